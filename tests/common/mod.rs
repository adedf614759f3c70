//! Synthetic DICOM studies for the integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::{tags, uids};
use ndarray::Array2;

pub const CT_INTERCEPT: f64 = -1024.0;
/// Stored value of soft tissue (40 HU) in the CT fixtures.
pub const CT_TISSUE: u16 = 1064;

pub struct Header<'a> {
    pub modality: &'a str,
    pub patient: &'a str,
    pub description: &'a str,
    pub instance: Option<i32>,
}

/// Square image with a centered disk of `inside` over a background of `outside`.
pub fn body(size: usize, inside: u16, outside: u16) -> Array2<u16> {
    let c = size as f32 / 2.0;
    let r = size as f32 / 3.0;
    Array2::from_shape_fn((size, size), |(y, x)| {
        let (dy, dx) = (y as f32 + 0.5 - c, x as f32 + 0.5 - c);
        if dy * dy + dx * dx <= r * r { inside } else { outside }
    })
}

pub fn write_dicom(path: &Path, header: &Header<'_>, pixels: &Array2<u16>) {
    let sop_class = match header.modality {
        "CT" => uids::CT_IMAGE_STORAGE,
        "MR" => uids::MR_IMAGE_STORAGE,
        _ => uids::SECONDARY_CAPTURE_IMAGE_STORAGE,
    };
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    let sop_instance = format!("2.25.{}", name.bytes().map(u32::from).sum::<u32>());

    let mut obj = InMemDicomObject::new_empty();
    let mut put = |tag, vr, value: PrimitiveValue| {
        obj.put(DataElement::new(tag, vr, value));
    };
    put(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(sop_class));
    put(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from(sop_instance.as_str()));
    put(tags::MODALITY, VR::CS, PrimitiveValue::from(header.modality));
    put(tags::PATIENT_ID, VR::LO, PrimitiveValue::from(header.patient));
    put(tags::SERIES_DESCRIPTION, VR::LO, PrimitiveValue::from(header.description));
    if let Some(instance) = header.instance {
        put(tags::INSTANCE_NUMBER, VR::IS, PrimitiveValue::from(instance.to_string()));
    }
    if header.modality == "CT" {
        put(tags::RESCALE_SLOPE, VR::DS, PrimitiveValue::from("1"));
        put(tags::RESCALE_INTERCEPT, VR::DS, PrimitiveValue::from(CT_INTERCEPT.to_string()));
    }

    let (rows, cols) = pixels.dim();
    put(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16));
    put(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, PrimitiveValue::from("MONOCHROME2"));
    put(tags::ROWS, VR::US, PrimitiveValue::from(rows as u16));
    put(tags::COLUMNS, VR::US, PrimitiveValue::from(cols as u16));
    put(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16));
    put(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16));
    put(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16));
    put(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16));
    let bytes: Vec<u8> = pixels.iter().flat_map(|v| v.to_le_bytes()).collect();
    put(tags::PIXEL_DATA, VR::OW, PrimitiveValue::from(bytes));

    obj.with_meta(
        FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(sop_class)
            .media_storage_sop_instance_uid(sop_instance),
    )
    .unwrap()
    .write_to_file(path)
    .unwrap();
}

/// `CT.1.2.{location}.dcm` of the registered CT series.
pub fn write_ct(patient_dir: &Path, patient: &str, location: i32, pixels: &Array2<u16>) -> PathBuf {
    fs::create_dir_all(patient_dir).unwrap();
    let path = patient_dir.join(format!("CT.1.2.{location}.dcm"));
    let header = Header {
        modality: "CT",
        patient,
        description: "CTtoMR",
        // deliberately unrelated to the location
        instance: Some(1000 - location),
    };
    write_dicom(&path, &header, pixels);
    path
}

/// T2 MR slice whose location is only known from its Instance Number.
pub fn write_mr(patient_dir: &Path, patient: &str, instance: i32, pixels: &Array2<u16>) -> PathBuf {
    fs::create_dir_all(patient_dir).unwrap();
    let path = patient_dir.join(format!("MR.9.{}.dcm", 500 + instance));
    let header = Header {
        modality: "MR",
        patient,
        description: "T2 tse tra",
        instance: Some(instance),
    };
    write_dicom(&path, &header, pixels);
    path
}
