use crate::enums::Modality;

use dicom::object::{FileDicomObject, InMemDicomObject, OpenFileOptions};
use dicom_dictionary_std::tags;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Slice position shared by the CT and MR series of a patient.
pub type Location = i64;

/// Series description marker of the CT series registered onto MR.
const CT_SERIES_MARKER: &str = "CTtoMR";

const MR_SERIES_MARKERS: [&str; 2] = ["T2", "t2"];

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Double on {modality} for patient {patient} at location {location}")]
    Duplicate {
        modality: Modality,
        patient: String,
        location: Location,
    },

    #[error("{}: missing or unreadable {attribute}", path.display())]
    MissingAttribute {
        path: PathBuf,
        attribute: &'static str,
    },

    #[error("{}: no slice location in file name", path.display())]
    MissingLocation { path: PathBuf },

    #[error("could not list {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not read {}: {source}", path.display())]
    Dicom {
        path: PathBuf,
        source: dicom::object::ReadError,
    },
}

/// At most one file per modality for a single patient location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModalityRecord {
    ct: Option<PathBuf>,
    mr: Option<PathBuf>,
}

impl ModalityRecord {
    pub fn get(&self, modality: Modality) -> Option<&Path> {
        match modality {
            Modality::CT => self.ct.as_deref(),
            Modality::MR => self.mr.as_deref(),
        }
    }

    fn slot_mut(&mut self, modality: Modality) -> &mut Option<PathBuf> {
        match modality {
            Modality::CT => &mut self.ct,
            Modality::MR => &mut self.mr,
        }
    }

    /// Replace the CT file of this location, returning the previous one.
    pub(crate) fn replace_ct(&mut self, path: Option<PathBuf>) -> Option<PathBuf> {
        std::mem::replace(&mut self.ct, path)
    }

    pub fn is_complete(&self) -> bool {
        self.ct.is_some() && self.mr.is_some()
    }
}

pub type LocationMap = BTreeMap<Location, ModalityRecord>;

/// Patient → location → modality → file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesIndex {
    patients: BTreeMap<String, LocationMap>,
}

impl SeriesIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path` as the `modality` file of a patient location.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Duplicate`] if that slot is already taken. The
    /// index is left untouched in that case.
    pub fn insert(
        &mut self,
        patient: &str,
        location: Location,
        modality: Modality,
        path: PathBuf,
    ) -> Result<(), IndexError> {
        let record = self
            .patients
            .entry(patient.to_owned())
            .or_default()
            .entry(location)
            .or_default();
        let slot = record.slot_mut(modality);
        if slot.is_some() {
            return Err(IndexError::Duplicate {
                modality,
                patient: patient.to_owned(),
                location,
            });
        }
        *slot = Some(path);
        Ok(())
    }

    pub fn patient(&self, patient: &str) -> Option<&LocationMap> {
        self.patients.get(patient)
    }

    pub(crate) fn patient_mut(&mut self, patient: &str) -> Option<&mut LocationMap> {
        self.patients.get_mut(patient)
    }

    /// Patients in ascending identifier order.
    pub fn patients(&self) -> impl Iterator<Item = (&str, &LocationMap)> {
        self.patients.iter().map(|(id, locations)| (id.as_str(), locations))
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// Number of (patient, location) entries.
    pub fn location_count(&self) -> usize {
        self.patients.values().map(BTreeMap::len).sum()
    }
}

/// Header fields needed to place a file in the index.
#[derive(Debug, Clone, Default)]
pub struct SeriesHeader {
    pub modality: String,
    pub patient_id: Option<String>,
    pub series_description: Option<String>,
    pub instance_number: Option<Location>,
}

impl SeriesHeader {
    /// Read the header of `path`, stopping before the pixel data.
    pub fn read(path: &Path) -> Result<Self, IndexError> {
        let object = OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path)
            .map_err(|source| IndexError::Dicom {
                path: path.to_owned(),
                source,
            })?;

        let modality =
            Self::string(&object, tags::MODALITY).ok_or_else(|| IndexError::MissingAttribute {
                path: path.to_owned(),
                attribute: "Modality",
            })?;

        Ok(Self {
            modality,
            patient_id: Self::string(&object, tags::PATIENT_ID),
            series_description: Self::string(&object, tags::SERIES_DESCRIPTION),
            instance_number: object
                .element(tags::INSTANCE_NUMBER)
                .ok()
                .and_then(|e| e.to_int::<Location>().ok()),
        })
    }

    fn string(
        object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<String> {
        object
            .element(tag)
            .ok()?
            .to_str()
            .ok()
            .map(|s| s.trim_end_matches(['\0', ' ']).to_string())
    }

    /// Decide whether this file belongs in the index, and where.
    ///
    /// Returns `Ok(None)` for modalities and series that take no part in the
    /// CT/MR pairing.
    pub fn classify(
        &self,
        path: &Path,
    ) -> Result<Option<(String, Location, Modality)>, IndexError> {
        let Some(modality) = Modality::from_dicom(&self.modality) else {
            return Ok(None);
        };
        let missing = |attribute| IndexError::MissingAttribute {
            path: path.to_owned(),
            attribute,
        };
        let description = self
            .series_description
            .as_deref()
            .ok_or_else(|| missing("SeriesDescription"))?;

        let location = match modality {
            Modality::CT if description.contains(CT_SERIES_MARKER) => {
                location_from_file_name(path).ok_or_else(|| IndexError::MissingLocation {
                    path: path.to_owned(),
                })?
            }
            Modality::MR if MR_SERIES_MARKERS.iter().any(|m| description.contains(m)) => self
                .instance_number
                .ok_or_else(|| missing("InstanceNumber"))?,
            _ => return Ok(None),
        };

        let patient = self
            .patient_id
            .clone()
            .ok_or_else(|| missing("PatientID"))?;
        Ok(Some((patient, location, modality)))
    }
}

/// Slice index encoded in CT file names such as `CT.1.2.3.42.dcm`.
pub fn location_from_file_name(path: &Path) -> Option<Location> {
    let name = path.file_name()?.to_str()?;
    let (_, digits) = name.strip_suffix(".dcm")?.rsplit_once('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Regular `.dcm` files directly inside `dir`, in name order.
pub fn dicom_files(dir: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let io_error = |source: std::io::Error| IndexError::Io {
        path: dir.to_owned(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("dcm") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Index every relevant CT and MR file found in `paths`.
///
/// # Errors
///
/// Fails on unreadable directories or headers, on malformed metadata of a
/// relevant file, and when two files claim the same patient, location and
/// modality.
pub fn build_index(paths: &[impl AsRef<Path>]) -> Result<SeriesIndex, IndexError> {
    let mut index = SeriesIndex::new();

    for dir in paths {
        for path in dicom_files(dir.as_ref())? {
            let header = SeriesHeader::read(&path)?;
            match header.classify(&path)? {
                Some((patient, location, modality)) => {
                    index.insert(&patient, location, modality, path)?;
                }
                None => debug!(
                    "Skipping {} ({} {:?})",
                    path.display(),
                    header.modality,
                    header.series_description.as_deref().unwrap_or_default()
                ),
            }
        }
    }

    Ok(index)
}

/// Keys of the locations of `map` that carry a CT file, ascending.
pub(crate) fn ct_locations(map: &LocationMap) -> Vec<Location> {
    map.iter()
        .filter(|(_, record)| record.get(Modality::CT).is_some())
        .map(|(location, _)| *location)
        .collect()
}
