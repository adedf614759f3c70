use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modality {
    CT,
    MR,
}

impl Modality {
    pub const ALL: [Modality; 2] = [Modality::CT, Modality::MR];

    /// Name used both for the DICOM Modality attribute and for output directories.
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::CT => "CT",
            Modality::MR => "MR",
        }
    }

    /// Parse the (trimmed) value of the DICOM Modality attribute.
    pub fn from_dicom(value: &str) -> Option<Self> {
        match value.trim() {
            "CT" => Some(Modality::CT),
            "MR" => Some(Modality::MR),
            _ => None,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
