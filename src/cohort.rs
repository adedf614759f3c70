//! Patient cohort: which patients go to which split, whose CT runs in
//! reverse, and who is left out of the output.

use crate::enums::Split;

use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::{fmt, fs};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CohortError {
    #[error("{first}/{second} crossover: patient {patient} is in both splits")]
    Crossover {
        first: Split,
        second: Split,
        patient: String,
    },

    #[error("patient {0} is listed twice in the same split")]
    Repeated(String),

    #[error("could not read cohort file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid cohort file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Patient groups of the Gold Atlas, one per contributing site.
const GOLD_ATLAS_SITES: [&[&str]; 3] = [
    &[
        "1_01_P", "1_02_P", "1_03_P", "1_04_P", "1_05_P", "1_06_P", "1_07_P", "1_08_P",
    ],
    &[
        "2_03_P", "2_04_P", "2_05_P", "2_06_P", "2_09_P", "2_10_P", "2_11_P",
    ],
    &["3_01_P", "3_02_P", "3_03_P", "3_04_P"],
];

/// Per site: end of training, start and end of validation, start of test.
/// Site 2 leaves `2_09_P` out of every split.
const GOLD_ATLAS_SPLIT: [(usize, usize, usize, usize); 3] =
    [(5, 5, 6, 6), (4, 5, 6, 6), (2, 2, 3, 3)];

/// Site whose CT series are stored in the opposite direction of MR.
const GOLD_ATLAS_REVERSED_SITE: usize = 2;

const GOLD_ATLAS_DROPPED: [&str; 1] = ["2_10_P"];

/// Serialized form of a cohort, as found in a TOML cohort file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CohortFile {
    pub train: Vec<String>,
    pub val: Vec<String>,
    pub test: Vec<String>,
    #[serde(default)]
    pub reversed: Vec<String>,
    #[serde(default)]
    pub dropped: Vec<String>,
}

/// Immutable cohort definition. The three splits never share a patient.
#[derive(Debug, Clone)]
pub struct PatientCohort {
    train: Vec<String>,
    val: Vec<String>,
    test: Vec<String>,
    reversed: BTreeSet<String>,
    dropped: BTreeSet<String>,
}

impl PatientCohort {
    /// Build a cohort, failing if a patient shows up in more than one split.
    pub fn new(
        train: Vec<String>,
        val: Vec<String>,
        test: Vec<String>,
        reversed: impl IntoIterator<Item = String>,
        dropped: impl IntoIterator<Item = String>,
    ) -> Result<Self, CohortError> {
        let cohort = Self {
            train,
            val,
            test,
            reversed: reversed.into_iter().collect(),
            dropped: dropped.into_iter().collect(),
        };
        cohort.validate()?;
        Ok(cohort)
    }

    /// The Gold Atlas cohort restricted to the enabled sites (1-based).
    pub fn gold_atlas(enabled_sites: &[usize]) -> Result<Self, CohortError> {
        let mut file = CohortFile::default();

        for (site, (patients, (train_end, val_start, val_end, test_start))) in GOLD_ATLAS_SITES
            .iter()
            .zip(GOLD_ATLAS_SPLIT)
            .enumerate()
            .map(|(i, entry)| (i + 1, entry))
        {
            if !enabled_sites.contains(&site) {
                continue;
            }
            let owned = |ids: &[&str]| ids.iter().map(|p| p.to_string()).collect::<Vec<_>>();
            file.train.extend(owned(&patients[..train_end]));
            file.val.extend(owned(&patients[val_start..val_end]));
            file.test.extend(owned(&patients[test_start..]));
            if site == GOLD_ATLAS_REVERSED_SITE {
                file.reversed.extend(owned(&patients[..]));
            }
        }
        file.dropped = GOLD_ATLAS_DROPPED.iter().map(|p| p.to_string()).collect();

        Self::from_file(file)
    }

    pub fn from_file(file: CohortFile) -> Result<Self, CohortError> {
        let CohortFile {
            train,
            val,
            test,
            reversed,
            dropped,
        } = file;
        Self::new(train, val, test, reversed, dropped)
    }

    /// Read a cohort from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CohortError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_file(toml::from_str(&text)?)
    }

    fn validate(&self) -> Result<(), CohortError> {
        for split in Split::ALL {
            let patients = self.patients(split);
            let unique: BTreeSet<&String> = patients.iter().collect();
            if unique.len() != patients.len() {
                let repeated = patients
                    .iter()
                    .enumerate()
                    .find(|(i, p)| patients[..*i].contains(p))
                    .map(|(_, p)| p.clone())
                    .unwrap_or_default();
                return Err(CohortError::Repeated(repeated));
            }
        }

        let pairs = [
            (Split::Train, Split::Val),
            (Split::Train, Split::Test),
            (Split::Val, Split::Test),
        ];
        for (first, second) in pairs {
            let other = self.patients(second);
            if let Some(patient) = self.patients(first).iter().find(|p| other.contains(p)) {
                return Err(CohortError::Crossover {
                    first,
                    second,
                    patient: patient.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn patients(&self, split: Split) -> &[String] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    /// Patient directories of a split under `source`.
    pub fn split_paths(&self, source: impl AsRef<Path>, split: Split) -> Vec<PathBuf> {
        self.patients(split)
            .iter()
            .map(|patient| source.as_ref().join(patient))
            .collect()
    }

    pub fn is_reversed(&self, patient: &str) -> bool {
        self.reversed.contains(patient)
    }

    pub fn is_dropped(&self, patient: &str) -> bool {
        self.dropped.contains(patient)
    }
}

impl fmt::Display for PatientCohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} train / {} val / {} test patients, {} reversed, {} dropped",
            self.train.len(),
            self.val.len(),
            self.test.len(),
            self.reversed.len(),
            self.dropped.len()
        )
    }
}
