//! Aligns CT slice order with MR slice order for patients whose CT series
//! was stored in the opposite direction.

use crate::cohort::PatientCohort;
use crate::index::{LocationMap, SeriesIndex, ct_locations};

/// Reverse the CT files of every reversed patient of `cohort` in `index`.
///
/// Returns the identifiers of the patients that were reversed.
pub fn reconcile(index: &mut SeriesIndex, cohort: &PatientCohort) -> Vec<String> {
    let reversed: Vec<String> = index
        .patients()
        .map(|(patient, _)| patient)
        .filter(|patient| cohort.is_reversed(patient))
        .map(str::to_owned)
        .collect();

    for patient in &reversed {
        if let Some(locations) = index.patient_mut(patient) {
            reverse_ct_order(locations);
        }
    }

    reversed
}

/// Hand the CT files of ascending locations back out in descending order.
/// Location keys and MR files stay where they are.
pub fn reverse_ct_order(locations: &mut LocationMap) {
    let keys = ct_locations(locations);
    let mut files: Vec<_> = locations
        .values_mut()
        .filter_map(|record| record.replace_ct(None))
        .collect();
    files.reverse();

    for (location, file) in keys.iter().zip(files) {
        if let Some(record) = locations.get_mut(location) {
            record.replace_ct(Some(file));
        }
    }
}
