/// Constants of the slice processing pipeline.
///
/// Built once at startup and handed to every stage by reference.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessingConfig {
    /// Edge length of the square arrays written to disk.
    pub target_resolution: usize,
    /// Edge length of each half of a visualization image.
    pub preview_resolution: usize,
    /// CT values at or below this are background when deriving the body mask.
    pub hounsfield_threshold: f32,
    /// First row (from the top) that is always background in the body mask.
    pub table_cutoff_row: usize,
    /// Radius of the disk footprint used to close the body mask.
    pub closing_radius: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            target_resolution: 512,
            preview_resolution: 256,
            hounsfield_threshold: -500.0,
            table_cutoff_row: 440,
            closing_radius: 15,
        }
    }
}
