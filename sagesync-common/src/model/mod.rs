//! Domain model for SAGE synchronization
//!
//! The persistent entities (LSM images, samples, data sets) reference each
//! other by id only; the store resolves relations. In-memory object graphs
//! stay acyclic.

pub mod data_set;
pub mod lsm;
pub mod property;
pub mod sample;
pub mod slide_image;

pub use data_set::DataSet;
pub use lsm::{FileType, LsmImage};
pub use property::{FieldValue, PropertyValue};
pub use sample::{ObjectiveSample, PipelineStatus, Sample, SamplePipelineRun, SampleTile};
pub use slide_image::{SlideImage, SlideImageGroup};
