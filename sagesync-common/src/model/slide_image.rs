//! Ephemeral input records from SAGE

use super::lsm::LsmImage;
use super::property::PropertyValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One per-acquisition image record as exported from SAGE.
///
/// Lives only for the duration of one synchronization run; reconciliation
/// folds it into the persistent [`LsmImage`] for its `sage_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideImage {
    pub sage_id: i64,
    pub name: String,
    pub filepath: String,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub tile: Option<String>,
    #[serde(default)]
    pub anatomical_area: Option<String>,
    /// Free-form property map keyed "<cv>_<term>"
    #[serde(default)]
    pub properties: HashMap<String, PropertyValue>,
}

/// Transient grouping of a sample's images by (tag, anatomical area).
///
/// Built fresh for each reconciliation run and discarded afterwards.
#[derive(Debug, Clone)]
pub struct SlideImageGroup {
    pub tag: String,
    pub anatomical_area: String,
    pub images: Vec<LsmImage>,
}

impl SlideImageGroup {
    pub fn new(anatomical_area: &str, tag: &str) -> Self {
        SlideImageGroup {
            tag: tag.to_string(),
            anatomical_area: anatomical_area.to_string(),
            images: Vec::new(),
        }
    }
}
