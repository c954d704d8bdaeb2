//! Data set configuration

use serde::{Deserialize, Serialize};

/// A data set groups samples under one owner and configures how they are
/// named. Data sets are administered outside the engine; synchronization
/// only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSet {
    /// Unique identifier, e.g. "flylight_polarity_case_3"
    pub identifier: String,
    pub name: String,
    pub owner_key: String,
    /// Display-name template for samples, e.g. "{Line}-{Slide Code}".
    /// Falls back to the engine default when absent.
    #[serde(default)]
    pub sample_name_pattern: Option<String>,
    #[serde(default)]
    pub readers: Vec<String>,
    #[serde(default)]
    pub writers: Vec<String>,
}
