//! Persisted sample aggregate: sample, objective samples, tiles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Sample processing status state machine.
///
/// New -> Scheduled -> (Queued/Processing, driven externally) -> Complete or
/// Error. The engine only ever moves a sample to Scheduled; everything past
/// that belongs to the downstream pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    Intake,
    New,
    Scheduled,
    Queued,
    Processing,
    Complete,
    Error,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStatus::Intake => "Intake",
            PipelineStatus::New => "New",
            PipelineStatus::Scheduled => "Scheduled",
            PipelineStatus::Queued => "Queued",
            PipelineStatus::Processing => "Processing",
            PipelineStatus::Complete => "Complete",
            PipelineStatus::Error => "Error",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for PipelineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Intake" => Ok(PipelineStatus::Intake),
            "New" => Ok(PipelineStatus::New),
            "Scheduled" => Ok(PipelineStatus::Scheduled),
            "Queued" => Ok(PipelineStatus::Queued),
            "Processing" => Ok(PipelineStatus::Processing),
            "Complete" => Ok(PipelineStatus::Complete),
            "Error" => Ok(PipelineStatus::Error),
            other => Err(format!("Unknown pipeline status: {}", other)),
        }
    }
}

/// One completed or in-flight pipeline run on an objective sample.
///
/// The engine never creates runs; their presence decides whether an obsolete
/// objective sample may be deleted or only have its tiles cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplePipelineRun {
    pub id: Uuid,
    pub name: String,
    pub pipeline_process: String,
    pub pipeline_version: i32,
    pub creation_date: DateTime<Utc>,
}

/// A named, area-tagged group of LSM images merged together downstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleTile {
    pub name: String,
    pub anatomical_area: String,
    /// Member images by id, in grouping order
    pub lsm_ids: Vec<Uuid>,
}

/// Per-objective grouping of tiles within a sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveSample {
    pub objective: String,
    pub chan_spec: Option<String>,
    pub tiles: Vec<SampleTile>,
    pub pipeline_runs: Vec<SamplePipelineRun>,
}

impl ObjectiveSample {
    pub fn new(objective: &str) -> Self {
        ObjectiveSample {
            objective: objective.to_string(),
            chan_spec: None,
            tiles: Vec::new(),
            pipeline_runs: Vec::new(),
        }
    }

    pub fn has_pipeline_runs(&self) -> bool {
        !self.pipeline_runs.is_empty()
    }

    /// Find a tile by its (tag, area) key. Legacy tiles persisted without an
    /// anatomical area match any area, so they can be patched in place.
    pub fn tile_index_by_name_and_area(&self, name: &str, area: &str) -> Option<usize> {
        self.tiles
            .iter()
            .position(|t| t.name == name && t.anatomical_area == area)
            .or_else(|| {
                self.tiles
                    .iter()
                    .position(|t| t.name == name && t.anatomical_area.is_empty())
            })
    }

    pub fn tile_by_name_and_area(&self, name: &str, area: &str) -> Option<&SampleTile> {
        self.tile_index_by_name_and_area(name, area)
            .map(|i| &self.tiles[i])
    }

    pub fn tile_by_name_and_area_mut(&mut self, name: &str, area: &str) -> Option<&mut SampleTile> {
        self.tile_index_by_name_and_area(name, area)
            .map(move |i| &mut self.tiles[i])
    }
}

/// The specimen aggregate, keyed externally by (data_set, slide_code)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub id: Uuid,
    pub data_set: String,
    pub slide_code: String,
    /// Display name derived from the data set's name pattern
    pub name: String,
    pub status: PipelineStatus,
    /// True for the single active record among those sharing a natural key
    pub sage_synced: bool,
    /// Administrative hold; suppresses all automatic status transitions
    pub blocked: bool,
    pub objective_samples: Vec<ObjectiveSample>,
    pub creation_date: DateTime<Utc>,

    // Consensus attributes computed across the sample's images
    pub line: Option<String>,
    pub vt_line: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub effector: Option<String>,
    pub mounting_protocol: Option<String>,
    pub tissue_orientation: Option<String>,
    pub cross_barcode: Option<i64>,
    pub tmog_date: Option<DateTime<Utc>>,

    // Access control, propagated from the owning data set
    pub readers: Vec<String>,
    pub writers: Vec<String>,
}

impl Sample {
    /// Create a new sample for a natural key, not yet persisted
    pub fn new(data_set: &str, slide_code: &str) -> Self {
        Sample {
            id: Uuid::new_v4(),
            data_set: data_set.to_string(),
            slide_code: slide_code.to_string(),
            name: slide_code.to_string(),
            status: PipelineStatus::New,
            sage_synced: false,
            blocked: false,
            objective_samples: Vec::new(),
            creation_date: Utc::now(),
            line: None,
            vt_line: None,
            age: None,
            gender: None,
            effector: None,
            mounting_protocol: None,
            tissue_orientation: None,
            cross_barcode: None,
            tmog_date: None,
            readers: Vec::new(),
            writers: Vec::new(),
        }
    }

    pub fn objective_sample(&self, objective: &str) -> Option<&ObjectiveSample> {
        self.objective_samples
            .iter()
            .find(|os| os.objective == objective)
    }

    pub fn objective_sample_mut(&mut self, objective: &str) -> Option<&mut ObjectiveSample> {
        self.objective_samples
            .iter_mut()
            .find(|os| os.objective == objective)
    }

    /// All LSM ids referenced by this sample's tiles, in tile order
    pub fn lsm_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for os in &self.objective_samples {
            for tile in &os.tiles {
                ids.extend(tile.lsm_ids.iter().copied());
            }
        }
        ids
    }
}
