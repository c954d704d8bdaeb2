//! Persisted LSM image record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Kinds of files attached to an image record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileType {
    /// The raw microscope stack, canonical key for the LSM filepath
    LosslessStack,
    /// Extracted metadata sidecar
    LsmMetadata,
    AllMip,
    ReferenceMip,
    SignalMip,
}

/// One raw microscope image, keyed externally by its SAGE image id.
///
/// Schema-mapped attributes are populated from the SAGE property map during
/// reconciliation; the rest are maintained by the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LsmImage {
    pub id: Uuid,
    pub sage_id: i64,
    pub name: String,
    pub filepath: String,
    /// Files attached to this image, keyed by kind
    pub files: BTreeMap<FileType, String>,
    /// Owning sample, maintained as a back-reference by the engine
    pub sample_ref: Option<Uuid>,
    /// True for the single active record among those sharing a sage_id
    pub sage_synced: bool,
    pub creation_date: DateTime<Utc>,

    // Schema-mapped attributes (see the engine's attribute schema index)
    pub line: Option<String>,
    pub vt_line: Option<String>,
    pub slide_code: Option<String>,
    pub data_set: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub effector: Option<String>,
    pub mounting_protocol: Option<String>,
    pub tissue_orientation: Option<String>,
    pub cross_barcode: Option<i64>,
    pub representative: Option<bool>,
    pub created_by: Option<String>,
    pub objective: Option<String>,
    pub tile: Option<String>,
    pub anatomical_area: Option<String>,
    pub chan_spec: Option<String>,
    pub num_channels: Option<i64>,
    pub capture_date: Option<DateTime<Utc>>,
    pub tmog_date: Option<DateTime<Utc>>,
    pub voxel_size_x: Option<String>,
    pub voxel_size_y: Option<String>,
    pub voxel_size_z: Option<String>,
    pub dimension_x: Option<String>,
    pub dimension_y: Option<String>,
    pub dimension_z: Option<String>,

    // Derived attributes
    pub optical_resolution: Option<String>,
    pub image_size: Option<String>,

    // Access control, propagated from the owning data set
    pub readers: Vec<String>,
    pub writers: Vec<String>,
}

impl LsmImage {
    /// Create an empty record for a SAGE image id, not yet persisted
    pub fn new(sage_id: i64) -> Self {
        LsmImage {
            id: Uuid::new_v4(),
            sage_id,
            name: String::new(),
            filepath: String::new(),
            files: BTreeMap::new(),
            sample_ref: None,
            sage_synced: false,
            creation_date: Utc::now(),
            line: None,
            vt_line: None,
            slide_code: None,
            data_set: None,
            age: None,
            gender: None,
            effector: None,
            mounting_protocol: None,
            tissue_orientation: None,
            cross_barcode: None,
            representative: None,
            created_by: None,
            objective: None,
            tile: None,
            anatomical_area: None,
            chan_spec: None,
            num_channels: None,
            capture_date: None,
            tmog_date: None,
            voxel_size_x: None,
            voxel_size_y: None,
            voxel_size_z: None,
            dimension_x: None,
            dimension_y: None,
            dimension_z: None,
            optical_resolution: None,
            image_size: None,
            readers: Vec::new(),
            writers: Vec::new(),
        }
    }
}
