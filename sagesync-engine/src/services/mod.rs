//! Reconciliation services
//!
//! One [`SampleSynchronizer`] drives one reconciliation run: LSM
//! reconciliation first, then sample assembly. The instance carries
//! run-scoped state (image cache, reprocess/changed id sets, counters) and
//! must not be reused across runs; separate specimens may be synchronized
//! concurrently by separate instances against the same store.

pub mod chan_spec;
pub mod consensus_resolver;
pub mod lsm_reconciler;
pub mod objective_sync;
pub mod sample_reconciler;
pub mod tile_grouper;

use crate::dal::SampleDal;
use crate::schema::AttributeSchemaIndex;
use sagesync_common::model::LsmImage;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// The reconciliation engine for one synchronization run
pub struct SampleSynchronizer {
    pub(crate) dal: SampleDal,
    pub(crate) owner_key: String,
    pub(crate) schema: &'static AttributeSchemaIndex,
    pub(crate) process: Option<String>,
    pub(crate) order_no: Option<String>,

    // Run-scoped state
    pub(crate) lsm_cache: HashMap<Uuid, LsmImage>,
    pub(crate) reprocess_lsm_ids: HashSet<Uuid>,
    pub(crate) changed_lsm_ids: HashSet<Uuid>,
    pub(crate) changed_sample_ids: HashSet<Uuid>,
    pub(crate) unknown_sage_keys: HashSet<String>,
    pub(crate) num_samples_created: usize,
    pub(crate) num_samples_updated: usize,
    pub(crate) num_samples_reprocessed: usize,
}

impl SampleSynchronizer {
    pub fn new(dal: SampleDal, owner_key: &str) -> Self {
        SampleSynchronizer {
            dal,
            owner_key: owner_key.to_string(),
            schema: AttributeSchemaIndex::global(),
            process: None,
            order_no: None,
            lsm_cache: HashMap::new(),
            reprocess_lsm_ids: HashSet::new(),
            changed_lsm_ids: HashSet::new(),
            changed_sample_ids: HashSet::new(),
            unknown_sage_keys: HashSet::new(),
            num_samples_created: 0,
            num_samples_updated: 0,
            num_samples_reprocessed: 0,
        }
    }

    /// Pipeline process name recorded on status transitions
    pub fn set_process(&mut self, process: &str) {
        self.process = Some(process.to_string());
    }

    /// Order number recorded on status transitions
    pub fn set_order_no(&mut self, order_no: &str) {
        self.order_no = Some(order_no.to_string());
    }

    /// Ids of images whose changes require downstream reprocessing
    pub fn reprocess_lsm_ids(&self) -> &HashSet<Uuid> {
        &self.reprocess_lsm_ids
    }

    /// Ids of images with at least one changed attribute this run
    pub fn changed_lsm_ids(&self) -> &HashSet<Uuid> {
        &self.changed_lsm_ids
    }

    pub fn num_samples_created(&self) -> usize {
        self.num_samples_created
    }

    pub fn num_samples_updated(&self) -> usize {
        self.num_samples_updated
    }

    pub fn num_samples_reprocessed(&self) -> usize {
        self.num_samples_reprocessed
    }
}
