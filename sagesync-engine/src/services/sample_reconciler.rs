//! Sample assembly
//!
//! Builds or updates the specimen aggregate for one (data set, slide code)
//! from its reconciled LSM images: consensus attributes, per-objective tile
//! groupings, status scheduling, back-references and permissions.

use super::consensus_resolver::apply_sample_attributes;
use super::objective_sync::{create_or_update_objective_sample, remove_obsolete_objectives};
use super::{chan_spec, tile_grouper, SampleSynchronizer};
use crate::dal::EntityType;
use crate::schema::UpdateType;
use sagesync_common::model::{DataSet, LsmImage, PipelineStatus, Sample};
use sagesync_common::{Error, Result};
use tracing::{debug, error, info, warn};

impl SampleSynchronizer {
    /// Create or update the sample for one slide code from its images.
    ///
    /// The images must already have been reconciled through
    /// [`create_or_update_lsm`](Self::create_or_update_lsm) this run, so that
    /// the pending-reprocess set and the image cache are populated.
    pub async fn create_or_update_sample(
        &mut self,
        slide_code: &str,
        data_set: &DataSet,
        lsms: &[LsmImage],
    ) -> Result<Sample> {
        debug!(
            "create_or_update_sample({}, dataSet={})",
            slide_code, data_set.identifier
        );

        let lsm_added = lsms.iter().any(|l| self.reprocess_lsm_ids.contains(&l.id));
        let tile_groups = tile_grouper::group_tiles(lsms);

        let mut sample_new = false;
        let mut dirty = false;
        let mut sample = match self.find_best_sample(&data_set.identifier, slide_code).await? {
            Some(sample) => sample,
            None => {
                info!(
                    "Creating new sample for {}/{}",
                    data_set.identifier, slide_code
                );
                self.num_samples_created += 1;
                sample_new = true;
                dirty = true;
                Sample::new(&data_set.identifier, slide_code)
            }
        };

        let (attr_dirty, attrs_changed) =
            apply_sample_attributes(self.schema, data_set, &mut sample, &tile_groups);
        if attr_dirty {
            dirty = true;
        }
        if attrs_changed {
            self.changed_sample_ids.insert(sample.id);
        }

        if remove_obsolete_objectives(&mut sample, &tile_groups) {
            dirty = true;
        }

        let only_objective = tile_groups.len() == 1;
        let mut objective_changed = false;
        for (objective, tile_group_list) in &tile_groups {
            let num_channels = chan_spec::num_signal_channels(tile_group_list) + 1;
            let channel_spec =
                chan_spec::create_chan_spec(num_channels as usize, num_channels as usize);

            let ut = match create_or_update_objective_sample(
                &mut sample,
                objective,
                &channel_spec,
                tile_group_list,
                only_objective,
            ) {
                Ok(ut) => ut,
                Err(Error::TileIntegrity(msg)) => {
                    // One broken objective must not block the others
                    error!(
                        "Tile integrity error on sample {} objective '{}': {}",
                        sample.name, objective, msg
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            if ut != UpdateType::Same {
                dirty = true;
            }
            if ut == UpdateType::Change && !sample_new {
                objective_changed = true;
            }
        }

        if !sample.sage_synced {
            sample.sage_synced = true;
            dirty = true;
        }

        // Never schedule a sample on the run that created it
        let needs_reprocessing =
            (lsm_added || attrs_changed || objective_changed) && !sample_new;
        if needs_reprocessing && self.mark_for_processing(&mut sample).await? {
            self.num_samples_reprocessed += 1;
            dirty = true;
        }

        if dirty {
            sample = self.dal.save_sample(&self.owner_key, &sample).await?;
            if sample_new {
                self.dal
                    .record_status_transition(
                        sample.id,
                        PipelineStatus::Intake,
                        PipelineStatus::New,
                        self.order_no.as_deref(),
                        self.process.as_deref(),
                        None,
                    )
                    .await?;
            } else {
                self.num_samples_updated += 1;
            }
            info!("Saved sample {} (id={})", sample.name, sample.id);
        }

        self.update_lsm_back_references(&sample).await?;

        if dirty {
            self.dal
                .propagate_permissions(&self.owner_key, EntityType::Sample, sample.id, data_set)
                .await?;
        }

        Ok(sample)
    }

    /// The single active record for a natural key, else the most recent
    async fn find_best_sample(
        &self,
        data_set: &str,
        slide_code: &str,
    ) -> Result<Option<Sample>> {
        let samples = self
            .dal
            .find_samples_by_slide_code(&self.owner_key, data_set, slide_code)
            .await?;
        if let Some(active) = samples.iter().find(|s| s.sage_synced) {
            return Ok(Some(active.clone()));
        }
        Ok(samples.into_iter().next())
    }

    /// Move a sample to Scheduled, recording the transition. Blocked samples
    /// are left alone. Returns true if the status was changed.
    async fn mark_for_processing(&self, sample: &mut Sample) -> Result<bool> {
        if sample.blocked {
            info!(
                "Sample {} is blocked, not marking for processing",
                sample.name
            );
            return Ok(false);
        }

        let source = sample.status;
        sample.status = PipelineStatus::Scheduled;
        self.dal
            .record_status_transition(
                sample.id,
                source,
                PipelineStatus::Scheduled,
                self.order_no.as_deref(),
                self.process.as_deref(),
                None,
            )
            .await?;
        info!("Marked sample {} for processing ({} -> Scheduled)", sample.name, source);
        Ok(true)
    }

    /// Point every tiled image back at its owning sample
    async fn update_lsm_back_references(&mut self, sample: &Sample) -> Result<()> {
        for lsm_id in sample.lsm_ids() {
            let Some(lsm) = self.lsm_cache.get(&lsm_id) else {
                warn!("Tiled LSM {} was not reconciled this run", lsm_id);
                continue;
            };
            if lsm.sample_ref == Some(sample.id) {
                continue;
            }
            let mut lsm = lsm.clone();
            lsm.sample_ref = Some(sample.id);
            let lsm = self.dal.save_lsm(&self.owner_key, &lsm).await?;
            debug!("Updated sample reference on LSM {}", lsm.id);
            self.lsm_cache.insert(lsm.id, lsm);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dal::SampleDal;
    use sagesync_common::db::init_memory_pool;

    const OWNER: &str = "group:flylight";

    async fn setup() -> SampleSynchronizer {
        let dal = SampleDal::new(init_memory_pool().await.unwrap());
        SampleSynchronizer::new(dal, OWNER)
    }

    #[tokio::test]
    async fn test_mark_for_processing_records_transition() {
        let mut engine = setup().await;
        engine.set_process("sage_sync");
        engine.set_order_no("1234");

        let mut sample = Sample::new("flylight_test", "S1");
        sample.status = PipelineStatus::Complete;

        assert!(engine.mark_for_processing(&mut sample).await.unwrap());
        assert_eq!(sample.status, PipelineStatus::Scheduled);

        let log = engine.dal.status_transitions(sample.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].source, "Complete");
        assert_eq!(log[0].target, "Scheduled");
        assert_eq!(log[0].order_no.as_deref(), Some("1234"));
    }

    #[tokio::test]
    async fn test_blocked_sample_is_not_scheduled() {
        let engine = setup().await;

        let mut sample = Sample::new("flylight_test", "S1");
        sample.status = PipelineStatus::Complete;
        sample.blocked = true;

        assert!(!engine.mark_for_processing(&mut sample).await.unwrap());
        assert_eq!(sample.status, PipelineStatus::Complete);
        assert!(engine.dal.status_transitions(sample.id).await.unwrap().is_empty());
    }
}
