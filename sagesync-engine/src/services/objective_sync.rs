//! Objective sample synchronization
//!
//! Reconciles one objective's tile grouping against the tiles already
//! persisted on the sample. Matching tile sets are patched in place;
//! anything else is a destructive rebuild of the tile list, intentionally
//! without per-tile diffing.

use crate::schema::UpdateType;
use sagesync_common::model::{ObjectiveSample, Sample, SampleTile, SlideImageGroup};
use sagesync_common::{Error, Result};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Remove or reset objective samples whose objective is absent from the new
/// grouping. Records with pipeline-run history keep their (cleared) record;
/// the lone empty-objective placeholder survives when it is about to be
/// repurposed for the run's only objective. Returns true if the sample was
/// modified.
pub fn remove_obsolete_objectives(
    sample: &mut Sample,
    tile_groups: &BTreeMap<String, Vec<SlideImageGroup>>,
) -> bool {
    let mut dirty = false;
    let only_objective = tile_groups.len() == 1;

    let mut kept = Vec::with_capacity(sample.objective_samples.len());
    for mut os in std::mem::take(&mut sample.objective_samples) {
        if tile_groups.contains_key(&os.objective) {
            kept.push(os);
            continue;
        }
        if os.objective.is_empty() && only_objective {
            warn!("Leaving empty objective alone, because it is the only one");
            kept.push(os);
            continue;
        }
        if os.has_pipeline_runs() {
            warn!("Resetting tiles for existing '{}' objective sample", os.objective);
            os.tiles = Vec::new();
            kept.push(os);
        } else {
            warn!("Removing existing '{}' objective sample", os.objective);
        }
        dirty = true;
    }
    sample.objective_samples = kept;

    dirty
}

/// Create the objective sample for one objective, or synchronize the
/// existing one against the new grouping.
pub fn create_or_update_objective_sample(
    sample: &mut Sample,
    objective: &str,
    chan_spec: &str,
    tile_group_list: &[SlideImageGroup],
    only_objective: bool,
) -> Result<UpdateType> {
    let existing_idx = sample
        .objective_samples
        .iter()
        .position(|os| os.objective == objective);

    let Some(existing_idx) = existing_idx else {
        // A lone legacy record with an empty objective is repurposed rather
        // than duplicated, but only when this run has no other objective.
        let legacy = only_objective
            && sample.objective_samples.len() == 1
            && sample.objective_samples[0].objective.is_empty();
        if legacy {
            let os = &mut sample.objective_samples[0];
            os.objective = objective.to_string();
            synchronize_tiles(os, tile_group_list)?;
            debug!(
                "Updated objective to '{}' for legacy sample with empty objective",
                objective
            );
            return Ok(UpdateType::Add);
        }

        let mut os = ObjectiveSample::new(objective);
        os.chan_spec = Some(chan_spec.to_string());
        synchronize_tiles(&mut os, tile_group_list)?;
        sample.objective_samples.push(os);
        debug!("Created new objective '{}' for sample {}", objective, sample.name);
        return Ok(UpdateType::Add);
    };

    let os = &mut sample.objective_samples[existing_idx];
    synchronize_tiles(os, tile_group_list)
}

/// Bring an objective sample's tiles in line with the new grouping.
///
/// When the tile sets match, only anatomical-area mismatches on
/// otherwise-identical tiles are patched in place (an ADD: legacy tiles had
/// no area). When they don't, the tile list is rebuilt wholesale (a CHANGE).
pub fn synchronize_tiles(
    objective_sample: &mut ObjectiveSample,
    tile_group_list: &[SlideImageGroup],
) -> Result<UpdateType> {
    if !tiles_match(objective_sample, tile_group_list) {
        // Something has changed, so just recreate the tiles
        let tiles: Vec<SampleTile> = tile_group_list
            .iter()
            .map(|tile_group| SampleTile {
                name: tile_group.tag.clone(),
                anatomical_area: tile_group.anatomical_area.clone(),
                lsm_ids: tile_group.images.iter().map(|lsm| lsm.id).collect(),
            })
            .collect();
        objective_sample.tiles = tiles;
        info!(
            "Updated tiles for objective '{}'",
            objective_sample.objective
        );
        return Ok(UpdateType::Change);
    }

    let mut update = UpdateType::Same;
    for tile_group in tile_group_list {
        let Some(tile) = objective_sample
            .tile_by_name_and_area_mut(&tile_group.tag, &tile_group.anatomical_area)
        else {
            return Err(Error::TileIntegrity(format!(
                "No such tile: {}",
                tile_group.tag
            )));
        };
        if tile.anatomical_area != tile_group.anatomical_area {
            tile.anatomical_area = tile_group.anatomical_area.clone();
            info!(
                "Updated anatomical area for tile {} to {}",
                tile.name, tile.anatomical_area
            );
            update = UpdateType::Add;
        }
    }

    Ok(update)
}

/// True iff the (tag, area) key set, the per-tile image-id membership, and
/// the tile count all match the new grouping.
pub fn tiles_match(
    objective_sample: &ObjectiveSample,
    tile_group_list: &[SlideImageGroup],
) -> bool {
    let mut seen_tiles: HashSet<usize> = HashSet::new();

    trace!("Checking if tiles match");
    for tile_group in tile_group_list {
        trace!("Checking for {}", tile_group.tag);

        let Some(tile_idx) = objective_sample
            .tile_index_by_name_and_area(&tile_group.tag, &tile_group.anatomical_area)
        else {
            info!(
                "Existing sample does not contain tile '{}' with anatomical area '{}'",
                tile_group.tag, tile_group.anatomical_area
            );
            return false;
        };
        seen_tiles.insert(tile_idx);

        let new_ids: HashSet<Uuid> = tile_group.images.iter().map(|lsm| lsm.id).collect();
        let curr_ids: HashSet<Uuid> = objective_sample.tiles[tile_idx]
            .lsm_ids
            .iter()
            .copied()
            .collect();
        if new_ids != curr_ids {
            info!("LSM sets are not the same ({:?} != {:?})", new_ids, curr_ids);
            return false;
        }
    }

    if objective_sample.tiles.len() != seen_tiles.len() {
        info!(
            "Tile set sizes are not the same ({} != {})",
            objective_sample.tiles.len(),
            seen_tiles.len()
        );
        return false;
    }

    trace!("Tiles match");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use sagesync_common::model::LsmImage;

    fn group(tag: &str, area: &str, images: &[&LsmImage]) -> SlideImageGroup {
        let mut g = SlideImageGroup::new(area, tag);
        g.images = images.iter().map(|l| (*l).clone()).collect();
        g
    }

    fn objective_with_tiles(tiles: &[(&str, &str, Vec<Uuid>)]) -> ObjectiveSample {
        let mut os = ObjectiveSample::new("20x");
        for (name, area, ids) in tiles {
            os.tiles.push(SampleTile {
                name: name.to_string(),
                anatomical_area: area.to_string(),
                lsm_ids: ids.clone(),
            });
        }
        os
    }

    #[test]
    fn test_tiles_match_when_identical() {
        let a = LsmImage::new(1);
        let b = LsmImage::new(2);
        let os = objective_with_tiles(&[
            ("Tile 1", "Brain", vec![a.id]),
            ("Tile 2", "Brain", vec![b.id]),
        ]);
        let groups = vec![
            group("Tile 1", "Brain", &[&a]),
            group("Tile 2", "Brain", &[&b]),
        ];
        assert!(tiles_match(&os, &groups));
    }

    #[test]
    fn test_single_membership_change_breaks_match() {
        let a = LsmImage::new(1);
        let b = LsmImage::new(2);
        let os = objective_with_tiles(&[("Tile 1", "Brain", vec![a.id])]);

        // Same key, different member
        let groups = vec![group("Tile 1", "Brain", &[&b])];
        assert!(!tiles_match(&os, &groups));

        // Extra member
        let groups = vec![group("Tile 1", "Brain", &[&a, &b])];
        assert!(!tiles_match(&os, &groups));
    }

    #[test]
    fn test_extra_persisted_tile_breaks_match() {
        let a = LsmImage::new(1);
        let os = objective_with_tiles(&[
            ("Tile 1", "Brain", vec![a.id]),
            ("Tile 2", "Brain", vec![]),
        ]);
        let groups = vec![group("Tile 1", "Brain", &[&a])];
        assert!(!tiles_match(&os, &groups));
    }

    #[test]
    fn test_missing_key_breaks_match() {
        let a = LsmImage::new(1);
        let os = objective_with_tiles(&[("Tile 1", "Brain", vec![a.id])]);
        let groups = vec![group("Tile 1", "VNC", &[&a])];
        assert!(!tiles_match(&os, &groups));
    }

    #[test]
    fn test_legacy_tile_without_area_is_patched_in_place() {
        let a = LsmImage::new(1);
        let mut os = objective_with_tiles(&[("Tile 1", "", vec![a.id])]);
        let groups = vec![group("Tile 1", "Brain", &[&a])];

        // Area-less tile matches by name, then gets its area patched
        assert!(tiles_match(&os, &groups));
        assert_eq!(synchronize_tiles(&mut os, &groups).unwrap(), UpdateType::Add);
        assert_eq!(os.tiles[0].anatomical_area, "Brain");

        // A second pass sees nothing left to do
        assert_eq!(synchronize_tiles(&mut os, &groups).unwrap(), UpdateType::Same);
    }

    #[test]
    fn test_mismatch_rebuilds_tile_list() {
        let a = LsmImage::new(1);
        let b = LsmImage::new(2);
        let c = LsmImage::new(3);
        let mut os = objective_with_tiles(&[
            ("Tile 1", "Brain", vec![a.id]),
            ("Tile 2", "Brain", vec![b.id]),
        ]);
        let groups = vec![
            group("Tile 1", "Brain", &[&a]),
            group("Tile 2", "Brain", &[&b]),
            group("Tile 3", "Brain", &[&c]),
        ];

        assert_eq!(synchronize_tiles(&mut os, &groups).unwrap(), UpdateType::Change);
        assert_eq!(os.tiles.len(), 3);
        assert_eq!(os.tiles[2].lsm_ids, vec![c.id]);
    }

    #[test]
    fn test_removal_pass() {
        let mut sample = Sample::new("ds", "S1");
        sample.objective_samples.push(objective_with_tiles(&[]));
        sample.objective_samples[0].objective = "63x".to_string();

        let mut with_history = ObjectiveSample::new("40x");
        with_history.pipeline_runs.push(sagesync_common::model::SamplePipelineRun {
            id: Uuid::new_v4(),
            name: "run".to_string(),
            pipeline_process: "alignment".to_string(),
            pipeline_version: 1,
            creation_date: chrono::Utc::now(),
        });
        with_history.tiles.push(SampleTile {
            name: "Tile 1".to_string(),
            anatomical_area: "Brain".to_string(),
            lsm_ids: vec![],
        });
        sample.objective_samples.push(with_history);

        let groups: BTreeMap<String, Vec<SlideImageGroup>> =
            BTreeMap::from([("20x".to_string(), vec![])]);
        let dirty = remove_obsolete_objectives(&mut sample, &groups);

        assert!(dirty);
        // 63x had no history: deleted. 40x had history: retained, tiles cleared.
        assert!(sample.objective_sample("63x").is_none());
        let forty = sample.objective_sample("40x").unwrap();
        assert!(forty.tiles.is_empty());
        assert!(forty.has_pipeline_runs());
    }

    #[test]
    fn test_lone_empty_objective_survives_removal() {
        let mut sample = Sample::new("ds", "S1");
        sample.objective_samples.push(ObjectiveSample::new(""));

        let groups: BTreeMap<String, Vec<SlideImageGroup>> =
            BTreeMap::from([("20x".to_string(), vec![])]);
        assert!(!remove_obsolete_objectives(&mut sample, &groups));
        assert_eq!(sample.objective_samples.len(), 1);
    }

    #[test]
    fn test_legacy_empty_objective_is_repurposed() {
        let a = LsmImage::new(1);
        let mut sample = Sample::new("ds", "S1");
        sample.objective_samples.push(ObjectiveSample::new(""));

        let groups = vec![group("Tile 1", "Brain", &[&a])];
        let ut = create_or_update_objective_sample(&mut sample, "20x", "sr", &groups, true)
            .unwrap();

        assert_eq!(ut, UpdateType::Add);
        assert_eq!(sample.objective_samples.len(), 1);
        assert_eq!(sample.objective_samples[0].objective, "20x");
        assert_eq!(sample.objective_samples[0].tiles.len(), 1);
    }
}
