//! Tile grouping
//!
//! Partitions a specimen's reconciled images into tile groups: first by
//! objective (empty string when unset), then within each objective by
//! (tag, anatomical area). Images without a tile tag receive a default
//! "Tile N" tag from their 1-based position in the input, so a fixed input
//! order always produces the same grouping.

use sagesync_common::model::{LsmImage, SlideImageGroup};
use std::collections::BTreeMap;
use tracing::debug;

/// Group images by objective and (tag, area).
///
/// The map is ordered by objective so downstream per-objective processing is
/// deterministic; groups within an objective preserve encounter order.
pub fn group_tiles(lsms: &[LsmImage]) -> BTreeMap<String, Vec<SlideImageGroup>> {
    let mut objective_groups: BTreeMap<String, Vec<SlideImageGroup>> = BTreeMap::new();

    for (tile_num, lsm) in lsms.iter().enumerate() {
        let objective = lsm.objective.clone().unwrap_or_default();
        let tag = lsm
            .tile
            .clone()
            .unwrap_or_else(|| format!("Tile {}", tile_num + 1));
        let area = lsm.anatomical_area.clone().unwrap_or_default();

        let groups = objective_groups.entry(objective).or_default();
        match groups
            .iter_mut()
            .find(|g| g.tag == tag && g.anatomical_area == area)
        {
            Some(group) => group.images.push(lsm.clone()),
            None => {
                let mut group = SlideImageGroup::new(&area, &tag);
                group.images.push(lsm.clone());
                groups.push(group);
            }
        }
    }

    debug!(
        "Grouped {} LSMs into objectives: {:?}",
        lsms.len(),
        objective_groups.keys().collect::<Vec<_>>()
    );
    objective_groups
}
