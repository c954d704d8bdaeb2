//! Channel specification helpers
//!
//! A channel spec is a string with one character per channel: 's' for a
//! signal channel, 'r' for the reference channel (e.g. "ssr" for two signal
//! channels plus the reference).

use sagesync_common::model::{LsmImage, SlideImageGroup};
use sagesync_common::{Error, Result};
use tracing::{trace, warn};

/// Build a channel spec with the reference channel at the given 1-based index
pub fn create_chan_spec(num_channels: usize, ref_index: usize) -> String {
    (1..=num_channels)
        .map(|i| if i == ref_index { 'r' } else { 's' })
        .collect()
}

/// The channel spec for an LSM, deriving a default from its channel count
/// when no spec was recorded.
pub fn lsm_channel_spec(lsm: &LsmImage, ref_index: usize) -> Result<String> {
    if let Some(chan_spec) = &lsm.chan_spec {
        if !chan_spec.is_empty() {
            return Ok(chan_spec.clone());
        }
    }

    if let Some(num_channels) = lsm.num_channels {
        if num_channels > 0 {
            return Ok(create_chan_spec(num_channels as usize, ref_index + 1));
        }
        warn!(
            "Could not use num channels ('{}') on LSM with id={}",
            num_channels, lsm.id
        );
    }

    Err(Error::InvalidInput(format!(
        "LSM {} has no channel specification and no channel count",
        lsm.id
    )))
}

/// Number of signal channels across a set of tile groups, and thus in the
/// eventual merged tile each group produces.
///
/// Counts 's' characters in the member images' channel specs; if a tile's
/// specs yield nothing, falls back to (numChannels - 1) per image. Tiles
/// within the same objective are expected to agree; disagreement is logged
/// and the first tile's count is adopted.
pub fn num_signal_channels(tile_group_list: &[SlideImageGroup]) -> i64 {
    let mut sample_num_signals: i64 = -1;
    for tile_group in tile_group_list {
        trace!("Calculating number of channels in tile {}", tile_group.tag);

        let mut tile_num_signals: i64 = 0;
        for lsm in &tile_group.images {
            if let Some(chanspec) = &lsm.chan_spec {
                tile_num_signals += chanspec.chars().filter(|c| *c == 's').count() as i64;
            }
        }

        if tile_num_signals < 1 {
            trace!("Falling back on channel number");
            for lsm in &tile_group.images {
                if let Some(num_channels) = lsm.num_channels {
                    tile_num_signals += num_channels - 1;
                }
            }
        }

        trace!(
            "Tile '{}' has {} signal channels",
            tile_group.tag,
            tile_num_signals
        );

        if sample_num_signals < 0 {
            sample_num_signals = tile_num_signals;
        } else if sample_num_signals != tile_num_signals {
            warn!(
                "No consensus for number of signal channels per tile ({} != {})",
                sample_num_signals, tile_num_signals
            );
        }
    }
    sample_num_signals
}
