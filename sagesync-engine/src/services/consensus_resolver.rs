//! Specimen-level consensus resolution
//!
//! Every schema-mapped sample field is scanned across all of the specimen's
//! images. The first observed value becomes the tentative consensus; any
//! later disagreement demotes the field to the NO_CONSENSUS sentinel (text
//! fields) or to no value (typed fields). The tmog date is the exception:
//! the latest image date is recorded as the sample date.

use crate::schema::{update_sample_field, AttributeSchemaIndex, FieldType, UpdateType};
use chrono::{DateTime, Utc};
use sagesync_common::model::{DataSet, FieldValue, Sample, SlideImageGroup};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, trace};

/// Sentinel stored on text fields whose images disagree
pub const NO_CONSENSUS_VALUE: &str = "NO_CONSENSUS";

const DEFAULT_SAMPLE_NAME_PATTERN: &str = "{Line}-{Slide Code}";

/// Compute per-field consensus across all tile groups.
///
/// The result holds an entry for every field with at least one observation:
/// the agreed value, or the sentinel/no-value marker on disagreement. Fields
/// never observed non-null are absent and left untouched on the sample.
pub fn resolve_consensus<'a>(
    schema: &AttributeSchemaIndex,
    tile_groups: impl Iterator<Item = &'a SlideImageGroup>,
) -> HashMap<&'static str, Option<FieldValue>> {
    let mut consensus: HashMap<&'static str, Option<FieldValue>> = HashMap::new();
    let mut nonconsensus: HashSet<&'static str> = HashSet::new();
    let mut max_tmog_date: Option<DateTime<Utc>> = None;

    for tile_group in tile_groups {
        for lsm in &tile_group.images {
            for field in schema.lsm_fields() {
                let value = field.value(lsm);

                // The latest image tmog date wins; equality is not required
                if field.field_name == "tmog_date" {
                    if let Some(FieldValue::Date(date)) = value {
                        if max_tmog_date.map(|max| date > max).unwrap_or(true) {
                            max_tmog_date = Some(date);
                        }
                    }
                    continue;
                }

                if nonconsensus.contains(field.field_name) {
                    continue;
                }
                match consensus.get(field.field_name) {
                    None | Some(None) => {
                        if value.is_some() {
                            consensus.insert(field.field_name, value);
                        }
                    }
                    Some(Some(curr)) => {
                        if value.as_ref() != Some(curr) {
                            nonconsensus.insert(field.field_name);
                            let sentinel = if field.field_type == FieldType::Text {
                                Some(FieldValue::Text(NO_CONSENSUS_VALUE.to_string()))
                            } else {
                                None
                            };
                            consensus.insert(field.field_name, sentinel);
                        }
                    }
                }
            }
        }
    }

    if let Some(date) = max_tmog_date {
        consensus.insert("tmog_date", Some(FieldValue::Date(date)));
    }

    for (field_name, value) in &consensus {
        trace!("  Consensus value {}: {:?}", field_name, value);
    }
    consensus
}

/// Apply consensus attributes and the derived display name to a sample.
///
/// Returns (dirty, changed): callers persist on dirty but only treat changed
/// as reprocessing-relevant.
pub fn apply_sample_attributes(
    schema: &AttributeSchemaIndex,
    data_set: &DataSet,
    sample: &mut Sample,
    tile_groups: &BTreeMap<String, Vec<SlideImageGroup>>,
) -> (bool, bool) {
    let mut dirty = false;
    let mut changed = false;

    let consensus = resolve_consensus(schema, tile_groups.values().flatten());
    for (field_name, value) in consensus {
        if let Some(sample_field) = schema.sample_field(field_name) {
            let ut = update_sample_field(sample, sample_field, value);
            if ut != UpdateType::Same {
                dirty = true;
            }
            if ut == UpdateType::Change {
                changed = true;
            }
        }
    }

    let new_name = build_sample_name(schema, data_set, sample);
    if sample.name != new_name {
        info!("Updating sample name to: {}", new_name);
        sample.name = new_name;
        dirty = true;
        changed = true;
    }

    (dirty, changed)
}

/// Derive a sample's display name from the data set's name pattern, e.g.
/// "{Line}-{Slide Code}" or "{VT Line|Line}-{Slide Code}-Left_Optic_Lobe".
pub fn build_sample_name(
    schema: &AttributeSchemaIndex,
    data_set: &DataSet,
    sample: &Sample,
) -> String {
    let mut values: HashMap<&str, String> = HashMap::new();
    for attr in schema.sample_attrs() {
        if let Some(value) = attr.value(sample) {
            values.insert(attr.label, value.render());
        }
    }

    let pattern = data_set
        .sample_name_pattern
        .as_deref()
        .unwrap_or(DEFAULT_SAMPLE_NAME_PATTERN);
    replace_variable_pattern(pattern, &values)
}

/// Substitute "{Label}" tokens with attribute values. A token may list
/// alternates, "{A|B}": the first label with a non-empty value wins. Tokens
/// with no value substitute to nothing.
fn replace_variable_pattern(pattern: &str, values: &HashMap<&str, String>) -> String {
    let mut result = String::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '{' {
            result.push(c);
            continue;
        }
        let mut token = String::new();
        for t in chars.by_ref() {
            if t == '}' {
                break;
            }
            token.push(t);
        }
        for label in token.split('|') {
            if let Some(value) = values.get(label.trim()) {
                if !value.is_empty() {
                    result.push_str(value);
                    break;
                }
            }
        }
    }
    result
}
