//! LSM reconciliation
//!
//! Folds one incoming slide image record into the persistent LSM image for
//! its SAGE id: coerces each raw property onto its schema-mapped field,
//! classifies every merge as SAME/ADD/REMOVE/CHANGE, and tracks which images
//! changed significantly enough to require downstream reprocessing.

use super::SampleSynchronizer;
use crate::schema::{update_lsm_field, FieldType, UpdateType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sagesync_common::model::{FieldValue, FileType, LsmImage, PropertyValue, SlideImage};
use sagesync_common::{Error, Result};
use tracing::{debug, error, info, warn};

impl SampleSynchronizer {
    /// Create or update the LSM image record for one incoming slide image.
    ///
    /// The active record for the SAGE id wins the lookup; with no active
    /// record the most recently created one is updated, and with no record at
    /// all a new one is created and marked reprocess-pending.
    pub async fn create_or_update_lsm(&mut self, slide_image: &SlideImage) -> Result<LsmImage> {
        debug!("create_or_update_lsm({})", slide_image.name);
        let mut dirty = false;

        let mut lsm = match self.find_best_lsm(slide_image.sage_id).await? {
            Some(lsm) => lsm,
            None => {
                let lsm = LsmImage::new(slide_image.sage_id);
                self.reprocess_lsm_ids.insert(lsm.id);
                info!("Created new LSM for SAGE image#{}", slide_image.sage_id);
                dirty = true;
                lsm
            }
        };

        if self.update_lsm_attributes(&mut lsm, slide_image) {
            info!("Updated LSM properties for {}", slide_image.name);
            dirty = true;
        }

        if dirty {
            lsm = self.dal.save_lsm(&self.owner_key, &lsm).await?;
        } else if !lsm.sage_synced {
            self.dal
                .update_property(
                    &self.owner_key,
                    crate::dal::EntityType::LsmImage,
                    lsm.id,
                    "sage_synced",
                    serde_json::json!(true),
                )
                .await?;
            lsm.sage_synced = true;
        }

        self.lsm_cache.insert(lsm.id, lsm.clone());
        Ok(lsm)
    }

    /// The single active record for a SAGE id, else the most recently created
    async fn find_best_lsm(&self, sage_id: i64) -> Result<Option<LsmImage>> {
        // Lookup order is most-recently-created first
        let lsms = self.dal.find_lsms_by_sage_id(&self.owner_key, sage_id).await?;
        if let Some(active) = lsms.iter().find(|l| l.sage_synced) {
            return Ok(Some(active.clone()));
        }
        Ok(lsms.into_iter().next())
    }

    /// Apply the slide image's properties to the record. Returns true if any
    /// field was modified.
    fn update_lsm_attributes(&mut self, lsm: &mut LsmImage, slide_image: &SlideImage) -> bool {
        debug!(
            "update_lsm_attributes(lsm_id={}, sage_id={})",
            lsm.id, slide_image.sage_id
        );
        let schema = self.schema;
        let mut changed = false;
        let mut dirty = false;

        for (key, value) in &slide_image.properties {
            let Some(sage_field) = schema.lsm_field(key) else {
                // Unknown keys are logged once per run, then skipped
                if self.unknown_sage_keys.insert(key.clone()) {
                    warn!("SAGE attribute not found on LsmImage: {}", key);
                }
                continue;
            };

            let coerced = match coerce_value(sage_field.field_type, value) {
                Ok(coerced) => coerced,
                Err(e) => {
                    error!(
                        "Error setting SAGE attribute value {} for LSM#{}: {}",
                        key, lsm.id, e
                    );
                    continue;
                }
            };

            let ut = update_lsm_field(lsm, sage_field, coerced);
            if ut != UpdateType::Same {
                dirty = true;
            }
            if ut == UpdateType::Change || ut == UpdateType::Add {
                changed = true;
            }
            if ut == UpdateType::Change && sage_field.reprocess_on_change {
                self.reprocess_lsm_ids.insert(lsm.id);
            }
        }

        // Manual attributes not covered by the schema index

        if lsm.name != slide_image.name {
            lsm.name = slide_image.name.clone();
            dirty = true;
            changed = true;
        }

        if lsm.filepath != slide_image.filepath {
            lsm.filepath = slide_image.filepath.clone();
            lsm.files
                .insert(FileType::LosslessStack, slide_image.filepath.clone());
            dirty = true;
            changed = true;
        }

        if lsm.objective != slide_image.objective {
            lsm.objective = slide_image.objective.clone();
            dirty = true;
            changed = true;
        }

        if let (Some(x), Some(y), Some(z)) = (
            lsm.voxel_size_x.as_deref(),
            lsm.voxel_size_y.as_deref(),
            lsm.voxel_size_z.as_deref(),
        ) {
            let optical_res = format!("{}x{}x{}", x, y, z);
            if lsm.optical_resolution.as_deref() != Some(optical_res.as_str()) {
                lsm.optical_resolution = Some(optical_res);
                dirty = true;
                changed = true;
            }
        }

        if let (Some(x), Some(y), Some(z)) = (
            lsm.dimension_x.as_deref(),
            lsm.dimension_y.as_deref(),
            lsm.dimension_z.as_deref(),
        ) {
            let image_size = format!("{}x{}x{}", x, y, z);
            if lsm.image_size.as_deref() != Some(image_size.as_str()) {
                lsm.image_size = Some(image_size);
                dirty = true;
                changed = true;
            }
        }

        if lsm.anatomical_area.is_none() {
            lsm.anatomical_area = Some(String::new());
            dirty = true;
        }

        if changed {
            self.changed_lsm_ids.insert(lsm.id);
        }

        dirty
    }
}

/// Convert a raw SAGE property value to the declared field type.
///
/// Strings pass through; dates pass through or parse from common string
/// forms; integers and booleans accept their native type or a tolerant
/// string parse. An empty string always coerces to no value.
pub fn coerce_value(
    field_type: FieldType,
    value: &PropertyValue,
) -> Result<Option<FieldValue>> {
    if let PropertyValue::Text(s) = value {
        if s.is_empty() {
            return Ok(None);
        }
    }

    let coerced = match field_type {
        FieldType::Text => FieldValue::Text(value.to_string()),
        FieldType::Int => match value {
            PropertyValue::Int(i) => FieldValue::Int(*i),
            PropertyValue::Text(s) => FieldValue::Int(s.trim().parse::<i64>().map_err(|_| {
                Error::Coercion(format!("'{}' is not an integer", s))
            })?),
            other => {
                return Err(Error::Coercion(format!(
                    "cannot convert {:?} to an integer",
                    other
                )))
            }
        },
        FieldType::Bool => match value {
            PropertyValue::Bool(b) => FieldValue::Bool(*b),
            PropertyValue::Int(i) => FieldValue::Bool(*i != 0),
            PropertyValue::Text(s) => FieldValue::Bool(s.eq_ignore_ascii_case("true")),
            other => {
                return Err(Error::Coercion(format!(
                    "cannot convert {:?} to a boolean",
                    other
                )))
            }
        },
        FieldType::Date => match value {
            PropertyValue::Date(d) => FieldValue::Date(*d),
            PropertyValue::Text(s) => FieldValue::Date(parse_date(s)?),
            other => {
                return Err(Error::Coercion(format!(
                    "cannot convert {:?} to a date",
                    other
                )))
            }
        },
    };
    Ok(Some(coerced))
}

fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    Err(Error::Coercion(format!("'{}' is not a date", s)))
}
