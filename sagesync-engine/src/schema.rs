//! Attribute schema index
//!
//! Read-only registry mapping SAGE attribute keys ("<cv>_<term>") to typed
//! domain-field descriptors with accessor functions, replacing the runtime
//! reflection the legacy system used. Built once behind a `OnceLock` and
//! shared across concurrent reconciliation runs.

use chrono::{DateTime, Utc};
use sagesync_common::model::{FieldValue, LsmImage, Sample};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, trace};

/// Declared type of a schema-mapped domain field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Int,
    Bool,
    Date,
}

/// Classification of one field-level merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateType {
    /// New value equals the current value
    Same,
    /// null -> value
    Add,
    /// value -> null
    Remove,
    /// value -> different value
    Change,
}

type LsmGetter = fn(&LsmImage) -> Option<FieldValue>;
type LsmSetter = fn(&mut LsmImage, Option<FieldValue>);
type SampleGetter = fn(&Sample) -> Option<FieldValue>;
type SampleSetter = fn(&mut Sample, Option<FieldValue>);

/// Descriptor for one SAGE-mapped field on [`LsmImage`]
pub struct LsmSageField {
    /// External key, "<cv>_<term>"
    pub key: String,
    pub field_name: &'static str,
    pub field_type: FieldType,
    /// A CHANGE on this field invalidates downstream results
    pub reprocess_on_change: bool,
    get: LsmGetter,
    set: LsmSetter,
}

/// Descriptor for one consensus field on [`Sample`]
pub struct SampleSageField {
    pub field_name: &'static str,
    pub field_type: FieldType,
    get: SampleGetter,
    set: SampleSetter,
}

/// Display attribute of [`Sample`], addressable by label in name templates
pub struct SampleAttr {
    pub label: &'static str,
    get: SampleGetter,
}

impl SampleAttr {
    pub fn value(&self, sample: &Sample) -> Option<FieldValue> {
        (self.get)(sample)
    }
}

/// The process-wide schema registry
pub struct AttributeSchemaIndex {
    lsm_fields: HashMap<String, LsmSageField>,
    sample_fields: HashMap<&'static str, SampleSageField>,
    sample_attrs: Vec<SampleAttr>,
}

// Accessor plumbing: every closure below is capture-free so it coerces to a
// plain fn pointer.

fn text(v: Option<FieldValue>) -> Option<String> {
    match v {
        Some(FieldValue::Text(s)) => Some(s),
        _ => None,
    }
}

fn int(v: Option<FieldValue>) -> Option<i64> {
    match v {
        Some(FieldValue::Int(i)) => Some(i),
        _ => None,
    }
}

fn boolean(v: Option<FieldValue>) -> Option<bool> {
    match v {
        Some(FieldValue::Bool(b)) => Some(b),
        _ => None,
    }
}

fn date(v: Option<FieldValue>) -> Option<DateTime<Utc>> {
    match v {
        Some(FieldValue::Date(d)) => Some(d),
        _ => None,
    }
}

impl LsmSageField {
    fn new(
        cv: &str,
        term: &str,
        field_name: &'static str,
        field_type: FieldType,
        reprocess_on_change: bool,
        get: LsmGetter,
        set: LsmSetter,
    ) -> Self {
        LsmSageField {
            key: format!("{}_{}", cv, term),
            field_name,
            field_type,
            reprocess_on_change,
            get,
            set,
        }
    }

    pub fn value(&self, lsm: &LsmImage) -> Option<FieldValue> {
        (self.get)(lsm)
    }
}

impl SampleSageField {
    pub fn value(&self, sample: &Sample) -> Option<FieldValue> {
        (self.get)(sample)
    }
}

impl AttributeSchemaIndex {
    /// The shared registry, built on first use
    pub fn global() -> &'static AttributeSchemaIndex {
        static INDEX: OnceLock<AttributeSchemaIndex> = OnceLock::new();
        INDEX.get_or_init(|| {
            debug!("Building attribute schema index");
            AttributeSchemaIndex::build()
        })
    }

    pub fn lsm_field(&self, key: &str) -> Option<&LsmSageField> {
        self.lsm_fields.get(key)
    }

    pub fn lsm_fields(&self) -> impl Iterator<Item = &LsmSageField> {
        self.lsm_fields.values()
    }

    pub fn sample_field(&self, field_name: &str) -> Option<&SampleSageField> {
        self.sample_fields.get(field_name)
    }

    pub fn sample_attrs(&self) -> &[SampleAttr] {
        &self.sample_attrs
    }

    fn build() -> AttributeSchemaIndex {
        let lsm_field_list = vec![
            LsmSageField::new("light_imagery", "line", "line", FieldType::Text, false,
                |l| l.line.clone().map(FieldValue::Text),
                |l, v| l.line = text(v)),
            LsmSageField::new("light_imagery", "vt_line", "vt_line", FieldType::Text, false,
                |l| l.vt_line.clone().map(FieldValue::Text),
                |l, v| l.vt_line = text(v)),
            LsmSageField::new("light_imagery", "slide_code", "slide_code", FieldType::Text, false,
                |l| l.slide_code.clone().map(FieldValue::Text),
                |l, v| l.slide_code = text(v)),
            LsmSageField::new("light_imagery", "data_set", "data_set", FieldType::Text, false,
                |l| l.data_set.clone().map(FieldValue::Text),
                |l, v| l.data_set = text(v)),
            LsmSageField::new("fly", "age", "age", FieldType::Text, false,
                |l| l.age.clone().map(FieldValue::Text),
                |l, v| l.age = text(v)),
            LsmSageField::new("fly", "gender", "gender", FieldType::Text, false,
                |l| l.gender.clone().map(FieldValue::Text),
                |l, v| l.gender = text(v)),
            LsmSageField::new("fly", "effector", "effector", FieldType::Text, false,
                |l| l.effector.clone().map(FieldValue::Text),
                |l, v| l.effector = text(v)),
            LsmSageField::new("fly", "cross_barcode", "cross_barcode", FieldType::Int, false,
                |l| l.cross_barcode.map(FieldValue::Int),
                |l, v| l.cross_barcode = int(v)),
            LsmSageField::new("light_imagery", "mounting_protocol", "mounting_protocol", FieldType::Text, true,
                |l| l.mounting_protocol.clone().map(FieldValue::Text),
                |l, v| l.mounting_protocol = text(v)),
            LsmSageField::new("light_imagery", "tissue_orientation", "tissue_orientation", FieldType::Text, false,
                |l| l.tissue_orientation.clone().map(FieldValue::Text),
                |l, v| l.tissue_orientation = text(v)),
            LsmSageField::new("light_imagery", "representative", "representative", FieldType::Bool, false,
                |l| l.representative.map(FieldValue::Bool),
                |l, v| l.representative = boolean(v)),
            LsmSageField::new("light_imagery", "created_by", "created_by", FieldType::Text, false,
                |l| l.created_by.clone().map(FieldValue::Text),
                |l, v| l.created_by = text(v)),
            LsmSageField::new("light_imagery", "tile", "tile", FieldType::Text, true,
                |l| l.tile.clone().map(FieldValue::Text),
                |l, v| l.tile = text(v)),
            LsmSageField::new("light_imagery", "area", "anatomical_area", FieldType::Text, true,
                |l| l.anatomical_area.clone().map(FieldValue::Text),
                |l, v| l.anatomical_area = text(v)),
            LsmSageField::new("light_imagery", "channel_spec", "chan_spec", FieldType::Text, true,
                |l| l.chan_spec.clone().map(FieldValue::Text),
                |l, v| l.chan_spec = text(v)),
            LsmSageField::new("light_imagery", "num_channels", "num_channels", FieldType::Int, true,
                |l| l.num_channels.map(FieldValue::Int),
                |l, v| l.num_channels = int(v)),
            LsmSageField::new("light_imagery", "capture_date", "capture_date", FieldType::Date, false,
                |l| l.capture_date.map(FieldValue::Date),
                |l, v| l.capture_date = date(v)),
            LsmSageField::new("image_query", "create_date", "tmog_date", FieldType::Date, false,
                |l| l.tmog_date.map(FieldValue::Date),
                |l, v| l.tmog_date = date(v)),
            LsmSageField::new("light_imagery", "voxel_size_x", "voxel_size_x", FieldType::Text, false,
                |l| l.voxel_size_x.clone().map(FieldValue::Text),
                |l, v| l.voxel_size_x = text(v)),
            LsmSageField::new("light_imagery", "voxel_size_y", "voxel_size_y", FieldType::Text, false,
                |l| l.voxel_size_y.clone().map(FieldValue::Text),
                |l, v| l.voxel_size_y = text(v)),
            LsmSageField::new("light_imagery", "voxel_size_z", "voxel_size_z", FieldType::Text, false,
                |l| l.voxel_size_z.clone().map(FieldValue::Text),
                |l, v| l.voxel_size_z = text(v)),
            LsmSageField::new("light_imagery", "dimension_x", "dimension_x", FieldType::Text, false,
                |l| l.dimension_x.clone().map(FieldValue::Text),
                |l, v| l.dimension_x = text(v)),
            LsmSageField::new("light_imagery", "dimension_y", "dimension_y", FieldType::Text, false,
                |l| l.dimension_y.clone().map(FieldValue::Text),
                |l, v| l.dimension_y = text(v)),
            LsmSageField::new("light_imagery", "dimension_z", "dimension_z", FieldType::Text, false,
                |l| l.dimension_z.clone().map(FieldValue::Text),
                |l, v| l.dimension_z = text(v)),
        ];

        let mut lsm_fields = HashMap::new();
        for field in lsm_field_list {
            trace!("  {} -> LsmImage.{}", field.key, field.field_name);
            lsm_fields.insert(field.key.clone(), field);
        }

        let sample_field_list: Vec<SampleSageField> = vec![
            SampleSageField { field_name: "line", field_type: FieldType::Text,
                get: |s| s.line.clone().map(FieldValue::Text),
                set: |s, v| s.line = text(v) },
            SampleSageField { field_name: "vt_line", field_type: FieldType::Text,
                get: |s| s.vt_line.clone().map(FieldValue::Text),
                set: |s, v| s.vt_line = text(v) },
            SampleSageField { field_name: "age", field_type: FieldType::Text,
                get: |s| s.age.clone().map(FieldValue::Text),
                set: |s, v| s.age = text(v) },
            SampleSageField { field_name: "gender", field_type: FieldType::Text,
                get: |s| s.gender.clone().map(FieldValue::Text),
                set: |s, v| s.gender = text(v) },
            SampleSageField { field_name: "effector", field_type: FieldType::Text,
                get: |s| s.effector.clone().map(FieldValue::Text),
                set: |s, v| s.effector = text(v) },
            SampleSageField { field_name: "mounting_protocol", field_type: FieldType::Text,
                get: |s| s.mounting_protocol.clone().map(FieldValue::Text),
                set: |s, v| s.mounting_protocol = text(v) },
            SampleSageField { field_name: "tissue_orientation", field_type: FieldType::Text,
                get: |s| s.tissue_orientation.clone().map(FieldValue::Text),
                set: |s, v| s.tissue_orientation = text(v) },
            SampleSageField { field_name: "cross_barcode", field_type: FieldType::Int,
                get: |s| s.cross_barcode.map(FieldValue::Int),
                set: |s, v| s.cross_barcode = int(v) },
            SampleSageField { field_name: "tmog_date", field_type: FieldType::Date,
                get: |s| s.tmog_date.map(FieldValue::Date),
                set: |s, v| s.tmog_date = date(v) },
        ];

        let mut sample_fields = HashMap::new();
        for field in sample_field_list {
            trace!("  {} -> Sample.{}", field.field_name, field.field_name);
            sample_fields.insert(field.field_name, field);
        }

        let sample_attrs = vec![
            SampleAttr { label: "Line", get: |s| s.line.clone().map(FieldValue::Text) },
            SampleAttr { label: "VT Line", get: |s| s.vt_line.clone().map(FieldValue::Text) },
            SampleAttr { label: "Slide Code", get: |s| Some(FieldValue::Text(s.slide_code.clone())) },
            SampleAttr { label: "Data Set", get: |s| Some(FieldValue::Text(s.data_set.clone())) },
            SampleAttr { label: "Age", get: |s| s.age.clone().map(FieldValue::Text) },
            SampleAttr { label: "Gender", get: |s| s.gender.clone().map(FieldValue::Text) },
            SampleAttr { label: "Effector", get: |s| s.effector.clone().map(FieldValue::Text) },
            SampleAttr { label: "Mounting Protocol", get: |s| s.mounting_protocol.clone().map(FieldValue::Text) },
        ];

        AttributeSchemaIndex {
            lsm_fields,
            sample_fields,
            sample_attrs,
        }
    }
}

/// Set a schema-mapped LSM field if the new value differs, classifying the
/// update.
pub fn update_lsm_field(
    lsm: &mut LsmImage,
    field: &LsmSageField,
    new_value: Option<FieldValue>,
) -> UpdateType {
    let curr_value = (field.get)(lsm);
    classify_and_apply(curr_value, new_value, field.field_name, |v| (field.set)(lsm, v))
}

/// Set a consensus Sample field if the new value differs, classifying the
/// update.
pub fn update_sample_field(
    sample: &mut Sample,
    field: &SampleSageField,
    new_value: Option<FieldValue>,
) -> UpdateType {
    let curr_value = (field.get)(sample);
    classify_and_apply(curr_value, new_value, field.field_name, |v| {
        (field.set)(sample, v)
    })
}

fn classify_and_apply(
    curr_value: Option<FieldValue>,
    new_value: Option<FieldValue>,
    field_name: &str,
    apply: impl FnOnce(Option<FieldValue>),
) -> UpdateType {
    if curr_value == new_value {
        trace!("  Already set {}={:?}", field_name, new_value);
        return UpdateType::Same;
    }

    match &curr_value {
        Some(curr) => debug!("  Setting {}={:?} (previously '{}')", field_name, new_value, curr),
        None => debug!("  Setting {}={:?}", field_name, new_value),
    }

    let update = match (&curr_value, &new_value) {
        (None, _) => UpdateType::Add,
        (_, None) => UpdateType::Remove,
        _ => UpdateType::Change,
    };
    apply(new_value);
    update
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_is_shared_and_complete() {
        let index = AttributeSchemaIndex::global();
        assert!(std::ptr::eq(index, AttributeSchemaIndex::global()));

        let gender = index.lsm_field("fly_gender").unwrap();
        assert_eq!(gender.field_name, "gender");
        assert_eq!(gender.field_type, FieldType::Text);
        assert!(!gender.reprocess_on_change);

        let chan_spec = index.lsm_field("light_imagery_channel_spec").unwrap();
        assert!(chan_spec.reprocess_on_change);

        assert!(index.lsm_field("light_imagery_no_such_term").is_none());
        assert!(index.sample_field("tmog_date").is_some());
    }

    #[test]
    fn test_update_classification() {
        let index = AttributeSchemaIndex::global();
        let field = index.lsm_field("fly_gender").unwrap();
        let mut lsm = LsmImage::new(1);

        let ut = update_lsm_field(&mut lsm, field, Some(FieldValue::Text("f".to_string())));
        assert_eq!(ut, UpdateType::Add);
        assert_eq!(lsm.gender.as_deref(), Some("f"));

        let ut = update_lsm_field(&mut lsm, field, Some(FieldValue::Text("f".to_string())));
        assert_eq!(ut, UpdateType::Same);

        let ut = update_lsm_field(&mut lsm, field, Some(FieldValue::Text("m".to_string())));
        assert_eq!(ut, UpdateType::Change);

        let ut = update_lsm_field(&mut lsm, field, None);
        assert_eq!(ut, UpdateType::Remove);
        assert!(lsm.gender.is_none());
    }

    #[test]
    fn test_typed_accessors() {
        let index = AttributeSchemaIndex::global();
        let field = index.lsm_field("light_imagery_num_channels").unwrap();
        let mut lsm = LsmImage::new(1);

        update_lsm_field(&mut lsm, field, Some(FieldValue::Int(4)));
        assert_eq!(lsm.num_channels, Some(4));
        assert_eq!(field.value(&lsm), Some(FieldValue::Int(4)));
    }
}
