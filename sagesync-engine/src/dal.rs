//! Persistence collaborator for the reconciliation engine
//!
//! Entities are stored as JSON documents with their natural-key columns
//! mirrored for indexing. All relations are explicit ids resolved through
//! this layer; nothing here retries, and every store error propagates
//! unmodified to the caller.

use chrono::Utc;
use sagesync_common::model::{DataSet, LsmImage, PipelineStatus, Sample};
use sagesync_common::Result;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// Entity kinds addressable by narrow property updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    LsmImage,
    Sample,
}

impl EntityType {
    fn table(&self) -> &'static str {
        match self {
            EntityType::LsmImage => "lsm_image",
            EntityType::Sample => "sample",
        }
    }
}

/// One recorded pipeline status transition
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatusTransition {
    pub sample_guid: String,
    pub source: String,
    pub target: String,
    pub order_no: Option<String>,
    pub process: Option<String>,
    pub note: Option<String>,
}

/// Data access for images, samples, data sets and transition history
#[derive(Clone)]
pub struct SampleDal {
    db: SqlitePool,
}

impl SampleDal {
    pub fn new(db: SqlitePool) -> Self {
        SampleDal { db }
    }

    /// All image records for one SAGE image id, most recently created first
    pub async fn find_lsms_by_sage_id(
        &self,
        owner_key: &str,
        sage_id: i64,
    ) -> Result<Vec<LsmImage>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT document FROM lsm_image WHERE owner_key = ? AND sage_id = ? ORDER BY created_at DESC",
        )
        .bind(owner_key)
        .bind(sage_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|(doc,)| Ok(serde_json::from_str(doc)?))
            .collect()
    }

    /// All sample records for one (data set, slide code), most recent first
    pub async fn find_samples_by_slide_code(
        &self,
        owner_key: &str,
        data_set: &str,
        slide_code: &str,
    ) -> Result<Vec<Sample>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT document FROM sample WHERE owner_key = ? AND data_set = ? AND slide_code = ? ORDER BY created_at DESC",
        )
        .bind(owner_key)
        .bind(data_set)
        .bind(slide_code)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|(doc,)| Ok(serde_json::from_str(doc)?))
            .collect()
    }

    pub async fn get_lsm(&self, id: Uuid) -> Result<Option<LsmImage>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT document FROM lsm_image WHERE guid = ?")
            .bind(id.to_string())
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some((doc,)) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    pub async fn get_sample(&self, id: Uuid) -> Result<Option<Sample>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT document FROM sample WHERE guid = ?")
            .bind(id.to_string())
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some((doc,)) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    /// Upsert an image record
    pub async fn save_lsm(&self, owner_key: &str, lsm: &LsmImage) -> Result<LsmImage> {
        let document = serde_json::to_string(lsm)?;
        sqlx::query(
            r#"
            INSERT INTO lsm_image (guid, owner_key, sage_id, sage_synced, created_at, document)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(guid) DO UPDATE SET
                owner_key = excluded.owner_key,
                sage_id = excluded.sage_id,
                sage_synced = excluded.sage_synced,
                document = excluded.document
            "#,
        )
        .bind(lsm.id.to_string())
        .bind(owner_key)
        .bind(lsm.sage_id)
        .bind(lsm.sage_synced)
        .bind(lsm.creation_date.to_rfc3339())
        .bind(document)
        .execute(&self.db)
        .await?;

        debug!(lsm_id = %lsm.id, sage_id = lsm.sage_id, "Saved LSM");
        Ok(lsm.clone())
    }

    /// Upsert a sample record
    pub async fn save_sample(&self, owner_key: &str, sample: &Sample) -> Result<Sample> {
        let document = serde_json::to_string(sample)?;
        sqlx::query(
            r#"
            INSERT INTO sample (guid, owner_key, data_set, slide_code, sage_synced, created_at, document)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guid) DO UPDATE SET
                owner_key = excluded.owner_key,
                data_set = excluded.data_set,
                slide_code = excluded.slide_code,
                sage_synced = excluded.sage_synced,
                document = excluded.document
            "#,
        )
        .bind(sample.id.to_string())
        .bind(owner_key)
        .bind(&sample.data_set)
        .bind(&sample.slide_code)
        .bind(sample.sage_synced)
        .bind(sample.creation_date.to_rfc3339())
        .bind(document)
        .execute(&self.db)
        .await?;

        debug!(sample_id = %sample.id, slide_code = %sample.slide_code, "Saved sample");
        Ok(sample.clone())
    }

    /// Fast partial update of a single property, without a full save.
    /// The mirrored key column is kept in step when the property has one.
    pub async fn update_property(
        &self,
        owner_key: &str,
        entity: EntityType,
        id: Uuid,
        prop_name: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let path = format!("$.{}", prop_name);
        let sql = format!(
            "UPDATE {} SET document = json_set(document, ?, json(?)) WHERE guid = ? AND owner_key = ?",
            entity.table()
        );
        sqlx::query(&sql)
            .bind(&path)
            .bind(value.to_string())
            .bind(id.to_string())
            .bind(owner_key)
            .execute(&self.db)
            .await?;

        if prop_name == "sage_synced" {
            let sql = format!(
                "UPDATE {} SET sage_synced = json_extract(document, '$.sage_synced') WHERE guid = ?",
                entity.table()
            );
            sqlx::query(&sql)
                .bind(id.to_string())
                .execute(&self.db)
                .await?;
        }

        debug!(%id, prop_name, "Updated property");
        Ok(())
    }

    /// Append one pipeline status transition to the audit log
    pub async fn record_status_transition(
        &self,
        sample_id: Uuid,
        source: PipelineStatus,
        target: PipelineStatus,
        order_no: Option<&str>,
        process: Option<&str>,
        note: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO status_transition (sample_guid, source, target, order_no, process, note, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sample_id.to_string())
        .bind(source.to_string())
        .bind(target.to_string())
        .bind(order_no)
        .bind(process)
        .bind(note)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        debug!(%sample_id, %source, %target, "Recorded status transition");
        Ok(())
    }

    /// Transition history for one sample, oldest first
    pub async fn status_transitions(&self, sample_id: Uuid) -> Result<Vec<StatusTransition>> {
        let rows = sqlx::query_as::<_, StatusTransition>(
            "SELECT sample_guid, source, target, order_no, process, note FROM status_transition WHERE sample_guid = ? ORDER BY id",
        )
        .bind(sample_id.to_string())
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    /// Propagate a data set's permission set onto a sample and, transitively,
    /// onto every image its tiles reference.
    pub async fn propagate_permissions(
        &self,
        owner_key: &str,
        entity: EntityType,
        id: Uuid,
        data_set: &DataSet,
    ) -> Result<()> {
        match entity {
            EntityType::Sample => {
                let Some(mut sample) = self.get_sample(id).await? else {
                    return Err(sagesync_common::Error::NotFound(format!("Sample#{}", id)));
                };
                sample.readers = acl_with_owner(&data_set.readers, &data_set.owner_key);
                sample.writers = acl_with_owner(&data_set.writers, &data_set.owner_key);
                let lsm_ids = sample.lsm_ids();
                self.save_sample(owner_key, &sample).await?;

                for lsm_id in lsm_ids {
                    if let Some(mut lsm) = self.get_lsm(lsm_id).await? {
                        lsm.readers = acl_with_owner(&data_set.readers, &data_set.owner_key);
                        lsm.writers = acl_with_owner(&data_set.writers, &data_set.owner_key);
                        self.save_lsm(owner_key, &lsm).await?;
                    }
                }
            }
            EntityType::LsmImage => {
                let Some(mut lsm) = self.get_lsm(id).await? else {
                    return Err(sagesync_common::Error::NotFound(format!("LSM#{}", id)));
                };
                lsm.readers = acl_with_owner(&data_set.readers, &data_set.owner_key);
                lsm.writers = acl_with_owner(&data_set.writers, &data_set.owner_key);
                self.save_lsm(owner_key, &lsm).await?;
            }
        }

        debug!(%id, data_set = %data_set.identifier, "Propagated permissions");
        Ok(())
    }

    pub async fn get_data_set(&self, identifier: &str) -> Result<Option<DataSet>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT document FROM data_set WHERE identifier = ?")
                .bind(identifier)
                .fetch_optional(&self.db)
                .await?;
        match row {
            Some((doc,)) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    pub async fn save_data_set(&self, data_set: &DataSet) -> Result<()> {
        let document = serde_json::to_string(data_set)?;
        sqlx::query(
            r#"
            INSERT INTO data_set (identifier, owner_key, document)
            VALUES (?, ?, ?)
            ON CONFLICT(identifier) DO UPDATE SET
                owner_key = excluded.owner_key,
                document = excluded.document
            "#,
        )
        .bind(&data_set.identifier)
        .bind(&data_set.owner_key)
        .bind(document)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

fn acl_with_owner(subjects: &[String], owner_key: &str) -> Vec<String> {
    let mut acl: Vec<String> = subjects.to_vec();
    if !acl.iter().any(|s| s == owner_key) {
        acl.push(owner_key.to_string());
    }
    acl
}
