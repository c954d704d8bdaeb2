//! sagesync-engine - SAGE sample reconciliation engine
//!
//! Ingests per-acquisition image metadata exported from SAGE and merges it
//! into the persistent specimen store: one LSM image record per SAGE image
//! id, one sample per (data set, slide code), tiles partitioned by objective
//! and (tag, anatomical area). Field-level merge classification decides what
//! is persisted and which changes are significant enough to schedule the
//! sample for downstream reprocessing.

pub mod dal;
pub mod schema;
pub mod services;

pub use dal::SampleDal;
pub use schema::AttributeSchemaIndex;
pub use services::SampleSynchronizer;
