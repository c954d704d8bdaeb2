//! End-to-end synchronization scenarios against an in-memory store

use sagesync_common::db::init_memory_pool;
use sagesync_common::model::{DataSet, PipelineStatus, PropertyValue, SlideImage};
use sagesync_engine::{SampleDal, SampleSynchronizer};
use std::collections::HashMap;

const OWNER: &str = "group:flylight";
const DATA_SET: &str = "flylight_polarity";
const SLIDE_CODE: &str = "20240101_31_A1";

async fn setup_dal() -> SampleDal {
    let dal = SampleDal::new(init_memory_pool().await.unwrap());
    dal.save_data_set(&DataSet {
        identifier: DATA_SET.to_string(),
        name: "FlyLight Polarity".to_string(),
        owner_key: OWNER.to_string(),
        sample_name_pattern: None,
        readers: vec!["user:reader".to_string()],
        writers: vec![],
    })
    .await
    .unwrap();
    dal
}

fn image(sage_id: i64, name: &str, objective: &str, props: &[(&str, &str)]) -> SlideImage {
    let mut properties: HashMap<String, PropertyValue> = HashMap::new();
    properties.insert(
        "light_imagery_line".to_string(),
        PropertyValue::Text("GMR_9F02".to_string()),
    );
    properties.insert(
        "fly_gender".to_string(),
        PropertyValue::Text("f".to_string()),
    );
    properties.insert(
        "light_imagery_channel_spec".to_string(),
        PropertyValue::Text("ssr".to_string()),
    );
    for (key, value) in props {
        properties.insert(key.to_string(), PropertyValue::Text(value.to_string()));
    }

    SlideImage {
        sage_id,
        name: name.to_string(),
        filepath: format!("/archive/lsm/{}", name),
        objective: Some(objective.to_string()),
        tile: None,
        anatomical_area: None,
        properties,
    }
}

/// One full reconciliation run with a fresh engine
async fn sync(
    dal: &SampleDal,
    images: &[SlideImage],
) -> (sagesync_common::model::Sample, SampleSynchronizer) {
    let data_set = dal.get_data_set(DATA_SET).await.unwrap().unwrap();
    let mut engine = SampleSynchronizer::new(dal.clone(), OWNER);
    engine.set_process("sage_sync");

    let mut lsms = Vec::new();
    for slide_image in images {
        lsms.push(engine.create_or_update_lsm(slide_image).await.unwrap());
    }
    let sample = engine
        .create_or_update_sample(SLIDE_CODE, &data_set, &lsms)
        .await
        .unwrap();
    (sample, engine)
}

#[tokio::test]
async fn test_new_sample_from_two_images() {
    let dal = setup_dal().await;
    let images = vec![
        image(101, "a.lsm", "20x", &[]),
        image(102, "b.lsm", "20x", &[]),
    ];

    let (sample, engine) = sync(&dal, &images).await;

    assert_eq!(engine.num_samples_created(), 1);
    // A sample is never scheduled on the run that created it
    assert_eq!(sample.status, PipelineStatus::New);
    assert_eq!(sample.name, "GMR_9F02-20240101_31_A1");
    assert_eq!(sample.gender.as_deref(), Some("f"));
    assert!(sample.sage_synced);

    // Untagged images become positional tiles under their objective
    assert_eq!(sample.objective_samples.len(), 1);
    let os = sample.objective_sample("20x").unwrap();
    assert_eq!(os.chan_spec.as_deref(), Some("ssr"));
    let tags: Vec<&str> = os.tiles.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tags, vec!["Tile 1", "Tile 2"]);

    // Creation is audited and permissions reach the images
    let log = dal.status_transitions(sample.id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!((log[0].source.as_str(), log[0].target.as_str()), ("Intake", "New"));

    for lsm_id in sample.lsm_ids() {
        let lsm = dal.get_lsm(lsm_id).await.unwrap().unwrap();
        assert_eq!(lsm.sample_ref, Some(sample.id));
        assert!(lsm.readers.contains(&"user:reader".to_string()));
    }
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let dal = setup_dal().await;
    let images = vec![
        image(101, "a.lsm", "20x", &[]),
        image(102, "b.lsm", "20x", &[]),
    ];

    let (first, _) = sync(&dal, &images).await;
    let (second, engine) = sync(&dal, &images).await;

    assert_eq!(second.id, first.id);
    assert_eq!(second.status, PipelineStatus::New);
    assert_eq!(engine.num_samples_created(), 0);
    assert_eq!(engine.num_samples_updated(), 0);
    assert_eq!(engine.num_samples_reprocessed(), 0);
    assert_eq!(dal.status_transitions(first.id).await.unwrap().len(), 1);

    // Untouched images are confirmed active without a full rewrite
    for lsm_id in second.lsm_ids() {
        assert!(dal.get_lsm(lsm_id).await.unwrap().unwrap().sage_synced);
    }
}

#[tokio::test]
async fn test_added_image_reschedules_existing_sample() {
    let dal = setup_dal().await;
    let (first, _) = sync(
        &dal,
        &[
            image(101, "a.lsm", "20x", &[]),
            image(102, "b.lsm", "20x", &[]),
        ],
    )
    .await;

    let (sample, engine) = sync(
        &dal,
        &[
            image(101, "a.lsm", "20x", &[]),
            image(102, "b.lsm", "20x", &[]),
            image(103, "c.lsm", "20x", &[]),
        ],
    )
    .await;

    assert_eq!(sample.id, first.id);
    assert_eq!(sample.status, PipelineStatus::Scheduled);
    assert_eq!(engine.num_samples_updated(), 1);
    assert_eq!(engine.num_samples_reprocessed(), 1);

    let os = sample.objective_sample("20x").unwrap();
    assert_eq!(os.tiles.len(), 3);

    let log = dal.status_transitions(sample.id).await.unwrap();
    assert_eq!(log.last().unwrap().target, "Scheduled");
    assert_eq!(log.last().unwrap().process.as_deref(), Some("sage_sync"));
}

#[tokio::test]
async fn test_obsolete_objective_is_removed() {
    let dal = setup_dal().await;
    let (first, _) = sync(
        &dal,
        &[
            image(101, "a.lsm", "20x", &[]),
            image(102, "b.lsm", "63x", &[]),
        ],
    )
    .await;
    assert_eq!(first.objective_samples.len(), 2);

    // 63x images stop arriving; the run-less objective sample is dropped
    let (sample, _) = sync(&dal, &[image(101, "a.lsm", "20x", &[])]).await;
    assert_eq!(sample.objective_samples.len(), 1);
    assert!(sample.objective_sample("63x").is_none());
}

#[tokio::test]
async fn test_obsolete_objective_with_history_keeps_its_record() {
    let dal = setup_dal().await;
    let (first, _) = sync(
        &dal,
        &[
            image(101, "a.lsm", "20x", &[]),
            image(102, "b.lsm", "63x", &[]),
        ],
    )
    .await;

    // Simulate a pipeline having already run on the 63x objective
    let mut stored = dal.get_sample(first.id).await.unwrap().unwrap();
    stored
        .objective_sample_mut("63x")
        .unwrap()
        .pipeline_runs
        .push(sagesync_common::model::SamplePipelineRun {
            id: uuid::Uuid::new_v4(),
            name: "Alignment".to_string(),
            pipeline_process: "alignment".to_string(),
            pipeline_version: 1,
            creation_date: chrono::Utc::now(),
        });
    dal.save_sample(OWNER, &stored).await.unwrap();

    let (sample, _) = sync(&dal, &[image(101, "a.lsm", "20x", &[])]).await;
    let sixty_three = sample.objective_sample("63x").unwrap();
    assert!(sixty_three.tiles.is_empty());
    assert!(sixty_three.has_pipeline_runs());
}

#[tokio::test]
async fn test_reprocess_sensitive_change_reschedules_completed_sample() {
    let dal = setup_dal().await;
    let (first, _) = sync(
        &dal,
        &[image(101, "a.lsm", "20x", &[("light_imagery_mounting_protocol", "DPX PBS")])],
    )
    .await;

    // Downstream pipeline finished in the meantime
    let mut stored = dal.get_sample(first.id).await.unwrap().unwrap();
    stored.status = PipelineStatus::Complete;
    dal.save_sample(OWNER, &stored).await.unwrap();

    let (sample, engine) = sync(
        &dal,
        &[image(101, "a.lsm", "20x", &[("light_imagery_mounting_protocol", "DPX Ethanol")])],
    )
    .await;

    assert_eq!(sample.status, PipelineStatus::Scheduled);
    assert_eq!(sample.mounting_protocol.as_deref(), Some("DPX Ethanol"));
    assert_eq!(engine.num_samples_reprocessed(), 1);
}

#[tokio::test]
async fn test_blocked_sample_is_updated_but_never_scheduled() {
    let dal = setup_dal().await;
    let (first, _) = sync(&dal, &[image(101, "a.lsm", "20x", &[])]).await;

    let mut stored = dal.get_sample(first.id).await.unwrap().unwrap();
    stored.blocked = true;
    dal.save_sample(OWNER, &stored).await.unwrap();

    let (sample, engine) = sync(
        &dal,
        &[
            image(101, "a.lsm", "20x", &[]),
            image(102, "b.lsm", "20x", &[]),
        ],
    )
    .await;

    // Tiles were rebuilt and saved, but the status hold was respected
    assert_eq!(sample.objective_sample("20x").unwrap().tiles.len(), 2);
    assert_eq!(sample.status, PipelineStatus::New);
    assert_eq!(engine.num_samples_reprocessed(), 0);
    assert_eq!(dal.status_transitions(sample.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_state_survives_across_file_backed_pools() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("store").join("sagesync.db");

    {
        let pool = sagesync_common::db::init_database_pool(&db_path).await.unwrap();
        let dal = SampleDal::new(pool.clone());
        dal.save_data_set(&DataSet {
            identifier: DATA_SET.to_string(),
            name: "FlyLight Polarity".to_string(),
            owner_key: OWNER.to_string(),
            sample_name_pattern: None,
            readers: vec![],
            writers: vec![],
        })
        .await
        .unwrap();
        sync(&dal, &[image(101, "a.lsm", "20x", &[])]).await;
        pool.close().await;
    }

    let pool = sagesync_common::db::init_database_pool(&db_path).await.unwrap();
    let dal = SampleDal::new(pool);
    let samples = dal
        .find_samples_by_slide_code(OWNER, DATA_SET, SLIDE_CODE)
        .await
        .unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].name, "GMR_9F02-20240101_31_A1");
}

#[tokio::test]
async fn test_custom_name_pattern_with_alternates() {
    let dal = setup_dal().await;
    dal.save_data_set(&DataSet {
        identifier: DATA_SET.to_string(),
        name: "FlyLight Polarity".to_string(),
        owner_key: OWNER.to_string(),
        sample_name_pattern: Some("{VT Line|Line}-{Slide Code}-{Gender}".to_string()),
        readers: vec![],
        writers: vec![],
    })
    .await
    .unwrap();

    let (sample, _) = sync(&dal, &[image(101, "a.lsm", "20x", &[])]).await;
    // No VT line on the images, so the alternate falls through to Line
    assert_eq!(sample.name, "GMR_9F02-20240101_31_A1-f");
}
