//! Integration tests for the MlService public interface.
//!
//! These drive whole lifecycles through the facade with in-process providers
//! and a file-backed store.

use chrono::Duration;
use maio_core::config::StoreConfig;
use maio_core::external::memory::{
    MemoryDatasources, MemoryDeployer, MemoryPredictor, MemoryTrainer, TrainerBehavior,
};
use maio_core::external::TagEntry;
use maio_core::{
    AlgorithmRef, MlService, ModelPatch, ModelTag, NewAlgorithm, NewModel, NewScheduler,
    NewVersion, PageRequest, Store, TaskStatus, TrainingOutcome, VersionStatus,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

struct TestEnv {
    _dir: TempDir,
    service: MlService,
    datasources: Arc<MemoryDatasources>,
    trainer: Arc<MemoryTrainer>,
    deployer: Arc<MemoryDeployer>,
}

/// Create a service over a fresh database with datasources D1 and D2.
fn create_test_env() -> TestEnv {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let datasources = Arc::new(
        MemoryDatasources::new()
            .with_datasource(1, "D1")
            .with_datasource(2, "D2"),
    );
    let trainer = Arc::new(MemoryTrainer::new());
    let deployer = Arc::new(MemoryDeployer::new());
    let service = MlService::builder()
        .data_dir(dir.path())
        .datasources(datasources.clone())
        .trainer(trainer.clone())
        .predictor(Arc::new(MemoryPredictor::new()))
        .deployer(deployer.clone())
        .build()
        .expect("Failed to build service");

    TestEnv {
        _dir: dir,
        service,
        datasources,
        trainer,
        deployer,
    }
}

fn new_model(name: &str) -> NewModel {
    NewModel {
        name: name.into(),
        description: Some("compressor vibration".into()),
        use_case: Some("predictive maintenance".into()),
        usage_guidelines: None,
        datasource_id: 1,
        output_tag: ModelTag {
            label: "anom_score".into(),
            display_name: Some("Anomaly score".into()),
            unit: None,
        },
        input_tags: vec![ModelTag {
            label: "vibration_rms".into(),
            display_name: None,
            unit: Some("mm/s".into()),
        }],
        created_by: Some(7),
    }
}

fn new_version(model_id: i64, name: &str) -> NewVersion {
    NewVersion {
        model_id,
        name: name.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_model_to_scheduler_scenario() {
    let env = create_test_env();
    let svc = &env.service;

    let m1 = svc.models().create(new_model("M1")).await.unwrap();
    let v1 = svc.versions().create(new_version(m1.id, "v1")).await.unwrap();
    assert_eq!(v1.version, 1);
    assert_eq!(v1.status, VersionStatus::Pending);

    svc.versions().train(v1.id).await.unwrap();
    svc.versions().join_training(v1.id).await;
    assert_eq!(svc.versions().get(v1.id).unwrap().status, VersionStatus::Trained);

    let deployed = svc.versions().deploy(v1.id).await.unwrap();
    assert_eq!(deployed.status, VersionStatus::Deployed);

    let s1 = svc
        .schedulers()
        .create(NewScheduler {
            version_id: v1.id,
            datasource_id: 1,
            start_time: chrono::Utc::now(),
            interval_seconds: 300,
            created_by: None,
        })
        .await
        .unwrap();
    let page = svc.history().list(s1.id, &PageRequest::default()).unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].status, TaskStatus::Pending);

    let undeployed = svc.versions().undeploy(v1.id).await.unwrap();
    assert_eq!(undeployed.status, VersionStatus::Undeployed);
    let s1 = svc.schedulers().get(s1.id).unwrap();
    assert!(!s1.enabled);

    // Disabled, not deleted; the history is still there.
    let page = svc.history().list(s1.id, &PageRequest::default()).unwrap();
    assert_eq!(page.items.len(), 1);

    let err = svc.schedulers().set_enabled(s1.id, true).unwrap_err();
    assert_eq!(err.code(), "VERSION_NOT_DEPLOYED");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_version_creation_numbers() {
    let env = create_test_env();
    let m1 = env.service.models().create(new_model("M1")).await.unwrap();

    let tasks: Vec<_> = ["v1", "v2"]
        .into_iter()
        .map(|name| {
            let service = env.service.clone();
            let model_id = m1.id;
            tokio::spawn(async move {
                service
                    .versions()
                    .create(new_version(model_id, name))
                    .await
                    .unwrap()
                    .version
            })
        })
        .collect();

    let mut numbers = HashSet::new();
    for task in tasks {
        numbers.insert(task.await.unwrap());
    }
    assert_eq!(numbers, HashSet::from([1, 2]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deploys_one_wins() {
    let env = create_test_env();
    let svc = &env.service;
    let m1 = svc.models().create(new_model("M1")).await.unwrap();
    let v1 = svc.versions().create(new_version(m1.id, "v1")).await.unwrap();
    svc.versions().train(v1.id).await.unwrap();
    svc.versions().join_training(v1.id).await;

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let service = svc.clone();
            let id = v1.id;
            tokio::spawn(async move { service.versions().deploy(id).await })
        })
        .collect();

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert_eq!(e.code(), "INVALID_TRANSITION"),
        }
    }
    assert_eq!(successes, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_forks_create_one_record() {
    let env = create_test_env();
    let algo = env
        .service
        .algorithms()
        .create(NewAlgorithm {
            name: "IsolationForest".into(),
            description: None,
            parameters: json!({"n_estimators": 100}),
        })
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = env.service.algorithms().clone();
            let id = algo.id;
            tokio::task::spawn_blocking(move || {
                registry
                    .resolve_or_fork(id, &json!({"n_estimators": 250}))
                    .unwrap()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap());
    }
    assert_eq!(ids.len(), 1);
    assert_eq!(env.service.algorithms().list().unwrap().len(), 2);
}

#[tokio::test]
async fn test_signature_frozen_after_first_version() {
    let env = create_test_env();
    let svc = &env.service;
    let m1 = svc.models().create(new_model("M1")).await.unwrap();
    svc.versions().create(new_version(m1.id, "v1")).await.unwrap();

    let err = svc
        .models()
        .update(
            m1.id,
            ModelPatch {
                datasource_id: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "IMMUTABLE_SIGNATURE");

    let err = svc
        .models()
        .update(
            m1.id,
            ModelPatch {
                output_tag: Some(ModelTag {
                    label: "other_score".into(),
                    display_name: None,
                    unit: None,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "IMMUTABLE_SIGNATURE");

    // Re-sending the current signature with a new description is fine.
    let updated = svc
        .models()
        .update(
            m1.id,
            ModelPatch {
                description: Some("re-described".into()),
                datasource_id: Some(1),
                output_tag: Some(m1.output_tag.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.description.as_deref(), Some("re-described"));
    assert_eq!(updated.versions.len(), 1);
}

#[tokio::test]
async fn test_model_delete_guard_and_cascade() {
    let env = create_test_env();
    let svc = &env.service;
    let m1 = svc.models().create(new_model("M1")).await.unwrap();
    let v1 = svc.versions().create(new_version(m1.id, "v1")).await.unwrap();
    svc.versions().train(v1.id).await.unwrap();
    svc.versions().join_training(v1.id).await;
    svc.versions().deploy(v1.id).await.unwrap();
    let s1 = svc
        .schedulers()
        .create(NewScheduler {
            version_id: v1.id,
            datasource_id: 1,
            start_time: chrono::Utc::now(),
            interval_seconds: 60,
            created_by: None,
        })
        .await
        .unwrap();

    let err = svc.models().delete(m1.id).unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");

    svc.versions().undeploy(v1.id).await.unwrap();
    svc.models().delete(m1.id).unwrap();

    assert_eq!(svc.models().get(m1.id).unwrap_err().code(), "NOT_FOUND");
    assert_eq!(svc.versions().get(v1.id).unwrap_err().code(), "NOT_FOUND");
    assert_eq!(svc.schedulers().get(s1.id).unwrap_err().code(), "NOT_FOUND");
    assert_eq!(
        svc.history()
            .list(s1.id, &PageRequest::default())
            .unwrap_err()
            .code(),
        "NOT_FOUND"
    );
}

#[tokio::test]
async fn test_version_delete_detaches_from_model() {
    let env = create_test_env();
    let svc = &env.service;
    let m1 = svc.models().create(new_model("M1")).await.unwrap();
    let v1 = svc.versions().create(new_version(m1.id, "v1")).await.unwrap();
    let v2 = svc.versions().create(new_version(m1.id, "v2")).await.unwrap();

    svc.versions().delete(v1.id).unwrap();
    let model = svc.models().get(m1.id).unwrap();
    let ids: Vec<i64> = model.versions.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![v2.id]);
}

#[tokio::test]
async fn test_training_callback_flow() {
    let env = create_test_env();
    let svc = &env.service;
    env.trainer.set_behavior(TrainerBehavior::Accept);

    let m1 = svc.models().create(new_model("M1")).await.unwrap();
    let algo = svc
        .algorithms()
        .create(NewAlgorithm {
            name: "lstm-ae".into(),
            description: Some("autoencoder".into()),
            parameters: json!({"epochs": 10, "window": 64}),
        })
        .unwrap();
    let mut input = new_version(m1.id, "v1");
    input.algorithm = Some(AlgorithmRef {
        id: algo.id,
        parameters: None,
    });
    input.training_percentage = Some(80.0);
    let v1 = svc.versions().create(input).await.unwrap();

    svc.versions().train(v1.id).await.unwrap();
    svc.versions().join_training(v1.id).await;
    assert_eq!(svc.versions().get(v1.id).unwrap().status, VersionStatus::Training);

    let submitted = env.trainer.submissions();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].parameters, Some(json!({"epochs": 10, "window": 64})));
    assert_eq!(submitted[0].training_percentage, Some(80.0));

    let v1 = svc
        .versions()
        .complete_training(
            v1.id,
            TrainingOutcome::Failed {
                reason: "loss diverged".into(),
            },
        )
        .unwrap();
    assert_eq!(v1.status, VersionStatus::Failed);

    // FAILED is terminal.
    let err = svc.versions().train(v1.id).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_scheduled_run_records_prediction() {
    let env = create_test_env();
    let svc = &env.service;
    let m1 = svc.models().create(new_model("M1")).await.unwrap();
    let v1 = svc.versions().create(new_version(m1.id, "v1")).await.unwrap();
    svc.versions().train(v1.id).await.unwrap();
    svc.versions().join_training(v1.id).await;
    svc.versions().deploy(v1.id).await.unwrap();

    let now = chrono::Utc::now();
    for (minutes, score) in [(5, 0.4), (3, 5.1), (1, 9.8)] {
        env.datasources.push_entry(
            1,
            TagEntry {
                tag: "anom_score".into(),
                timestamp: now - Duration::minutes(minutes),
                value: score,
            },
        );
    }

    let s1 = svc
        .schedulers()
        .create(NewScheduler {
            version_id: v1.id,
            datasource_id: 1,
            start_time: now - Duration::minutes(30),
            interval_seconds: 600,
            created_by: Some(7),
        })
        .await
        .unwrap();

    let started = svc.schedulers().fire_due(now).await.unwrap();
    assert_eq!(started.len(), 1);
    svc.schedulers().join_running().await;

    let record = svc.history().get(started[0]).unwrap();
    assert_eq!(record.scheduler_id, s1.id);
    assert_eq!(record.status, TaskStatus::Successful);
    assert_eq!(record.anomaly_detected, Some(true));
    assert_eq!(record.anomaly_count, Some(2));
    assert!(record.execution_duration_ms.is_some());
    assert!(env.deployer.is_live(&format!("memory://endpoints/{}", v1.id)));
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let datasources = Arc::new(MemoryDatasources::new().with_datasource(1, "D1"));

    let model_id = {
        let service = MlService::builder()
            .data_dir(dir.path())
            .datasources(datasources.clone())
            .build()
            .unwrap();
        let m1 = service.models().create(new_model("M1")).await.unwrap();
        let v1 = service.versions().create(new_version(m1.id, "v1")).await.unwrap();
        service.versions().delete(v1.id).unwrap();
        m1.id
    };

    let service = MlService::builder()
        .data_dir(dir.path())
        .datasources(datasources)
        .build()
        .unwrap();
    let v2 = service
        .versions()
        .create(new_version(model_id, "v2"))
        .await
        .unwrap();
    assert_eq!(v2.version, 2);
}

#[tokio::test]
async fn test_reopen_fails_interrupted_runs() {
    let dir = TempDir::new().unwrap();
    let datasources = Arc::new(MemoryDatasources::new().with_datasource(1, "D1"));
    let open = || {
        MlService::builder()
            .data_dir(dir.path())
            .datasources(datasources.clone())
            .build()
            .unwrap()
    };

    let scheduler_id = {
        let service = open();
        let m1 = service.models().create(new_model("M1")).await.unwrap();
        let v1 = service.versions().create(new_version(m1.id, "v1")).await.unwrap();
        service.versions().train(v1.id).await.unwrap();
        service.versions().join_training(v1.id).await;
        service.versions().deploy(v1.id).await.unwrap();
        let s1 = service
            .schedulers()
            .create(NewScheduler {
                version_id: v1.id,
                datasource_id: 1,
                start_time: chrono::Utc::now() - Duration::hours(1),
                interval_seconds: 60,
                created_by: None,
            })
            .await
            .unwrap();
        s1.id
    };

    // The process died with the first run in flight.
    Store::open_at(&dir.path().join(StoreConfig::DB_FILE_NAME))
        .unwrap()
        .write(|tx| {
            tx.execute_batch("UPDATE scheduler_history SET status = 'RUNNING'")?;
            Ok(())
        })
        .unwrap();

    let service = open();
    let page = service
        .history()
        .list(scheduler_id, &PageRequest::default())
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].status, TaskStatus::Failed);
    assert!(page.items[0]
        .failure_reason
        .as_deref()
        .unwrap()
        .starts_with("interrupted"));

    let started = service
        .schedulers()
        .fire_due(chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(started.len(), 1);
    service.schedulers().join_running().await;
    let record = service.history().get(started[0]).unwrap();
    assert_eq!(record.counter, 2);
    assert_eq!(record.status, TaskStatus::Successful);
}
