mod common;

use common::{CallLog, RecordingHandler, chain, entry, registry};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tideflow_engine::{
    ApplyOptions, EntryState, EntryStates, HandlerError, HandlerRegistry, ReconcileError,
    StepAction, StepError, StepState, apply_steps, plan_steps, reconcile,
};

fn handlers(log: &CallLog) -> HandlerRegistry {
    registry(RecordingHandler::new(log.clone()), &["resource"])
}

async fn apply_all(
    new: Option<&EntryStates>,
    old: Option<&EntryStates>,
    handlers: &HandlerRegistry,
) -> tideflow_engine::ApplyOutcome {
    let steps = plan_steps(new, old, handlers).unwrap();
    apply_steps(&steps, new, old, handlers, &ApplyOptions::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_populates_results() {
    let log = CallLog::default();
    let handlers = handlers(&log);
    let desired = chain();

    let outcome = apply_all(Some(&desired), None, &handlers).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.result.len(), 4);
    for entry in outcome.result.iter() {
        assert_eq!(entry.result.as_ref().unwrap()["id"], format!("res-{}", entry.entry_id));
    }

    // 依存先の結果はコンテキスト経由で参照できる
    let c = outcome.result.get("C").unwrap().result.clone().unwrap();
    assert_eq!(c["upstream"], json!(["B", "D"]));

    let order: Vec<String> = log.calls().into_iter().map(|(_, id)| id).collect();
    assert_eq!(order, vec!["D", "B", "C", "A"]);
}

#[tokio::test]
async fn test_round_trip_is_idempotent() {
    let log = CallLog::default();
    let handlers = handlers(&log);
    let desired = chain();

    let first = apply_all(Some(&desired), None, &handlers).await;
    assert!(first.is_success());

    let steps = plan_steps(Some(&desired), Some(&first.result), &handlers).unwrap();
    assert!(steps.iter().all(|s| s.action == StepAction::Update));

    let second = apply_steps(
        &steps,
        Some(&desired),
        Some(&first.result),
        &handlers,
        &ApplyOptions::default(),
    )
    .await
    .unwrap();

    assert!(second.is_success());
    assert_eq!(log.count("preview"), 4);
    assert_eq!(log.count("update"), 0);
    assert_eq!(
        serde_json::to_string(&second.result).unwrap(),
        serde_json::to_string(&first.result).unwrap()
    );
}

#[tokio::test]
async fn test_update_merges_partial_result() {
    let log = CallLog::default();
    let handlers = handlers(&log);

    let old: EntryStates = [
        EntryState::new("fn", "resource", json!({"identity": "fn", "memory": 128}))
            .with_result(json!({"id": "res-fn", "params": {"memory": 128}})),
    ]
    .into_iter()
    .collect();
    let desired: EntryStates =
        [EntryState::new("fn", "resource", json!({"identity": "fn", "memory": 256}))]
            .into_iter()
            .collect();

    let outcome = apply_all(Some(&desired), Some(&old), &handlers).await;

    assert!(outcome.is_success());
    assert_eq!(log.count("update"), 1);
    let updated = outcome.result.get("fn").unwrap();
    assert_eq!(updated.parameters["memory"], 256);
    assert_eq!(
        updated.result,
        Some(json!({"id": "res-fn", "params": {"identity": "fn", "memory": 256}}))
    );
}

#[tokio::test]
async fn test_failed_update_leaves_prior_result() {
    let log = CallLog::default();
    let handlers = registry(
        RecordingHandler::new(log.clone()).failing("update", "fn"),
        &["resource"],
    );

    let recorded = EntryState::new("fn", "resource", json!({"identity": "fn", "memory": 128}))
        .with_result(json!({"id": "res-fn"}));
    let old: EntryStates = [recorded.clone()].into_iter().collect();
    let desired: EntryStates =
        [EntryState::new("fn", "resource", json!({"identity": "fn", "memory": 512}))]
            .into_iter()
            .collect();

    let outcome = apply_all(Some(&desired), Some(&old), &handlers).await;

    assert_eq!(outcome.result.get("fn"), Some(&recorded));
    assert_eq!(outcome.errors.len(), 1);
    match &outcome.errors[0] {
        StepError::Handler {
            entry_id,
            action,
            source: HandlerError::ApiError(message),
        } => {
            assert_eq!(entry_id, "fn");
            assert_eq!(*action, StepAction::Update);
            assert_eq!(message, "update fn failed");
        }
        other => panic!("Expected handler error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_create_skips_dependents_only() {
    let log = CallLog::default();
    let handlers = registry(
        RecordingHandler::new(log.clone()).failing("create", "B"),
        &["resource"],
    );

    let mut desired = chain();
    desired.insert(entry("standalone", &["D"]));

    let outcome = apply_all(Some(&desired), None, &handlers).await;

    assert!(outcome.result.contains("D"));
    assert!(outcome.result.contains("standalone"));
    assert!(!outcome.result.contains("B"));
    assert!(!outcome.result.contains("C"));
    assert!(!outcome.result.contains("A"));

    // B は失敗、C と A は依存失敗でスキップ
    assert_eq!(outcome.errors.len(), 3);
    assert!(matches!(&outcome.errors[0], StepError::Handler { entry_id, .. } if entry_id == "B"));
    assert!(matches!(
        &outcome.errors[1],
        StepError::DependencyFailed { entry_id, dependency, .. }
            if entry_id == "C" && dependency == "B"
    ));
    assert!(matches!(
        &outcome.errors[2],
        StepError::DependencyFailed { entry_id, dependency, .. }
            if entry_id == "A" && dependency == "C"
    ));
    assert_eq!(log.position("create", "C"), None);
}

#[tokio::test]
async fn test_failed_delete_keeps_entry_and_its_dependencies() {
    let log = CallLog::default();
    let handlers = registry(
        RecordingHandler::new(log.clone()).failing("delete", "C"),
        &["resource"],
    );

    let old: EntryStates = chain()
        .into_iter()
        .map(|e| {
            let result = json!({ "id": format!("res-{}", e.entry_id) });
            e.with_result(result)
        })
        .collect();

    let outcome = apply_all(None, Some(&old), &handlers).await;

    assert!(!outcome.result.contains("A"));
    assert_eq!(outcome.result.get("C"), old.get("C"));
    assert_eq!(outcome.result.get("B"), old.get("B"));
    assert_eq!(outcome.result.get("D"), old.get("D"));

    assert_eq!(outcome.errors.len(), 3);
    assert_eq!(outcome.errors[0].entry_id(), "C");
    assert!(matches!(
        &outcome.errors[1],
        StepError::DependentRemains { entry_id, dependent } if entry_id == "B" && dependent == "C"
    ));
    assert!(matches!(
        &outcome.errors[2],
        StepError::DependentRemains { entry_id, .. } if entry_id == "D"
    ));
    assert_eq!(log.count("delete"), 2);
}

#[tokio::test]
async fn test_replace_of_provisioned_entry_is_rejected() {
    let log = CallLog::default();
    let handlers = registry(RecordingHandler::new(log.clone()), &["resource", "table"]);

    let recorded = EntryState::new("store", "table", json!({"identity": "store"}))
        .with_result(json!({"id": "res-store"}));
    let old: EntryStates = [recorded.clone()].into_iter().collect();
    let desired: EntryStates =
        [EntryState::new("store", "resource", json!({"identity": "store"}))]
            .into_iter()
            .collect();

    let outcome = apply_all(Some(&desired), Some(&old), &handlers).await;

    assert_eq!(outcome.result.get("store"), Some(&recorded));
    assert_eq!(outcome.errors.len(), 1);
    match outcome.errors[0].handler_error() {
        Some(HandlerError::ReplaceResource {
            service_name,
            candidate_id,
            current_id,
        }) => {
            assert_eq!(service_name, "recording");
            assert_eq!(candidate_id, "store");
            assert_eq!(current_id, "store");
        }
        other => panic!("Expected ReplaceResource, got {other:?}"),
    }
}

#[tokio::test]
async fn test_replace_of_unprovisioned_entry_creates() {
    let log = CallLog::default();
    let handlers = handlers(&log);

    let old: EntryStates = [EntryState::new("fn", "resource", json!({"identity": "v1"}))]
        .into_iter()
        .collect();
    let desired: EntryStates = [EntryState::new("fn", "resource", json!({"identity": "v2"}))]
        .into_iter()
        .collect();

    let outcome = apply_all(Some(&desired), Some(&old), &handlers).await;

    assert!(outcome.is_success());
    let replaced = outcome.result.get("fn").unwrap();
    assert_eq!(replaced.parameters["identity"], "v2");
    assert_eq!(replaced.result.as_ref().unwrap()["id"], "res-fn");
}

#[tokio::test]
async fn test_deletes_run_after_all_upserts() {
    let log = CallLog::default();
    let handlers = handlers(&log);

    let old: EntryStates = [entry("old-api", &[]), entry("old-role", &[])]
        .into_iter()
        .collect();
    let desired = chain();

    let outcome = apply_all(Some(&desired), Some(&old), &handlers).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.result.len(), 4);

    let calls = log.calls();
    let last_create = calls.iter().rposition(|(m, _)| m == "create").unwrap();
    let first_delete = calls.iter().position(|(m, _)| m == "delete").unwrap();
    assert!(last_create < first_delete);
}

#[tokio::test]
async fn test_concurrent_waves() {
    let log = CallLog::default();
    let handler = RecordingHandler::new(log.clone()).with_delay(Duration::from_millis(20));
    let max_in_flight = handler.max_in_flight();
    let handlers = registry(handler, &["resource"]);

    let desired: EntryStates = [
        entry("root", &[]),
        entry("a", &["root"]),
        entry("b", &["root"]),
        entry("c", &["root"]),
        entry("leaf", &["a", "b", "c"]),
    ]
    .into_iter()
    .collect();

    let steps = plan_steps(Some(&desired), None, &handlers).unwrap();
    let options = ApplyOptions {
        concurrent_waves: true,
        ..Default::default()
    };
    let outcome = apply_steps(&steps, Some(&desired), None, &handlers, &options)
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.result.len(), 5);
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 3);

    let leaf = outcome.result.get("leaf").unwrap().result.clone().unwrap();
    assert_eq!(leaf["upstream"], json!(["a", "b", "c"]));
}

#[tokio::test]
async fn test_force_is_passed_to_handlers() {
    let log = CallLog::default();
    let handlers = handlers(&log);
    let desired = chain();

    let options = ApplyOptions {
        force: true,
        ..Default::default()
    };
    let reconciliation = reconcile(Some(&desired), None, &handlers, &options)
        .await
        .unwrap();

    assert_eq!(reconciliation.steps.len(), 4);
    assert!(
        reconciliation
            .outcome
            .result
            .iter()
            .all(|e| e.result.as_ref().unwrap()["force"] == true)
    );
}

#[tokio::test]
async fn test_missing_handler_at_apply_time() {
    let log = CallLog::default();
    let desired = chain();
    let steps = plan_steps(Some(&desired), None, &handlers(&log)).unwrap();

    let outcome = apply_steps(
        &steps,
        Some(&desired),
        None,
        &HandlerRegistry::new(),
        &ApplyOptions::default(),
    )
    .await
    .unwrap();

    assert!(outcome.result.is_empty());
    assert!(matches!(
        &outcome.errors[0],
        StepError::HandlerNotFound { entry_id, .. } if entry_id == "D"
    ));
    // D より後はすべて依存失敗
    assert_eq!(outcome.errors.len(), 4);
}

#[tokio::test]
async fn test_missing_connection_is_recorded() {
    let log = CallLog::default();
    let handlers = handlers(&log);
    let desired: EntryStates = [entry("fn", &[]).with_connections(["bucket"])]
        .into_iter()
        .collect();

    let outcome = apply_all(Some(&desired), None, &handlers).await;

    assert!(outcome.result.is_empty());
    assert!(matches!(
        &outcome.errors[..],
        [StepError::MissingReference { reference, .. }] if reference == "bucket"
    ));
    assert_eq!(log.count("create"), 0);
}

#[tokio::test]
async fn test_apply_without_entries() {
    let steps = vec![StepState::new("A", StepAction::Create, 0)];
    let result = apply_steps(
        &steps,
        None,
        None,
        &HandlerRegistry::new(),
        &ApplyOptions::default(),
    )
    .await;
    assert!(matches!(result, Err(ReconcileError::EntriesNotFound)));
}

#[tokio::test]
async fn test_failed_preview_leaves_prior_result() {
    let log = CallLog::default();
    let handlers = registry(
        RecordingHandler::new(log.clone()).failing("preview", "fn"),
        &["resource"],
    );

    let recorded = EntryState::new("fn", "resource", json!({"identity": "fn", "memory": 128}))
        .with_result(json!({"id": "res-fn"}));
    let old: EntryStates = [recorded.clone()].into_iter().collect();
    let desired: EntryStates =
        [EntryState::new("fn", "resource", json!({"identity": "fn", "memory": 512}))]
            .into_iter()
            .collect();

    let outcome = apply_all(Some(&desired), Some(&old), &handlers).await;

    assert_eq!(outcome.result.get("fn"), Some(&recorded));
    assert_eq!(log.count("update"), 0);
    match &outcome.errors[..] {
        [
            StepError::Handler {
                entry_id,
                action,
                source: HandlerError::ApiError(message),
            },
        ] => {
            assert_eq!(entry_id, "fn");
            assert_eq!(*action, StepAction::Update);
            assert_eq!(message, "preview fn failed");
        }
        other => panic!("Expected one handler error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_replace_leaves_prior_entry() {
    let log = CallLog::default();
    let handlers = registry(
        RecordingHandler::new(log.clone()).failing("replace", "fn"),
        &["resource"],
    );

    let recorded = EntryState::new("fn", "resource", json!({"identity": "v1"}));
    let old: EntryStates = [recorded.clone()].into_iter().collect();
    let desired: EntryStates = [EntryState::new("fn", "resource", json!({"identity": "v2"}))]
        .into_iter()
        .collect();

    let steps = plan_steps(Some(&desired), Some(&old), &handlers).unwrap();
    assert_eq!(steps[0].action, StepAction::Replace);

    let outcome = apply_all(Some(&desired), Some(&old), &handlers).await;

    assert_eq!(outcome.result.get("fn"), Some(&recorded));
    assert_eq!(log.count("create"), 0);
    match &outcome.errors[..] {
        [
            StepError::Handler {
                entry_id,
                action,
                source: HandlerError::ApiError(message),
            },
        ] => {
            assert_eq!(entry_id, "fn");
            assert_eq!(*action, StepAction::Replace);
            assert_eq!(message, "replace fn failed");
        }
        other => panic!("Expected one handler error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_step_for_unknown_entry_is_missing_reference() {
    let log = CallLog::default();
    let handlers = handlers(&log);
    let desired: EntryStates = [entry("fn", &[])].into_iter().collect();

    // どちらのグラフにも存在しないエントリーを指すステップ
    let steps = vec![
        StepState::new("fn", StepAction::Create, 0),
        StepState::new("ghost", StepAction::Create, 0),
        StepState::new("phantom", StepAction::Delete, 0),
    ];
    let outcome = apply_steps(
        &steps,
        Some(&desired),
        None,
        &handlers,
        &ApplyOptions::default(),
    )
    .await
    .unwrap();

    assert!(outcome.result.contains("fn"));
    assert_eq!(outcome.result.len(), 1);
    assert_eq!(outcome.errors.len(), 2);
    for (error, id) in outcome.errors.iter().zip(["ghost", "phantom"]) {
        match error {
            StepError::MissingReference {
                entry_id,
                reference,
            } => {
                assert_eq!(entry_id, id);
                assert_eq!(reference, id);
            }
            other => panic!("Expected MissingReference, got {other:?}"),
        }
    }
    assert_eq!(log.count("delete"), 0);
}

/// 更新に失敗したエントリーが旧依存を保持している間は、その依存先を削除しない
#[tokio::test]
async fn test_failed_update_keeps_recorded_dependencies_alive() {
    let log = CallLog::default();
    let flaky = registry(
        RecordingHandler::new(log.clone()).failing("update", "Y"),
        &["resource"],
    );

    let old: EntryStates = [
        entry("X", &[]).with_result(json!({"id": "res-X"})),
        entry("Y", &["X"]).with_result(json!({"id": "res-Y"})),
    ]
    .into_iter()
    .collect();
    let desired: EntryStates =
        [EntryState::new("Y", "resource", json!({"identity": "Y", "version": 2}))]
            .into_iter()
            .collect();

    let first = apply_all(Some(&desired), Some(&old), &flaky).await;

    assert_eq!(first.result.get("Y"), old.get("Y"));
    assert_eq!(first.result.get("X"), old.get("X"));
    assert_eq!(first.errors.len(), 2);
    assert!(matches!(
        &first.errors[0],
        StepError::Handler { entry_id, action: StepAction::Update, .. } if entry_id == "Y"
    ));
    assert!(matches!(
        &first.errors[1],
        StepError::DependentRemains { entry_id, dependent }
            if entry_id == "X" && dependent == "Y"
    ));
    assert_eq!(log.count("delete"), 0);

    // 記録された結果はそのまま全削除できる
    let teardown_log = CallLog::default();
    let healthy = handlers(&teardown_log);
    let second = apply_all(None, Some(&first.result), &healthy).await;

    assert!(second.is_success(), "errors: {:?}", second.errors);
    assert!(second.result.is_empty());
    assert_eq!(
        teardown_log.calls(),
        vec![
            ("delete".to_string(), "Y".to_string()),
            ("delete".to_string(), "X".to_string()),
        ]
    );
}
