use std::sync::Arc;

use nyuki_orchestrator::{
  GlobalBroadcaster, HistoryRecorder, InboundEvent, Registry, Sinks, TemplateRecovery,
  TriggerBinding,
};
use nyuki_store::MemoryStore;
use nyuki_test_utils::{FakeEngine, RecordingReporter, init_tracing, publish, template_document};
use serde_json::json;

#[tokio::test]
async fn test_engine_rejection_is_reported_and_skipped() {
  init_tracing();
  let store = Arc::new(MemoryStore::new());
  for id in ["tpl1", "tpl2", "tpl3"] {
    publish(store.as_ref(), template_document(id, &[])).await;
  }
  let engine = Arc::new(FakeEngine::new());
  engine.reject("tpl2");
  let reporter = Arc::new(RecordingReporter::new());

  let recovery = TemplateRecovery::new(store, engine.clone(), reporter.clone());
  let report = recovery.run().await.unwrap();

  assert_eq!(report.loaded, vec!["tpl1", "tpl3"]);
  assert_eq!(report.failed, vec!["tpl2"]);
  assert_eq!(engine.loaded(), vec!["tpl1", "tpl3"]);
  assert_eq!(reporter.count(), 1);
}

#[tokio::test]
async fn test_trigger_without_matching_template_starts_nothing() {
  init_tracing();
  let store = Arc::new(MemoryStore::new());
  publish(store.as_ref(), template_document("tpl1", &["alerts"])).await;

  let engine = Arc::new(FakeEngine::new());
  let reporter = Arc::new(RecordingReporter::new());
  TemplateRecovery::new(store.clone(), engine.clone(), reporter.clone())
    .run()
    .await
    .unwrap();

  let sinks = Sinks::new(
    None,
    HistoryRecorder::new(store.clone(), reporter.clone()),
    GlobalBroadcaster::new(8),
  );
  let mut registry = Registry::new(8);
  let trigger = TriggerBinding::new(engine.clone(), store, reporter.clone());

  let started = trigger
    .handle(
      &mut registry,
      &sinks,
      InboundEvent {
        topic: "tickets".to_string(),
        payload: json!({"id": 7}).into(),
      },
    )
    .await
    .unwrap();
  assert!(started.is_empty());
  assert!(engine.payloads().is_empty());

  let started = trigger
    .handle(
      &mut registry,
      &sinks,
      InboundEvent {
        topic: "alerts".to_string(),
        payload: json!({"id": 8}).into(),
      },
    )
    .await
    .unwrap();
  assert_eq!(started, vec!["tpl1-0"]);
  assert!(registry.contains("tpl1-0"));
  assert_eq!(reporter.count(), 0);
}
