use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nyuki_engine::{
  Engine, EngineError, EventSource, ExecEvent, ExecutionNotifier, Instance, Transition,
};
use nyuki_workflow::{LiveReport, Map, Template, TemplateRef, Value};

/// An instance whose live state is set by the test.
#[derive(Debug)]
pub struct FakeInstance {
  id: String,
  template_id: String,
  live: Mutex<LiveReport>,
}

impl FakeInstance {
  pub fn new(id: &str, template_id: &str) -> Self {
    let mut exec = Map::new();
    exec.insert("id".to_string(), Value::from(id));
    exec.insert("state".to_string(), Value::from("pending"));
    Self {
      id: id.to_string(),
      template_id: template_id.to_string(),
      live: Mutex::new(LiveReport {
        exec,
        tasks: Vec::new(),
      }),
    }
  }

  pub fn set_exec(&self, key: &str, value: impl Into<Value>) {
    self
      .live
      .lock()
      .unwrap()
      .exec
      .insert(key.to_string(), value.into());
  }

  pub fn push_task(&self, task: Map) {
    self.live.lock().unwrap().tasks.push(task);
  }
}

impl Instance for FakeInstance {
  fn id(&self) -> &str {
    &self.id
  }

  fn template_id(&self) -> &str {
    &self.template_id
  }

  fn report(&self) -> LiveReport {
    self.live.lock().unwrap().clone()
  }
}

/// An engine that starts instances on demand and emits only the events the
/// test asks for.
///
/// Instance ids come from the queue given to [`FakeEngine::with_ids`], then
/// from a counter (`<template>-<n>`).
#[derive(Default)]
pub struct FakeEngine {
  templates: Mutex<BTreeMap<String, Template>>,
  instances: Mutex<HashMap<String, Arc<FakeInstance>>>,
  notifier: Mutex<Option<Arc<dyn ExecutionNotifier>>>,
  rejected: Mutex<HashSet<String>>,
  payloads: Mutex<Vec<(String, Value)>>,
  next_ids: Mutex<VecDeque<String>>,
  counter: AtomicUsize,
  stopped: AtomicBool,
}

impl FakeEngine {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
    let engine = Self::new();
    engine
      .next_ids
      .lock()
      .unwrap()
      .extend(ids.into_iter().map(str::to_string));
    engine
  }

  /// Make `load` fail for this template.
  pub fn reject(&self, template_id: &str) {
    self
      .rejected
      .lock()
      .unwrap()
      .insert(template_id.to_string());
  }

  /// Identifiers of the loaded templates, sorted.
  pub fn loaded(&self) -> Vec<String> {
    self.templates.lock().unwrap().keys().cloned().collect()
  }

  pub fn instance(&self, exec_id: &str) -> Option<Arc<FakeInstance>> {
    self.instances.lock().unwrap().get(exec_id).cloned()
  }

  /// Payloads received through `data_received` and `run_once`, with the
  /// topic or template they came with.
  pub fn payloads(&self) -> Vec<(String, Value)> {
    self.payloads.lock().unwrap().clone()
  }

  pub fn is_stopped(&self) -> bool {
    self.stopped.load(Ordering::SeqCst)
  }

  pub fn has_notifier(&self) -> bool {
    self.notifier.lock().unwrap().is_some()
  }

  /// Emit a workflow-level transition for a started instance, updating its
  /// exec state.
  pub fn emit(&self, exec_id: &str, transition: Transition) {
    let template_id = match self.instance(exec_id) {
      Some(instance) => {
        instance.set_exec("state", transition.as_str());
        instance.template_id.clone()
      }
      None => "unknown".to_string(),
    };
    self.emit_event(ExecEvent::new(
      transition,
      EventSource::workflow(template_id, exec_id),
    ));
  }

  /// Emit an arbitrary event.
  pub fn emit_event(&self, event: ExecEvent) {
    let notifier = self.notifier.lock().unwrap().clone();
    if let Some(notifier) = notifier {
      notifier.notify(event);
    }
  }

  fn start(&self, template: &Template) -> Arc<FakeInstance> {
    let id = self.next_ids.lock().unwrap().pop_front().unwrap_or_else(|| {
      let n = self.counter.fetch_add(1, Ordering::SeqCst);
      format!("{}-{}", template.id(), n)
    });
    let instance = Arc::new(FakeInstance::new(&id, template.id()));
    self
      .instances
      .lock()
      .unwrap()
      .insert(id, instance.clone());
    instance
  }

  fn check_running(&self) -> Result<(), EngineError> {
    if self.is_stopped() {
      return Err(EngineError::Stopped);
    }
    Ok(())
  }
}

#[async_trait]
impl Engine for FakeEngine {
  async fn load(&self, template: Template) -> Result<(), EngineError> {
    self.check_running()?;
    if self.rejected.lock().unwrap().contains(template.id()) {
      return Err(EngineError::Load {
        template_id: template.id().to_string(),
        message: "rejected by test".to_string(),
      });
    }
    self
      .templates
      .lock()
      .unwrap()
      .insert(template.id().to_string(), template);
    Ok(())
  }

  fn select(&self, topic: &str) -> Vec<TemplateRef> {
    self
      .templates
      .lock()
      .unwrap()
      .values()
      .filter(|template| template.matches_topic(topic))
      .map(Template::reference)
      .collect()
  }

  async fn data_received(
    &self,
    payload: Value,
    topic: &str,
  ) -> Result<Vec<Arc<dyn Instance>>, EngineError> {
    self.check_running()?;
    self
      .payloads
      .lock()
      .unwrap()
      .push((topic.to_string(), payload));

    let matching: Vec<Template> = self
      .templates
      .lock()
      .unwrap()
      .values()
      .filter(|template| template.matches_topic(topic))
      .cloned()
      .collect();

    Ok(
      matching
        .iter()
        .map(|template| self.start(template) as Arc<dyn Instance>)
        .collect(),
    )
  }

  async fn run_once(
    &self,
    template_id: &str,
    payload: Value,
  ) -> Result<Arc<dyn Instance>, EngineError> {
    self.check_running()?;
    let template = self
      .templates
      .lock()
      .unwrap()
      .get(template_id)
      .cloned()
      .ok_or_else(|| EngineError::TemplateNotLoaded(template_id.to_string()))?;
    self
      .payloads
      .lock()
      .unwrap()
      .push((template_id.to_string(), payload));

    Ok(self.start(&template))
  }

  fn register_notifier(&self, notifier: Arc<dyn ExecutionNotifier>) {
    *self.notifier.lock().unwrap() = Some(notifier);
  }

  async fn stop(&self) {
    self.stopped.store(true, Ordering::SeqCst);
  }
}
