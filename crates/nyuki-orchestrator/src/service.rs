//! The workflow service loop.
//!
//! `WorkflowService` owns the registry and every sink. It runs a single loop
//! that handles, one at a time, engine events, inbound bus events and
//! requests coming from [`ServiceHandle`]s.

use std::collections::HashSet;
use std::sync::Arc;

use nyuki_cache::{CacheConnector, CacheSync};
use nyuki_channel::Subscription;
use nyuki_config::{CacheSetting, ServiceConfig};
use nyuki_engine::{ChannelNotifier, Engine, ExecEvent};
use nyuki_store::Store;
use nyuki_workflow::{ExecMeta, Report, Value, WorkflowUri};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::{InboundBus, InboundEvent};
use crate::error::OrchestratorError;
use crate::global::GlobalBroadcaster;
use crate::history::HistoryRecorder;
use crate::recovery::{RecoveryReport, TemplateRecovery};
use crate::registry::Registry;
use crate::reporting::ErrorReporter;
use crate::router::route;
use crate::sinks::Sinks;
use crate::trigger::{TriggerBinding, register};

const COMMAND_BUFFER: usize = 32;

/// External collaborators of the service.
#[derive(Clone)]
pub struct ServiceDeps {
  pub engine: Arc<dyn Engine>,
  pub store: Arc<dyn Store>,
  pub bus: Arc<dyn InboundBus>,
  pub cache_connector: Arc<dyn CacheConnector>,
  pub reporter: Arc<dyn ErrorReporter>,
}

enum Command {
  StartWorkflow {
    template_id: String,
    payload: Value,
    exec: ExecMeta,
    reply: oneshot::Sender<Result<String, OrchestratorError>>,
  },
  Running {
    reply: oneshot::Sender<Vec<String>>,
  },
  Report {
    exec_id: String,
    reply: oneshot::Sender<Result<Report, OrchestratorError>>,
  },
  Uri {
    exec_id: String,
    reply: oneshot::Sender<Result<WorkflowUri, OrchestratorError>>,
  },
  SubscribeGlobal {
    reply: oneshot::Sender<Subscription>,
  },
  SubscribeInstance {
    exec_id: String,
    reply: oneshot::Sender<Result<Subscription, OrchestratorError>>,
  },
  Reload {
    config: Box<ServiceConfig>,
    reply: oneshot::Sender<Result<RecoveryReport, OrchestratorError>>,
  },
  Drain {
    reply: oneshot::Sender<()>,
  },
}

/// A workflow service.
///
/// # Usage
///
/// ```ignore
/// let (service, handle) = WorkflowService::new(config, deps);
///
/// let cancel = CancellationToken::new();
/// tokio::spawn(service.start(cancel.clone()));
///
/// let exec_id = handle.start_workflow("tpl1", payload, ExecMeta::new()).await?;
/// ```
pub struct WorkflowService {
  config: ServiceConfig,
  deps: ServiceDeps,
  registry: Registry,
  sinks: Sinks,
  trigger: TriggerBinding,
  recovery: TemplateRecovery,
  notifier: ChannelNotifier,
  events: mpsc::UnboundedReceiver<ExecEvent>,
  inbound_sender: mpsc::Sender<InboundEvent>,
  inbound: mpsc::Receiver<InboundEvent>,
  commands: mpsc::Receiver<Command>,
  subscribed: HashSet<String>,
}

impl WorkflowService {
  pub fn new(config: ServiceConfig, deps: ServiceDeps) -> (Self, ServiceHandle) {
    let (notifier, events) = ChannelNotifier::channel();
    let (inbound_sender, inbound) = mpsc::channel(config.channel_capacity);
    let (command_sender, commands) = mpsc::channel(COMMAND_BUFFER);

    let sinks = Sinks::new(
      None,
      HistoryRecorder::new(deps.store.clone(), deps.reporter.clone()),
      GlobalBroadcaster::new(config.channel_capacity),
    );
    let trigger = TriggerBinding::new(
      deps.engine.clone(),
      deps.store.clone(),
      deps.reporter.clone(),
    );
    let recovery = TemplateRecovery::new(
      deps.store.clone(),
      deps.engine.clone(),
      deps.reporter.clone(),
    );

    let service = Self {
      registry: Registry::new(config.channel_capacity),
      config,
      deps,
      sinks,
      trigger,
      recovery,
      notifier,
      events,
      inbound_sender,
      inbound,
      commands,
      subscribed: HashSet::new(),
    };
    let handle = ServiceHandle {
      commands: command_sender,
    };
    (service, handle)
  }

  /// Run the service until `cancel` is triggered.
  pub async fn start(mut self, cancel: CancellationToken) -> Result<(), OrchestratorError> {
    info!(holder = %self.config.holder, "starting workflow service");
    self.setup().await;

    loop {
      tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          info!(holder = %self.config.holder, "workflow service cancelled");
          break;
        }
        Some(event) = self.events.recv() => self.on_event(event),
        Some(event) = self.inbound.recv() => self.on_inbound(event).await,
        Some(command) = self.commands.recv() => self.on_command(command).await,
      }
    }

    self.teardown().await;
    Ok(())
  }

  async fn setup(&mut self) {
    self
      .deps
      .engine
      .register_notifier(Arc::new(self.notifier.clone()));

    let config = self.config.clone();
    self.reset_cache(&config).await;
    self.subscribe_topics(&config.topics).await;
    if self.recover().await.is_err() {
      warn!("starting without recovered templates");
    }
  }

  async fn teardown(&mut self) {
    self.sinks.global.close();
    self.deps.engine.stop().await;
    if let Some(cache) = self.sinks.cache.take() {
      cache.close().await;
    }
    if self.sinks.fanout.in_flight() > 0 {
      warn!(
        in_flight = self.sinks.fanout.in_flight(),
        "stopping with fan-out actions in flight"
      );
    }
    info!(holder = %self.config.holder, "workflow service stopped");
  }

  /// Close the current cache client, then open one for `config`.
  async fn reset_cache(&mut self, config: &ServiceConfig) {
    if let Some(cache) = self.sinks.cache.take() {
      cache.close().await;
    }

    self.sinks.cache = match config.cache_setting() {
      CacheSetting::Enabled { namespace, config } => {
        match self.deps.cache_connector.connect(&config).await {
          Ok(client) => {
            info!(namespace = %namespace, "workflow cache enabled");
            Some(CacheSync::new(namespace, client))
          }
          Err(e) => {
            error!(error = %e, "workflow cache unreachable, cache disabled");
            None
          }
        }
      }
      CacheSetting::MissingNamespace | CacheSetting::Disabled => None,
    };
  }

  /// Subscribe to topics not subscribed to yet.
  async fn subscribe_topics(&mut self, topics: &[String]) {
    for topic in topics {
      if self.subscribed.contains(topic) {
        continue;
      }
      match self
        .deps
        .bus
        .subscribe(topic, self.inbound_sender.clone())
        .await
      {
        Ok(()) => {
          info!(topic = %topic, "subscribed to inbound topic");
          self.subscribed.insert(topic.clone());
        }
        Err(e) => self.deps.reporter.report(&e),
      }
    }
  }

  async fn recover(&mut self) -> Result<RecoveryReport, OrchestratorError> {
    let result = self.recovery.run().await;
    if let Err(e) = &result {
      self.deps.reporter.report(e);
    }
    result
  }

  fn on_event(&mut self, event: ExecEvent) {
    let exec_id = event.exec_id().to_string();
    let transition = event.transition;

    match route(&mut self.registry, &self.sinks, event) {
      Ok(()) => {}
      Err(OrchestratorError::UnknownInstance(_)) => {
        error!(
          exec_id = %exec_id,
          transition = %transition,
          "event for unregistered workflow instance dropped"
        );
      }
      Err(e) => warn!(exec_id = %exec_id, error = %e, "workflow event dropped"),
    }
  }

  async fn on_inbound(&mut self, event: InboundEvent) {
    let topic = event.topic.clone();
    if let Err(e) = self
      .trigger
      .handle(&mut self.registry, &self.sinks, event)
      .await
    {
      error!(topic = %topic, error = %e, "failed to trigger workflows");
      self.deps.reporter.report(&e);
    }
  }

  async fn on_command(&mut self, command: Command) {
    // A dropped reply receiver means the caller gave up waiting
    match command {
      Command::StartWorkflow {
        template_id,
        payload,
        exec,
        reply,
      } => {
        let result = self.start_workflow(&template_id, payload, exec).await;
        let _ = reply.send(result);
      }
      Command::Running { reply } => {
        let _ = reply.send(self.registry.ids());
      }
      Command::Report { exec_id, reply } => {
        let result = self.registry.get(&exec_id).map(|workflow| workflow.report());
        let _ = reply.send(result);
      }
      Command::Uri { exec_id, reply } => {
        let result = self
          .registry
          .get(&exec_id)
          .map(|workflow| WorkflowUri::new(workflow.reference(), &self.config.holder));
        let _ = reply.send(result);
      }
      Command::SubscribeGlobal { reply } => {
        let _ = reply.send(self.sinks.global.subscribe(&self.registry));
      }
      Command::SubscribeInstance { exec_id, reply } => {
        let result = self.registry.get(&exec_id).map(|workflow| workflow.subscribe());
        let _ = reply.send(result);
      }
      Command::Reload { config, reply } => {
        let result = self.reload(*config).await;
        let _ = reply.send(result);
      }
      Command::Drain { reply } => {
        let fanout = self.sinks.fanout.clone();
        tokio::spawn(async move {
          fanout.wait_idle().await;
          let _ = reply.send(());
        });
      }
    }
  }

  async fn start_workflow(
    &mut self,
    template_id: &str,
    payload: Value,
    exec: ExecMeta,
  ) -> Result<String, OrchestratorError> {
    let template = self.trigger.template(template_id).await?;
    let instance = self.deps.engine.run_once(template_id, payload).await?;
    register(&mut self.registry, &self.sinks, template, instance, exec)
  }

  async fn reload(&mut self, config: ServiceConfig) -> Result<RecoveryReport, OrchestratorError> {
    config.validate()?;
    info!(holder = %config.holder, "reloading workflow service");

    self.reset_cache(&config).await;
    self.subscribe_topics(&config.topics).await;
    self.config = config;
    self.recover().await
  }
}

/// A cloneable handle to a running [`WorkflowService`].
#[derive(Clone)]
pub struct ServiceHandle {
  commands: mpsc::Sender<Command>,
}

impl ServiceHandle {
  async fn request<T>(
    &self,
    command: impl FnOnce(oneshot::Sender<T>) -> Command,
  ) -> Result<T, OrchestratorError> {
    let (reply, response) = oneshot::channel();
    self
      .commands
      .send(command(reply))
      .await
      .map_err(|_| OrchestratorError::Stopped)?;
    response.await.map_err(|_| OrchestratorError::Stopped)
  }

  /// Start a loaded template with `payload`, attaching caller metadata.
  pub async fn start_workflow(
    &self,
    template_id: &str,
    payload: impl Into<Value>,
    exec: ExecMeta,
  ) -> Result<String, OrchestratorError> {
    let template_id = template_id.to_string();
    let payload = payload.into();
    self
      .request(|reply| Command::StartWorkflow {
        template_id,
        payload,
        exec,
        reply,
      })
      .await?
  }

  /// Identifiers of the active instances, sorted.
  pub async fn running(&self) -> Result<Vec<String>, OrchestratorError> {
    self.request(|reply| Command::Running { reply }).await
  }

  pub async fn report(&self, exec_id: &str) -> Result<Report, OrchestratorError> {
    let exec_id = exec_id.to_string();
    self
      .request(|reply| Command::Report { exec_id, reply })
      .await?
  }

  /// Address of an active instance.
  pub async fn uri(&self, exec_id: &str) -> Result<WorkflowUri, OrchestratorError> {
    let exec_id = exec_id.to_string();
    self.request(|reply| Command::Uri { exec_id, reply }).await?
  }

  /// Subscribe to the fleet view; the first message lists active instances.
  pub async fn subscribe_global(&self) -> Result<Subscription, OrchestratorError> {
    self.request(|reply| Command::SubscribeGlobal { reply }).await
  }

  /// Subscribe to one instance; the first message is its current report.
  pub async fn subscribe_instance(&self, exec_id: &str) -> Result<Subscription, OrchestratorError> {
    let exec_id = exec_id.to_string();
    self
      .request(|reply| Command::SubscribeInstance { exec_id, reply })
      .await?
  }

  /// Apply a new configuration and reload templates.
  pub async fn reload(&self, config: ServiceConfig) -> Result<RecoveryReport, OrchestratorError> {
    let config = Box::new(config);
    self
      .request(|reply| Command::Reload { config, reply })
      .await?
  }

  /// Wait until dispatched fan-out actions have finished.
  pub async fn drain(&self) -> Result<(), OrchestratorError> {
    self.request(|reply| Command::Drain { reply }).await
  }
}
