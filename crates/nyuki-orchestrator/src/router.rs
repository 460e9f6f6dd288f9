//! Execution event router.
//!
//! Every engine event goes through [`route`], which runs on the service loop:
//!
//! 1. resolve the instance and check the lifecycle transition
//! 2. snapshot its report and normalize the event into an [`ExecPayload`]
//! 3. dispatch sink actions by transition
//! 4. deliver the payload on the instance's own channel
//!
//! On `end`/`error` the report snapshot is taken before the instance leaves
//! the registry, so a reader either finds the instance or has already been
//! sent its terminal payload.

use nyuki_engine::{ExecEvent, Transition};
use tracing::{debug, info};

use crate::error::OrchestratorError;
use crate::payload::ExecPayload;
use crate::registry::Registry;
use crate::sinks::Sinks;

pub fn route(
  registry: &mut Registry,
  sinks: &Sinks,
  event: ExecEvent,
) -> Result<(), OrchestratorError> {
  let exec_id = event.exec_id().to_string();
  let transition = event.transition;

  let workflow = registry.get_mut(&exec_id)?;
  workflow.advance(transition)?;

  let report = workflow.report();
  let mut payload = ExecPayload::new(event, workflow.exec_meta());
  if transition == Transition::Begin {
    payload = payload.with_template(workflow.template().document().clone());
  }
  let payload = payload.into_json();

  if transition.is_terminal() {
    sinks.global.broadcast(&payload);
    sinks.history.record(&sinks.fanout, report.clone());

    let workflow = registry.remove(&exec_id)?;
    sinks.share_and_forget(exec_id.clone(), report);

    workflow.channel().broadcast(payload);
    workflow.channel().close();
    info!(
      exec_id = %exec_id,
      template_id = %workflow.template().id(),
      transition = %transition,
      "workflow finished"
    );
    return Ok(());
  }

  sinks.share(report, true);
  match transition {
    Transition::Begin | Transition::Suspend | Transition::Resume => {
      sinks.global.broadcast(&payload);
      info!(exec_id = %exec_id, transition = %transition, "workflow transition");
    }
    _ => debug!(exec_id = %exec_id, "workflow update"),
  }

  workflow.channel().broadcast(payload);
  Ok(())
}
