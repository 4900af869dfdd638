// Workflow Manager: the only component allowed to move a workflow between
// paused/active/terminal states. Every transition into a terminal state
// archives the workflow in the same operation - there is no tick where a
// workflow is both "terminal" and still sitting in the active bucket.
//
// Pause/resume/cancel also have to reach the node actually running the
// workflow's current step - a paused workflow whose node keeps executing
// the action it was already given isn't paused at all. Mirrors the
// source's `send_admin_command_to_step` against whichever node the active
// step names.

use std::time::Duration;

use tracing::warn;

use crate::error::{Result, WorkcellError};
use crate::models::{AdminCommand, Workflow};

use super::dispatcher::NodeClient;
use super::state_store::WorkcellStateStore;

pub struct WorkflowManager<'a, C: NodeClient> {
    store: &'a dyn WorkcellStateStore,
    node_client: &'a C,
}

impl<'a, C: NodeClient> WorkflowManager<'a, C> {
    pub fn new(store: &'a dyn WorkcellStateStore, node_client: &'a C) -> Self {
        Self { store, node_client }
    }

    pub async fn pause(&self, workflow_id: &str) -> Result<Workflow> {
        let workflow = self
            .transition(workflow_id, |wf| {
                if wf.status.terminal() {
                    return Err(WorkcellError::Validation(format!(
                        "workflow '{workflow_id}' is already terminal"
                    )));
                }
                wf.status.paused = true;
                Ok(())
            })
            .await?;
        self.notify_active_node(&workflow, AdminCommand::Pause).await;
        Ok(workflow)
    }

    pub async fn resume(&self, workflow_id: &str) -> Result<Workflow> {
        let workflow = self
            .transition(workflow_id, |wf| {
                wf.status.paused = false;
                Ok(())
            })
            .await?;
        self.notify_active_node(&workflow, AdminCommand::Resume).await;
        Ok(workflow)
    }

    /// Cancel a workflow. Terminal, so this archives it.
    pub async fn cancel(&self, workflow_id: &str) -> Result<Workflow> {
        let workflow = self
            .transition(workflow_id, |wf| {
                if wf.status.terminal() {
                    return Err(WorkcellError::Validation(format!(
                        "workflow '{workflow_id}' is already terminal"
                    )));
                }
                wf.status.cancelled = true;
                wf.end_time = Some(chrono::Utc::now());
                Ok(())
            })
            .await?;
        self.notify_active_node(&workflow, AdminCommand::Cancel).await;
        Ok(workflow)
    }

    /// Reset a workflow back to step 0 and requeue it.
    pub async fn retry(&self, workflow_id: &str) -> Result<Workflow> {
        self.retry_from(workflow_id, 0).await
    }

    /// Reset a workflow back to `from_step` and requeue it. Valid for any
    /// terminal workflow - failed, cancelled, or completed - since an
    /// operator may want to replay a run regardless of how it ended. Steps
    /// before `from_step` keep their recorded results; `from_step` and
    /// everything after are reset to `not_started` so the scheduler
    /// dispatches them again.
    pub async fn retry_from(&self, workflow_id: &str, from_step: usize) -> Result<Workflow> {
        let lock = self.store.acquire_lock(Duration::from_secs(5)).await?;
        let mut archived = self
            .store
            .get_archived_workflow(workflow_id)
            .await?
            .ok_or_else(|| WorkcellError::NotFound(format!("workflow '{workflow_id}' not found")))?;

        if !archived.status.terminal() {
            drop(lock);
            return Err(WorkcellError::Validation(format!(
                "workflow '{workflow_id}' has not finished, nothing to retry"
            )));
        }

        archived.status.reset(from_step);
        archived.start_time = None;
        archived.end_time = None;
        for step in archived.steps.iter_mut().skip(from_step) {
            step.status = crate::models::ActionStatus::NotStarted;
            step.results.clear();
            step.start_time = None;
            step.end_time = None;
        }

        self.store.set_workflow(archived.clone()).await?;
        drop(lock);
        Ok(archived)
    }

    /// Apply `record_terminal_result` semantics: fold a step's terminal
    /// failure into the workflow status and archive it in one step. Called
    /// by the engine's tick loop once a dispatched step's result is
    /// terminal.
    pub async fn record_step_outcome(&self, workflow_id: &str, step_failed: bool) -> Result<Workflow> {
        self.transition(workflow_id, |wf| {
            if step_failed {
                wf.status.failed = true;
                wf.end_time = Some(chrono::Utc::now());
            } else {
                wf.status.current_step_index += 1;
                if wf.status.current_step_index >= wf.steps.len() {
                    wf.status.completed = true;
                    wf.end_time = Some(chrono::Utc::now());
                }
            }
            if wf.start_time.is_none() {
                wf.start_time = Some(chrono::Utc::now());
            }
            Ok(())
        })
        .await
    }

    /// Run `mutate` against the workflow under the state lock, persist it,
    /// and archive it in the same critical section if the mutation pushed
    /// it into a terminal status - archival is never a separate tick.
    async fn transition(
        &self,
        workflow_id: &str,
        mutate: impl FnOnce(&mut Workflow) -> Result<()>,
    ) -> Result<Workflow> {
        let lock = self.store.acquire_lock(Duration::from_secs(5)).await?;
        let mut workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| WorkcellError::NotFound(format!("workflow '{workflow_id}' not found")))?;

        let was_terminal = workflow.status.terminal();
        mutate(&mut workflow)?;

        if !was_terminal && workflow.status.terminal() {
            self.store.archive_workflow(workflow.clone()).await?;
        } else {
            self.store.set_workflow(workflow.clone()).await?;
        }
        drop(lock);
        Ok(workflow)
    }

    /// Best-effort: tell the node running `workflow`'s current step about
    /// `command`. Missing node records or send failures are logged, not
    /// propagated - the workflow's own status has already moved, and a
    /// node that can't be reached right now will pick up the real state on
    /// its next poll.
    async fn notify_active_node(&self, workflow: &Workflow, command: AdminCommand) {
        let Some(step) = workflow.steps.get(workflow.status.current_step_index) else {
            return;
        };
        let node_name = &step.definition.node;
        let node = match self.store.get_node(node_name).await {
            Ok(Some(node)) => node,
            Ok(None) => return,
            Err(e) => {
                warn!(node = %node_name, error = %e, "could not look up node for admin command");
                return;
            }
        };
        if let Err(e) = self.node_client.send_admin_command(&node.node_url, command).await {
            warn!(node = %node_name, error = %e, ?command, "admin command to node failed");
        }
    }
}
