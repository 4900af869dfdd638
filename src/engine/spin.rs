// Engine: ties the scheduler, dispatcher, and node poller into the three
// concurrent loops that keep a workcell moving. Named after the source's
// `spin()` - the engine doesn't do the work itself, it spins the loop that
// asks the scheduler what's next and hands it to the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument};

use crate::error::Result;

use super::dispatcher::{NodeClient, StepDispatcher};
use super::scheduler::Scheduler;
use super::state_store::WorkcellStateStore;
use super::workflow_manager::WorkflowManager;

pub struct Engine<S: WorkcellStateStore + 'static, C: NodeClient> {
    store: Arc<S>,
    scheduler: Scheduler,
    dispatcher: StepDispatcher<C>,
    tick_interval: Duration,
    node_urls: std::collections::HashMap<String, String>,
}

impl<S: WorkcellStateStore + 'static, C: NodeClient> Engine<S, C> {
    pub fn new(
        store: Arc<S>,
        scheduler: Scheduler,
        node_client: C,
        node_urls: std::collections::HashMap<String, String>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            scheduler,
            dispatcher: StepDispatcher::new(node_client),
            tick_interval,
            node_urls,
        }
    }

    /// Run the scheduler/dispatcher tick loop forever. The node liveness
    /// poller is a separate loop (`node_poller::NodePoller::run`), spawned
    /// independently by the caller against the same store so a stalled
    /// tick never blocks status refresh.
    pub async fn spin(&self) -> ! {
        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, "engine tick failed");
            }
            tokio::time::sleep(self.tick_interval).await;
        }
    }

    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<()> {
        // Read-select-mark-running runs under the state lock so two ticks
        // (or a tick racing an API-triggered pause/cancel) can never both
        // select the same step: one observes the other's in-flight marker
        // once it releases. The lock is dropped before any node I/O so a
        // slow or hung node never blocks the rest of the workcell.
        let (mut workflow, node_url) = {
            let _guard = self.store.acquire_lock(Duration::from_secs(5)).await?;

            let workflows = self.store.list_active_workflows().await?;
            let nodes = self.store.list_nodes().await?;
            let locations = self.store.list_locations().await?;

            let Some(workflow) = self.scheduler.select_next(&workflows, &nodes, &locations) else {
                return Ok(());
            };

            let mut workflow = workflow.clone();
            let step_index = workflow.status.current_step_index;
            let node_name = workflow.steps[step_index].definition.node.clone();
            let node_url = nodes.get(&node_name).map(|n| n.node_url.clone()).unwrap_or_default();

            // Marking the step Running here, inside the lock, is what a
            // concurrent tick's `is_ready` check sees - it keeps the second
            // tick from selecting the same not-yet-terminal step again.
            workflow.steps[step_index].status = crate::models::ActionStatus::Running;
            self.store.set_workflow(workflow.clone()).await?;
            (workflow, node_url)
        };

        let step_index = workflow.status.current_step_index;
        let node_name = workflow.steps[step_index].definition.node.clone();
        info!(workflow_id = %workflow.workflow_id, step_index, node = %node_name, "dispatching step");

        let result = self.dispatcher.dispatch(&node_url, &mut workflow.steps[step_index]).await?;
        self.store.set_workflow(workflow.clone()).await?;

        if result.status.is_terminal() {
            let manager = WorkflowManager::new(self.store.as_ref(), self.dispatcher.client());
            let failed = result.status == crate::models::ActionStatus::Failed;
            manager.record_step_outcome(&workflow.workflow_id, failed).await?;
        }

        Ok(())
    }
}
