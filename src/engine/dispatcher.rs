// Step Dispatcher: turns the scheduler's "this step is ready" decision
// into an actual HTTP call to a node, and folds the result back into the
// workflow's step state.
//
// Idempotent by construction: every `ActionRequest` carries an `action_id`
// minted once per step attempt and stored on the step before the request
// is sent. If the dispatcher crashes and restarts mid-flight, it recovers
// by calling `get_action_result(action_id)` instead of resubmitting the
// action, mirroring the source's `query_action_result` recovery path - which
// polls on a fixed five-second interval until the action reaches a terminal
// status. This dispatcher does the same, bounded by `poll_timeout` so one
// stuck node can't hang a tick forever: a request that's still running when
// the window closes just comes back non-terminal, to be recovered on the
// engine's next tick exactly like a dispatcher restart would.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ActionRequest, ActionResult, AdminCommand, AdminCommandResponse, Step};

/// What the dispatcher (and the Ingress API's admin endpoints) need from a
/// node. Implemented over HTTP for real nodes (`reqwest`-backed, matching
/// the node's `send_action` / `get_action_result` / `admin` endpoints) and
/// over an in-memory fake for tests.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn send_action(&self, node_url: &str, request: &ActionRequest) -> Result<ActionResult>;
    async fn get_action_result(&self, node_url: &str, action_id: &str) -> Result<ActionResult>;
    async fn send_admin_command(
        &self,
        node_url: &str,
        command: AdminCommand,
    ) -> Result<AdminCommandResponse>;
}

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

pub struct StepDispatcher<C: NodeClient> {
    client: C,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl<C: NodeClient> StepDispatcher<C> {
    pub fn new(client: C) -> Self {
        Self { client, poll_interval: DEFAULT_POLL_INTERVAL, poll_timeout: DEFAULT_POLL_TIMEOUT }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// The node client backing this dispatcher, so callers that need to
    /// reach a node directly (the Workflow Manager's pause/resume/cancel
    /// admin commands) can share the same client instead of building one.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Dispatch (or recover) the action for one step, folding the result
    /// into it. Returns the `ActionResult` so the caller (the engine's
    /// tick loop) can decide what to do with the workflow's status.
    pub async fn dispatch(&self, node_url: &str, step: &mut Step) -> Result<ActionResult> {
        if let Some(in_flight) = self.in_flight_action_id(step) {
            return self.poll_until_terminal(node_url, &in_flight, step).await;
        }

        let request = ActionRequest::new(&step.definition.action)
            .with_args(step.definition.args.clone())
            .with_files(step.definition.files.clone());

        // Record the request's action_id as in-flight before the network
        // call returns, so a crash between send and reply still leaves a
        // recoverable trail.
        step.apply_result(request.running());

        let result = self.client.send_action(node_url, &request).await?;
        step.apply_result(result.clone());
        if result.status.is_terminal() {
            return Ok(result);
        }
        self.poll_until_terminal(node_url, &result.action_id, step).await
    }

    /// Polls `get_action_result` on `poll_interval` until the action reaches
    /// a terminal status or `poll_timeout` elapses, folding every
    /// intermediate result into `step` as it arrives.
    async fn poll_until_terminal(&self, node_url: &str, action_id: &str, step: &mut Step) -> Result<ActionResult> {
        let deadline = Instant::now() + self.poll_timeout;
        loop {
            let result = self.client.get_action_result(node_url, action_id).await?;
            step.apply_result(result.clone());
            if result.status.is_terminal() || Instant::now() >= deadline {
                return Ok(result);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// A step has an in-flight action if its last recorded result is
    /// non-terminal (`running` or `not_ready`) - anything else means either
    /// nothing has been sent yet, or the step already finished.
    fn in_flight_action_id(&self, step: &Step) -> Option<String> {
        if step.is_terminal() {
            return None;
        }
        step.results
            .values()
            .find(|r| !r.status.is_terminal())
            .map(|r| r.action_id.clone())
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records every request it receives and returns a scripted response
    /// per action name, so dispatcher tests can assert on exactly what
    /// was sent without a real node.
    #[derive(Default)]
    pub struct MockNodeClient {
        pub responses: Mutex<HashMap<String, ActionResult>>,
        pub sent: Mutex<Vec<ActionRequest>>,
        pub queried: Mutex<Vec<String>>,
        pub sent_admin_commands: Mutex<Vec<AdminCommand>>,
    }

    impl MockNodeClient {
        pub fn respond_with(&self, action_name: &str, result: ActionResult) {
            self.responses.lock().unwrap().insert(action_name.to_string(), result);
        }
    }

    #[async_trait]
    impl NodeClient for MockNodeClient {
        async fn send_action(&self, _node_url: &str, request: &ActionRequest) -> Result<ActionResult> {
            self.sent.lock().unwrap().push(request.clone());
            let responses = self.responses.lock().unwrap();
            Ok(responses
                .get(&request.action_name)
                .cloned()
                .unwrap_or_else(|| request.succeeded(HashMap::new())))
        }

        async fn get_action_result(&self, _node_url: &str, action_id: &str) -> Result<ActionResult> {
            self.queried.lock().unwrap().push(action_id.to_string());
            let responses = self.responses.lock().unwrap();
            Ok(responses
                .values()
                .find(|r| r.action_id == action_id)
                .cloned()
                .unwrap_or(ActionResult {
                    action_id: action_id.to_string(),
                    status: crate::models::ActionStatus::Running,
                    errors: Vec::new(),
                    data: HashMap::new(),
                    files: HashMap::new(),
                }))
        }

        async fn send_admin_command(
            &self,
            _node_url: &str,
            command: AdminCommand,
        ) -> Result<AdminCommandResponse> {
            self.sent_admin_commands.lock().unwrap().push(command);
            Ok(AdminCommandResponse { success: true, errors: Vec::new() })
        }
    }
}
