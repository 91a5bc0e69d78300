//! Tool Call Router
//!
//! Dispatches each model tool call as its own task: the active vertical gets
//! the first chance to handle it, and declined calls are delegated to the
//! remote agent. Every task is registered under its call id so it can be
//! cancelled individually or in bulk.
//!
//! Cancellation is cooperative. A cancelled task may still finish its work,
//! but its response is checked against the registry at the delivery boundary
//! and dropped, so a cancelled call never produces a response.

use crate::bridge::RemoteAgentBridge;
use crate::session_manager::SessionManager;
use crate::tool_call::{ToolCall, ToolResponse, ToolResult};
use crate::vertical::Vertical;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

/// Where routed responses are delivered.
pub type ResponseSink = mpsc::UnboundedSender<ToolResponse>;

struct InFlight {
    generation: u64,
    token: CancellationToken,
}

type Registry = Arc<Mutex<HashMap<String, InFlight>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, InFlight>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ToolCallRouter {
    vertical: Option<Arc<dyn Vertical>>,
    session: Arc<SessionManager>,
    bridge: Arc<dyn RemoteAgentBridge>,
    in_flight: Registry,
    next_generation: AtomicU64,
}

impl ToolCallRouter {
    pub fn new(
        vertical: Option<Arc<dyn Vertical>>,
        session: Arc<SessionManager>,
        bridge: Arc<dyn RemoteAgentBridge>,
    ) -> Self {
        Self {
            vertical,
            session,
            bridge,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Schedules a tool call and returns immediately.
    ///
    /// Exactly one response is sent to `respond` unless the call is cancelled
    /// first, in which case none is. Must be called from within a Tokio
    /// runtime.
    pub fn route(&self, call: ToolCall, respond: ResponseSink) {
        let token = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // Hold the registry lock until the task is spawned so it cannot reach
        // its delivery check before it is registered.
        let mut in_flight = lock(&self.in_flight);
        let previous = in_flight.insert(
            call.id.clone(),
            InFlight {
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            warn!(call_id = %call.id, "Duplicate tool call id; superseding the earlier call");
            previous.token.cancel();
        }

        let span = tracing::info_span!("tool_call", call_id = %call.id, tool = %call.name);
        let registry = self.in_flight.clone();
        let vertical = self.vertical.clone();
        let session = self.session.clone();
        let bridge = self.bridge.clone();

        tokio::spawn(
            async move {
                let work = tokio::spawn(dispatch(call.clone(), vertical, session, bridge));
                let result = match work.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!(error = %e, "Tool call task failed");
                        ToolResult::error(format!("Tool '{}' failed unexpectedly.", call.name))
                    }
                };
                deliver(&registry, generation, &token, ToolResponse::new(&call, result), &respond);
            }
            .instrument(span),
        );
        drop(in_flight);
    }

    /// Cancels the named calls. Unknown or already-completed ids are ignored.
    pub fn cancel(&self, ids: &[String]) {
        let cancelled: Vec<String> = {
            let mut in_flight = lock(&self.in_flight);
            ids.iter()
                .filter_map(|id| {
                    in_flight.remove(id).map(|entry| {
                        entry.token.cancel();
                        id.clone()
                    })
                })
                .collect()
        };
        if cancelled.is_empty() {
            debug!(?ids, "No in-flight calls matched cancellation");
            return;
        }
        info!(?cancelled, "Cancelled in-flight tool calls");
        self.bridge.mark_cancelled(&cancelled);
    }

    /// Cancels every in-flight call. The registry is empty afterwards.
    pub fn cancel_all(&self) {
        let cancelled: Vec<String> = lock(&self.in_flight)
            .drain()
            .map(|(id, entry)| {
                entry.token.cancel();
                id
            })
            .collect();
        if !cancelled.is_empty() {
            info!(count = cancelled.len(), "Cancelled all in-flight tool calls");
            self.bridge.mark_cancelled(&cancelled);
        }
    }

    /// Number of calls still awaiting delivery.
    pub fn pending_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        lock(&self.in_flight).contains_key(id)
    }
}

async fn dispatch(
    call: ToolCall,
    vertical: Option<Arc<dyn Vertical>>,
    session: Arc<SessionManager>,
    bridge: Arc<dyn RemoteAgentBridge>,
) -> ToolResult {
    if let Some(vertical) = &vertical {
        if let Some(result) = vertical.handle(&call, &session).await {
            debug!(vertical = %vertical.id(), error = result.is_error(), "Handled locally");
            return result;
        }
    }
    let task = call.task_description();
    info!(%task, "Delegating tool call to remote agent");
    bridge.delegate_task(&task, &call.name).await
}

/// Sends the response unless the call was cancelled or superseded meanwhile,
/// then removes it from the registry.
fn deliver(
    registry: &Registry,
    generation: u64,
    token: &CancellationToken,
    response: ToolResponse,
    respond: &ResponseSink,
) {
    let mut in_flight = lock(registry);
    let current = in_flight
        .get(&response.id)
        .is_some_and(|entry| entry.generation == generation);
    if token.is_cancelled() || !current {
        debug!("Dropping response for cancelled call");
        return;
    }
    let id = response.id.clone();
    if respond.send(response).is_err() {
        warn!("Response receiver dropped; tool response lost");
    }
    in_flight.remove(&id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{AgentCallStatus, AgentConnectionState, MockRemoteAgentBridge};
    use crate::history::{MemoryStore, SessionHistory};
    use crate::tool_call::ToolSchema;
    use crate::verticals::ConstructionVertical;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio::sync::Notify;

    /// Bridge whose delegated tasks block until released.
    #[derive(Default)]
    struct GatedBridge {
        started: Notify,
        release: Notify,
        tasks: Mutex<Vec<(String, String)>>,
        status: Mutex<AgentCallStatus>,
    }

    #[async_trait]
    impl RemoteAgentBridge for GatedBridge {
        async fn check_connection(&self) -> bool {
            true
        }
        async fn reset_session(&self) {}
        async fn delegate_task(&self, description: &str, tool_name: &str) -> ToolResult {
            self.tasks
                .lock()
                .unwrap()
                .push((description.to_string(), tool_name.to_string()));
            self.started.notify_one();
            self.release.notified().await;
            ToolResult::success("remote done")
        }
        fn mark_cancelled(&self, ids: &[String]) {
            *self.status.lock().unwrap() = AgentCallStatus::Cancelled { ids: ids.to_vec() };
        }
        fn last_call_status(&self) -> AgentCallStatus {
            self.status.lock().unwrap().clone()
        }
        fn connection_state(&self) -> AgentConnectionState {
            AgentConnectionState::Connected
        }
    }

    struct PanickingVertical;

    #[async_trait]
    impl Vertical for PanickingVertical {
        fn id(&self) -> &str {
            "panicking"
        }
        fn display_name(&self) -> &str {
            ""
        }
        fn description(&self) -> &str {
            ""
        }
        fn system_prompt(&self) -> &str {
            ""
        }
        fn tool_schemas(&self) -> Vec<ToolSchema> {
            Vec::new()
        }
        fn session_key_prefix(&self) -> &str {
            "p_"
        }
        async fn handle(&self, _call: &ToolCall, _session: &SessionManager) -> Option<ToolResult> {
            panic!("handler bug");
        }
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        let Value::Object(map) = args else {
            panic!("args must be an object");
        };
        ToolCall::new(id, name, map)
    }

    async fn active_session() -> Arc<SessionManager> {
        let history = SessionHistory::new(Arc::new(MemoryStore::new()), "construction_");
        let vertical = Arc::new(ConstructionVertical::new());
        let manager = Arc::new(SessionManager::new(vertical, history));
        manager.start().await;
        manager
    }

    async fn construction_router(
        bridge: Arc<dyn RemoteAgentBridge>,
    ) -> (ToolCallRouter, Arc<SessionManager>) {
        let session = active_session().await;
        let vertical: Arc<dyn Vertical> = Arc::new(ConstructionVertical::new());
        (ToolCallRouter::new(Some(vertical), session.clone(), bridge), session)
    }

    #[tokio::test]
    async fn test_local_call_delivers_exactly_once() {
        let (router, session) = construction_router(Arc::new(GatedBridge::default())).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        router.route(call("f1", "flag_issue", json!({"description": "trip hazard"})), tx);

        let response = rx.recv().await.unwrap();
        assert_eq!(response.id, "f1");
        assert_eq!(response.name, "flag_issue");
        assert!(!response.result.is_error());
        assert!(rx.recv().await.is_none());
        assert_eq!(router.pending_count(), 0);
        assert_eq!(session.flag_count().await, 1);
    }

    #[tokio::test]
    async fn test_declined_call_is_delegated_with_task_argument() {
        let mut bridge = MockRemoteAgentBridge::new();
        bridge
            .expect_delegate_task()
            .withf(|description, tool| {
                description.to_string() == "look up the fire code" && tool.to_string() == "lookup"
            })
            .times(1)
            .returning(|_, _| ToolResult::success("Section 4.2"));
        let (router, _session) = construction_router(Arc::new(bridge)).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        router.route(call("r1", "lookup", json!({"task": "look up the fire code"})), tx);

        let response = rx.recv().await.unwrap();
        assert_eq!(response.result, ToolResult::success("Section 4.2"));
        assert_eq!(router.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_bridge_failure_becomes_error_response() {
        let mut bridge = MockRemoteAgentBridge::new();
        bridge
            .expect_delegate_task()
            .returning(|_, _| ToolResult::error("agent unreachable"));
        let router = ToolCallRouter::new(None, active_session().await, Arc::new(bridge));
        let (tx, mut rx) = mpsc::unbounded_channel();

        router.route(call("e1", "anything", json!({"x": 1})), tx);

        let response = rx.recv().await.unwrap();
        assert_eq!(response.result, ToolResult::error("agent unreachable"));
    }

    #[tokio::test]
    async fn test_cancel_before_bridge_resolves_suppresses_response() {
        let bridge = Arc::new(GatedBridge::default());
        let (router, _session) = construction_router(bridge.clone()).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        router.route(call("a1", "research", json!({"task": "find the drywall data sheet"})), tx);
        bridge.started.notified().await;
        assert_eq!(
            bridge.tasks.lock().unwrap().as_slice(),
            [("find the drywall data sheet".to_string(), "research".to_string())]
        );

        router.cancel(&["a1".to_string()]);
        assert_eq!(router.pending_count(), 0);
        assert_eq!(
            bridge.last_call_status(),
            AgentCallStatus::Cancelled { ids: vec!["a1".into()] }
        );

        bridge.release.notify_one();
        // The task's sender is the only one left; it closes once the task ends.
        assert!(rx.recv().await.is_none());
        assert_eq!(router.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_unknown_id_is_ignored() {
        let bridge = Arc::new(GatedBridge::default());
        let (router, _session) = construction_router(bridge.clone()).await;
        router.cancel(&["nope".to_string()]);
        assert_eq!(bridge.last_call_status(), AgentCallStatus::Idle);
    }

    #[tokio::test]
    async fn test_cancel_all_clears_registry() {
        let bridge = Arc::new(GatedBridge::default());
        let (router, _session) = construction_router(bridge.clone()).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        for id in ["b1", "b2"] {
            router.route(call(id, "research", json!({"task": id})), tx.clone());
            bridge.started.notified().await;
        }
        drop(tx);
        assert!(router.is_pending("b1"));
        assert_eq!(router.pending_count(), 2);

        router.cancel_all();
        assert_eq!(router.pending_count(), 0);

        bridge.release.notify_waiters();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_handler_panic_is_reported_as_error() {
        let session = active_session().await;
        let vertical: Arc<dyn Vertical> = Arc::new(PanickingVertical);
        let router = ToolCallRouter::new(Some(vertical), session, Arc::new(GatedBridge::default()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        router.route(call("p1", "flag_issue", json!({})), tx);

        let response = rx.recv().await.unwrap();
        assert!(response.result.is_error());
        assert_eq!(router.pending_count(), 0);
    }
}
