use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {
    async_trait::async_trait,
    dashmap::DashMap,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    prosa_common::types::{InboundEvent, SendAck},
    prosa_events::{Event, EventSink},
    prosa_store::{ChannelDescriptor, ChannelStore},
};

use crate::{
    error::{Error, Result},
    state::{PairingPayload, ReconnectPolicy, SessionState, SessionStatus},
    transport::{Transport, TransportEvent, TransportHandle},
};

/// Consumer of inbound messages. The ingestion pipeline implements this;
/// errors are the implementor's to log, ingestion failures never reach the
/// session.
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn ingest(&self, tenant_id: &str, event: InboundEvent);
}

/// Summary row for one tenant connection, for operator dashboards.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionInfo {
    pub tenant_id: String,
    pub state: SessionState,
    pub connected_address: Option<String>,
    pub display_name: Option<String>,
}

struct SessionEntry {
    state: SessionState,
    pairing: Option<PairingPayload>,
    connected_address: Option<String>,
    display_name: Option<String>,
    reconnect_attempts: u32,
    last_error: Option<String>,
    handle: Option<Arc<dyn TransportHandle>>,
    /// Cancels the event loop and any pending reconnect timer.
    cancel: CancellationToken,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            state: SessionState::Initializing,
            pairing: None,
            connected_address: None,
            display_name: None,
            reconnect_attempts: 0,
            last_error: None,
            handle: None,
            cancel: CancellationToken::new(),
        }
    }

    fn snapshot(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            pairing_payload: self
                .pairing
                .as_ref()
                .filter(|p| !p.is_expired())
                .cloned(),
            connected_address: self.connected_address.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

struct Core {
    transport: Arc<dyn Transport>,
    channels: Arc<dyn ChannelStore>,
    events: Arc<dyn EventSink>,
    inbound: RwLock<Option<Arc<dyn InboundSink>>>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    /// One in-flight lifecycle operation per tenant; tenants independent.
    lifecycle: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    policy: ReconnectPolicy,
}

/// Owns every tenant session in the process: pairing, reconnection, teardown,
/// raw sends. Sessions do not survive a restart; callers re-initialize.
#[derive(Clone)]
pub struct SessionManager {
    core: Arc<Core>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        channels: Arc<dyn ChannelStore>,
        events: Arc<dyn EventSink>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            core: Arc::new(Core {
                transport,
                channels,
                events,
                inbound: RwLock::new(None),
                sessions: RwLock::new(HashMap::new()),
                lifecycle: DashMap::new(),
                policy,
            }),
        }
    }

    /// Wire the inbound message consumer. Called once at composition time,
    /// after the pipeline (which needs this manager for sends) exists.
    pub fn set_inbound_sink(&self, sink: Arc<dyn InboundSink>) {
        let mut slot = self
            .core
            .inbound
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *slot = Some(sink);
    }

    /// Start a session for a tenant, or no-op when one is already connected
    /// or coming up. Serialized against other lifecycle calls for the same
    /// tenant.
    pub async fn initialize(&self, tenant_id: &str) -> Result<SessionStatus> {
        let lock = self.core.lifecycle_lock(tenant_id);
        let _guard = lock.lock().await;

        // Already connected (or mid-handshake): report, don't restart.
        {
            let sessions = self.core.sessions.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = sessions.get(tenant_id)
                && matches!(
                    entry.state,
                    SessionState::Initializing
                        | SessionState::AwaitingPairing
                        | SessionState::Authenticated
                        | SessionState::Connected
                )
            {
                return Ok(entry.snapshot());
            }
        }

        // Tear down any stale entry (capped disconnect, auth failure).
        if let Some(stale) = {
            let mut sessions = self
                .core
                .sessions
                .write()
                .unwrap_or_else(|e| e.into_inner());
            sessions.remove(tenant_id)
        } {
            stale.cancel.cancel();
        }

        info!(tenant_id, "initializing session");
        {
            let mut sessions = self
                .core
                .sessions
                .write()
                .unwrap_or_else(|e| e.into_inner());
            sessions.insert(tenant_id.to_string(), SessionEntry::new());
        }
        self.core
            .emit_state(tenant_id, SessionState::Initializing)
            .await;

        match Core::connect(Arc::clone(&self.core), tenant_id).await {
            Ok(()) => Ok(self.status(tenant_id)),
            Err(source) => {
                let mut sessions = self
                    .core
                    .sessions
                    .write()
                    .unwrap_or_else(|e| e.into_inner());
                sessions.remove(tenant_id);
                Err(Error::Init {
                    tenant_id: tenant_id.to_string(),
                    source,
                })
            },
        }
    }

    /// Current snapshot for a tenant. Expired pairing payloads are omitted.
    #[must_use]
    pub fn status(&self, tenant_id: &str) -> SessionStatus {
        let sessions = self.core.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(tenant_id)
            .map_or_else(SessionStatus::uninitialized, SessionEntry::snapshot)
    }

    /// Snapshot of every tenant session.
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let sessions = self.core.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .iter()
            .map(|(tenant_id, entry)| ConnectionInfo {
                tenant_id: tenant_id.clone(),
                state: entry.state,
                connected_address: entry.connected_address.clone(),
                display_name: entry.display_name.clone(),
            })
            .collect()
    }

    /// Explicitly tear down a tenant session. Cancels any pending reconnect
    /// timer; terminal (no auto-retry). Idempotent.
    pub async fn disconnect(&self, tenant_id: &str) -> Result<()> {
        let lock = self.core.lifecycle_lock(tenant_id);
        {
            let _guard = lock.lock().await;

            let entry = {
                let mut sessions = self
                    .core
                    .sessions
                    .write()
                    .unwrap_or_else(|e| e.into_inner());
                sessions.remove(tenant_id)
            };
            if let Some(entry) = entry {
                info!(tenant_id, "disconnecting session");
                entry.cancel.cancel();
                if let Some(handle) = entry.handle {
                    if let Err(e) = handle.logout().await {
                        warn!(tenant_id, error = %e, "transport logout failed");
                    }
                    if let Err(e) = handle.destroy().await {
                        warn!(tenant_id, error = %e, "transport destroy failed");
                    }
                }
                if let Err(e) = self.core.channels.mark_inactive(tenant_id).await {
                    warn!(tenant_id, error = %e, "failed to mark channel inactive");
                }
                self.core
                    .emit_state(tenant_id, SessionState::Disconnected { capped: false })
                    .await;
            } else {
                debug!(tenant_id, "disconnect for uninitialized tenant");
            }
        }
        drop(lock);

        // Reclaim the tenant's lifecycle lock once nothing else references
        // it. The shard lock held by remove_if makes the count check and
        // the removal atomic against lifecycle_lock.
        self.core
            .lifecycle
            .remove_if(tenant_id, |_, lock| Arc::strong_count(lock) == 1);
        Ok(())
    }

    /// Send a raw text message through the tenant's connected channel.
    /// Failures are returned to the caller; no automatic retry.
    pub async fn send_raw(&self, tenant_id: &str, to: &str, text: &str) -> Result<SendAck> {
        let handle = {
            let sessions = self.core.sessions.read().unwrap_or_else(|e| e.into_inner());
            sessions
                .get(tenant_id)
                .filter(|entry| entry.state == SessionState::Connected)
                .and_then(|entry| entry.handle.clone())
        };
        let handle = handle.ok_or_else(|| Error::NotConnected {
            tenant_id: tenant_id.to_string(),
        })?;
        handle
            .send_text(to, text)
            .await
            .map_err(|source| Error::Send {
                tenant_id: tenant_id.to_string(),
                source,
            })
    }
}

impl Core {
    fn lifecycle_lock(&self, tenant_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.lifecycle
            .entry(tenant_id.to_string())
            .or_default()
            .clone()
    }

    async fn emit_state(&self, tenant_id: &str, state: SessionState) {
        self.events
            .emit(Event::SessionStateChanged {
                tenant_id: tenant_id.to_string(),
                state: state.as_str().to_string(),
            })
            .await;
    }

    fn update_entry(&self, tenant_id: &str, apply: impl FnOnce(&mut SessionEntry)) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        match sessions.get_mut(tenant_id) {
            Some(entry) => {
                apply(entry);
                true
            },
            None => false,
        }
    }

    /// Open the transport connection for an existing registry entry and spawn
    /// its event loop.
    async fn connect(core: Arc<Core>, tenant_id: &str) -> anyhow::Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = core.transport.connect(tenant_id, tx).await?;

        let cancel = {
            let mut sessions = core.sessions.write().unwrap_or_else(|e| e.into_inner());
            let entry = sessions
                .get_mut(tenant_id)
                .ok_or_else(|| anyhow::anyhow!("session entry vanished during connect"))?;
            entry.handle = Some(handle);
            entry.cancel.clone()
        };

        tokio::spawn(Core::event_loop(
            Arc::clone(&core),
            tenant_id.to_string(),
            rx,
            cancel,
        ));
        Ok(())
    }

    async fn event_loop(
        core: Arc<Core>,
        tenant_id: String,
        mut rx: mpsc::UnboundedReceiver<TransportEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(tenant_id, "session event loop cancelled");
                    break;
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        Core::on_disconnected(
                            Arc::clone(&core),
                            &tenant_id,
                            "transport event stream closed".to_string(),
                        )
                        .await;
                        break;
                    };
                    if core.handle_event(&core, &tenant_id, event).await {
                        break;
                    }
                }
            }
        }
    }

    /// Apply one transport event. Returns true when the event loop must stop
    /// (the underlying connection is gone).
    async fn handle_event(&self, core: &Arc<Core>, tenant_id: &str, event: TransportEvent) -> bool {
        match event {
            TransportEvent::PairingReady { payload } => {
                info!(tenant_id, "pairing payload issued");
                let issued = PairingPayload::issue(payload.clone());
                self.update_entry(tenant_id, |entry| {
                    entry.state = SessionState::AwaitingPairing;
                    entry.pairing = Some(issued);
                });
                self.events
                    .emit(Event::PairingReady {
                        tenant_id: tenant_id.to_string(),
                        payload,
                    })
                    .await;
                self.emit_state(tenant_id, SessionState::AwaitingPairing)
                    .await;
                false
            },
            TransportEvent::Authenticated => {
                self.update_entry(tenant_id, |entry| {
                    entry.state = SessionState::Authenticated;
                    entry.pairing = None;
                });
                self.emit_state(tenant_id, SessionState::Authenticated).await;
                false
            },
            TransportEvent::Ready {
                address,
                display_name,
            } => {
                info!(tenant_id, address, "session connected");
                self.update_entry(tenant_id, |entry| {
                    entry.state = SessionState::Connected;
                    entry.pairing = None;
                    entry.connected_address = Some(address.clone());
                    entry.display_name = display_name.clone();
                    entry.reconnect_attempts = 0;
                    entry.last_error = None;
                });
                let descriptor = ChannelDescriptor::connected(tenant_id, address, display_name);
                if let Err(e) = self.channels.upsert(descriptor).await {
                    warn!(tenant_id, error = %e, "failed to persist channel descriptor");
                }
                self.emit_state(tenant_id, SessionState::Connected).await;
                false
            },
            TransportEvent::Message(inbound) => {
                let sink = {
                    let slot = self.inbound.read().unwrap_or_else(|e| e.into_inner());
                    slot.clone()
                };
                match sink {
                    Some(sink) => sink.ingest(tenant_id, inbound).await,
                    None => debug!(tenant_id, "inbound message dropped: no sink wired"),
                }
                false
            },
            TransportEvent::Disconnected { reason } => {
                Core::on_disconnected(Arc::clone(core), tenant_id, reason).await;
                true
            },
            TransportEvent::AuthFailure { reason } => {
                warn!(tenant_id, reason, "authentication failed; re-pairing required");
                self.update_entry(tenant_id, |entry| {
                    entry.state = SessionState::AuthFailed;
                    entry.pairing = None;
                    entry.handle = None;
                    entry.connected_address = None;
                    entry.last_error = Some(reason);
                });
                if let Err(e) = self.transport.clear_credentials(tenant_id).await {
                    warn!(tenant_id, error = %e, "failed to clear stale credentials");
                }
                if let Err(e) = self.channels.mark_inactive(tenant_id).await {
                    warn!(tenant_id, error = %e, "failed to mark channel inactive");
                }
                self.emit_state(tenant_id, SessionState::AuthFailed).await;
                true
            },
        }
    }

    /// Unexpected disconnect: mark the channel inactive and apply the
    /// reconnection policy. An entry that is already gone means the
    /// disconnect was explicit and nothing is scheduled.
    async fn on_disconnected(core: Arc<Core>, tenant_id: &str, reason: String) {
        let attempt = {
            let mut sessions = core.sessions.write().unwrap_or_else(|e| e.into_inner());
            let Some(entry) = sessions.get_mut(tenant_id) else {
                return;
            };
            entry.handle = None;
            entry.connected_address = None;
            entry.last_error = Some(reason.clone());
            entry.reconnect_attempts += 1;
            entry.reconnect_attempts
        };

        if let Err(e) = core.channels.mark_inactive(tenant_id).await {
            warn!(tenant_id, error = %e, "failed to mark channel inactive");
        }

        if attempt > core.policy.max_attempts {
            warn!(
                tenant_id,
                reason,
                max_attempts = core.policy.max_attempts,
                "reconnection attempts exhausted"
            );
            core.update_entry(tenant_id, |entry| {
                entry.state = SessionState::Disconnected { capped: true };
            });
            core.emit_state(tenant_id, SessionState::Disconnected { capped: true })
                .await;
            return;
        }

        info!(
            tenant_id,
            reason,
            attempt,
            max_attempts = core.policy.max_attempts,
            "session disconnected; scheduling reconnect"
        );
        core.update_entry(tenant_id, |entry| {
            entry.state = SessionState::Disconnected { capped: false };
        });
        core.emit_state(tenant_id, SessionState::Disconnected { capped: false })
            .await;
        Core::reconnect_later(core, tenant_id.to_string(), attempt);
    }

    /// Arm the reconnect timer. The timer is cancelled by explicit
    /// disconnect (the entry's token) and fires at `attempt * base_delay`.
    fn reconnect_later(core: Arc<Core>, tenant_id: String, attempt: u32) {
        let cancel = {
            let sessions = core.sessions.read().unwrap_or_else(|e| e.into_inner());
            match sessions.get(&tenant_id) {
                Some(entry) => entry.cancel.clone(),
                None => return,
            }
        };
        let delay = core.policy.delay_for(attempt);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(tenant_id, "reconnect timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    Core::reconnect(core, tenant_id).await;
                }
            }
        });
    }

    async fn reconnect(core: Arc<Core>, tenant_id: String) {
        let lock = core.lifecycle_lock(&tenant_id);
        let _guard = lock.lock().await;

        // The session may have been torn down or already recovered while the
        // timer was pending.
        let still_down = {
            let sessions = core.sessions.read().unwrap_or_else(|e| e.into_inner());
            sessions
                .get(&tenant_id)
                .is_some_and(|entry| entry.state == SessionState::Disconnected { capped: false })
        };
        if !still_down {
            return;
        }

        core.update_entry(&tenant_id, |entry| {
            entry.state = SessionState::Initializing;
        });
        core.emit_state(&tenant_id, SessionState::Initializing).await;

        if let Err(e) = Core::connect(Arc::clone(&core), &tenant_id).await {
            warn!(tenant_id, error = %e, "reconnect attempt failed");
            Core::on_disconnected(core, &tenant_id, format!("reconnect failed: {e}")).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Duration,
    };

    use {prosa_events::NoopEventSink, prosa_store::MemoryStore, tokio::sync::Mutex};

    use super::*;

    struct FakeHandle {
        sent: Arc<Mutex<Vec<(String, String)>>>,
        fail_send: Arc<AtomicBool>,
        logged_out: Arc<AtomicBool>,
    }

    #[async_trait]
    impl TransportHandle for FakeHandle {
        async fn send_text(&self, to: &str, text: &str) -> anyhow::Result<SendAck> {
            if self.fail_send.load(Ordering::SeqCst) {
                anyhow::bail!("network send timed out");
            }
            self.sent.lock().await.push((to.to_string(), text.to_string()));
            Ok(SendAck {
                transport_message_id: Some("tm-1".to_string()),
            })
        }

        async fn logout(&self) -> anyhow::Result<()> {
            self.logged_out.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn destroy(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeTransport {
        senders: Mutex<HashMap<String, mpsc::UnboundedSender<TransportEvent>>>,
        connect_count: AtomicUsize,
        fail_connect: AtomicBool,
        fail_send: Arc<AtomicBool>,
        sent: Arc<Mutex<Vec<(String, String)>>>,
        logged_out: Arc<AtomicBool>,
        cleared: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        async fn emit(&self, tenant_id: &str, event: TransportEvent) {
            let senders = self.senders.lock().await;
            senders
                .get(tenant_id)
                .expect("no connection for tenant")
                .send(event)
                .expect("event loop gone");
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(
            &self,
            tenant_id: &str,
            events: mpsc::UnboundedSender<TransportEvent>,
        ) -> anyhow::Result<Arc<dyn TransportHandle>> {
            self.connect_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_connect.load(Ordering::SeqCst) {
                anyhow::bail!("browser failed to launch");
            }
            self.senders
                .lock()
                .await
                .insert(tenant_id.to_string(), events);
            Ok(Arc::new(FakeHandle {
                sent: Arc::clone(&self.sent),
                fail_send: Arc::clone(&self.fail_send),
                logged_out: Arc::clone(&self.logged_out),
            }))
        }

        async fn clear_credentials(&self, tenant_id: &str) -> anyhow::Result<()> {
            self.cleared.lock().await.push(tenant_id.to_string());
            Ok(())
        }
    }

    fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(10),
            max_attempts: 2,
        }
    }

    fn build_manager() -> (SessionManager, Arc<FakeTransport>, MemoryStore) {
        let transport = Arc::new(FakeTransport::default());
        let store = MemoryStore::new();
        let manager = SessionManager::new(
            transport.clone(),
            Arc::new(store.clone()),
            Arc::new(NoopEventSink),
            fast_policy(),
        );
        (manager, transport, store)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn initialize_then_pairing_payload_is_visible() {
        let (manager, transport, _) = build_manager();
        let status = manager.initialize("t1").await.unwrap();
        assert_eq!(status.state, SessionState::Initializing);

        transport
            .emit("t1", TransportEvent::PairingReady {
                payload: "qr-blob".into(),
            })
            .await;
        settle().await;

        let status = manager.status("t1");
        assert_eq!(status.state, SessionState::AwaitingPairing);
        assert_eq!(status.pairing_payload.unwrap().data, "qr-blob");
    }

    #[tokio::test]
    async fn concurrent_initialize_connects_once() {
        let (manager, transport, _) = build_manager();
        let a = manager.clone();
        let b = manager.clone();
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.initialize("t1").await }),
            tokio::spawn(async move { b.initialize("t1").await }),
        );
        ra.unwrap().unwrap();
        rb.unwrap().unwrap();
        assert_eq!(transport.connect_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn initialize_when_connected_is_a_noop() {
        let (manager, transport, store) = build_manager();
        manager.initialize("t1").await.unwrap();
        transport
            .emit("t1", TransportEvent::Ready {
                address: "5511988887777".into(),
                display_name: Some("Loja".into()),
            })
            .await;
        settle().await;
        assert_eq!(manager.status("t1").state, SessionState::Connected);

        manager.initialize("t1").await.unwrap();
        assert_eq!(transport.connect_count.load(Ordering::SeqCst), 1);

        // Connecting persisted the channel descriptor.
        let descriptor = ChannelStore::get(&store, "t1").await.unwrap().unwrap();
        assert!(descriptor.active);
        assert_eq!(descriptor.address, "5511988887777");
    }

    #[tokio::test]
    async fn initialize_failure_discards_the_session() {
        let (manager, transport, _) = build_manager();
        transport.fail_connect.store(true, Ordering::SeqCst);
        let result = manager.initialize("t1").await;
        assert!(matches!(result, Err(Error::Init { .. })));
        assert_eq!(manager.status("t1").state, SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn send_raw_requires_connected_state() {
        let (manager, transport, _) = build_manager();
        manager.initialize("t1").await.unwrap();
        let result = manager.send_raw("t1", "5511999990000", "oi").await;
        assert!(matches!(result, Err(Error::NotConnected { .. })));

        transport
            .emit("t1", TransportEvent::Ready {
                address: "addr".into(),
                display_name: None,
            })
            .await;
        settle().await;

        let ack = manager.send_raw("t1", "5511999990000", "oi").await.unwrap();
        assert_eq!(ack.transport_message_id.as_deref(), Some("tm-1"));
        assert_eq!(
            transport.sent.lock().await.as_slice(),
            &[("5511999990000".to_string(), "oi".to_string())]
        );
    }

    #[tokio::test]
    async fn send_failure_is_isolated() {
        let (manager, transport, _) = build_manager();
        manager.initialize("t1").await.unwrap();
        transport
            .emit("t1", TransportEvent::Ready {
                address: "addr".into(),
                display_name: None,
            })
            .await;
        settle().await;

        transport.fail_send.store(true, Ordering::SeqCst);
        let result = manager.send_raw("t1", "x", "y").await;
        assert!(matches!(result, Err(Error::Send { .. })));
        // Session stays connected.
        assert_eq!(manager.status("t1").state, SessionState::Connected);
    }

    #[tokio::test]
    async fn unexpected_disconnect_reconnects() {
        let (manager, transport, _) = build_manager();
        manager.initialize("t1").await.unwrap();
        transport
            .emit("t1", TransportEvent::Ready {
                address: "addr".into(),
                display_name: None,
            })
            .await;
        settle().await;

        transport
            .emit("t1", TransportEvent::Disconnected {
                reason: "navigation".into(),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        // Timer fired and the transport was asked to connect again.
        assert!(transport.connect_count.load(Ordering::SeqCst) >= 2);
        assert_eq!(manager.status("t1").state, SessionState::Initializing);
    }

    #[tokio::test]
    async fn reconnection_halts_after_max_attempts() {
        let (manager, transport, store) = build_manager();
        manager.initialize("t1").await.unwrap();
        transport
            .emit("t1", TransportEvent::Ready {
                address: "addr".into(),
                display_name: None,
            })
            .await;
        settle().await;

        transport.fail_connect.store(true, Ordering::SeqCst);
        transport
            .emit("t1", TransportEvent::Disconnected {
                reason: "gone".into(),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(
            manager.status("t1").state,
            SessionState::Disconnected { capped: true }
        );
        // Initial connect + max_attempts failed retries, then no more.
        assert_eq!(transport.connect_count.load(Ordering::SeqCst), 3);
        assert!(!ChannelStore::get(&store, "t1").await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn explicit_disconnect_cancels_pending_reconnect() {
        let (manager, transport, _) = build_manager();
        manager.initialize("t1").await.unwrap();
        transport
            .emit("t1", TransportEvent::Ready {
                address: "addr".into(),
                display_name: None,
            })
            .await;
        settle().await;

        transport
            .emit("t1", TransportEvent::Disconnected {
                reason: "blip".into(),
            })
            .await;
        // Disconnect before the 10ms retry timer fires.
        manager.disconnect("t1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(transport.connect_count.load(Ordering::SeqCst), 1);
        assert_eq!(manager.status("t1").state, SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn explicit_disconnect_logs_out_the_transport() {
        let (manager, transport, store) = build_manager();
        manager.initialize("t1").await.unwrap();
        transport
            .emit("t1", TransportEvent::Ready {
                address: "addr".into(),
                display_name: None,
            })
            .await;
        settle().await;

        manager.disconnect("t1").await.unwrap();
        assert!(transport.logged_out.load(Ordering::SeqCst));
        assert!(!ChannelStore::get(&store, "t1").await.unwrap().unwrap().active);
        // Idempotent.
        manager.disconnect("t1").await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_reclaims_the_lifecycle_lock() {
        let (manager, transport, _) = build_manager();
        manager.initialize("t1").await.unwrap();
        transport
            .emit("t1", TransportEvent::Ready {
                address: "addr".into(),
                display_name: None,
            })
            .await;
        settle().await;
        assert!(!manager.core.lifecycle.is_empty());

        manager.disconnect("t1").await.unwrap();
        // No session, no lock entry: the registry does not grow with every
        // tenant ever seen.
        assert!(manager.core.lifecycle.is_empty());
    }

    #[tokio::test]
    async fn auth_failure_is_terminal_and_clears_credentials() {
        let (manager, transport, _) = build_manager();
        manager.initialize("t1").await.unwrap();
        transport
            .emit("t1", TransportEvent::AuthFailure {
                reason: "session corrupted".into(),
            })
            .await;
        settle().await;

        let status = manager.status("t1");
        assert_eq!(status.state, SessionState::AuthFailed);
        assert_eq!(status.last_error.as_deref(), Some("session corrupted"));
        assert_eq!(transport.cleared.lock().await.as_slice(), &["t1".to_string()]);

        // No reconnect is ever attempted from AuthFailed.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(transport.connect_count.load(Ordering::SeqCst), 1);

        // A fresh initialize starts over.
        manager.initialize("t1").await.unwrap();
        assert_eq!(transport.connect_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn inbound_messages_reach_the_sink() {
        struct RecordingSink(Mutex<Vec<(String, String)>>);

        #[async_trait]
        impl InboundSink for RecordingSink {
            async fn ingest(&self, tenant_id: &str, event: InboundEvent) {
                self.0
                    .lock()
                    .await
                    .push((tenant_id.to_string(), event.content));
            }
        }

        let (manager, transport, _) = build_manager();
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        manager.set_inbound_sink(sink.clone());
        manager.initialize("t1").await.unwrap();
        transport
            .emit(
                "t1",
                TransportEvent::Message(InboundEvent {
                    sender_address: "5511999990000".into(),
                    sender_display_name: None,
                    content: "oi".into(),
                    content_type: "chat".into(),
                    transport_message_id: None,
                    timestamp: 0,
                    has_media: false,
                    is_group: false,
                }),
            )
            .await;
        settle().await;

        assert_eq!(
            sink.0.lock().await.as_slice(),
            &[("t1".to_string(), "oi".to_string())]
        );
    }

    #[tokio::test]
    async fn tenants_are_independent() {
        let (manager, transport, _) = build_manager();
        manager.initialize("t1").await.unwrap();
        manager.initialize("t2").await.unwrap();
        transport
            .emit("t1", TransportEvent::Ready {
                address: "a1".into(),
                display_name: None,
            })
            .await;
        settle().await;

        assert_eq!(manager.status("t1").state, SessionState::Connected);
        assert_eq!(manager.status("t2").state, SessionState::Initializing);

        let mut connections = manager.connections();
        connections.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].tenant_id, "t1");
        assert_eq!(connections[0].connected_address.as_deref(), Some("a1"));
    }
}
