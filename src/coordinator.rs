//! §4.7 — the top-level coordinator. Owns the transport, the type registry
//! and the symbol graph, and sequences `initialize` / `kill` / `reinitialize`
//! plus the source-change probe that triggers an automatic rebuild.
//!
//! `ClientSettings` is built the same way the teacher builds `GXConfig`: a
//! `derive_builder::Builder` struct with an owned-pattern builder, optional
//! fields defaulted via `#[builder(setter(strip_option), default)]`, and a
//! single required field (the target address) left without a default so the
//! builder fails to compile a config that doesn't name a controller.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arcstr::ArcStr;
use derive_builder::Builder;
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use parking_lot::RwLock;

use crate::error::{ClientError, CoordinatorId, ErrorKind, Result};
use crate::events::{CoordinatorEvent, Emitter, Event, TransportEvent as EngineTransportEvent};
use crate::symbol::{build_symbol_graph, SymbolNode};
use crate::transport::Transport;
use crate::typ::registry::TypeRegistry;

static NEXT_COORDINATOR_ID: AtomicU64 = AtomicU64::new(1);

/// One settings record passed to the transport (§6 "Configuration surface").
/// Defaults target localhost, mirroring the reference configuration.
#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned")]
pub struct ClientSettings {
    /// The controller's address. No default — a config that doesn't name a
    /// target fails to build.
    pub target_addr: IpAddr,
    #[builder(default = "48898")]
    pub target_port: u16,
    #[builder(setter(strip_option), default)]
    pub local_addr: Option<IpAddr>,
    #[builder(setter(strip_option), default)]
    pub local_port: Option<u16>,
    #[builder(setter(strip_option), default)]
    pub router_addr: Option<SocketAddr>,
    #[builder(default = "Duration::from_secs(5)")]
    pub connect_timeout: Duration,
    #[builder(default = "true")]
    pub auto_reconnect: bool,
    #[builder(default = "Duration::from_secs(3)")]
    pub reconnect_interval: Duration,
    #[builder(default = "Duration::from_secs(10)")]
    pub health_check_interval: Duration,
    #[builder(default = "Duration::from_secs(1)")]
    pub connection_down_grace: Duration,
    #[builder(default = "true")]
    pub monitor_symbol_version: bool,
    #[builder(default = "false")]
    pub warn_on_console: bool,
    #[builder(default = "true")]
    pub warn_on_struct_pack_mode: bool,
    /// The concrete knob for §4.4's "N=500 in the reference configuration"
    /// per-request item cap; exposed so a test transport can exercise
    /// splitting at a small N.
    #[builder(default = "500")]
    pub request_item_cap: usize,
}

impl ClientSettings {
    /// Defaults target `127.0.0.1:48898`, the reference ADS endpoint.
    pub fn builder() -> ClientSettingsBuilder {
        ClientSettingsBuilder::default().target_addr(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Idle,
    Initializing,
    Ready,
    TornDown,
}

/// The full mirrored graph produced by one `initialize` cycle: the finished
/// type registry plus the top-level-name → `NamespaceSym` map.
pub struct Mirror {
    pub types: TypeRegistry,
    pub symbols: IndexMap<ArcStr, Arc<SymbolNode>>,
}

/// A reaction to a detected source-version change. The default is
/// `reinitialize`; callers may inject their own to, say, pause and ask for
/// operator confirmation before a rebuild.
pub type ChangeReaction = Box<dyn Fn() + Send + Sync>;

/// Owns one transport connection end to end: `initialize` resolves types and
/// builds the symbol graph; `kill` tears both down invalidating every handed
/// out handle top-down, children first; `reinitialize` is `kill` then
/// `initialize`. Multiple coordinators may coexist, each bound to a distinct
/// transport endpoint — there is no global state (§9 "Global state: None").
pub struct Coordinator {
    id: CoordinatorId,
    transport: Arc<dyn Transport>,
    settings: ClientSettings,
    state: RwLock<LifecycleState>,
    mirror: RwLock<Option<Arc<Mirror>>>,
    last_source_version: AtomicI64,
    emitter: Arc<Emitter>,
    auto_reinitialize: AtomicBool,
}

impl Coordinator {
    pub fn new(transport: Arc<dyn Transport>, settings: ClientSettings) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_COORDINATOR_ID.fetch_add(1, Ordering::Relaxed),
            transport,
            settings,
            state: RwLock::new(LifecycleState::Idle),
            mirror: RwLock::new(None),
            last_source_version: AtomicI64::new(i64::MIN),
            emitter: Emitter::new(),
            auto_reinitialize: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> CoordinatorId {
        self.id
    }

    pub fn emitter(&self) -> &Arc<Emitter> {
        &self.emitter
    }

    /// The currently-built mirror, if `initialize` has completed and `kill`
    /// hasn't run since. Handles obtained from a prior mirror remain
    /// individually invalid after a rebuild even if a caller kept a clone.
    pub fn mirror(&self) -> Option<Arc<Mirror>> {
        self.mirror.read().clone()
    }

    /// `connect → install change-counter notifier → types.build →
    /// symbols.build` (§4.7). Fails with `TransportBusy` if called on an
    /// already-initialized coordinator.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.write();
            if *state != LifecycleState::Idle && *state != LifecycleState::TornDown {
                return Err(ClientError::new(
                    ErrorKind::TransportBusy,
                    self.id,
                    "initialize called on an already-initialized coordinator",
                ));
            }
            *state = LifecycleState::Initializing;
        }

        let result = self.initialize_inner().await;
        match &result {
            Ok(()) => {
                *self.state.write() = LifecycleState::Ready;
                info!("coordinator {} initialized", self.id);
            }
            Err(e) => {
                *self.state.write() = LifecycleState::Idle;
                error!("coordinator {} failed to initialize: {e}", self.id);
            }
        }
        result
    }

    /// Chains `connect -> seed source version -> resolve types -> build
    /// symbols` with plain `?`, the same way the teacher threads a sequence
    /// of fallible setup steps through `anyhow::Result` rather than manually
    /// `map_err`-ing each one (`graphix-rt/src/lib.rs`'s own init sequence).
    /// Every step already returns our own `ClientError`, which converts into
    /// `anyhow::Error` for free (`ClientError: std::error::Error + Send +
    /// Sync`); [`Self::initialize_inner`] converts back at the boundary.
    async fn initialize_steps(
        &self,
    ) -> anyhow::Result<(TypeRegistry, IndexMap<ArcStr, Arc<SymbolNode>>)> {
        self.transport.connect().await?;

        if self.settings.monitor_symbol_version {
            let version = self.transport.source_version().await.map_err(|e| {
                ClientError::with_source(
                    ErrorKind::ChangeDetectionFailed,
                    self.id,
                    "reading initial source version",
                    e,
                )
            })?;
            self.last_source_version.store(version, Ordering::SeqCst);
        }

        let types = TypeRegistry::build(self.transport.as_ref(), self.id).await?;
        info!("coordinator {} resolved {} bindable types", self.id, types.len());

        let symbols = build_symbol_graph(
            self.transport.as_ref(),
            &types,
            self.settings.request_item_cap,
            self.id,
            Arc::clone(&self.emitter),
        )
        .await?;
        info!("coordinator {} built {} top-level namespaces", self.id, symbols.len());

        Ok((types, symbols))
    }

    async fn initialize_inner(self: &Arc<Self>) -> Result<()> {
        let (types, symbols) =
            self.initialize_steps().await.map_err(|e| Self::to_client_error(e, self.id))?;
        *self.mirror.write() = Some(Arc::new(Mirror { types, symbols }));
        Ok(())
    }

    /// Recovers the original `ClientError` (and its `ErrorKind`) from the
    /// `anyhow::Error` chain built by [`Self::initialize_steps`]; every error
    /// that can reach here started life as a `ClientError`, so the fallback
    /// branch only matters if that invariant is ever broken upstream.
    fn to_client_error(err: anyhow::Error, coordinator: CoordinatorId) -> ClientError {
        match err.downcast::<ClientError>() {
            Ok(ce) => ce.with_coordinator(coordinator),
            Err(err) => ClientError::new(ErrorKind::ConnectFailed, coordinator, err.to_string()),
        }
    }

    /// `symbols.destroy (invalidates all handed-out handles top-down,
    /// children-first) → types.destroy → transport.disconnect` (§4.7).
    /// Best-effort: every step runs even if an earlier one failed, and the
    /// *first* failure is re-raised once the coordinator's state is torn
    /// down (§7 "Propagation").
    pub async fn kill(self: &Arc<Self>) -> Result<()> {
        let mirror = self.mirror.write().take();
        let mut first_err: Option<ClientError> = None;

        if let Some(mirror) = &mirror {
            for node in mirror.symbols.values() {
                node.invalidate();
            }
        }

        if let Err(e) = self.transport.unsubscribe_all().await {
            warn!("coordinator {} best-effort unsubscribe_all failed during kill: {e}", self.id);
            first_err.get_or_insert(e.with_coordinator(self.id));
        }

        if let Err(e) = self.transport.disconnect(false).await {
            warn!("coordinator {} disconnect failed during kill: {e}", self.id);
            first_err.get_or_insert(
                ClientError::with_source(ErrorKind::DisconnectFailed, self.id, "disconnect failed", e),
            );
        }

        *self.state.write() = LifecycleState::TornDown;
        self.emit_coordinator_event(CoordinatorEvent::Killed);
        info!("coordinator {} killed", self.id);

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// `kill` followed by `initialize` (§4.7).
    pub async fn reinitialize(self: &Arc<Self>) -> Result<()> {
        if let Err(e) = self.kill().await {
            debug!("coordinator {} reinitialize: kill reported {e}, continuing", self.id);
        }
        *self.state.write() = LifecycleState::Idle;
        self.initialize().await?;
        self.emit_coordinator_event(CoordinatorEvent::Reinitialized);
        Ok(())
    }

    /// Overrides the default `reinitialize` reaction to a detected source
    /// change. Passing `false` to [`Self::set_auto_reinitialize`] disables
    /// the automatic rebuild entirely, leaving the caller to poll
    /// [`Self::check_source_version`] and react itself.
    pub fn set_auto_reinitialize(&self, enabled: bool) {
        self.auto_reinitialize.store(enabled, Ordering::SeqCst);
    }

    /// Polls the transport's source-change probe (§6) and compares it to the
    /// last-observed value. On a change, the default reaction is
    /// `reinitialize`; this can be disabled via
    /// [`Self::set_auto_reinitialize`], in which case the caller is expected
    /// to invoke its own `ChangeReaction` after observing `Ok(true)`.
    pub async fn check_source_version(self: &Arc<Self>) -> Result<bool> {
        if !self.settings.monitor_symbol_version {
            return Ok(false);
        }
        let version = self.transport.source_version().await.map_err(|e| {
            ClientError::with_source(ErrorKind::ChangeDetectionFailed, self.id, "polling source version", e)
        })?;
        let previous = self.last_source_version.swap(version, Ordering::SeqCst);
        let changed = previous != i64::MIN && previous != version;
        if changed {
            warn!("coordinator {} detected a source change ({previous} -> {version})", self.id);
            self.emit_coordinator_event_transport(EngineTransportEvent::SourceChanged);
            if self.auto_reinitialize.load(Ordering::SeqCst) {
                self.reinitialize().await?;
            }
        }
        Ok(changed)
    }

    fn emit_coordinator_event(&self, event: CoordinatorEvent) {
        debug!("coordinator {} event {event:?}", self.id);
        let name = match event {
            CoordinatorEvent::Killed => "killed",
            CoordinatorEvent::Reinitialized => "reinitialized",
        };
        self.emit_event(name);
    }

    fn emit_coordinator_event_transport(&self, event: EngineTransportEvent) {
        debug!("coordinator {} transport event {event:?}", self.id);
        let name = match event {
            EngineTransportEvent::Connected => "connected",
            EngineTransportEvent::Disconnected => "disconnected",
            EngineTransportEvent::SourceChanged => "sourceChanged",
            EngineTransportEvent::ConnectionLost => "connectionLost",
            EngineTransportEvent::Reconnected => "reconnected",
        };
        self.emit_event(name);
    }

    /// Builds and emits a coordinator-level [`Event`] through `self.emitter`,
    /// the root of the bubbling tree every namespace emitter feeds into
    /// (§4.6 "a single handler at the root sees everything").
    fn emit_event(&self, name: &str) {
        let event = Event::new(
            ArcStr::from(name),
            self.id,
            ArcStr::new(),
            None,
            SystemTime::now(),
        );
        self.emitter.emit(&event);
    }
}
