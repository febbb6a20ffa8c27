//! Ordered configuration steps of a training session.
//!
//! `start → select mode → configure console → configure antenna → check access`.
//! Each step reads the full session, validates against the topology registry,
//! and writes back through one typed store update. Access is never stored as
//! a flag: it is recomputed from the current console and antenna configs on
//! every check, so overwriting a console config revokes access immediately.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use station_spec::{
    check_mode, validate_antenna_config, validate_console_config, AntennaDescriptor, AntennaId,
    ConsoleId, DeviceConfig, GatewayCheck, ModeError, TopologyRegistry, ValidationError,
};
use tracing::{debug, error};

use crate::store::{SessionRecord, SessionStore, SessionUpdate, StoreError, UserId};

/// Broad class of a workflow failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Unknown session, console, or antenna.
    NotFound,
    /// Submitted values rejected.
    Validation,
    /// Step attempted out of order.
    Precondition,
    /// Persistence unavailable.
    Store,
}

/// Workflow failures. Everything except [`WorkflowError::Store`] is an
/// expected, user-recoverable outcome.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// No session for this user.
    #[error("session for user {0:?} not found; start a session first")]
    SessionNotFound(UserId),
    /// Console id not in the registry.
    #[error("unknown console: {0}")]
    UnknownConsole(ConsoleId),
    /// Antenna id not in the registry.
    #[error("unknown antenna: {0}")]
    UnknownAntenna(AntennaId),
    /// Band or topology other than the enabled pair.
    #[error(transparent)]
    UnsupportedMode(#[from] ModeError),
    /// Devices configured before the operating mode was chosen.
    #[error("select the C band and point-to-point topology first")]
    ModeNotSelected,
    /// Access checked for an antenna with no stored config.
    #[error("antenna {0} has not been configured yet")]
    AntennaNotConfigured(AntennaId),
    /// Configuration rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Session store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// Classify the failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            WorkflowError::SessionNotFound(_)
            | WorkflowError::UnknownConsole(_)
            | WorkflowError::UnknownAntenna(_) => ErrorClass::NotFound,
            WorkflowError::ModeNotSelected
            | WorkflowError::AntennaNotConfigured(_)
            | WorkflowError::Validation(ValidationError::ConsoleNotConfigured { .. }) => {
                ErrorClass::Precondition
            }
            WorkflowError::UnsupportedMode(_) | WorkflowError::Validation(_) => {
                ErrorClass::Validation
            }
            WorkflowError::Store(_) => ErrorClass::Store,
        }
    }

    /// Whether the failure must propagate instead of being reported to the user.
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Store
    }
}

/// Derived progress of a session towards web access through one antenna.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStage {
    /// No session record.
    Uninitialized,
    /// Session exists.
    Started,
    /// Band and topology recorded.
    ModeSelected,
    /// Bound console holds a config that validates.
    ConsoleConfigured,
    /// Antenna config stored.
    AntennaConfigured,
    /// Stored antenna config re-validates against the current console.
    AccessGranted,
}

/// Allow/deny answer of an access check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessDecision {
    /// Whether the PC behind the antenna reaches the web service.
    pub allowed: bool,
    /// Human-readable reason when denied.
    pub reason: Option<String>,
}

impl AccessDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Reply status tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// Step succeeded.
    Ok,
    /// Step refused; the message says why.
    Error,
}

/// Transport-neutral reply: `{"status": "ok"|"error", "message": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationReply {
    /// Outcome tag.
    pub status: ReplyStatus,
    /// User-facing message.
    pub message: String,
}

impl OperationReply {
    /// Success reply.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Ok,
            message: message.into(),
        }
    }

    /// Refusal reply.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            message: message.into(),
        }
    }

    /// Whether the step succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    /// Render a workflow result; store failures propagate.
    pub fn from_result<T>(
        result: Result<T, WorkflowError>,
        message: impl FnOnce(T) -> String,
    ) -> Result<Self, StoreError> {
        match result {
            Ok(value) => Ok(Self::ok(message(value))),
            Err(WorkflowError::Store(err)) => Err(err),
            Err(err) => Ok(Self::error(err.to_string())),
        }
    }
}

/// Exposed operation surface, one variant per step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Create the session if absent.
    StartSession {
        /// Session owner.
        user_id: UserId,
    },
    /// Choose band and topology.
    SelectMode {
        /// Session owner.
        user_id: UserId,
        /// Requested band.
        band: String,
        /// Requested topology.
        topology: String,
    },
    /// Store a console config.
    ConfigureConsole {
        /// Session owner.
        user_id: UserId,
        /// Console being configured.
        console_id: ConsoleId,
        /// Submitted addressing.
        config: DeviceConfig,
    },
    /// Validate and store an antenna config.
    ConfigureAntenna {
        /// Session owner.
        user_id: UserId,
        /// Antenna being configured.
        antenna_id: AntennaId,
        /// Submitted addressing.
        config: DeviceConfig,
    },
    /// Ask whether the PC behind an antenna reaches the web service.
    CheckWebAccess {
        /// Session owner.
        user_id: UserId,
        /// Antenna to check.
        antenna_id: AntennaId,
    },
}

impl Operation {
    /// Stable operation name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::StartSession { .. } => "start_session",
            Operation::SelectMode { .. } => "select_mode",
            Operation::ConfigureConsole { .. } => "configure_console",
            Operation::ConfigureAntenna { .. } => "configure_antenna",
            Operation::CheckWebAccess { .. } => "check_web_access",
        }
    }
}

/// Device ids known to the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailableDevices {
    /// Antenna ids.
    pub antennas: Vec<AntennaId>,
    /// Console ids.
    pub consoles: Vec<ConsoleId>,
    /// Serial number suffix per antenna, where known.
    pub serial_suffixes: BTreeMap<AntennaId, String>,
}

/// Session workflow over an injected registry and store.
#[derive(Clone)]
pub struct StationWorkflow {
    registry: Arc<TopologyRegistry>,
    store: Arc<dyn SessionStore>,
    gateway_check: GatewayCheck,
}

impl StationWorkflow {
    /// Create a workflow.
    pub fn new(
        registry: Arc<TopologyRegistry>,
        store: Arc<dyn SessionStore>,
        gateway_check: GatewayCheck,
    ) -> Self {
        Self {
            registry,
            store,
            gateway_check,
        }
    }

    /// Topology in use.
    pub fn registry(&self) -> &TopologyRegistry {
        &self.registry
    }

    /// Gateway policy in use.
    pub fn gateway_check(&self) -> GatewayCheck {
        self.gateway_check
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Create the session if absent. Returns `true` when a record was created.
    pub fn start_session(&self, user_id: &str) -> Result<bool, WorkflowError> {
        let span = tracing::info_span!(
            "start_session",
            user = %user_id,
            latency_ms = tracing::field::Empty
        );
        let _guard = span.enter();
        let start = Instant::now();
        let res = self.store.create_session(user_id).map_err(WorkflowError::from);
        finish(&span, start, &res);
        res
    }

    /// Record the operating mode. Only `C` / `point-to-point` is accepted.
    pub fn select_mode(
        &self,
        user_id: &str,
        band: &str,
        topology: &str,
    ) -> Result<SessionRecord, WorkflowError> {
        let span = tracing::info_span!(
            "select_mode",
            user = %user_id,
            band = %band,
            topology = %topology,
            latency_ms = tracing::field::Empty
        );
        let _guard = span.enter();
        let start = Instant::now();
        let res = self.select_mode_inner(user_id, band, topology);
        finish(&span, start, &res);
        res
    }

    fn select_mode_inner(
        &self,
        user_id: &str,
        band: &str,
        topology: &str,
    ) -> Result<SessionRecord, WorkflowError> {
        let session = self.session(user_id)?;
        check_mode(band, topology)?;
        if session.selected_band.as_deref() == Some(band)
            && session.selected_topology.as_deref() == Some(topology)
        {
            return Ok(session);
        }
        let record = self.store.apply(
            user_id,
            SessionUpdate::Mode {
                band: band.to_string(),
                topology: topology.to_string(),
            },
        )?;
        Ok(record)
    }

    /// Store a console config. No subnet validation happens here; it runs
    /// whenever a later step depends on the console.
    pub fn configure_console(
        &self,
        user_id: &str,
        console_id: &str,
        config: DeviceConfig,
    ) -> Result<SessionRecord, WorkflowError> {
        let span = tracing::info_span!(
            "configure_console",
            user = %user_id,
            console = %console_id,
            latency_ms = tracing::field::Empty
        );
        let _guard = span.enter();
        let start = Instant::now();
        let res = self.configure_console_inner(user_id, console_id, config);
        finish(&span, start, &res);
        res
    }

    fn configure_console_inner(
        &self,
        user_id: &str,
        console_id: &str,
        config: DeviceConfig,
    ) -> Result<SessionRecord, WorkflowError> {
        self.registry
            .antenna_for_console(console_id)
            .map_err(|_| WorkflowError::UnknownConsole(console_id.to_string()))?;
        let session = self.session(user_id)?;
        if !session.mode_selected() {
            return Err(WorkflowError::ModeNotSelected);
        }
        Ok(self.store.merge_console_config(user_id, console_id, config)?)
    }

    /// Validate and store an antenna config. The bound console must already
    /// hold a config that validates; nothing is written on rejection.
    pub fn configure_antenna(
        &self,
        user_id: &str,
        antenna_id: &str,
        config: DeviceConfig,
    ) -> Result<SessionRecord, WorkflowError> {
        let span = tracing::info_span!(
            "configure_antenna",
            user = %user_id,
            antenna = %antenna_id,
            latency_ms = tracing::field::Empty
        );
        let _guard = span.enter();
        let start = Instant::now();
        let res = self.configure_antenna_inner(user_id, antenna_id, config);
        finish(&span, start, &res);
        res
    }

    fn configure_antenna_inner(
        &self,
        user_id: &str,
        antenna_id: &str,
        config: DeviceConfig,
    ) -> Result<SessionRecord, WorkflowError> {
        let antenna = self.antenna(antenna_id)?;
        let session = self.session(user_id)?;
        if !session.mode_selected() {
            return Err(WorkflowError::ModeNotSelected);
        }
        let console = session.console_config(&antenna.console_id());
        validate_antenna_config(&config, antenna, console, self.gateway_check)?;
        Ok(self.store.merge_antenna_config(user_id, antenna_id, config)?)
    }

    /// Decide whether the PC behind `antenna_id` reaches the web service.
    ///
    /// Read-only and recomputed from stored state on every call.
    pub fn can_access_antenna(
        &self,
        user_id: &str,
        antenna_id: &str,
    ) -> Result<AccessDecision, StoreError> {
        let span = tracing::info_span!(
            "can_access_antenna",
            user = %user_id,
            antenna = %antenna_id,
            allowed = tracing::field::Empty,
            latency_ms = tracing::field::Empty
        );
        let _guard = span.enter();
        let start = Instant::now();
        let res = self.access(user_id, antenna_id);
        finish(&span, start, &res);
        let decision = match res {
            Ok(()) => AccessDecision::allow(),
            Err(WorkflowError::Store(err)) => return Err(err),
            Err(err) => AccessDecision::deny(err.to_string()),
        };
        span.record("allowed", decision.allowed);
        Ok(decision)
    }

    /// Access check rendered as an `ok`/`error` reply.
    pub fn check_web_access(
        &self,
        user_id: &str,
        antenna_id: &str,
    ) -> Result<OperationReply, StoreError> {
        let decision = self.can_access_antenna(user_id, antenna_id)?;
        Ok(match decision.reason {
            None => OperationReply::ok(format!("web interface access through {antenna_id} granted")),
            Some(reason) => OperationReply::error(reason),
        })
    }

    fn access(&self, user_id: &str, antenna_id: &str) -> Result<(), WorkflowError> {
        let antenna = self.antenna(antenna_id)?;
        let session = self.session(user_id)?;
        self.check_granted(&session, antenna)
    }

    fn check_granted(
        &self,
        session: &SessionRecord,
        antenna: &AntennaDescriptor,
    ) -> Result<(), WorkflowError> {
        let console_id = antenna.console_id();
        let console = session
            .console_config(&console_id)
            .ok_or(ValidationError::ConsoleNotConfigured {
                console: console_id.clone(),
            })?;
        validate_console_config(console, antenna, self.gateway_check)?;
        let antenna_config = session
            .antenna_config(&antenna.id)
            .ok_or_else(|| WorkflowError::AntennaNotConfigured(antenna.id.clone()))?;
        validate_antenna_config(antenna_config, antenna, Some(console), self.gateway_check)?;
        Ok(())
    }

    /// Furthest stage the session has reached for `antenna_id`, derived from
    /// the stored configs.
    pub fn stage(&self, user_id: &str, antenna_id: &str) -> Result<SessionStage, WorkflowError> {
        let antenna = self.antenna(antenna_id)?;
        let Some(session) = self.store.get_session(user_id)? else {
            return Ok(SessionStage::Uninitialized);
        };
        if !session.mode_selected() {
            return Ok(SessionStage::Started);
        }
        let console_valid = session
            .console_config(&antenna.console_id())
            .map(|cfg| validate_console_config(cfg, antenna, self.gateway_check).is_ok())
            .unwrap_or(false);
        if !console_valid {
            return Ok(SessionStage::ModeSelected);
        }
        if session.antenna_config(&antenna.id).is_none() {
            return Ok(SessionStage::ConsoleConfigured);
        }
        Ok(match self.check_granted(&session, antenna) {
            Ok(()) => SessionStage::AccessGranted,
            Err(_) => SessionStage::AntennaConfigured,
        })
    }

    /// Antenna and console ids of the registry.
    pub fn available_devices(&self) -> AvailableDevices {
        AvailableDevices {
            antennas: self.registry.antennas().map(|a| a.id.clone()).collect(),
            consoles: self.registry.consoles().cloned().collect(),
            serial_suffixes: self
                .registry
                .antennas()
                .filter_map(|a| Some((a.id.clone(), a.serial_suffix.clone()?)))
                .collect(),
        }
    }

    /// Run one operation and render its reply. Only store failures are errors.
    pub fn execute(&self, op: Operation) -> Result<OperationReply, StoreError> {
        match op {
            Operation::StartSession { user_id } => {
                OperationReply::from_result(self.start_session(&user_id), |created| {
                    if created {
                        format!("session for {user_id} created")
                    } else {
                        format!("session for {user_id} already exists")
                    }
                })
            }
            Operation::SelectMode {
                user_id,
                band,
                topology,
            } => OperationReply::from_result(
                self.select_mode(&user_id, &band, &topology),
                |_| format!("mode {band}/{topology} selected; consoles activated"),
            ),
            Operation::ConfigureConsole {
                user_id,
                console_id,
                config,
            } => OperationReply::from_result(
                self.configure_console(&user_id, &console_id, config),
                |_| format!("console {console_id} configuration saved"),
            ),
            Operation::ConfigureAntenna {
                user_id,
                antenna_id,
                config,
            } => OperationReply::from_result(
                self.configure_antenna(&user_id, &antenna_id, config),
                |_| format!("antenna {antenna_id} configured"),
            ),
            Operation::CheckWebAccess {
                user_id,
                antenna_id,
            } => self.check_web_access(&user_id, &antenna_id),
        }
    }

    fn antenna(&self, antenna_id: &str) -> Result<&AntennaDescriptor, WorkflowError> {
        self.registry
            .antenna(antenna_id)
            .map_err(|_| WorkflowError::UnknownAntenna(antenna_id.to_string()))
    }

    fn session(&self, user_id: &str) -> Result<SessionRecord, WorkflowError> {
        self.store
            .get_session(user_id)?
            .ok_or_else(|| WorkflowError::SessionNotFound(user_id.to_string()))
    }
}

fn finish<T>(span: &tracing::Span, start: Instant, res: &Result<T, WorkflowError>) {
    let elapsed = start.elapsed().as_millis() as u64;
    span.record("latency_ms", elapsed);
    match res {
        Ok(_) => debug!("step accepted"),
        Err(err) if err.is_fatal() => error!(error = %err, "session store failed"),
        Err(err) => debug!(error = %err, class = ?err.class(), "step refused"),
    }
}
