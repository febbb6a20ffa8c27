//! HTTP surface of the ground-station simulator.
//!
//! Session routes map one-to-one onto [`Operation`]s. Refused steps come back
//! as `{"status": "error", "message": ...}` with `400`; store failures are
//! `500`. Scheme routes under `/api/schemes` answer `404` for an unknown
//! scheme, device, or unsaved config. Store calls run on the blocking pool.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::Encoder;
use serde::{Deserialize, Serialize};
use station_core::{
    AvailableDevices, Operation, OperationReply, SavedDeviceConfig, SchemeService,
    SchemeServiceError, SessionStage, StationWorkflow, StoreError, WorkflowError,
};
use station_spec::{ClickableArea, DeviceConfig, DeviceIps, GatewayCheck, SchemeId};
use tokio::task::JoinError;

/// Prometheus collectors of the daemon.
#[derive(Clone)]
pub struct DaemonMetrics {
    registry: prometheus::Registry,
    operations_total: prometheus::IntCounterVec,
    operation_latency_ms: prometheus::HistogramVec,
    store_errors_total: prometheus::IntCounter,
}

impl DaemonMetrics {
    /// Create and register all collectors.
    pub fn new() -> anyhow::Result<Self> {
        let registry = prometheus::Registry::new();
        let operations_total = prometheus::IntCounterVec::new(
            prometheus::Opts::new(
                "stationd_operations_total",
                "Workflow and scheme operations by name and outcome",
            ),
            &["op", "outcome"],
        )?;
        let operation_latency_ms = prometheus::HistogramVec::new(
            prometheus::HistogramOpts::new(
                "stationd_operation_latency_ms",
                "Workflow operation latency in milliseconds",
            ),
            &["op"],
        )?;
        let store_errors_total = prometheus::IntCounter::new(
            "stationd_store_errors_total",
            "Store failures surfaced as 500",
        )?;
        registry.register(Box::new(operations_total.clone()))?;
        registry.register(Box::new(operation_latency_ms.clone()))?;
        registry.register(Box::new(store_errors_total.clone()))?;
        Ok(Self {
            registry,
            operations_total,
            operation_latency_ms,
            store_errors_total,
        })
    }

    fn observe(&self, op: &str, outcome: &str, latency_ms: f64) {
        self.operations_total
            .with_label_values(&[op, outcome])
            .inc();
        self.operation_latency_ms
            .with_label_values(&[op])
            .observe(latency_ms);
    }

    /// Text exposition of all collectors.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    workflow: StationWorkflow,
    schemes: SchemeService,
    metrics: DaemonMetrics,
}

impl AppState {
    /// Wrap a workflow and scheme service with fresh metrics.
    pub fn new(workflow: StationWorkflow, schemes: SchemeService) -> anyhow::Result<Self> {
        Ok(Self {
            workflow,
            schemes,
            metrics: DaemonMetrics::new()?,
        })
    }

    /// Workflow served by the router.
    pub fn workflow(&self) -> &StationWorkflow {
        &self.workflow
    }

    /// Scheme service served by the router.
    pub fn schemes(&self) -> &SchemeService {
        &self.schemes
    }

    async fn run(self: &Arc<Self>, op: Operation) -> Result<OperationReply, AppError> {
        let state = Arc::clone(self);
        blocking(move || state.run_blocking(op)).await
    }

    fn run_blocking(&self, op: Operation) -> Result<OperationReply, AppError> {
        let name = op.name();
        let start = Instant::now();
        let res = self.workflow.execute(op);
        let latency = start.elapsed().as_secs_f64() * 1000.0;
        let outcome = match &res {
            Ok(reply) if reply.is_ok() => "ok",
            Ok(_) => "refused",
            Err(_) => {
                self.metrics.store_errors_total.inc();
                "store_error"
            }
        };
        self.metrics.observe(name, outcome, latency);
        res.map_err(AppError::from)
    }

    fn run_scheme<T>(
        &self,
        name: &str,
        call: impl FnOnce(&SchemeService) -> Result<T, SchemeServiceError>,
    ) -> Result<T, AppError> {
        let start = Instant::now();
        let res = call(&self.schemes);
        let latency = start.elapsed().as_secs_f64() * 1000.0;
        let outcome = match &res {
            Ok(_) => "ok",
            Err(err) if err.is_fatal() => {
                self.metrics.store_errors_total.inc();
                "store_error"
            }
            Err(_) => "not_found",
        };
        self.metrics.observe(name, outcome, latency);
        res.map_err(AppError::from)
    }
}

/// Run store-touching work off the async worker threads.
async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Handler failure that is not a user-recoverable refusal.
#[derive(Debug)]
pub enum AppError {
    /// Session store failed.
    Store(StoreError),
    /// Registry lookup failed outside the workflow.
    Workflow(WorkflowError),
    /// Scheme, device, or saved config not found.
    Scheme(SchemeServiceError),
    /// Blocking task panicked or was cancelled.
    Join(JoinError),
}

impl From<JoinError> for AppError {
    fn from(err: JoinError) -> Self {
        AppError::Join(err)
    }
}

impl From<SchemeServiceError> for AppError {
    fn from(err: SchemeServiceError) -> Self {
        match err {
            SchemeServiceError::Store(err) => AppError::Store(err),
            other => AppError::Scheme(other),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Store(err) => AppError::Store(err),
            other => AppError::Workflow(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Store(err) => {
                tracing::error!(error = %err, "request failed on session store");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(OperationReply::error("session storage is unavailable")),
                )
                    .into_response()
            }
            AppError::Workflow(err) => {
                (StatusCode::NOT_FOUND, Json(OperationReply::error(err.to_string())))
                    .into_response()
            }
            AppError::Scheme(err) => {
                (StatusCode::NOT_FOUND, Json(OperationReply::error(err.to_string())))
                    .into_response()
            }
            AppError::Join(err) => {
                tracing::error!(error = %err, "blocking handler task failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(OperationReply::error("request could not be completed")),
                )
                    .into_response()
            }
        }
    }
}

fn reply(reply: OperationReply) -> Response {
    let status = if reply.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(reply)).into_response()
}

/// Body of `POST /api/session/start`.
#[derive(Debug, Deserialize, Serialize)]
pub struct StartBody {
    /// Session owner.
    pub user_id: String,
}

/// Body of `POST /api/session/{user}/select_mode`.
#[derive(Debug, Deserialize, Serialize)]
pub struct ModeBody {
    /// Requested band.
    pub band: String,
    /// Requested topology.
    pub topology: String,
}

/// Body of the console and antenna configure routes.
#[derive(Debug, Deserialize, Serialize)]
pub struct DeviceBody {
    /// IP address text.
    pub ip_address: String,
    /// Subnet mask text.
    pub subnet_mask: String,
    /// Optional gateway text.
    #[serde(default)]
    pub gateway: Option<String>,
}

impl From<DeviceBody> for DeviceConfig {
    fn from(body: DeviceBody) -> Self {
        DeviceConfig::new(body.ip_address, body.subnet_mask, body.gateway)
    }
}

#[derive(Serialize)]
struct SchemeList {
    schemes: Vec<SchemeId>,
}

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    sessions: usize,
    antennas: usize,
    gateway_check: GatewayCheck,
}

#[derive(Serialize)]
struct StageReport {
    user_id: String,
    antenna_id: String,
    stage: SessionStage,
}

/// Build the daemon router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/session/start", post(start_session))
        .route("/api/session/available_devices", get(available_devices))
        .route("/api/session/:user/select_mode", post(select_mode))
        .route(
            "/api/session/:user/console/:console/configure",
            post(configure_console),
        )
        .route(
            "/api/session/:user/antenna/:antenna/configure",
            post(configure_antenna),
        )
        .route(
            "/api/session/:user/antenna/:antenna/web_access",
            get(web_access),
        )
        .route("/api/session/:user/antenna/:antenna/stage", get(stage))
        .route("/api/schemes/list", get(list_schemes))
        .route("/api/schemes/:scheme/areas", get(scheme_areas))
        .route("/api/schemes/:scheme/device/:device/ips", get(device_ips))
        .route(
            "/api/schemes/:scheme/device/:device/set_ips",
            post(set_device_ips),
        )
        .route("/metrics", get(metrics_endpoint))
        .route("/healthz", get(health_endpoint))
        .with_state(state)
}

async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartBody>,
) -> Result<Response, AppError> {
    let op = Operation::StartSession {
        user_id: body.user_id,
    };
    Ok(reply(state.run(op).await?))
}

async fn select_mode(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<ModeBody>,
) -> Result<Response, AppError> {
    let op = Operation::SelectMode {
        user_id,
        band: body.band,
        topology: body.topology,
    };
    Ok(reply(state.run(op).await?))
}

async fn configure_console(
    State(state): State<Arc<AppState>>,
    Path((user_id, console_id)): Path<(String, String)>,
    Json(body): Json<DeviceBody>,
) -> Result<Response, AppError> {
    let op = Operation::ConfigureConsole {
        user_id,
        console_id,
        config: body.into(),
    };
    Ok(reply(state.run(op).await?))
}

async fn configure_antenna(
    State(state): State<Arc<AppState>>,
    Path((user_id, antenna_id)): Path<(String, String)>,
    Json(body): Json<DeviceBody>,
) -> Result<Response, AppError> {
    let op = Operation::ConfigureAntenna {
        user_id,
        antenna_id,
        config: body.into(),
    };
    Ok(reply(state.run(op).await?))
}

async fn web_access(
    State(state): State<Arc<AppState>>,
    Path((user_id, antenna_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let op = Operation::CheckWebAccess {
        user_id,
        antenna_id,
    };
    Ok(reply(state.run(op).await?))
}

async fn stage(
    State(state): State<Arc<AppState>>,
    Path((user_id, antenna_id)): Path<(String, String)>,
) -> Result<Json<StageReport>, AppError> {
    let stage = {
        let state = Arc::clone(&state);
        let (user_id, antenna_id) = (user_id.clone(), antenna_id.clone());
        blocking(move || Ok(state.workflow.stage(&user_id, &antenna_id)?)).await?
    };
    Ok(Json(StageReport {
        user_id,
        antenna_id,
        stage,
    }))
}

async fn available_devices(State(state): State<Arc<AppState>>) -> Json<AvailableDevices> {
    Json(state.workflow.available_devices())
}

async fn list_schemes(State(state): State<Arc<AppState>>) -> Json<SchemeList> {
    Json(SchemeList {
        schemes: state.schemes.list_schemes(),
    })
}

async fn scheme_areas(
    State(state): State<Arc<AppState>>,
    Path(scheme_id): Path<String>,
) -> Result<Json<Vec<ClickableArea>>, AppError> {
    let areas = state.run_scheme("scheme_areas", |schemes| schemes.areas(&scheme_id))?;
    Ok(Json(areas))
}

async fn device_ips(
    State(state): State<Arc<AppState>>,
    Path((scheme_id, device_id)): Path<(String, String)>,
) -> Result<Json<SavedDeviceConfig>, AppError> {
    let saved = blocking(move || {
        state.run_scheme("device_ips", |schemes| {
            schemes.device_ips(&scheme_id, &device_id)
        })
    })
    .await?;
    Ok(Json(saved))
}

async fn set_device_ips(
    State(state): State<Arc<AppState>>,
    Path((scheme_id, device_id)): Path<(String, String)>,
    Json(ips): Json<DeviceIps>,
) -> Result<Json<SavedDeviceConfig>, AppError> {
    let saved = blocking(move || {
        state.run_scheme("set_device_ips", |schemes| {
            schemes.set_device_ips(&scheme_id, &device_id, ips)
        })
    })
    .await?;
    Ok(Json(saved))
}

async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn health_endpoint(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthReport>, AppError> {
    let sessions = {
        let state = Arc::clone(&state);
        blocking(move || Ok(state.workflow.store().session_count()?)).await?
    };
    Ok(Json(HealthReport {
        status: "ok",
        sessions,
        antennas: state.workflow.registry().len(),
        gateway_check: state.workflow.gateway_check(),
    }))
}
