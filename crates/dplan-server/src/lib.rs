//! HTTP surface for the degree planner.
//!
//! Routes:
//! - `GET  /health`
//! - `GET  /majors`
//! - `POST /courses/get-courses-to-schedule`
//! - `POST /schedule/edit`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Error, anyhow};
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use dplan_core::logging::{LoggingDestination, init_logging};
use dplan_core::{
    CatalogError, EditOutcome, PlanError, PlanInput, PlanOutcome, PlannerContext, Preferences,
    RuntimeOverrides, Transcript, apply_runtime_overrides, config_path, edit_schedule,
    load_config_from, plan_courses, requirements_for,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const SERVE_SUBCOMMAND: &str = "serve";

/// Arguments for `dplan-server` / `dplan serve`.
#[derive(Parser, Debug, Clone)]
#[command(version, about = "Serve the degree planner over HTTP", long_about = None)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Read configuration from this file instead of the default location.
    #[arg(long)]
    pub config: Option<String>,

    /// Requirement catalog JSON file.
    #[arg(long)]
    pub catalog: Option<String>,

    /// Log to the log file only.
    #[arg(long)]
    pub quiet: bool,
}

/// True when the process was started as `<bin> serve ...`.
pub fn should_run_server_mode() -> bool {
    std::env::args().nth(1).as_deref() == Some(SERVE_SUBCOMMAND)
}

/// Drop a leading `serve` word so the remaining arguments parse as [`ServeArgs`].
pub fn server_args<I: IntoIterator<Item = String>>(args: I) -> Vec<String> {
    args.into_iter()
        .enumerate()
        .filter(|(idx, arg)| !(*idx == 1 && arg == SERVE_SUBCOMMAND))
        .map(|(_, arg)| arg)
        .collect()
}

pub async fn run() -> Result<(), Error> {
    let args = ServeArgs::parse_from(server_args(std::env::args()));
    serve(args).await
}

pub async fn serve(args: ServeArgs) -> Result<(), Error> {
    let destination = if args.quiet {
        LoggingDestination::FileOnly
    } else {
        LoggingDestination::FileAndStderr
    };
    if let Err(err) = init_logging(destination) {
        eprintln!("[dplan] Logging disabled: {err}");
    }

    let path = args
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(config_path);
    let load = load_config_from(&path);
    let mut warnings = load.warnings;
    let mut config = load.config;
    let overrides = RuntimeOverrides {
        catalog_path: args.catalog.clone(),
        ..RuntimeOverrides::default()
    };
    apply_runtime_overrides(&mut config, &overrides, &mut warnings);
    for warning in &warnings {
        warn!("{warning}");
    }

    let ctx = PlannerContext::from_config(&config).map_err(|err| anyhow!(err.to_string()))?;
    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    let addr = listener.local_addr()?;
    info!(%addr, config = %path.display(), "Planner API listening");
    eprintln!("[dplan] Listening on http://{addr}");

    axum::serve(listener, router(Arc::new(ctx))).await?;
    Ok(())
}

pub fn router(ctx: Arc<PlannerContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/majors", get(majors_handler))
        .route("/courses/get-courses-to-schedule", post(plan_handler))
        .route("/schedule/edit", post(edit_handler))
        .with_state(ctx)
        .layer(cors)
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn majors_handler(
    State(ctx): State<Arc<PlannerContext>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let majors = ctx.catalog.majors().await.map_err(ApiError::from)?;
    Ok(Json(majors))
}

#[derive(Debug, Deserialize)]
struct PlanBody {
    #[serde(rename = "jsonData", default)]
    json_data: Option<Value>,
    #[serde(default)]
    majors: Vec<String>,
    #[serde(default)]
    transcript: Transcript,
    #[serde(default)]
    preferences: Preferences,
    #[serde(default)]
    grad_year: Option<Value>,
    #[serde(default)]
    grad_quarter: Option<String>,
}

async fn plan_handler(
    State(ctx): State<Arc<PlannerContext>>,
    Json(body): Json<Value>,
) -> Result<Json<PlanOutcome>, ApiError> {
    let body: PlanBody = serde_json::from_value(body)
        .map_err(|err| ApiError::bad_request(format!("Invalid request body: {err}")))?;

    let requirements = match body.json_data {
        Some(Value::String(text)) => serde_json::from_str(&text)
            .map_err(|err| ApiError::bad_request(format!("jsonData is not valid JSON: {err}")))?,
        Some(tree) => tree,
        None if !body.majors.is_empty() => {
            requirements_for(ctx.catalog.as_ref(), &body.majors).await?
        }
        None => return Err(ApiError::bad_request("jsonData or majors is required")),
    };

    let input = PlanInput {
        requirements,
        transcript: body.transcript,
        preferences: body.preferences,
        grad_year: parse_year(body.grad_year)?,
        grad_quarter: body.grad_quarter,
    };

    let outcome = plan_courses(&ctx, input).await?;
    info!(
        courses = outcome.courses_to_schedule.len(),
        scheduled = outcome.schedule.is_some(),
        "Served course plan"
    );
    Ok(Json(outcome))
}

/// Accepts `2027` or `"2027"`; null and blank mean absent.
fn parse_year(value: Option<Value>) -> Result<Option<i32>, ApiError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_i64()
            .and_then(|year| i32::try_from(year).ok())
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("grad_year {number} is not a year"))),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("grad_year '{text}' is not a year"))),
        Some(other) => Err(ApiError::bad_request(format!(
            "grad_year {other} is not a year"
        ))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditBody {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    schedule_data: Value,
    #[serde(default)]
    transcript: Transcript,
}

async fn edit_handler(
    State(ctx): State<Arc<PlannerContext>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<EditOutcome>), ApiError> {
    let body: EditBody = serde_json::from_value(body)
        .map_err(|err| ApiError::bad_request(format!("Invalid request body: {err}")))?;
    let question = body
        .question
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("question is required"))?;

    let outcome = edit_schedule(&ctx, &question, &body.schedule_data, &body.transcript).await;
    let status = if outcome.is_interpreter_failure() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    inner: Error,
}

impl ApiError {
    fn new(status: StatusCode, inner: Error) -> Self {
        Self { status, inner }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, anyhow!(message.into()))
    }
}

impl From<Error> for ApiError {
    fn from(value: Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, value)
    }
}

impl From<PlanError> for ApiError {
    fn from(value: PlanError) -> Self {
        Self::bad_request(value.to_string())
    }
}

impl From<CatalogError> for ApiError {
    fn from(value: CatalogError) -> Self {
        match value {
            CatalogError::UnknownMajor(_) | CatalogError::NotConfigured => {
                Self::bad_request(value.to_string())
            }
            other => Self::from(Error::new(other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.inner, "Request failed");
        }
        let payload = Json(ErrorBody {
            error: self.inner.to_string(),
        });
        (self.status, payload).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}
