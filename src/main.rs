mod campaign;
mod catalog;
mod config;
mod generator;
mod http;
mod jobs;
mod llm;
mod metrics;
mod models;
mod notify;
mod prompts;
mod store;
mod supabase;
#[cfg(test)]
mod testing;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use campaign::{CampaignError, CampaignErrorKind, CampaignRunner, Orchestrator};
use catalog::{Catalog, RecipientDirectory, SeedCatalog};
use config::AppConfig;
use eyre::WrapErr;
use generator::{ContentGenerator, TensorZeroGenerator};
use llm::LlmClient;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, CampaignStatusResponse, CampaignSummary, StartCampaignResponse};
use notify::{LogSink, NotificationSink, SmtpSink};
use once_cell::sync::Lazy;
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc};
use store::{CampaignStore, MemoryCampaignStore, RedisCampaignStore};
use supabase::SupabaseClient;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

static OPENAPI: Lazy<Value> = Lazy::new(|| {
    serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or_else(|_| json!({"openapi": "3.0.3"}))
});

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "campaign.api", "server crashed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> eyre::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let config = AppConfig::from_env();

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .wrap_err("installing prometheus recorder")?;

    let store: Arc<dyn CampaignStore> = match &config.redis_url {
        Some(url) => {
            info!(target = "campaign.store", "using redis campaign store");
            Arc::new(RedisCampaignStore::open(url).wrap_err("opening redis store")?)
        }
        None => {
            warn!(
                target = "campaign.store",
                "REDIS_URL not set; campaign records are kept in memory"
            );
            Arc::new(MemoryCampaignStore::new())
        }
    };

    let catalog: Arc<dyn Catalog>;
    let directory: Arc<dyn RecipientDirectory>;
    if let Some(supabase) = config.supabase.clone() {
        let client = Arc::new(SupabaseClient::new(supabase, config.http));
        catalog = client.clone();
        directory = client;
    } else {
        let seed = Arc::new(
            SeedCatalog::from_path(&config.catalog_seed_path).wrap_err("loading seed catalog")?,
        );
        catalog = seed.clone();
        directory = seed;
    }

    let llm = Arc::new(LlmClient::new(config.llm.clone(), config.http));
    let generator: Arc<dyn ContentGenerator> = Arc::new(TensorZeroGenerator::new(llm));

    let sink: Arc<dyn NotificationSink> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpSink::new(smtp).wrap_err("configuring smtp transport")?),
        None => {
            warn!(
                target = "campaign.notify",
                "SMTP_HOST not set; emails are logged instead of sent"
            );
            Arc::new(LogSink)
        }
    };

    let runner = CampaignRunner::new(
        store.clone(),
        generator,
        sink,
        config.fanout_concurrency,
    );
    let (queue, _worker) =
        jobs::JobQueue::spawn(runner, config.queue_capacity, config.campaign_concurrency);
    let orchestrator = Orchestrator::new(
        store,
        catalog,
        directory,
        queue,
        config.recipient_limit,
    );

    let state = AppState {
        orchestrator,
        prometheus,
        metrics_key: config.metrics_key.clone(),
        openapi_key: config.openapi_key.clone(),
    };
    let app = router(state, config.body_limit);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(target = "campaign.api", "listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    axum::serve(listener, app.into_make_service())
        .await
        .wrap_err("serving http")?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    orchestrator: Orchestrator,
    prometheus: PrometheusHandle,
    metrics_key: Option<String>,
    openapi_key: Option<String>,
}

fn router(state: AppState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let marketing = Router::new()
        .route("/start-campaign/{product_id}", post(start_campaign))
        .route("/campaign-status/{product_id}", get(campaign_status))
        .route("/campaign-result/{product_id}", get(campaign_result))
        .route("/campaign-poster/{product_id}", get(campaign_poster));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .nest("/marketing", marketing)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "campaign-api-rs",
    }))
}

/// Start the campaign for a product.
///
/// - Method: `POST`
/// - Path: `/marketing/start-campaign/{product_id}`
/// - Response: `202` with the new `campaign_id`; `200` with
///   `reason: already_started` when a campaign exists; `404` when the product
///   or its shop is unknown; `503` when the run queue is full (nothing written).
async fn start_campaign(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<(StatusCode, Json<StartCampaignResponse>), AppError> {
    crate::metrics::inc_requests("/marketing/start-campaign");
    match state.orchestrator.start_campaign(&product_id).await {
        Ok(started) => {
            info!(
                target = "campaign.api",
                product_id = %product_id,
                target_count = started.target_count,
                "campaign accepted"
            );
            Ok((
                StatusCode::ACCEPTED,
                Json(StartCampaignResponse::started(started.campaign_id)),
            ))
        }
        Err(err) => match err.kind() {
            CampaignErrorKind::AlreadyStarted => Ok((
                StatusCode::OK,
                Json(StartCampaignResponse::rejected("already_started")),
            )),
            CampaignErrorKind::NotFound => {
                info!(
                    target = "campaign.api",
                    product_id = %product_id,
                    stage = err.stage(),
                    "start rejected"
                );
                Ok((
                    StatusCode::NOT_FOUND,
                    Json(StartCampaignResponse::rejected(format!(
                        "{}_not_found",
                        err.stage()
                    ))),
                ))
            }
            _ => Err(err.into()),
        },
    }
}

async fn campaign_status(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<CampaignStatusResponse>, AppError> {
    crate::metrics::inc_requests("/marketing/campaign-status");
    Ok(Json(state.orchestrator.status(&product_id).await?))
}

async fn campaign_result(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<CampaignSummary>, AppError> {
    crate::metrics::inc_requests("/marketing/campaign-result");
    Ok(Json(state.orchestrator.result(&product_id).await?))
}

/// Poster bytes as `image/png`; `409` while the campaign exists without one.
async fn campaign_poster(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/marketing/campaign-poster");
    let bytes = state.orchestrator.poster(&product_id).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], Bytes::from(bytes)).into_response())
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    if !key_matches(&headers, "X-Docs-Key", state.openapi_key.as_deref()) {
        return Err(AppError::Unauthorized);
    }
    Ok(Json(OPENAPI.clone()))
}

async fn swagger_ui() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Campaign API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#,
    )
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !key_matches(&headers, "X-Metrics-Key", state.metrics_key.as_deref()) {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus.render(),
    )
        .into_response()
}

fn key_matches(headers: &HeaderMap, name: &str, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|presented| presented == expected)
}

#[derive(Debug)]
enum AppError {
    Campaign(CampaignError),
    Unauthorized,
}

impl From<CampaignError> for AppError {
    fn from(value: CampaignError) -> Self {
        Self::Campaign(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Campaign(err) => {
                let status = match err.kind() {
                    CampaignErrorKind::NotFound => StatusCode::NOT_FOUND,
                    CampaignErrorKind::AlreadyStarted | CampaignErrorKind::NotReady => {
                        StatusCode::CONFLICT
                    }
                    CampaignErrorKind::Busy => StatusCode::SERVICE_UNAVAILABLE,
                    CampaignErrorKind::Internal => {
                        error!(
                            target = "campaign.api",
                            stage = err.stage(),
                            "request failed: {}",
                            err.detail()
                        );
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                let payload = ApiError {
                    error: err.kind().code().to_string(),
                    detail: Some(err.detail().to_string()),
                };
                (status, Json(payload)).into_response()
            }
            AppError::Unauthorized => {
                let payload = ApiError {
                    error: "unauthorized".into(),
                    detail: None,
                };
                (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
