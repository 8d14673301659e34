use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryApplicationRepository};
use crate::routes::with_pipeline_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use job_pipeline::config::AppConfig;
use job_pipeline::error::AppError;
use job_pipeline::telemetry;
use job_pipeline::workflows::applications::PipelineService;
use job_pipeline::workflows::catalog::StatusCatalog;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let catalog = match &config.pipeline.catalog_csv {
        Some(path) => {
            let catalog = StatusCatalog::from_csv_path(path)?;
            info!(path = %path.display(), statuses = catalog.len(), "loaded status catalog");
            catalog
        }
        None => StatusCatalog::standard(),
    };

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryApplicationRepository::default());
    let pipeline_service = Arc::new(PipelineService::new(
        Arc::new(catalog),
        repository,
        config.pipeline.clone(),
    ));

    let app = with_pipeline_routes(pipeline_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "job pipeline tracker ready");

    axum::serve(listener, app).await?;
    Ok(())
}
