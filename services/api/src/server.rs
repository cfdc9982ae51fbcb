use crate::cli::ServeArgs;
use crate::infra::{build_runtime, seed_operator, AppState};
use crate::routes::with_recruitment_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use recruitment::config::AppConfig;
use recruitment::error::AppError;
use recruitment::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    std::fs::create_dir_all(&config.storage.media_root)?;
    let runtime = build_runtime(&config);
    match seed_operator(&runtime, &args.operator) {
        Ok(_) => {}
        Err(err) => warn!(error = %err, "operator account not seeded"),
    }

    let app = with_recruitment_routes(runtime.service.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        media_root = %config.storage.media_root.display(),
        elevation = ?config.access.elevation,
        "recruitment service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
