use crate::cli::ServeArgs;
use crate::infra::{build_engine, hydrate_archive, AppState};
use crate::routes::app_router;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use sitter_srs::config::AppConfig;
use sitter_srs::error::AppError;
use sitter_srs::telemetry;
use sitter_srs::tiers::{OrgId, SrsScheduler, TierApi};
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

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let engine = build_engine();
    if let Some(archive) = args.archive.take() {
        let org = OrgId(args.org.clone());
        let summary = hydrate_archive(&engine, &org, &archive)?;
        info!(
            imported = summary.imported(),
            skipped = summary.skipped.len(),
            path = %archive.display(),
            "event archive hydrated"
        );
    }

    let scheduler = SrsScheduler::start(engine.service.clone(), config.scheduler.clone());
    let api = Arc::new(TierApi {
        service: engine.service.clone(),
        scheduler,
    });

    let app = app_router(api)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "sitter reliability service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
