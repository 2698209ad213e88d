use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use tracing::{info, warn};

use gatehouse::config::AppConfig;
use gatehouse::error::AppError;
use gatehouse::telemetry;
use gatehouse::workflows::intake::IntakeService;

use crate::cli::ServeArgs;
use crate::infra::{
    AppState, ChannelCommandSink, InMemoryApplicationRepository, InMemoryPlatform,
};
use crate::routes::with_intake_routes;

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
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let platform = Arc::new(InMemoryPlatform::default());
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let sink = Arc::new(ChannelCommandSink::new(
        platform.clone(),
        config.intake.provisioning_channel.clone(),
    ));
    let service = Arc::new(IntakeService::new(
        platform,
        repository,
        sink,
        config.intake.clone(),
    ));

    if let Err(err) = service.ensure_entry_prompt().await {
        warn!(error = %err, "entry prompt installation failed");
    }

    let app = with_intake_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "gatehouse intake service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
