use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryAdoptionStore, InMemoryNotificationPublisher, LocalCommitmentStorage,
};
use crate::routes::with_process_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use pet_adoption::config::AppConfig;
use pet_adoption::error::AppError;
use pet_adoption::telemetry;
use pet_adoption::workflows::adoption::AdoptionProcessService;
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
    if let Some(dir) = args.upload_dir.take() {
        config.uploads.storage_dir = dir;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(if args.seed_demo {
        InMemoryAdoptionStore::seeded()
    } else {
        InMemoryAdoptionStore::default()
    });
    let notifications = Arc::new(InMemoryNotificationPublisher::default());
    let storage = Arc::new(LocalCommitmentStorage::new(
        config.uploads.storage_dir.clone(),
    ));
    let process_service = Arc::new(AdoptionProcessService::with_upload_policy(
        repository,
        notifications,
        storage,
        config.uploads.policy(),
    ));

    let app = with_process_routes(process_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        upload_dir = %config.uploads.storage_dir.display(),
        seeded = args.seed_demo,
        "adoption process service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
