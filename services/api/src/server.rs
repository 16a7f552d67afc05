use crate::cli::ServeArgs;
use crate::infra::{build_engine, seed_default_fixture, AppState, LogDispatcher};
use crate::roster;
use crate::routes::service_router;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use faculty_flow::config::AppConfig;
use faculty_flow::error::AppError;
use faculty_flow::telemetry;
use faculty_flow::workflows::relief::memory::{InMemoryFacultyDirectory, InMemoryTimetable};
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

    let directory = Arc::new(InMemoryFacultyDirectory::default());
    let timetable = Arc::new(InMemoryTimetable::default());
    match args.roster.take() {
        Some(roster_path) => {
            let faculty = roster::load_faculty(&roster_path, &directory)
                .map_err(|err| AppError::Seed(err.to_string()))?;
            let entries = match args.timetable.take() {
                Some(timetable_path) => roster::load_timetable(&timetable_path, &timetable)
                    .map_err(|err| AppError::Seed(err.to_string()))?,
                None => 0,
            };
            info!(faculty, entries, "seeded directory and timetable from CSV");
        }
        None => {
            seed_default_fixture(&directory, &timetable)
                .map_err(|err| AppError::Seed(err.to_string()))?;
            info!("seeded directory and timetable from built-in fixture");
        }
    }

    let state = build_engine(
        directory,
        timetable,
        Arc::new(LogDispatcher),
        &config.workflow,
    );

    let app = service_router(state)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "leave workflow service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
