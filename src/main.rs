//! timerd - a persistent multi-timer countdown daemon
//!
//! This is the main entry point: it loads the stored timers, starts the shared
//! scheduler and serves the timer operations over HTTP.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use timerd::{
    api::create_router,
    config::Config,
    persistence::JsonFileAdapter,
    services::TimerService,
    state::{AppState, TimerStore},
    tasks::TimerEvent,
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("timerd={},tower_http=info", config.log_level()))
        .init();

    let data_path = config.data_path();
    info!("Starting timerd v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: host={}, port={}, data={}",
          config.host, config.port, data_path.display());

    // Load stored timers; storage trouble never stops startup
    let store = Arc::new(TimerStore::new(Arc::new(JsonFileAdapter::new(data_path))));
    let timers = store.load();
    for warning in store.warnings() {
        warn!("Startup warning: {}", warning);
    }
    info!("{} timers restored ({} running)",
          timers.len(), timers.iter().filter(|t| t.is_running()).count());

    let service = Arc::new(TimerService::new(Arc::clone(&store)));
    service.on_event(|event| match event {
        TimerEvent::Completed(timer) => info!("{} finished", timer.name),
        TimerEvent::HalfwayReached(timer) => {
            info!("{} is halfway, {} left", timer.name, timer.format_remaining())
        }
    });
    service.scheduler().start();

    let state = Arc::new(AppState::new(Arc::clone(&service), config.port, config.host.clone()));
    let app = create_router(state);

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  GET    /timers                 - List timers (?category=)");
    info!("  POST   /timers                 - Create a timer");
    info!("  GET    /timers/:id             - Fetch a timer");
    info!("  DELETE /timers/:id             - Delete a timer");
    info!("  POST   /timers/:id/start|pause|reset");
    info!("  GET    /categories             - Categories with counts");
    info!("  POST   /categories/:name/start|pause|reset");
    info!("  GET    /export                 - Export all timers as JSON");
    info!("  GET    /events                 - Completion and halfway events (SSE)");
    info!("  GET    /status                 - Daemon status");
    info!("  GET    /health                 - Health check");

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    if let Err(e) = service.shutdown() {
        error!("Failed to save timers on shutdown: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}
