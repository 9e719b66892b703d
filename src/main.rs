use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use labflow::api::server;
use labflow::config;
use labflow::core_state::AppCore;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let core = Arc::new(AppCore::new());

    // Open once at startup so migrations run before traffic arrives
    if let Err(e) = core.open_db() {
        tracing::error!("database initialization failed: {e}");
        std::process::exit(1);
    }
    tracing::info!(data_dir = %core.data_dir.display(), "database ready");

    if let Err(e) = server::run(core, config::bind_addr()).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
