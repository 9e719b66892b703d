use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Labflow";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory.
/// `LABFLOW_DATA_DIR` overrides; defaults to ~/Labflow/
pub fn app_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LABFLOW_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Labflow")
}

/// Get the generated-report artifact directory
pub fn reports_dir() -> PathBuf {
    app_data_dir().join("reports")
}

/// Bind address for the HTTP server.
/// `LABFLOW_BIND` overrides; defaults to 127.0.0.1:8780
pub fn bind_addr() -> SocketAddr {
    std::env::var("LABFLOW_BIND")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8780)))
}

/// Default tracing filter when RUST_LOG is unset
pub fn default_log_filter() -> String {
    "info,labflow=debug".to_string()
}
