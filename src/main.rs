use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use devtools_log_mcp::config::Config;
use devtools_log_mcp::error::Result;
use devtools_log_mcp::health::{HealthProbe, HttpHealthProbe};
use devtools_log_mcp::mcp::run_stdio;
use devtools_log_mcp::server::McpServer;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout 是协议通道,诊断日志只能走 stderr。
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    info!("monitoring log file: {}", config.log_file_path.display());

    let probe: Arc<dyn HealthProbe> = Arc::new(HttpHealthProbe::new(config.probe_timeout));
    let server = McpServer::new(config, Some(probe));
    info!(
        "{} v{} ready to receive MCP requests via stdio",
        server.state().name,
        server.state().version
    );

    run_stdio(server).await
}
