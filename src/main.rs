use std::{sync::Arc, time::Duration};

use clarifai_mcp_bridge::{
    config::Config, logging, model_client::UnavailableModelClient, serve, AppState, McpHandler,
    StdioTransport,
};
use tracing::{error, info, Level};

/// Grace period for blocking stdio work once serving has finished.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            logging::init_logging(Level::INFO);
            error!(error = %err, "invalid configuration");
            return Err(err.into());
        }
    };
    logging::init_logging(config.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(run(config));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);

    outcome
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        api_addr = %config.api_addr,
        output_path = %config.output_path.display(),
        timeout_secs = config.timeout_secs,
        "bridge starting"
    );

    let client = Arc::new(UnavailableModelClient::new(config.api_addr.clone()));
    let handler = McpHandler::new(AppState::from_config(&config, client));
    let transport = StdioTransport::new(tokio::io::stdin(), tokio::io::stdout());

    if let Err(err) = serve(transport, &handler).await {
        error!(error = %err, "stdio transport failed");
        return Err(err.into());
    }

    info!("bridge stopped");
    Ok(())
}
