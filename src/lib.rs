use std::{path::PathBuf, sync::Arc, time::Duration};

pub mod config;
pub mod domain;
pub mod errors;
pub mod handler;
pub mod logging;
pub mod mcp;
pub mod model_client;
pub mod transport;

use config::Config;
use model_client::{CallScope, ModelClient};

pub use handler::{serve, RequestHandler};
pub use mcp::server::McpHandler;
pub use transport::{StdioTransport, TransportError};

#[derive(Clone)]
pub struct AppState {
    pub pat: Arc<str>,
    pub model_client: Arc<dyn ModelClient>,
    /// Large generated images are written here; `None` always returns them inline.
    pub output_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub default_user_id: Option<String>,
    pub default_app_id: Option<String>,
}

impl AppState {
    pub fn new(
        pat: String,
        model_client: Arc<dyn ModelClient>,
        output_dir: Option<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            pat: Arc::<str>::from(pat),
            model_client,
            output_dir,
            timeout,
            default_user_id: None,
            default_app_id: None,
        }
    }

    pub fn from_config(config: &Config, model_client: Arc<dyn ModelClient>) -> Self {
        Self {
            default_user_id: config.default_user_id.clone(),
            default_app_id: config.default_app_id.clone(),
            ..Self::new(
                config.pat.clone(),
                model_client,
                Some(config.output_path.clone()),
                config.timeout(),
            )
        }
    }

    pub fn call_scope(&self, user_id: Option<String>, app_id: Option<String>) -> CallScope {
        CallScope {
            pat: Arc::clone(&self.pat),
            user_id,
            app_id,
        }
    }
}
