//! reqwest transport for the remote service: request/response endpoints,
//! the SSE event stream, and the per-directory client factory.

mod client;
mod events;
mod factory;
pub mod retry;

use std::path::Path;

use mira_api::RemoteClient;

pub use factory::HttpClientFactory;
pub use retry::{RetryPolicy, with_retry};

/// Configuration for the remote transport.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("MIRA_SERVER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:4096".into()),
        }
    }
}

/// Create a standalone client scoped to `directory` (`None` = global).
///
/// Most callers want [`HttpClientFactory`] instead, which caches one client
/// per directory.
pub fn client(config: &ServerConfig, directory: Option<&Path>) -> RemoteClient {
    client::build(reqwest::Client::new(), config, directory)
}
