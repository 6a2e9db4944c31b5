//! Per-directory client cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use mira_api::{ClientFactory, RemoteClient};
use parking_lot::Mutex;

use crate::ServerConfig;
use crate::client;

/// Produces one [`RemoteClient`] per workspace directory, lazily, sharing a
/// single connection pool across all of them.
pub struct HttpClientFactory {
    config: ServerConfig,
    http: reqwest::Client,
    /// Lazily constructed clients keyed by directory (`None` = global).
    instances: Mutex<HashMap<Option<PathBuf>, RemoteClient>>,
}

impl HttpClientFactory {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            instances: Mutex::new(HashMap::new()),
        }
    }
}

impl ClientFactory for HttpClientFactory {
    fn client(&self, directory: Option<&Path>) -> RemoteClient {
        let key = directory.map(Path::to_path_buf);
        let mut instances = self.instances.lock();
        instances
            .entry(key)
            .or_insert_with(|| client::build(self.http.clone(), &self.config, directory))
            .clone()
    }
}
