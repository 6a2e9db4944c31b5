//! The HTTP [`ClientBackend`] implementation.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use mira_api::error::{Error, Result};
use mira_api::types::{
    AgentInfo, CommandInfo, Config, FileDiff, LspStatus, McpStatus, MessageWithParts, PathInfo,
    Permission, Project, ProviderList, Pty, PtyCreate, PtyUpdate, Question, Session, SessionStatus,
    SessionUpdate, Todo, VcsInfo,
};
use mira_api::{ClientBackend, EventStream, RemoteClient};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ServerConfig;
use crate::events;

pub(crate) fn build(
    client: reqwest::Client,
    config: &ServerConfig,
    directory: Option<&Path>,
) -> RemoteClient {
    RemoteClient::new(HttpBackend {
        client,
        base_url: config.base_url.trim_end_matches('/').to_string(),
        directory: directory.map(|d| d.to_string_lossy().into_owned()),
    })
}

struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    /// The workspace this client is scoped to; attached to every request.
    directory: Option<String>,
}

impl HttpBackend {
    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(directory) = &self.directory {
            request = request.query(&[("directory", directory.as_str())]);
        }
        request
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(|e| Error::Http(Box::new(e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(Box::new(e)))?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.request(Method::GET, path)).await
    }

    async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send(self.request(Method::PATCH, path).json(body)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send(self.request(Method::POST, path).json(body)).await
    }
}

#[async_trait]
impl ClientBackend for HttpBackend {
    async fn project_list(&self) -> Result<Vec<Project>> {
        self.get("/project").await
    }

    async fn project_current(&self) -> Result<Project> {
        self.get("/project/current").await
    }

    async fn project_update(&self, project: &Project) -> Result<Project> {
        self.patch("/project/current", project).await
    }

    async fn provider_list(&self) -> Result<ProviderList> {
        self.get("/config/providers").await
    }

    async fn provider_auth(&self) -> Result<HashMap<String, serde_json::Value>> {
        self.get("/provider/auth").await
    }

    async fn config_get(&self) -> Result<Config> {
        self.get("/config").await
    }

    async fn config_update(&self, config: &Config) -> Result<Config> {
        self.patch("/config", config).await
    }

    async fn path_get(&self) -> Result<PathInfo> {
        self.get("/path").await
    }

    async fn command_list(&self) -> Result<Vec<CommandInfo>> {
        self.get("/command").await
    }

    async fn agent_list(&self) -> Result<Vec<AgentInfo>> {
        self.get("/agent").await
    }

    async fn session_list(&self) -> Result<Vec<Session>> {
        self.get("/session").await
    }

    async fn session_get(&self, session_id: &str) -> Result<Session> {
        self.get(&format!("/session/{session_id}")).await
    }

    async fn session_update(&self, session_id: &str, update: &SessionUpdate) -> Result<Session> {
        self.patch(&format!("/session/{session_id}"), update).await
    }

    async fn session_messages(
        &self,
        session_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<MessageWithParts>> {
        let mut request = self
            .request(Method::GET, &format!("/session/{session_id}/message"))
            .query(&[("limit", limit.to_string())]);
        if let Some(before) = before {
            request = request.query(&[("before", before)]);
        }
        self.send(request).await
    }

    async fn session_diff(&self, session_id: &str) -> Result<Vec<FileDiff>> {
        self.get(&format!("/session/{session_id}/diff")).await
    }

    async fn session_todo(&self, session_id: &str) -> Result<Vec<Todo>> {
        self.get(&format!("/session/{session_id}/todo")).await
    }

    async fn session_status(&self) -> Result<HashMap<String, SessionStatus>> {
        self.get("/session/status").await
    }

    async fn mcp_status(&self) -> Result<HashMap<String, McpStatus>> {
        self.get("/mcp").await
    }

    async fn lsp_status(&self) -> Result<Vec<LspStatus>> {
        self.get("/lsp").await
    }

    async fn vcs_get(&self) -> Result<Option<VcsInfo>> {
        self.get("/vcs").await
    }

    async fn permission_list(&self) -> Result<Vec<Permission>> {
        self.get("/permission").await
    }

    async fn question_list(&self) -> Result<Vec<Question>> {
        self.get("/question").await
    }

    async fn pty_create(&self, request: &PtyCreate) -> Result<Pty> {
        self.post("/pty", request).await
    }

    async fn pty_update(&self, pty_id: &str, request: &PtyUpdate) -> Result<Pty> {
        self.patch(&format!("/pty/{pty_id}"), request).await
    }

    async fn pty_remove(&self, pty_id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/pty/{pty_id}"))
            .send()
            .await
            .map_err(|e| Error::Http(Box::new(e)))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    fn events(&self) -> EventStream {
        Box::pin(events::open(
            self.client.clone(),
            format!("{}/event", self.base_url),
            self.directory.clone(),
        ))
    }
}
