//! Process-wide (but instance-owned) registry of server definitions and the
//! lazy, memoized transport session map.
//!
//! Sessions are opened on first use and reused per `(runtime, server name)`.
//! The registry lives behind a sync mutex (never held across await); the
//! session map lives behind an async mutex, which also serializes first-call
//! handshakes within one runtime. Multiple `Runtime` values in one process
//! are fully isolated; there is no ambient/global instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{StreamableHttpClientTransport, TokioChildProcess};
use rmcp::{RoleClient, ServiceExt};
use tokio::process::Command;

use crate::config::{CommandSpec, LoadOptions, ServerDefinition, load_server_definitions};
use crate::error::{Error, Result};
use crate::paths;

/// A live client session over either transport.
pub(crate) type Session = RunningService<RoleClient, RuntimeClientHandler>;

/// Registry of server definitions plus open sessions.
///
/// Callers own the runtime and are expected to call [`Runtime::close`] when
/// done; dropping without closing aborts sessions without a clean shutdown
/// (stdio children are still killed on drop).
pub struct Runtime {
    definitions: Mutex<Vec<ServerDefinition>>,
    sessions: tokio::sync::Mutex<HashMap<String, Arc<Session>>>,
    closed: AtomicBool,
}

/// Load the config file and register every definition into a fresh runtime.
pub fn create_runtime(options: &LoadOptions) -> Result<Runtime> {
    let runtime = Runtime::new();
    for definition in load_server_definitions(options)? {
        runtime.register_definition(definition);
    }
    Ok(runtime)
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// An empty runtime with no registered servers.
    pub fn new() -> Self {
        Self {
            definitions: Mutex::new(Vec::new()),
            sessions: tokio::sync::Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn definitions_guard(&self) -> MutexGuard<'_, Vec<ServerDefinition>> {
        // Recover from poisoning: the registry holds plain data.
        self.definitions.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Register a definition, replacing any existing one with the same name.
    pub fn register_definition(&self, definition: ServerDefinition) {
        let mut definitions = self.definitions_guard();
        if let Some(existing) = definitions.iter_mut().find(|d| d.name == definition.name) {
            tracing::warn!("replacing existing definition for server '{}'", definition.name);
            *existing = definition;
        } else {
            definitions.push(definition);
        }
    }

    /// Snapshot of all registered definitions, in registration order.
    pub fn definitions(&self) -> Vec<ServerDefinition> {
        self.definitions_guard().clone()
    }

    /// Look up one definition by name.
    pub fn definition(&self, name: &str) -> Option<ServerDefinition> {
        self.definitions_guard()
            .iter()
            .find(|d| d.name == name)
            .cloned()
    }

    /// Fetch or open the session for a definition.
    pub(crate) async fn session_for(&self, definition: &ServerDefinition) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.lock().await;
        // Checked under the lock: close() drains while holding it, so a
        // session can neither be opened nor inserted after the drain.
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        if let Some(session) = sessions.get(&definition.name) {
            return Ok(session.clone());
        }
        let session = Arc::new(open_session(definition).await?);
        sessions.insert(definition.name.clone(), session.clone());
        Ok(session)
    }

    /// Drop a failed session so a later call can re-attempt creation.
    pub(crate) async fn invalidate_session(&self, name: &str) {
        if self.sessions.lock().await.remove(name).is_some() {
            tracing::warn!("invalidated session for server '{}'", name);
        }
    }

    /// Shut down every open session. Idempotent; subsequent session requests
    /// fail with [`Error::Closed`].
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut sessions = self.sessions.lock().await;
        for (name, session) in sessions.drain() {
            tracing::debug!("closing session for server '{}'", name);
            match Arc::into_inner(session) {
                Some(service) => {
                    let _ = service.cancel().await;
                }
                None => {
                    tracing::warn!("session for '{}' still referenced at close; dropping", name);
                }
            }
        }
    }
}

/// Client handler advertising the definition's client name during the
/// handshake. All protocol mechanics stay with the rmcp defaults.
#[derive(Debug, Clone, Default)]
pub(crate) struct RuntimeClientHandler {
    client_name: Option<String>,
}

impl rmcp::ClientHandler for RuntimeClientHandler {
    fn get_info(&self) -> rmcp::model::ClientInfo {
        let mut info = rmcp::model::ClientInfo::default();
        if let Some(name) = &self.client_name {
            info.client_info.name = name.clone();
        }
        info
    }
}

async fn open_session(definition: &ServerDefinition) -> Result<Session> {
    match &definition.command {
        CommandSpec::Stdio { command, args, cwd } => {
            tracing::info!(
                "spawning stdio server '{}' (command={}, cwd={})",
                definition.name,
                command,
                cwd.display()
            );
            let mut cmd = Command::new(command);
            cmd.args(args).current_dir(cwd);
            if let Some(env) = &definition.env {
                cmd.envs(env);
            }
            let transport =
                TokioChildProcess::new(cmd).map_err(|e| transport_error(&definition.name, e))?;
            handler_for(definition)
                .serve(transport)
                .await
                .map_err(|e| transport_error(&definition.name, e))
        }
        CommandSpec::Http { url, headers } => {
            tracing::info!("connecting to http server '{}' at {}", definition.name, url);
            let header_map = resolve_header_map(&definition.name, headers.as_ref())?;
            let client = reqwest::Client::builder()
                .default_headers(header_map)
                .build()
                .map_err(|e| transport_error(&definition.name, e))?;
            let transport = StreamableHttpClientTransport::with_client(
                client,
                StreamableHttpClientTransportConfig {
                    uri: url.to_string().into(),
                    ..Default::default()
                },
            );
            handler_for(definition)
                .serve(transport)
                .await
                .map_err(|e| transport_error(&definition.name, e))
        }
    }
}

fn handler_for(definition: &ServerDefinition) -> RuntimeClientHandler {
    RuntimeClientHandler {
        client_name: definition.client_name.clone(),
    }
}

/// Resolve configured headers (including `$env:` indirections) into a header
/// map for the HTTP client. Resolution happens here, at session-open time,
/// so environment changes after config load are observed.
fn resolve_header_map(
    server: &str,
    headers: Option<&std::collections::BTreeMap<String, String>>,
) -> Result<reqwest::header::HeaderMap> {
    let mut header_map = reqwest::header::HeaderMap::new();
    let Some(headers) = headers else {
        return Ok(header_map);
    };
    for (name, value) in headers {
        let resolved = paths::resolve_header_value(server, value)?;
        let header_name =
            reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                Error::InvalidHeader {
                    server: server.to_string(),
                    header: name.clone(),
                }
            })?;
        let header_value =
            reqwest::header::HeaderValue::from_str(&resolved).map_err(|_| Error::InvalidHeader {
                server: server.to_string(),
                header: name.clone(),
            })?;
        header_map.insert(header_name, header_value);
    }
    Ok(header_map)
}

fn transport_error(server: &str, error: impl std::fmt::Display) -> Error {
    Error::Transport {
        server: server.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn stdio_definition(name: &str) -> ServerDefinition {
        ServerDefinition {
            name: name.to_string(),
            description: None,
            command: CommandSpec::Stdio {
                command: "server-bin".to_string(),
                args: Vec::new(),
                cwd: PathBuf::from("/tmp"),
            },
            env: None,
            auth: None,
            token_cache_dir: None,
            client_name: None,
        }
    }

    #[test]
    fn register_replaces_same_name() {
        let runtime = Runtime::new();
        runtime.register_definition(stdio_definition("a"));
        runtime.register_definition(stdio_definition("b"));
        let mut replacement = stdio_definition("a");
        replacement.description = Some("second".to_string());
        runtime.register_definition(replacement);

        let definitions = runtime.definitions();
        assert_eq!(definitions.len(), 2);
        // Registration order is preserved across replacement.
        assert_eq!(definitions[0].name, "a");
        assert_eq!(definitions[0].description.as_deref(), Some("second"));
        assert_eq!(definitions[1].name, "b");
    }

    #[test]
    fn definition_lookup_by_name() {
        let runtime = Runtime::new();
        runtime.register_definition(stdio_definition("known"));
        assert!(runtime.definition("known").is_some());
        assert!(runtime.definition("unknown").is_none());
    }

    #[tokio::test]
    async fn sessions_fail_after_close() {
        let runtime = Runtime::new();
        runtime.register_definition(stdio_definition("a"));
        runtime.close().await;
        // close is idempotent
        runtime.close().await;
        let err = runtime
            .session_for(&stdio_definition("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Closed));
    }

    #[tokio::test]
    async fn close_races_with_session_requests() {
        let runtime = Arc::new(Runtime::new());
        let requester = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.session_for(&stdio_definition("a")).await })
        };
        runtime.close().await;

        // Whichever side wins the lock, the request must not produce a
        // session that outlives the drain.
        assert!(requester.await.expect("requester task").is_err());
        let err = runtime
            .session_for(&stdio_definition("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Closed));
    }

    #[test]
    fn header_maps_resolve_literals() {
        let mut headers = std::collections::BTreeMap::new();
        headers.insert("X-Custom".to_string(), "1".to_string());
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());
        let map = resolve_header_map("srv", Some(&headers)).unwrap();
        assert_eq!(map.get("x-custom").unwrap(), "1");
        assert_eq!(map.get("authorization").unwrap(), "Bearer abc");
    }

    #[test]
    fn header_maps_reject_missing_env_indirection() {
        let mut headers = std::collections::BTreeMap::new();
        headers.insert(
            "Authorization".to_string(),
            "$env:MCP_RUNTIME_TEST_UNSET_VAR".to_string(),
        );
        let err = resolve_header_map("srv", Some(&headers)).unwrap_err();
        assert!(matches!(err, Error::MissingEnvVar { var, .. }
            if var == "MCP_RUNTIME_TEST_UNSET_VAR"));
    }

    #[test]
    fn header_maps_reject_unencodable_names() {
        let mut headers = std::collections::BTreeMap::new();
        headers.insert("bad header".to_string(), "1".to_string());
        let err = resolve_header_map("srv", Some(&headers)).unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { header, .. } if header == "bad header"));
    }
}
