//! Config normalizer: `mcp-runtime.json` entries into [`ServerDefinition`]s.
//!
//! The input schema is deliberately permissive: every logical field accepts a
//! camelCase and a snake_case spelling, unknown fields are ignored, and all
//! fields are optional at parse time. Business rules (URL-vs-command
//! precedence, auth normalization, token cache placement) are enforced here,
//! once, so no aliasing leaks into downstream components.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::paths;

/// How to reach a server: streamable HTTP endpoint or spawned subprocess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CommandSpec {
    Http {
        url: Url,
        #[serde(skip_serializing_if = "Option::is_none")]
        headers: Option<BTreeMap<String, String>>,
    },
    Stdio {
        command: String,
        args: Vec<String>,
        cwd: PathBuf,
    },
}

/// Authentication policy for a server. Only oauth is recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    OAuth,
}

/// Normalized, immutable description of one configured or ephemeral server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub command: CommandSpec,
    /// Subprocess environment overlay; carried but ignored for HTTP servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthScheme>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
}

/// Options for [`load_server_definitions`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path; required to exist when set.
    pub config_path: Option<PathBuf>,
    /// Base for the default `config/mcp-runtime.json` lookup; defaults to the
    /// current directory.
    pub root_dir: Option<PathBuf>,
}

/// A `command` field may be a single string or an argv-style array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum CommandField {
    Line(String),
    Argv(Vec<String>),
}

/// Raw per-server record as declared in `mcp-runtime.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEntry {
    description: Option<String>,
    #[serde(rename = "baseUrl")]
    base_url: Option<String>,
    #[serde(rename = "base_url")]
    base_url_snake: Option<String>,
    url: Option<String>,
    #[serde(rename = "serverUrl")]
    server_url: Option<String>,
    #[serde(rename = "server_url")]
    server_url_snake: Option<String>,
    command: Option<CommandField>,
    executable: Option<String>,
    args: Option<Vec<String>>,
    headers: Option<BTreeMap<String, String>>,
    env: Option<BTreeMap<String, String>>,
    auth: Option<String>,
    #[serde(rename = "tokenCacheDir")]
    token_cache_dir: Option<String>,
    #[serde(rename = "token_cache_dir")]
    token_cache_dir_snake: Option<String>,
    #[serde(rename = "clientName")]
    client_name: Option<String>,
    #[serde(rename = "client_name")]
    client_name_snake: Option<String>,
    #[serde(rename = "bearerToken")]
    bearer_token: Option<String>,
    #[serde(rename = "bearer_token")]
    bearer_token_snake: Option<String>,
    #[serde(rename = "bearerTokenEnv")]
    bearer_token_env: Option<String>,
    #[serde(rename = "bearer_token_env")]
    bearer_token_env_snake: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    #[serde(rename = "mcpServers")]
    mcp_servers: BTreeMap<String, RawEntry>,
}

/// Load and normalize all server definitions from the config file.
///
/// An explicit `config_path` must exist; the default
/// `<root_dir>/config/mcp-runtime.json` is optional and its absence yields an
/// empty list.
pub fn load_server_definitions(options: &LoadOptions) -> Result<Vec<ServerDefinition>> {
    let (config_path, explicit) = resolve_config_path(options)?;
    let text = match std::fs::read_to_string(&config_path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if explicit {
                return Err(Error::ConfigMissing { path: config_path });
            }
            tracing::debug!("no config at default path {}", config_path.display());
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(Error::Io {
                path: config_path,
                source,
            });
        }
    };
    let raw: RawConfig = serde_json::from_str(&text).map_err(|source| Error::ConfigParse {
        path: config_path.clone(),
        source,
    })?;

    // Relative script paths in stdio args resolve against the config file's
    // directory, not the process cwd.
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let home = paths::home_dir();

    let mut servers = Vec::with_capacity(raw.mcp_servers.len());
    for (name, entry) in &raw.mcp_servers {
        servers.push(normalize_server_entry(
            name,
            entry,
            &base_dir,
            home.as_deref(),
        )?);
    }
    tracing::debug!(
        "loaded {} server definition(s) from {}",
        servers.len(),
        config_path.display()
    );
    Ok(servers)
}

fn resolve_config_path(options: &LoadOptions) -> Result<(PathBuf, bool)> {
    let absolute =
        |p: PathBuf| std::path::absolute(&p).map_err(|source| Error::Io { path: p, source });
    if let Some(path) = &options.config_path {
        return Ok((absolute(path.clone())?, true));
    }
    let root_dir = match &options.root_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().map_err(|source| Error::Io {
            path: PathBuf::from("."),
            source,
        })?,
    };
    Ok((
        absolute(root_dir.join("config").join("mcp-runtime.json"))?,
        false,
    ))
}

fn normalize_server_entry(
    name: &str,
    raw: &RawEntry,
    base_dir: &Path,
    home: Option<&Path>,
) -> Result<ServerDefinition> {
    let auth = normalize_auth(raw.auth.as_deref());
    let headers = build_headers(raw);

    let command = if let Some(url_text) = resolved_url(raw) {
        let url = Url::parse(url_text).map_err(|source| Error::InvalidUrl {
            name: name.to_string(),
            url: url_text.to_string(),
            source,
        })?;
        CommandSpec::Http { url, headers }
    } else if let Some((command, args)) = resolved_command(raw) {
        CommandSpec::Stdio {
            command,
            args,
            cwd: base_dir.to_path_buf(),
        }
    } else {
        return Err(Error::InvalidServer {
            name: name.to_string(),
        });
    };

    let token_cache_dir = match auth {
        // oauth always pins the cache under the home directory, overriding
        // any configured location for that server.
        Some(AuthScheme::OAuth) => {
            let home = home.ok_or_else(|| Error::HomeDirUnavailable {
                server: name.to_string(),
            })?;
            Some(paths::token_cache_dir(home, name))
        }
        None => first_non_empty(&[
            raw.token_cache_dir.as_ref(),
            raw.token_cache_dir_snake.as_ref(),
        ])
        .map(|dir| paths::expand_home(dir, home)),
    };

    Ok(ServerDefinition {
        name: name.to_string(),
        description: raw.description.clone(),
        command,
        env: raw.env.clone(),
        auth,
        token_cache_dir,
        client_name: first_non_empty(&[raw.client_name.as_ref(), raw.client_name_snake.as_ref()])
            .map(str::to_string),
    })
}

fn normalize_auth(auth: Option<&str>) -> Option<AuthScheme> {
    auth.filter(|a| a.eq_ignore_ascii_case("oauth"))
        .map(|_| AuthScheme::OAuth)
}

/// Ordered URL-family precedence; first non-empty spelling wins.
fn resolved_url(raw: &RawEntry) -> Option<&str> {
    first_non_empty(&[
        raw.base_url.as_ref(),
        raw.base_url_snake.as_ref(),
        raw.url.as_ref(),
        raw.server_url.as_ref(),
        raw.server_url_snake.as_ref(),
    ])
}

/// Command-family resolution: `command` (string or argv) then `executable`.
///
/// An argv-style `command` supplies both executable and args; a sibling
/// `args` field is ignored in that case. A string `command` (or
/// `executable`) has the sibling `args` appended.
fn resolved_command(raw: &RawEntry) -> Option<(String, Vec<String>)> {
    if let Some(CommandField::Argv(argv)) = &raw.command {
        if let Some((head, tail)) = argv.split_first()
            && !head.is_empty()
        {
            return Some((head.clone(), tail.to_vec()));
        }
        return None;
    }
    if let Some(CommandField::Line(line)) = &raw.command
        && !line.is_empty()
    {
        return Some((line.clone(), raw.args.clone().unwrap_or_default()));
    }
    let executable = raw.executable.as_deref().filter(|e| !e.is_empty())?;
    Some((executable.to_string(), raw.args.clone().unwrap_or_default()))
}

/// Start from explicit headers, then a literal bearer token, then an
/// env-indirected token. The env form is applied last and therefore wins
/// when both token fields are present.
fn build_headers(raw: &RawEntry) -> Option<BTreeMap<String, String>> {
    let mut headers = raw.headers.clone().unwrap_or_default();
    if let Some(token) =
        first_non_empty(&[raw.bearer_token.as_ref(), raw.bearer_token_snake.as_ref()])
    {
        headers.insert("Authorization".to_string(), format!("Bearer {token}"));
    }
    if let Some(var) = first_non_empty(&[
        raw.bearer_token_env.as_ref(),
        raw.bearer_token_env_snake.as_ref(),
    ]) {
        headers.insert("Authorization".to_string(), paths::env_indirection(var));
    }
    (!headers.is_empty()).then_some(headers)
}

fn first_non_empty<'a>(candidates: &[Option<&'a String>]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|c| c.map(String::as_str))
        .find(|s| !s.is_empty())
}
