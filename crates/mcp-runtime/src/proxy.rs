//! Per-server proxy handles and the normalized call envelope.
//!
//! A [`ServerProxy`] borrows the runtime, pins one server definition, and
//! turns tool calls into [`CallResult`] envelopes. Remote tool failures come
//! back as `is_error = true` results; only transport and resolution problems
//! become [`Error`] values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use rmcp::model::{CallToolRequestParam, CallToolResult, RawContent, ResourceContents};

use crate::config::ServerDefinition;
use crate::error::{Error, Result};
use crate::runtime::Runtime;

/// How a proxy is addressed: by registered name, or by handing over a
/// definition directly (the ephemeral path).
#[derive(Debug, Clone)]
pub enum ProxyTarget {
    Name(String),
    Definition(ServerDefinition),
}

impl From<&str> for ProxyTarget {
    fn from(name: &str) -> Self {
        ProxyTarget::Name(name.to_string())
    }
}

impl From<String> for ProxyTarget {
    fn from(name: String) -> Self {
        ProxyTarget::Name(name)
    }
}

impl From<ServerDefinition> for ProxyTarget {
    fn from(definition: ServerDefinition) -> Self {
        ProxyTarget::Definition(definition)
    }
}

/// Resolve a proxy for a target. Fails with [`Error::UnknownTarget`] when a
/// name matches no registered definition; never opens a session by itself.
pub fn create_server_proxy<'a>(
    runtime: &'a Runtime,
    target: impl Into<ProxyTarget>,
) -> Result<ServerProxy<'a>> {
    let definition = match target.into() {
        ProxyTarget::Name(name) => runtime
            .definition(&name)
            .ok_or(Error::UnknownTarget { target: name })?,
        ProxyTarget::Definition(definition) => definition,
    };
    Ok(ServerProxy {
        runtime,
        definition,
    })
}

/// Handle for calling tools on one server through a shared runtime.
pub struct ServerProxy<'a> {
    runtime: &'a Runtime,
    definition: ServerDefinition,
}

impl ServerProxy<'_> {
    /// The definition this proxy is bound to.
    pub fn definition(&self) -> &ServerDefinition {
        &self.definition
    }

    /// Call a tool by name. The session is opened lazily on first use and
    /// reused afterwards; a transport failure evicts it so the next call
    /// starts fresh.
    pub async fn call(
        &self,
        tool: &str,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallResult> {
        let session = self.runtime.session_for(&self.definition).await?;
        tracing::debug!("calling tool '{}' on server '{}'", tool, self.definition.name);
        match session
            .call_tool(CallToolRequestParam {
                name: tool.to_string().into(),
                arguments,
            })
            .await
        {
            Ok(result) => Ok(CallResult::from_tool_result(result)),
            Err(error) => Err(self.session_failure(error).await),
        }
    }

    /// List the tools the server advertises.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let session = self.runtime.session_for(&self.definition).await?;
        match session.list_tools(Default::default()).await {
            Ok(result) => Ok(result
                .tools
                .into_iter()
                .map(|tool| ToolDescriptor {
                    name: tool.name.to_string(),
                    description: tool.description.map(|d| d.to_string()),
                })
                .collect()),
            Err(error) => Err(self.session_failure(error).await),
        }
    }

    async fn session_failure(&self, error: rmcp::ServiceError) -> Error {
        // A server-side protocol error leaves the session healthy; anything
        // else (closed channel, dead child, dropped connection) evicts it so
        // the next call re-opens.
        if !matches!(error, rmcp::ServiceError::McpError(_)) {
            self.runtime.invalidate_session(&self.definition.name).await;
        }
        Error::Transport {
            server: self.definition.name.clone(),
            message: error.to_string(),
        }
    }
}

/// A tool advertised by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Normalized outcome of a tool call, independent of transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    pub is_error: bool,
    pub content: Vec<ContentBlock>,
}

/// One content item from a tool result. Text and markdown get first-class
/// variants; everything else is carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Markdown { text: String },
    #[serde(untagged)]
    Other(Value),
}

impl CallResult {
    pub(crate) fn from_tool_result(result: CallToolResult) -> Self {
        let content = result.content.into_iter().map(convert_block).collect();
        Self {
            is_error: result.is_error.unwrap_or(false),
            content,
        }
    }

    /// All plain-text blocks joined with newlines, or `None` if there are
    /// none.
    pub fn text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n"))
    }

    /// All markdown blocks joined with newlines, or `None` if there are
    /// none.
    pub fn markdown(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Markdown { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n"))
    }
}

fn convert_block(block: rmcp::model::Content) -> ContentBlock {
    match &block.raw {
        RawContent::Text(text) => ContentBlock::Text {
            text: text.text.clone(),
        },
        RawContent::Resource(embedded) => match &embedded.resource {
            ResourceContents::TextResourceContents {
                mime_type: Some(mime),
                text,
                ..
            } if mime == "text/markdown" => ContentBlock::Markdown { text: text.clone() },
            _ => passthrough_block(&block),
        },
        _ => passthrough_block(&block),
    }
}

fn passthrough_block(block: &rmcp::model::Content) -> ContentBlock {
    ContentBlock::Other(serde_json::to_value(block).unwrap_or(Value::Null))
}
