//! Client-side MCP plumbing: load server definitions from a JSON config,
//! resolve ad-hoc package-runner targets, and call tools through lazily
//! opened, memoized sessions over stdio or streamable HTTP.
//!
//! ```no_run
//! use mcp_runtime::{LoadOptions, create_runtime, create_server_proxy};
//!
//! # async fn demo() -> mcp_runtime::Result<()> {
//! let runtime = create_runtime(&LoadOptions::default())?;
//! let proxy = create_server_proxy(&runtime, "context7")?;
//! let result = proxy.call("resolve-library-id", None).await?;
//! if let Some(text) = result.text() {
//!     println!("{text}");
//! }
//! runtime.close().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod ephemeral;
mod error;
mod paths;
mod proxy;
mod runtime;

pub use config::{
    AuthScheme, CommandSpec, LoadOptions, ServerDefinition, load_server_definitions,
};
pub use ephemeral::{ResolvedTarget, resolve_ephemeral_target};
pub use error::{Error, Result};
pub use proxy::{
    CallResult, ContentBlock, ProxyTarget, ServerProxy, ToolDescriptor, create_server_proxy,
};
pub use runtime::{Runtime, create_runtime};
