//! Error taxonomy for target resolution and transport dispatch.
//!
//! Remote tool failures are deliberately *not* represented here: a tool that
//! reports its own error still produces a well-formed [`crate::CallResult`]
//! with `is_error = true`. Only configuration, resolution, and transport
//! problems surface as [`Error`].

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An explicitly supplied config path does not exist.
    #[error("config file not found at {path}")]
    ConfigMissing { path: PathBuf },

    /// The config file exists but is not valid JSON for the expected shape.
    #[error("failed to parse config {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An I/O failure while reading the config file.
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Entry resolved neither a URL-family nor a command-family field.
    #[error("server '{name}' is missing a baseUrl/url or command definition")]
    InvalidServer { name: String },

    /// A URL-family field resolved but does not parse as a URL.
    #[error("server '{name}' has an invalid url '{url}'")]
    InvalidUrl {
        name: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A configured header cannot be encoded into an HTTP header.
    #[error("server '{server}' has an invalid header '{header}'")]
    InvalidHeader { server: String, header: String },

    /// A `$env:`-indirected header references a variable that is not set.
    #[error("environment variable '{var}' referenced by server '{server}' is not set")]
    MissingEnvVar { server: String, var: String },

    /// OAuth token caching requires a resolvable home directory.
    #[error("cannot resolve a home directory for the token cache of server '{server}'")]
    HomeDirUnavailable { server: String },

    /// The call target matches no registered server and no known invocation
    /// pattern.
    #[error("unknown server or target '{target}'")]
    UnknownTarget { target: String },

    /// Spawn, connect, or in-flight transport failure for one session.
    #[error("transport error for server '{server}': {message}")]
    Transport { server: String, message: String },

    /// A session was requested after `Runtime::close()`.
    #[error("runtime has been closed")]
    Closed,
}
