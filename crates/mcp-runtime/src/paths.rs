//! Home-directory expansion and environment-variable header indirection.
//!
//! Headers constructed at config load time may carry a `$env:NAME` marker
//! instead of a literal value; the marker is resolved against the process
//! environment only when a session is opened, so the variable may change
//! between load and first call.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Prefix marking a header value as an environment-variable indirection.
pub const ENV_HEADER_PREFIX: &str = "$env:";

/// Resolve the user's home directory from `HOME` (or `USERPROFILE` on
/// Windows hosts).
pub fn home_dir() -> Option<PathBuf> {
    if let Ok(home) = std::env::var("HOME")
        && !home.is_empty()
    {
        return Some(PathBuf::from(home));
    }
    if let Ok(profile) = std::env::var("USERPROFILE")
        && !profile.is_empty()
    {
        return Some(PathBuf::from(profile));
    }
    None
}

/// Expand a leading `~/` against the given home directory.
pub fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = home
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}

/// Deterministic token cache directory for an oauth server.
pub fn token_cache_dir(home: &Path, server_name: &str) -> PathBuf {
    home.join(".mcp-runtime").join(server_name)
}

/// Build the indirection marker for a named environment variable.
pub fn env_indirection(var: &str) -> String {
    format!("{ENV_HEADER_PREFIX}{var}")
}

/// Resolve a header value, following an `$env:` marker if present.
pub fn resolve_header_value(server: &str, value: &str) -> Result<String> {
    resolve_header_with(server, value, |var| std::env::var(var).ok())
}

fn resolve_header_with<F>(server: &str, value: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(var) = value.strip_prefix(ENV_HEADER_PREFIX) else {
        return Ok(value.to_string());
    };
    lookup(var).ok_or_else(|| Error::MissingEnvVar {
        server: server.to_string(),
        var: var.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_rewrites_leading_tilde() {
        let home = PathBuf::from("/home/alice");
        assert_eq!(
            expand_home("~/tokens/linear", Some(&home)),
            PathBuf::from("/home/alice/tokens/linear")
        );
        // No home: keep the path as-is.
        assert_eq!(expand_home("~/tokens", None), PathBuf::from("~/tokens"));
        // Only a leading `~/` is special.
        assert_eq!(expand_home("/etc/~", Some(&home)), PathBuf::from("/etc/~"));
    }

    #[test]
    fn token_cache_dir_is_home_scoped() {
        let dir = token_cache_dir(Path::new("/home/alice"), "linear");
        assert_eq!(dir, PathBuf::from("/home/alice/.mcp-runtime/linear"));
    }

    #[test]
    fn literal_header_values_pass_through() {
        let v = resolve_header_with("srv", "Bearer abc123", |_| None).unwrap();
        assert_eq!(v, "Bearer abc123");
    }

    #[test]
    fn env_marker_resolves_at_lookup_time() {
        let v = resolve_header_with("srv", "$env:API_KEY", |var| {
            assert_eq!(var, "API_KEY");
            Some("s3cret".to_string())
        })
        .unwrap();
        assert_eq!(v, "s3cret");
    }

    #[test]
    fn missing_env_var_is_a_configuration_error() {
        let err = resolve_header_with("srv", "$env:NOPE", |_| None).unwrap_err();
        match err {
            Error::MissingEnvVar { server, var } => {
                assert_eq!(server, "srv");
                assert_eq!(var, "NOPE");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
