//! Ephemeral target resolution for ad-hoc package-runner invocations.
//!
//! A call target like `"npx -y xcodebuildmcp"` that matches no registered
//! server name is parsed into a synthetic stdio [`ServerDefinition`] so the
//! caller can invoke tools on it without touching the config file. The
//! synthetic definition is returned for one-shot use and is never inserted
//! into the runtime's registry.

use std::path::PathBuf;

use crate::config::{CommandSpec, ServerDefinition};
use crate::runtime::Runtime;

/// Outcome of [`resolve_ephemeral_target`].
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// The (possibly rewritten) target string; for a synthesized definition
    /// this is the derived server name so `<name>.<tool>` addressing works.
    pub target: String,
    /// Synthetic definition when the target parsed as a runner invocation.
    pub definition: Option<ServerDefinition>,
}

/// Single-token package runners.
const LAUNCHERS: &[&str] = &["npx", "bunx", "pnpx", "uvx"];

/// Runners invoked through a subcommand, e.g. `pnpm dlx <pkg>`.
const SUBCOMMAND_LAUNCHERS: &[(&str, &str)] = &[("pnpm", "dlx"), ("yarn", "dlx"), ("bun", "x")];

/// Resolve a free-form call target against the runtime's registry.
///
/// A leading segment (up to the first `.` or whitespace) that names a
/// registered server short-circuits: the original string is returned
/// unchanged. Otherwise the whole string is tried as a package-runner
/// invocation; anything unparseable is also returned unchanged with no
/// definition, and the caller surfaces the unknown-target error.
pub fn resolve_ephemeral_target(runtime: &Runtime, target: &str) -> ResolvedTarget {
    let head = leading_segment(target);
    if runtime.definition(head).is_some() {
        return ResolvedTarget {
            target: target.to_string(),
            definition: None,
        };
    }

    let Some((launcher, args, package)) = parse_runner_invocation(target) else {
        return ResolvedTarget {
            target: target.to_string(),
            definition: None,
        };
    };

    let name = derive_server_name(&package);
    tracing::debug!(
        "synthesized ephemeral server '{}' from invocation '{}' (command={})",
        name,
        target,
        launcher
    );
    let definition = ServerDefinition {
        name: name.clone(),
        description: None,
        command: CommandSpec::Stdio {
            command: launcher,
            args,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        },
        env: None,
        auth: None,
        token_cache_dir: None,
        client_name: None,
    };
    ResolvedTarget {
        target: name,
        definition: Some(definition),
    }
}

fn leading_segment(target: &str) -> &str {
    target
        .split(|c: char| c == '.' || c.is_whitespace())
        .next()
        .unwrap_or(target)
}

/// Parse `target` as `<launcher> [flags] <package> [rest...]`.
///
/// Returns the launcher executable, every token after it (the stdio args),
/// and the package identifier token.
fn parse_runner_invocation(target: &str) -> Option<(String, Vec<String>, String)> {
    let tokens: Vec<&str> = target.split_whitespace().collect();
    let (first, rest) = tokens.split_first()?;
    let base = launcher_basename(first);

    let package_tokens: &[&str] = if LAUNCHERS.contains(&base) {
        rest
    } else if SUBCOMMAND_LAUNCHERS
        .iter()
        .any(|(cmd, sub)| *cmd == base && rest.first() == Some(sub))
    {
        // Skip the subcommand when searching for the package identifier.
        &rest[1..]
    } else {
        return None;
    };

    let package = package_tokens
        .iter()
        .find(|tok| !tok.starts_with('-'))?
        .to_string();
    let args = rest.iter().map(|t| t.to_string()).collect();
    Some((first.to_string(), args, package))
}

/// A launcher may be referenced through a path; match on its file name.
fn launcher_basename(token: &str) -> &str {
    std::path::Path::new(token)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or(token)
}

/// Derive the server name from a package identifier: strip any scope prefix
/// and version suffix, then keep the final path segment.
/// `@scope/tool@1.2` becomes `tool`.
fn derive_server_name(package: &str) -> String {
    let without_version = if let Some(rest) = package.strip_prefix('@') {
        match rest.rsplit_once('@') {
            Some((head, _)) => format!("@{head}"),
            None => package.to_string(),
        }
    } else {
        match package.split_once('@') {
            Some((head, _)) => head.to_string(),
            None => package.to_string(),
        }
    };
    without_version
        .rsplit('/')
        .next()
        .unwrap_or(&without_version)
        .to_string()
}
