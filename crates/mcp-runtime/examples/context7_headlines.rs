//! Fetch the README docs for a React-adjacent package from Context7 and
//! print only the markdown headlines.
//!
//! Expects a `context7` entry in `config/mcp-runtime.json`.

use anyhow::Context;
use serde_json::{Map, Value, json};

use mcp_runtime::{LoadOptions, create_runtime, create_server_proxy};

fn arguments(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let runtime = create_runtime(&LoadOptions::default())?;
    let result = run(&runtime).await;
    runtime.close().await;
    result
}

async fn run(runtime: &mcp_runtime::Runtime) -> anyhow::Result<()> {
    let context7 = create_server_proxy(runtime, "context7")?;

    let resolved = context7
        .call(
            "resolve-library-id",
            arguments(json!({ "libraryName": "react" })),
        )
        .await?;
    let identifier_text = resolved.text().unwrap_or_default();
    let target = identifier_text
        .lines()
        .find_map(|line| line.split_once("Context7-compatible library ID:"))
        .map(|(_, id)| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .context("no Context7-compatible library ID resolved for React")?;

    let docs = context7
        .call(
            "get-library-docs",
            arguments(json!({ "context7CompatibleLibraryID": target })),
        )
        .await?;
    let markdown = docs.markdown().or_else(|| docs.text()).unwrap_or_default();
    let headlines: Vec<&str> = markdown
        .lines()
        .filter(|line| {
            let hashes = line.len() - line.trim_start_matches('#').len();
            hashes > 0 && line[hashes..].starts_with(' ')
        })
        .collect();

    println!("# Headlines for {target}");
    if headlines.is_empty() {
        println!("(no headlines found)");
    } else {
        println!("{}", headlines.join("\n"));
    }
    Ok(())
}
