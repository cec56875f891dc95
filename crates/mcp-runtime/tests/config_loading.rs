use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use mcp_runtime::{CommandSpec, Error, LoadOptions, load_server_definitions};

fn write_config(root: &TempDir, contents: &str) -> PathBuf {
    let config_dir = root.path().join("config");
    fs::create_dir_all(&config_dir).expect("create config dir");
    let path = config_dir.join("mcp-runtime.json");
    fs::write(&path, contents).expect("write config");
    path
}

#[test]
fn missing_default_config_yields_no_servers() {
    let root = TempDir::new().expect("tempdir");
    let servers = load_server_definitions(&LoadOptions {
        config_path: None,
        root_dir: Some(root.path().to_path_buf()),
    })
    .expect("load");
    assert!(servers.is_empty());
}

#[test]
fn missing_explicit_config_is_an_error() {
    let root = TempDir::new().expect("tempdir");
    let missing = root.path().join("nope.json");
    let err = load_server_definitions(&LoadOptions {
        config_path: Some(missing.clone()),
        root_dir: None,
    })
    .expect_err("must fail");
    assert!(matches!(err, Error::ConfigMissing { path } if path == missing));
}

#[test]
fn config_without_server_map_yields_no_servers() {
    let root = TempDir::new().expect("tempdir");
    write_config(&root, r#"{ "unrelated": true }"#);
    let servers = load_server_definitions(&LoadOptions {
        config_path: None,
        root_dir: Some(root.path().to_path_buf()),
    })
    .expect("load");
    assert!(servers.is_empty());
}

#[test]
fn malformed_json_is_a_parse_error() {
    let root = TempDir::new().expect("tempdir");
    let path = write_config(&root, "{ not json");
    let err = load_server_definitions(&LoadOptions {
        config_path: Some(path.clone()),
        root_dir: None,
    })
    .expect_err("must fail");
    assert!(matches!(err, Error::ConfigParse { path: p, .. } if p == path));
}

#[test]
fn definitions_normalize_and_sort_by_name() {
    let root = TempDir::new().expect("tempdir");
    let path = write_config(
        &root,
        r#"{
            "mcpServers": {
                "zeta": { "command": "node", "args": ["server.js"] },
                "alpha": {
                    "serverUrl": "https://alpha.example/mcp",
                    "bearerTokenEnv": "ALPHA_KEY"
                }
            }
        }"#,
    );

    let servers = load_server_definitions(&LoadOptions {
        config_path: None,
        root_dir: Some(root.path().to_path_buf()),
    })
    .expect("load");
    assert_eq!(servers.len(), 2);
    assert_eq!(servers[0].name, "alpha");
    assert_eq!(servers[1].name, "zeta");

    match &servers[0].command {
        CommandSpec::Http { url, headers } => {
            assert_eq!(url.as_str(), "https://alpha.example/mcp");
            let headers = headers.as_ref().expect("headers");
            assert_eq!(
                headers.get("Authorization").map(String::as_str),
                Some("$env:ALPHA_KEY")
            );
        }
        other => panic!("expected http spec, got {other:?}"),
    }

    match &servers[1].command {
        CommandSpec::Stdio { command, args, cwd } => {
            assert_eq!(command, "node");
            assert_eq!(args, &["server.js"]);
            // Relative stdio paths resolve against the config file's
            // directory.
            assert_eq!(cwd, &path.parent().expect("parent").to_path_buf());
        }
        other => panic!("expected stdio spec, got {other:?}"),
    }
}

#[test]
fn explicit_config_path_is_honored() {
    let root = TempDir::new().expect("tempdir");
    let path = root.path().join("custom.json");
    fs::write(
        &path,
        r#"{ "mcpServers": { "solo": { "url": "https://solo.example/" } } }"#,
    )
    .expect("write config");

    let servers = load_server_definitions(&LoadOptions {
        config_path: Some(path),
        root_dir: None,
    })
    .expect("load");
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].name, "solo");
}

#[test]
fn invalid_entries_fail_the_whole_load() {
    let root = TempDir::new().expect("tempdir");
    let path = write_config(
        &root,
        r#"{
            "mcpServers": {
                "good": { "url": "https://good.example/" },
                "bad": { "description": "no url, no command" }
            }
        }"#,
    );
    let err = load_server_definitions(&LoadOptions {
        config_path: Some(path),
        root_dir: None,
    })
    .expect_err("must fail");
    assert!(matches!(err, Error::InvalidServer { name } if name == "bad"));
}
