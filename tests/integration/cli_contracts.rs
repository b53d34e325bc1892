use std::fs;

use branchdb::tooling::cli::{ChildCommands, Cli, CliContext, Commands};
use clap::Parser;
use tempfile::TempDir;

fn write_config(temp_dir: &TempDir) -> std::path::PathBuf {
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        format!(
            "[storage]\nbackend = \"sled\"\npath = {:?}\n",
            temp_dir.path().join("store")
        ),
    )
    .unwrap();
    config_path
}

fn context_for(args: &[&str]) -> (Cli, CliContext) {
    let cli = Cli::try_parse_from(args).unwrap();
    let config = CliContext::load_config(&cli).unwrap();
    let context = CliContext::new(&config).unwrap();
    (cli, context)
}

#[test]
fn commands_drive_one_session() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir);
    let (cli, ctx) = context_for(&[
        "branchdb",
        "--config",
        config_path.to_str().unwrap(),
        "--cache",
        "create",
        r#"{"Name":"A"}"#,
    ]);
    assert_eq!(ctx.branch().cache_status(), branchdb::CacheState::Enabled);

    let id = ctx.execute(&cli.command).unwrap();
    let child = ctx
        .execute(&Commands::Child {
            command: ChildCommands::Create {
                id: id.clone(),
                path: "/".to_string(),
            },
        })
        .unwrap();
    assert_eq!(child, format!("/{}", id));

    let nested = ctx
        .execute(&Commands::Create {
            value: r#"{"Name":"B"}"#.to_string(),
            path: child.clone(),
        })
        .unwrap();
    let read = ctx
        .execute(&Commands::Read {
            id: nested.clone(),
            path: child.clone(),
        })
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&read).unwrap();
    assert_eq!(parsed["Name"], "B");
    assert_eq!(parsed["_id"], nested.as_str());

    let ancestor = ctx
        .execute(&Commands::Ancestor {
            id: "root".to_string(),
            path: "/".to_string(),
        })
        .unwrap();
    assert_eq!(ancestor, "true");

    let delete_child = Commands::Child {
        command: ChildCommands::Delete {
            id: id.clone(),
            path: "/".to_string(),
        },
    };
    assert!(ctx.execute(&delete_child).is_err());
    ctx.execute(&Commands::Delete {
        id: nested,
        path: child,
    })
    .unwrap();
    ctx.execute(&delete_child).unwrap();

    let tree = ctx
        .execute(&Commands::Tree {
            path: "/".to_string(),
            id: None,
        })
        .unwrap();
    assert_eq!(tree, "{}");
}

#[test]
fn collections_json_contract_has_required_fields() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir);
    let cli = Cli::try_parse_from([
        "branchdb",
        "--config",
        config_path.to_str().unwrap(),
        "--store",
        temp_dir.path().join("override").to_str().unwrap(),
        "collections",
        "--format",
        "json",
    ])
    .unwrap();
    let config = CliContext::load_config(&cli).unwrap();
    assert_eq!(config.storage.path, Some(temp_dir.path().join("override")));

    let context = CliContext::new(&config).unwrap();
    let output = context
        .execute(&Commands::Collections {
            format: "json".to_string(),
        })
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    let collections = parsed["collections"].as_array().unwrap();
    assert!(collections.iter().any(|c| c == "root"));
    assert!(collections.iter().any(|c| c == "index"));
    assert_eq!(parsed["cache"], "Disabled");
}
