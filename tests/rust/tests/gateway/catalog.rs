//! Connector catalog loading tests

use std::collections::HashMap;

use mcphub_core::{ConnectorCatalog, InMemoryConnectorCatalog, TransportKind};
use mcphub_gateway::pool::transport::resolution::resolve;
use mcphub_gateway::ResolvedTransport;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const CATALOG: &str = r#"[
  {
    "name": "filesystem",
    "description": "Local files",
    "transportType": "STDIO",
    "command": "npx",
    "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
  },
  {
    "name": "notion",
    "transportType": "STDIO",
    "command": "npx",
    "args": "-y @notionhq/notion-mcp-server",
    "envTemplate": { "NOTION_TOKEN": "", "NOTION_VERSION": "2022-06-28" }
  },
  {
    "name": "weather",
    "transportType": "STREAMABLE_HTTP",
    "serverUrl": "https://weather.example.com/mcp"
  },
  {
    "name": "legacy",
    "transportType": "SSE",
    "serverUrl": "https://legacy.example.com/sse",
    "enabled": false
  }
]"#;

async fn load(content: &str) -> anyhow::Result<InMemoryConnectorCatalog> {
    let dir = TempDir::new()?;
    let path = dir.path().join("connectors.json");
    tokio::fs::write(&path, content).await?;
    InMemoryConnectorCatalog::from_json_file(&path).await
}

#[tokio::test]
async fn test_load_catalog_file() {
    let catalog = load(CATALOG).await.unwrap();

    let all = catalog.list_all().await.unwrap();
    let names: Vec<_> = all.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["filesystem", "notion", "weather", "legacy"]);

    let enabled = catalog.list_enabled().await.unwrap();
    let names: Vec<_> = enabled.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["filesystem", "notion", "weather"]);

    let weather = catalog.find_by_name("weather").await.unwrap().unwrap();
    assert_eq!(weather.transport, TransportKind::StreamableHttp);
    assert!(catalog.find_by_name("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_array_and_string_args_resolve_alike() {
    let catalog = load(CATALOG).await.unwrap();
    let env = HashMap::new();

    let filesystem = catalog.find_by_name("filesystem").await.unwrap().unwrap();
    match resolve(&filesystem, &env).unwrap() {
        ResolvedTransport::Stdio { args, .. } => assert_eq!(
            args.iter().rev().take(3).rev().cloned().collect::<Vec<_>>(),
            vec!["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
        ),
        other => panic!("expected stdio, got {:?}", other),
    }

    let notion = catalog.find_by_name("notion").await.unwrap().unwrap();
    match resolve(&notion, &env).unwrap() {
        ResolvedTransport::Stdio { args, .. } => {
            assert_eq!(args.last().map(String::as_str), Some("@notionhq/notion-mcp-server"))
        }
        other => panic!("expected stdio, got {:?}", other),
    }
}

#[tokio::test]
async fn test_env_template_resolution() {
    let catalog = load(CATALOG).await.unwrap();
    let notion = catalog.find_by_name("notion").await.unwrap().unwrap();

    // Token has no default and is unset: left out. Version falls back.
    let env = notion.resolve_env(|_| None);
    assert_eq!(env.get("NOTION_TOKEN"), None);
    assert_eq!(env.get("NOTION_VERSION").map(String::as_str), Some("2022-06-28"));

    let env = notion.resolve_env(|key| (key == "NOTION_TOKEN").then(|| "secret".to_string()));
    assert_eq!(env.get("NOTION_TOKEN").map(String::as_str), Some("secret"));
}

#[tokio::test]
async fn test_duplicate_names_rejected() {
    let duplicate = r#"[
      { "name": "a", "transportType": "STDIO", "command": "npx" },
      { "name": "a", "transportType": "STDIO", "command": "uvx" }
    ]"#;
    assert!(load(duplicate).await.is_err());
}

#[tokio::test]
async fn test_malformed_file_rejected() {
    assert!(load("{ not json").await.is_err());
}
