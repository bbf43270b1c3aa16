use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Map, Value};

use paxful_client::config::CliArgs;
use paxful_client::{InvokeBody, PaxfulApi};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();

    // Initialize logging with a configured level
    let log_level = args.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    let method = args.method.to_uppercase();
    let path = args.path.clone();
    let payload = parse_payload(&args.data)?;
    let config = args.into_configuration()?;

    tracing::debug!(
        "Configured hosts: oauth={} data={}",
        config.oauth_host,
        config.data_host
    );

    let api = PaxfulApi::new(config, None)?;
    let payload = (!payload.is_empty()).then_some(&payload);

    let result: Value = match method.as_str() {
        "GET" => api.get::<Value>(&path, payload).await,
        "DELETE" => api.delete::<Value>(&path, payload).await,
        "POST" => api.post::<Value>(&path, payload).await,
        "PUT" => api.put::<Value>(&path, payload).await,
        "PATCH" => api.patch::<Value>(&path, payload).await,
        "INVOKE" => api.invoke::<Value>(&path, payload).await,
        other => anyhow::bail!("Unsupported method: {}", other),
    }
    .with_context(|| format!("{} {} failed", method, path))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Parse `key=value` pairs; values that parse as JSON keep their type and
/// dotted keys build nested objects (`offer.type=buy`)
fn parse_payload(entries: &[String]) -> Result<InvokeBody> {
    let mut root = Map::new();
    for entry in entries {
        let (key, raw) = entry
            .split_once('=')
            .with_context(|| format!("Invalid data entry '{}', expected key=value", entry))?;
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        insert_nested(&mut root, key, value)?;
    }
    Ok(InvokeBody::from(root))
}

fn insert_nested(root: &mut Map<String, Value>, key: &str, value: Value) -> Result<()> {
    let (parents, leaf) = match key.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, key),
    };

    let mut node = root;
    for segment in parents.into_iter().flat_map(|p| p.split('.')) {
        node = node
            .entry(segment)
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .with_context(|| format!("Data entry '{}' conflicts with an earlier value at '{}'", key, segment))?;
    }
    node.insert(leaf.to_string(), value);
    Ok(())
}
