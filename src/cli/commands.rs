//! CLI command implementations
//!
//! Every command builds a gateway from the configuration, handles exactly
//! one request (or none, for `collections`) and writes one JSON line.
//! Request failures are printed as envelopes and still exit 0; only
//! configuration, seed and I/O problems are CLI errors.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::gateway::{GatewayConfig, MemoryStore, QueryGateway, QueryRequest, QueryResult};
use crate::observability::GatewayEvent;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_request, write_json};

/// Dispatch a parsed command
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Collections { config } => collections(config.as_deref()),
        Command::Check { config } => check(config.as_deref()),
        Command::Exec { config, seed } => exec(config.as_deref(), seed.as_deref()),
    }
}

/// Load the configuration file, or defaults when no path is given
pub fn load_config(path: Option<&Path>) -> CliResult<GatewayConfig> {
    let config = match path {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };
    info!(
        event = GatewayEvent::ConfigLoaded.as_str(),
        source = %path.map_or_else(|| "defaults".to_string(), |p| p.display().to_string()),
        "config loaded"
    );
    Ok(config)
}

/// Load a seed file into a fresh memory store
pub fn load_seed(path: Option<&Path>) -> CliResult<MemoryStore> {
    let Some(path) = path else {
        return Ok(MemoryStore::new());
    };
    let content = fs::read_to_string(path)
        .map_err(|e| CliError::seed_error(format!("Failed to read seed: {}", e)))?;
    let seed: Value = serde_json::from_str(&content)
        .map_err(|e| CliError::seed_error(format!("Invalid seed JSON: {}", e)))?;
    Ok(MemoryStore::from_json(&seed)?)
}

/// Print collections and permitted operations
pub fn collections(config_path: Option<&Path>) -> CliResult<()> {
    let config = load_config(config_path)?;
    let gateway = QueryGateway::new(Arc::new(MemoryStore::new()), config);
    write_json(&gateway.capabilities())
}

/// Validate one stdin request and print the prepared plan
pub fn check(config_path: Option<&Path>) -> CliResult<()> {
    let config = load_config(config_path)?;
    let line = read_request()?;
    write_json(&check_request(config, &line))
}

/// Execute one stdin request against a seeded memory store
pub fn exec(config_path: Option<&Path>, seed_path: Option<&Path>) -> CliResult<()> {
    let config = load_config(config_path)?;
    let store = load_seed(seed_path)?;
    let line = read_request()?;
    write_json(&exec_request(config, store, &line)?)
}

/// Dry run: never reaches a store
pub fn check_request(config: GatewayConfig, line: &str) -> QueryResult {
    let gateway = QueryGateway::new(Arc::new(MemoryStore::new()), config);
    match QueryRequest::parse(line) {
        Ok(request) => gateway.check(&request),
        Err(e) => e.into(),
    }
}

/// Run one request on a single-threaded runtime
pub fn exec_request(config: GatewayConfig, store: MemoryStore, line: &str) -> CliResult<QueryResult> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::runtime_error(format!("Failed to start runtime: {}", e)))?;

    let gateway = QueryGateway::new(Arc::new(store), config);
    Ok(runtime.block_on(gateway.execute_json(line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn seed_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn test_load_config_invalid() {
        let file = seed_file(r#"{"maxLimit": 0}"#);
        let err = load_config(Some(file.path())).unwrap_err();
        assert_eq!(err.code_str(), "QG_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_load_seed_errors() {
        let file = seed_file("[1, 2]");
        assert_eq!(load_seed(Some(file.path())).unwrap_err().code_str(), "QG_CLI_SEED_ERROR");

        let file = seed_file("{oops");
        assert_eq!(load_seed(Some(file.path())).unwrap_err().code_str(), "QG_CLI_SEED_ERROR");

        let missing = Path::new("/nonexistent/querygate-seed.json");
        assert_eq!(load_seed(Some(missing)).unwrap_err().code_str(), "QG_CLI_SEED_ERROR");
    }

    #[test]
    fn test_check_request_plan_and_rejection() {
        let res = check_request(
            GatewayConfig::default(),
            r#"{"collection":"payrolls","operation":"aggregate","pipeline":[{"$match":{"period":"2024-05"}}]}"#,
        );
        assert!(res.success);
        let plan = res.data.unwrap();
        assert_eq!(plan["pipeline"].as_array().unwrap().len(), 2);

        let res = check_request(
            GatewayConfig::default(),
            r#"{"collection":"secrets","operation":"find"}"#,
        );
        assert!(!res.success);
        assert_eq!(res.code.as_deref(), Some("GATEWAY_COLLECTION_NOT_ALLOWED"));
    }

    #[test]
    fn test_exec_request_against_seed() {
        let file = seed_file(
            r#"{"users": [
                {"name": "Ann", "role": "admin"},
                {"name": "Bob", "role": "teacher"},
                {"name": "Cy", "role": "admin"}
            ]}"#,
        );
        let store = load_seed(Some(file.path())).unwrap();
        let res = exec_request(
            GatewayConfig::default(),
            store,
            r#"{"collection":"users","operation":"find","filter":{"role":"admin"}}"#,
        )
        .unwrap();
        assert!(res.success);
        assert_eq!(res.data.unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_exec_request_read_only_config() {
        let res = exec_request(
            GatewayConfig::read_only(),
            MemoryStore::new(),
            r#"{"collection":"users","operation":"insertOne","document":{"name":"Eve"}}"#,
        )
        .unwrap();
        assert!(!res.success);
        assert_eq!(res.code.as_deref(), Some("GATEWAY_OPERATION_NOT_ALLOWED"));
    }
}
