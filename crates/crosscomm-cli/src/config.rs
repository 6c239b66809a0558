//! Configuration loading for the CLI
//!
//! Starts from the TOML file given with `--config` (or the defaults) and
//! applies command-line overrides on top.

use tracing::{debug, info};

use crosscomm_client::{ClientConfig, StoreConfig};

use crate::cli::Cli;
use crate::error::Result;

/// Build the client configuration from the file and command-line options
pub fn load_configuration(cli: &Cli) -> Result<ClientConfig> {
    let base = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            ClientConfig::load_from_file(path)?
        }
        None => ClientConfig::default(),
    };

    let config = apply_overrides(base, cli);
    config.validate()?;
    debug!("Using relay at {}", config.server_url());
    Ok(config)
}

fn apply_overrides(mut config: ClientConfig, cli: &Cli) -> ClientConfig {
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(client_id) = &cli.client_id {
        config.client_id = Some(client_id.clone());
    }
    if let Some(dir) = &cli.store_dir {
        config.store = StoreConfig::local(dir);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use crosscomm_client::StoreBackend;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let cli = Cli::try_parse_from(["crosscomm", "peers"]).unwrap();
        let config = load_configuration(&cli).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_flags_override_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.toml");
        ClientConfig::new("relay.lan", 7000)
            .with_client_id("from-file")
            .save_to_file(&path)
            .unwrap();

        let store_dir = dir.path().join("bucket");
        let cli = Cli::try_parse_from([
            "crosscomm",
            "--config",
            path.to_str().unwrap(),
            "--client-id",
            "from-flag",
            "--store-dir",
            store_dir.to_str().unwrap(),
            "peers",
        ])
        .unwrap();
        let config = load_configuration(&cli).unwrap();

        assert_eq!(config.host, "relay.lan");
        assert_eq!(config.port, 7000);
        assert_eq!(config.client_id.as_deref(), Some("from-flag"));
        assert_eq!(config.store.backend, StoreBackend::Local);
        assert_eq!(config.store.root.as_deref(), Some(store_dir.as_path()));
    }

    #[test]
    fn test_reserved_client_id_rejected() {
        let cli = Cli::try_parse_from(["crosscomm", "--client-id", "server", "peers"]).unwrap();
        assert!(load_configuration(&cli).is_err());
    }
}
