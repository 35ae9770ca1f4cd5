use geth_gateway_core::config::{validate_reporting, Configuration};
use serde_json::Value;
use std::{fs, path::Path};
use tracing::warn;

use crate::cli::CliOpts;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Reads the configuration file as untyped JSON, `null` when it is missing or unparsable.
pub fn read_raw(path: &Path) -> Value {
	let content = match fs::read_to_string(path) {
		Ok(content) => content,
		Err(error) => {
			warn!(path = %path.display(), "Cannot read configuration file, using defaults: {error}");
			return Value::Null;
		},
	};

	serde_json::from_str(&content).unwrap_or_else(|error| {
		warn!(path = %path.display(), "Cannot parse configuration file, using defaults: {error}");
		Value::Null
	})
}

pub fn load_runtime_config(opts: &CliOpts) -> Configuration {
	let path = opts.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
	let raw = read_raw(Path::new(path));

	let (mut cfg, substituted) = validate_reporting(&raw);
	if !raw.is_null() {
		for key in substituted {
			warn!(key, "Configuration value is missing or invalid, using default");
		}
	}

	// Flags override the config parameters
	if let Some(port) = opts.port {
		cfg.port = port;
	}
	if let Some(endpoint) = &opts.endpoint {
		cfg.endpoint_address = endpoint.to_string();
	}
	cfg
}
