use clap::{command, Parser};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(version)]
pub struct CliOpts {
	/// Path to the JSON configuration file (default: config.json)
	#[arg(short, long, value_name = "FILE")]
	pub config: Option<String>,
	/// HTTP port, overrides `port` from the configuration file
	#[arg(short, long)]
	pub port: Option<u16>,
	/// Node endpoint (HTTP URL or IPC path), overrides `endpointAddress`
	#[arg(short, long, value_name = "ADDRESS")]
	pub endpoint: Option<String>,
	/// Host the HTTP server binds to
	#[arg(long, default_value = "127.0.0.1")]
	pub http_server_host: String,
	/// Log level
	#[arg(long)]
	pub verbosity: Option<Level>,
	/// Set logs format to JSON
	#[arg(long)]
	pub logs_json: bool,
}
