#![doc = include_str!("../README.md")]

use crate::cli::CliOpts;
use clap::Parser;
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use geth_gateway_core::{
	admission::{run_pruning, AdmissionController, PRUNE_INTERVAL},
	api::server::Server,
	config::{Configuration, ExecutorPolicy},
	dispatch::{Dispatcher, Executor, SerialQueue, WorkerPool},
	network::rpc::{Connect, Factory, Transport},
	shutdown::{user_signal, Controller},
	utils::{default_subscriber, install_panic_hooks, json_subscriber, spawn_in_span},
};
use std::sync::Arc;
use tracing::{error, info, warn, Level};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod cli;
mod config;

/// Starts the write executor, limiter housekeeping and the HTTP server.
async fn run(
	cfg: Configuration,
	opts: &CliOpts,
	shutdown: &Controller,
) -> Result<Arc<dyn Executor>> {
	let version = clap::crate_version!();
	info!("Running Geth Gateway version: {version}.");
	info!("Using config: {cfg:?}");

	let factory = Arc::new(Factory::new(cfg.request_timeout, cfg.receipt_polling.clone()));
	let client = factory
		.build(&cfg.endpoint_address)
		.wrap_err("Unable to create node client")?;
	info!(
		endpoint = %cfg.endpoint_address,
		http = Transport::is_http(&cfg.endpoint_address),
		"Node client created"
	);

	let executor: Arc<dyn Executor> = match cfg.write_executor {
		ExecutorPolicy::Pool => Arc::new(WorkerPool::new(factory.clone(), cfg.worker)),
		ExecutorPolicy::Serial => Arc::new(SerialQueue::new(factory.clone())),
	};
	info!(policy = ?cfg.write_executor, mode = ?cfg.transaction_mode, "Write executor started");

	let admission = Arc::new(AdmissionController::new(&cfg));
	let monitor = shutdown
		.watch()
		.ok_or_else(|| eyre!("Shutdown already completed"))?;
	spawn_in_span(run_pruning(admission.clone(), PRUNE_INTERVAL, monitor));

	let dispatcher = Arc::new(Dispatcher::new(
		client,
		cfg.endpoint_address.clone(),
		cfg.transaction_mode,
		executor.clone(),
	));

	let server = Server {
		admission,
		dispatcher,
	};
	let monitor = shutdown
		.watch()
		.ok_or_else(|| eyre!("Shutdown already completed"))?;
	let (_, server) = server.bind(&opts.http_server_host, cfg.port, monitor)?;
	spawn_in_span(server);

	Ok(executor)
}

#[tokio::main]
pub async fn main() -> Result<()> {
	let mut shutdown = Controller::new();
	let opts = CliOpts::parse();
	let log_level = opts.verbosity.unwrap_or(Level::INFO);

	if opts.logs_json {
		tracing::subscriber::set_global_default(json_subscriber(log_level))?;
	} else {
		tracing::subscriber::set_global_default(default_subscriber(log_level))?;
	};

	// install custom panic hooks
	install_panic_hooks(shutdown.trigger())?;

	let cfg = config::load_runtime_config(&opts);

	let executor = match run(cfg, &opts, &shutdown).await {
		Ok(executor) => executor,
		Err(error) => {
			error!("{error:#}");
			shutdown.shutdown().await;
			return Err(error.wrap_err("Starting Geth Gateway failed"));
		},
	};

	tokio::select! {
		_ = user_signal() => info!("User signaled shutdown"),
		_ = shutdown.triggered() => warn!("Shutdown triggered"),
	}

	// stop accepting requests first, then drain the queued writes
	shutdown.shutdown().await;
	executor.shutdown().await;
	info!("Geth Gateway stopped");
	Ok(())
}
