//! Translates admitted requests into upstream calls.
//!
//! Reads and miner control wait for the node. Writes either wait for the
//! receipt or are handed to an [`Executor`] and acknowledged right away,
//! depending on the configured [`TransactionMode`].

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
	api::types::{Entity, Outcome},
	config::TransactionMode,
	network::rpc::{BlockId, Error, Node, TransactionRequest},
};

mod executor;

pub use executor::{execute, Executor, MockExecutor, SerialQueue, WorkItem, WorkerPool};

pub struct Dispatcher<C: Node> {
	client: C,
	endpoint: String,
	mode: TransactionMode,
	executor: Arc<dyn Executor>,
}

impl<C: Node> Dispatcher<C> {
	pub fn new(
		client: C,
		endpoint: String,
		mode: TransactionMode,
		executor: Arc<dyn Executor>,
	) -> Self {
		Self {
			client,
			endpoint,
			mode,
			executor,
		}
	}

	pub fn executor(&self) -> Arc<dyn Executor> {
		self.executor.clone()
	}

	pub async fn node_info(&self) -> Outcome {
		match self.client.call("admin_nodeInfo", vec![]).await {
			Ok(response) => match response.get("result") {
				Some(info @ Value::Object(_)) => Outcome::Found(info.clone()),
				_ => {
					warn!(%response, "Unexpected admin_nodeInfo response");
					Outcome::Malformed(Entity::NodeInfo)
				},
			},
			Err(error @ (Error::Rpc { .. } | Error::InvalidResponse(_))) => {
				warn!("Cannot get node info: {error}");
				Outcome::Malformed(Entity::NodeInfo)
			},
			Err(error) => upstream_failure("admin_nodeInfo", error),
		}
	}

	pub async fn block(&self, block: BlockId) -> Outcome {
		match self.client.get_block(block).await {
			Ok(Some(block)) => Outcome::Found(block),
			Ok(None) => {
				debug!(%block, "Block not found");
				Outcome::NotFound(Entity::Block)
			},
			Err(error) => upstream_failure("eth_getBlockByNumber", error),
		}
	}

	pub async fn transaction(&self, hash: String) -> Outcome {
		match self.client.get_transaction(hash.clone()).await {
			Ok(Some(transaction)) => Outcome::Found(transaction),
			Ok(None) => {
				debug!(hash, "Transaction not found");
				Outcome::NotFound(Entity::Transaction)
			},
			Err(error) => upstream_failure("eth_getTransactionByHash", error),
		}
	}

	pub async fn send_transaction(&self, transaction: TransactionRequest) -> Outcome {
		match self.mode {
			TransactionMode::Sync => match self.client.send_transaction(transaction).await {
				Ok(receipt) => Outcome::Found(receipt),
				Err(error) => upstream_failure("eth_sendTransaction", error),
			},
			TransactionMode::Async => {
				let item = WorkItem {
					endpoint: self.endpoint.clone(),
					payload: transaction,
				};
				match self.executor.submit(item) {
					Ok(()) => {
						debug!(pending = self.executor.pending(), "Transaction queued");
						Outcome::Accepted
					},
					Err(error) => {
						warn!("Cannot queue transaction: {error}");
						Outcome::Unavailable(error.to_string())
					},
				}
			},
		}
	}

	pub async fn start_miner(&self) -> Outcome {
		self.miner("miner_start", vec![Value::from(1)], Entity::MinerStart)
			.await
	}

	pub async fn stop_miner(&self) -> Outcome {
		self.miner("miner_stop", vec![], Entity::MinerStop).await
	}

	async fn miner(&self, method: &str, params: Vec<Value>, entity: Entity) -> Outcome {
		match self.client.call(method, params).await {
			Ok(Value::Object(mut response)) if response.contains_key("result") => {
				info!(method, "Miner control call succeeded");
				Outcome::Found(response.remove("result").unwrap_or_default())
			},
			Ok(response) => {
				warn!(method, %response, "Unexpected miner response");
				Outcome::Malformed(entity)
			},
			Err(error) => upstream_failure(method, error),
		}
	}
}

fn upstream_failure(method: &str, error: Error) -> Outcome {
	warn!(method, "Upstream call failed: {error}");
	Outcome::Upstream(error.to_string())
}
