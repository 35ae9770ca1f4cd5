use async_trait::async_trait;
use serde_json::Value;
use std::{
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio_retry::RetryIf;
use tracing::debug;

use super::{
	check_response,
	configuration::{RetryConfig, DEFAULT_REQUEST_TIMEOUT},
	optional_result, BlockId, Connect, Error, Node, Request, TransactionRequest, Transport,
};

/// JSON-RPC client bound to a single upstream endpoint.
#[derive(Clone, Debug)]
pub struct Client {
	transport: Transport,
	receipt_polling: RetryConfig,
	next_id: Arc<AtomicU64>,
}

impl Client {
	pub fn new(transport: Transport, receipt_polling: RetryConfig) -> Self {
		let first_id = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|elapsed| elapsed.as_millis() as u64)
			.unwrap_or_default();

		Self {
			transport,
			receipt_polling,
			next_id: Arc::new(AtomicU64::new(first_id)),
		}
	}

	fn request(&self, method: &str, params: Vec<Value>) -> Request {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		Request::new(method, params, id)
	}

	async fn receipt(&self, hash: &str) -> Result<Value, Error> {
		let response = self
			.call("eth_getTransactionReceipt", vec![Value::from(hash)])
			.await?;
		optional_result(response)?.ok_or_else(|| Error::Pending(hash.to_string()))
	}
}

#[async_trait]
impl Node for Client {
	async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, Error> {
		let request = self.request(method, params);
		let response = self.transport.send(&request).await?;
		check_response(response)
	}

	async fn get_block(&self, block: BlockId) -> Result<Option<Value>, Error> {
		let params = vec![block.to_param(), Value::Bool(false)];
		let response = self.call("eth_getBlockByNumber", params).await?;
		optional_result(response)
	}

	async fn get_transaction(&self, hash: String) -> Result<Option<Value>, Error> {
		let response = self
			.call("eth_getTransactionByHash", vec![Value::String(hash)])
			.await?;
		optional_result(response)
	}

	async fn send_transaction(&self, transaction: TransactionRequest) -> Result<Value, Error> {
		let params = serde_json::to_value(&transaction)
			.map_err(|error| Error::InvalidResponse(error.to_string()))?;
		let response = self.call("eth_sendTransaction", vec![params]).await?;

		let hash = match optional_result(response)? {
			Some(Value::String(hash)) => hash,
			other => {
				return Err(Error::InvalidResponse(format!(
					"expected transaction hash, got {other:?}"
				)))
			},
		};
		debug!(%hash, "Transaction submitted, waiting for receipt");

		RetryIf::start(
			self.receipt_polling.clone(),
			|| self.receipt(&hash),
			|error: &Error| matches!(error, Error::Pending(_)),
		)
		.await
	}
}

/// Builds a [`Client`] per endpoint address; holds no connection itself,
/// so it can be shared between workers.
#[derive(Clone, Debug)]
pub struct Factory {
	timeout: Duration,
	receipt_polling: RetryConfig,
}

impl Factory {
	pub fn new(timeout: Duration, receipt_polling: RetryConfig) -> Self {
		Self {
			timeout,
			receipt_polling,
		}
	}
}

impl Default for Factory {
	fn default() -> Self {
		Self::new(DEFAULT_REQUEST_TIMEOUT, RetryConfig::default())
	}
}

impl Connect for Factory {
	type Client = Client;

	fn build(&self, endpoint: &str) -> Result<Client, Error> {
		let transport = Transport::new(endpoint, self.timeout)?;
		Ok(Client::new(transport, self.receipt_polling.clone()))
	}
}
