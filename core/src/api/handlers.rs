use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

use super::types::{Outcome, WELCOME_MESSAGE};
use crate::{
	dispatch::Dispatcher,
	network::rpc::{BlockId, Node, TransactionRequest},
};

pub async fn root() -> Outcome {
	Outcome::Found(Value::from(WELCOME_MESSAGE))
}

pub async fn node(dispatcher: Arc<Dispatcher<impl Node>>) -> Outcome {
	dispatcher.node_info().await
}

pub async fn block(block_number: String, dispatcher: Arc<Dispatcher<impl Node>>) -> Outcome {
	match block_number.parse::<BlockId>() {
		Ok(block) => dispatcher.block(block).await,
		Err(error) => {
			debug!("Invalid block number {error}");
			Outcome::BadRequest("Invalid block number".to_string())
		},
	}
}

pub async fn transaction(hash: String, dispatcher: Arc<Dispatcher<impl Node>>) -> Outcome {
	dispatcher.transaction(hash).await
}

pub async fn send_transaction(
	query: HashMap<String, String>,
	dispatcher: Arc<Dispatcher<impl Node>>,
) -> Outcome {
	match TransactionRequest::from_query(query) {
		Ok(transaction) => dispatcher.send_transaction(transaction).await,
		Err(message) => Outcome::BadRequest(message),
	}
}

pub async fn start_miner(dispatcher: Arc<Dispatcher<impl Node>>) -> Outcome {
	dispatcher.start_miner().await
}

pub async fn stop_miner(dispatcher: Arc<Dispatcher<impl Node>>) -> Outcome {
	dispatcher.stop_miner().await
}
