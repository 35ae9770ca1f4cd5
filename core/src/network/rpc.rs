use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::{collections::HashMap, fmt::Display, str::FromStr};

mod client;
pub mod configuration;
mod transport;

pub use client::{Client, Factory};
pub use transport::Transport;

pub const JSONRPC_VERSION: &str = "2.0";

const QUANTITY_FIELDS: [&str; 4] = ["value", "gas", "gasPrice", "nonce"];

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Upstream node could not be reached, or the connection broke mid-call.
	#[error("{0}")]
	Transport(String),
	/// Upstream answered with a JSON-RPC `error` member.
	#[error("{message}")]
	Rpc { code: i64, message: String },
	#[error("Invalid response from node: {0}")]
	InvalidResponse(String),
	#[error("Invalid endpoint address: {0}")]
	InvalidEndpoint(String),
	#[error("Transaction {0} is not mined yet")]
	Pending(String),
}

/// Single JSON-RPC invocation sent upstream.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Request {
	pub jsonrpc: &'static str,
	pub method: String,
	pub params: Vec<Value>,
	pub id: u64,
}

impl Request {
	pub fn new(method: &str, params: Vec<Value>, id: u64) -> Self {
		Request {
			jsonrpc: JSONRPC_VERSION,
			method: method.to_string(),
			params,
			id,
		}
	}
}

/// Fails with [`Error::Rpc`] when the response carries an `error` member,
/// otherwise hands the whole response object back.
pub fn check_response(response: Value) -> Result<Value, Error> {
	let Some(error) = response.get("error").filter(|error| !error.is_null()) else {
		return Ok(response);
	};

	let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
	let message = match error.get("message").and_then(Value::as_str) {
		Some(message) if !message.trim().is_empty() => message.to_string(),
		_ => format!("Node error {code}: {error}"),
	};
	Err(Error::Rpc { code, message })
}

/// Extracts `result` from a response, mapping `null` to `None`.
pub fn optional_result(response: Value) -> Result<Option<Value>, Error> {
	match response {
		Value::Object(mut object) => match object.remove("result") {
			None => Err(Error::InvalidResponse("missing result field".to_string())),
			Some(Value::Null) => Ok(None),
			Some(result) => Ok(Some(result)),
		},
		other => Err(Error::InvalidResponse(format!(
			"expected object, got {other}"
		))),
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockTag {
	Latest,
	Earliest,
	Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockId {
	Number(u64),
	Tag(BlockTag),
}

impl BlockId {
	pub fn to_param(&self) -> Value {
		match self {
			BlockId::Number(number) => Value::String(format!("{number:#x}")),
			BlockId::Tag(BlockTag::Latest) => Value::from("latest"),
			BlockId::Tag(BlockTag::Earliest) => Value::from("earliest"),
			BlockId::Tag(BlockTag::Pending) => Value::from("pending"),
		}
	}
}

impl FromStr for BlockId {
	type Err = String;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		let parsed = match value {
			"latest" => BlockId::Tag(BlockTag::Latest),
			"earliest" => BlockId::Tag(BlockTag::Earliest),
			"pending" => BlockId::Tag(BlockTag::Pending),
			hex if hex.starts_with("0x") || hex.starts_with("0X") => {
				u64::from_str_radix(&hex[2..], 16)
					.map(BlockId::Number)
					.map_err(|error| format!("{value}: {error}"))?
			},
			decimal => decimal
				.parse::<u64>()
				.map(BlockId::Number)
				.map_err(|error| format!("{value}: {error}"))?,
		};
		Ok(parsed)
	}
}

impl Display for BlockId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.to_param() {
			Value::String(param) => f.write_str(&param),
			other => write!(f, "{other}"),
		}
	}
}

/// Transaction parameters passed through to `eth_sendTransaction`.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct TransactionRequest(Map<String, Value>);

impl TransactionRequest {
	/// Builds a request from query parameters, converting decimal quantities to hex.
	pub fn from_query(query: HashMap<String, String>) -> Result<Self, String> {
		if !query.get("from").is_some_and(|from| !from.is_empty()) {
			return Err("Missing 'from' address".to_string());
		}

		let mut fields = Map::new();
		for (key, value) in query {
			let value = if QUANTITY_FIELDS.contains(&key.as_str()) {
				to_quantity(&value).ok_or_else(|| format!("Invalid quantity for '{key}'"))?
			} else {
				value
			};
			fields.insert(key, Value::String(value));
		}
		Ok(TransactionRequest(fields))
	}

	pub fn from(&self) -> Option<&str> {
		self.0.get("from").and_then(Value::as_str)
	}

	pub fn to(&self) -> Option<&str> {
		self.0.get("to").and_then(Value::as_str)
	}

	#[cfg(test)]
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}
}

fn to_quantity(value: &str) -> Option<String> {
	if value.starts_with("0x") || value.starts_with("0X") {
		let digits = &value[2..];
		let valid = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit());
		return valid.then(|| value.to_lowercase());
	}
	value
		.parse::<u128>()
		.ok()
		.map(|number| format!("{number:#x}"))
}

/// Capabilities the gateway needs from an upstream node.
#[async_trait]
#[automock]
pub trait Node: Send + Sync {
	/// Raw call, returns the whole response object unless it carries an `error`.
	async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, Error>;
	async fn get_block(&self, block: BlockId) -> Result<Option<Value>, Error>;
	async fn get_transaction(&self, hash: String) -> Result<Option<Value>, Error>;
	/// Sends the transaction and waits for its receipt.
	async fn send_transaction(&self, transaction: TransactionRequest) -> Result<Value, Error>;
}

/// Builds node clients from an endpoint address.
#[automock(type Client = MockNode;)]
pub trait Connect: Send + Sync + 'static {
	type Client: Node + 'static;

	fn build(&self, endpoint: &str) -> Result<Self::Client, Error>;
}
