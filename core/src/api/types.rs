use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use warp::{reply::Reply, reply::WithStatus};

pub const WELCOME_MESSAGE: &str = "Welcome to Geth Gateway!";
pub const TRANSACTION_SENT: &str = "Transaction sent.";
pub const UPSTREAM_ERROR: &str = "Upstream error";

/// The single response shape of every route.
///
/// `message` is empty on success, `result` is an empty string on failure.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
	pub success: bool,
	pub message: String,
	pub result: Value,
}

impl Envelope {
	pub fn ok(result: Value) -> Self {
		Envelope {
			success: true,
			message: String::new(),
			result,
		}
	}

	pub fn error(message: impl Into<String>) -> Self {
		Envelope {
			success: false,
			message: message.into(),
			result: Value::String(String::new()),
		}
	}

	pub fn with_status(self, status: StatusCode) -> WithStatus<warp::reply::Json> {
		warp::reply::with_status(warp::reply::json(&self), status)
	}
}

/// Upstream entity a route is about, used to word failure messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
	NodeInfo,
	Block,
	Transaction,
	MinerStart,
	MinerStop,
}

impl Entity {
	pub fn not_found_message(&self) -> &'static str {
		match self {
			Entity::NodeInfo => "Node info not found",
			Entity::Block => "Block not found",
			Entity::Transaction => "Transaction not found",
			Entity::MinerStart | Entity::MinerStop => "Miner not found",
		}
	}

	pub fn failure_message(&self) -> &'static str {
		match self {
			Entity::NodeInfo => "Fail to get node info",
			Entity::Block => "Fail to get block",
			Entity::Transaction => "Fail to get transaction",
			Entity::MinerStart => "Fail to start miner",
			Entity::MinerStop => "Fail to stop miner",
		}
	}

	/// Status of an unexpected response shape, reads report it as missing.
	fn malformed_status(&self) -> StatusCode {
		match self {
			Entity::NodeInfo | Entity::Block | Entity::Transaction => StatusCode::NOT_FOUND,
			Entity::MinerStart | Entity::MinerStop => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

/// Result of handling one request, before it is turned into an [`Envelope`].
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
	/// Upstream value present and well formed.
	Found(Value),
	/// Upstream answered `null`.
	NotFound(Entity),
	/// Upstream answered, but not in the expected shape.
	Malformed(Entity),
	/// Node could not be reached or refused the call, carries the upstream error text.
	Upstream(String),
	/// Admission rejected the client, carries the route's message.
	Rejected(String),
	/// Write queued for asynchronous execution.
	Accepted,
	BadRequest(String),
	/// Write executor cannot take more work.
	Unavailable(String),
}

impl Outcome {
	pub fn normalize(self) -> (Envelope, StatusCode) {
		match self {
			Outcome::Found(value) => (Envelope::ok(value), StatusCode::OK),
			Outcome::NotFound(entity) => (
				Envelope::error(entity.not_found_message()),
				StatusCode::NOT_FOUND,
			),
			Outcome::Malformed(entity) => (
				Envelope::error(entity.failure_message()),
				entity.malformed_status(),
			),
			Outcome::Upstream(message) => (
				Envelope::error(or_default(message, UPSTREAM_ERROR)),
				StatusCode::BAD_GATEWAY,
			),
			Outcome::Rejected(message) => (
				Envelope::error(or_default(message, "Too many requests")),
				StatusCode::TOO_MANY_REQUESTS,
			),
			Outcome::Accepted => (
				Envelope::ok(Value::from(TRANSACTION_SENT)),
				StatusCode::ACCEPTED,
			),
			Outcome::BadRequest(message) => (
				Envelope::error(or_default(message, "Bad request")),
				StatusCode::BAD_REQUEST,
			),
			Outcome::Unavailable(message) => (
				Envelope::error(or_default(message, "Service unavailable")),
				StatusCode::SERVICE_UNAVAILABLE,
			),
		}
	}

	#[cfg(test)]
	pub fn status(&self) -> StatusCode {
		self.clone().normalize().1
	}
}

/// Failure envelopes always carry a message.
fn or_default(message: String, default: &str) -> String {
	if message.trim().is_empty() {
		default.to_string()
	} else {
		message
	}
}

/// Rejection raised by the admission filter, carries the route's message.
#[derive(Debug)]
pub struct TooManyRequests(pub String);

impl warp::reject::Reject for TooManyRequests {}

impl Reply for Outcome {
	fn into_response(self) -> warp::reply::Response {
		let (envelope, status) = self.normalize();
		envelope.with_status(status).into_response()
	}
}
