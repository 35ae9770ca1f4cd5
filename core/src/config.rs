//! Validated gateway configuration.
//!
//! [`validate`] turns an untrusted JSON value into a [`Configuration`]. It never
//! fails: every field that is absent or malformed falls back to its own default,
//! independently of its siblings.

use serde_json::{Map, Value};
use std::time::Duration;

use crate::{
	admission::RouteClass,
	network::rpc::configuration::{RetryConfig, DEFAULT_REQUEST_TIMEOUT},
};

pub const DEFAULT_PORT: u16 = 3000;

#[cfg(windows)]
pub const DEFAULT_ENDPOINT: &str = r"\\.\pipe\geth.ipc";
#[cfg(not(windows))]
pub const DEFAULT_ENDPOINT: &str = "/tmp/geth.ipc";

/// Upper bound for `maxWorkers`, larger pools revert to the default.
pub const MAX_WORKERS: usize = 256;
/// Upper bound for receipt polling attempts.
pub const MAX_RECEIPT_RETRIES: usize = 100;

pub const DEFAULT_REJECTION_MESSAGE: &str =
	"Too many requests from this IP, please try again after 15 minutes";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitSpec {
	pub window: Duration,
	/// Requests allowed per window, zero blocks everything.
	pub max_requests: u64,
	/// Extra penalty once the limit is crossed, zero disables it.
	pub block_duration: Duration,
	pub rejection_message: String,
}

impl Default for RateLimitSpec {
	fn default() -> Self {
		Self {
			window: Duration::from_secs(15 * 60),
			max_requests: 10,
			block_duration: Duration::ZERO,
			rejection_message: DEFAULT_REJECTION_MESSAGE.to_string(),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerPoolConfig {
	pub min_workers: usize,
	pub max_workers: usize,
}

impl Default for WorkerPoolConfig {
	fn default() -> Self {
		Self {
			min_workers: 1,
			max_workers: 1,
		}
	}
}

/// How `POST /transaction` reaches the node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransactionMode {
	/// Caller waits for the receipt.
	Sync,
	/// Caller gets 202 immediately, a worker sends the transaction later.
	#[default]
	Async,
}

/// Executor policy for asynchronous writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutorPolicy {
	/// One active slot fed by an unbounded FIFO queue.
	Serial,
	/// Fixed pool of `min_workers..max_workers` threads.
	#[default]
	Pool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
	pub port: u16,
	/// HTTP URL or local IPC path of the node.
	pub endpoint_address: String,
	pub node_limit: RateLimitSpec,
	pub block_limit: RateLimitSpec,
	pub transaction_limit: RateLimitSpec,
	pub miner_limit: RateLimitSpec,
	pub worker: WorkerPoolConfig,
	pub transaction_mode: TransactionMode,
	pub write_executor: ExecutorPolicy,
	pub receipt_polling: RetryConfig,
	pub request_timeout: Duration,
}

impl Default for Configuration {
	fn default() -> Self {
		Self {
			port: DEFAULT_PORT,
			endpoint_address: DEFAULT_ENDPOINT.to_string(),
			node_limit: Default::default(),
			block_limit: Default::default(),
			transaction_limit: Default::default(),
			miner_limit: Default::default(),
			worker: Default::default(),
			transaction_mode: Default::default(),
			write_executor: Default::default(),
			receipt_polling: Default::default(),
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
		}
	}
}

impl Configuration {
	/// Limiter spec for the route class, the root route always uses the default one.
	pub fn limit(&self, class: RouteClass) -> RateLimitSpec {
		match class {
			RouteClass::Root => RateLimitSpec::default(),
			RouteClass::Node => self.node_limit.clone(),
			RouteClass::Block => self.block_limit.clone(),
			RouteClass::Transaction => self.transaction_limit.clone(),
			RouteClass::Miner => self.miner_limit.clone(),
		}
	}
}

/// Validates a raw configuration, see [`validate_reporting`].
pub fn validate(raw: &Value) -> Configuration {
	validate_reporting(raw).0
}

/// Validates a raw configuration and reports the keys that were replaced by defaults.
pub fn validate_reporting(raw: &Value) -> (Configuration, Vec<&'static str>) {
	let defaults = Configuration::default();
	let mut substituted = vec![];

	let Some(object) = raw.as_object() else {
		return (defaults, vec!["configuration"]);
	};

	let port = or_default(&mut substituted, "port", port(object), defaults.port);
	let endpoint_address = or_default(
		&mut substituted,
		"endpointAddress",
		endpoint_address(object),
		defaults.endpoint_address,
	);
	let node_limit = or_default(
		&mut substituted,
		"nodeLimit",
		rate_limit(object.get("nodeLimit")),
		defaults.node_limit,
	);
	let block_limit = or_default(
		&mut substituted,
		"blockLimit",
		rate_limit(object.get("blockLimit")),
		defaults.block_limit,
	);
	let transaction_limit = or_default(
		&mut substituted,
		"transactionLimit",
		rate_limit(object.get("transactionLimit")),
		defaults.transaction_limit,
	);
	let miner_limit = or_default(
		&mut substituted,
		"minerLimit",
		rate_limit(object.get("minerLimit")),
		defaults.miner_limit,
	);
	let worker = or_default(
		&mut substituted,
		"worker",
		worker(object.get("worker")),
		defaults.worker,
	);
	let transaction_mode = or_default(
		&mut substituted,
		"transactionMode",
		transaction_mode(object.get("transactionMode")),
		defaults.transaction_mode,
	);
	let write_executor = or_default(
		&mut substituted,
		"writeExecutor",
		write_executor(object.get("writeExecutor")),
		defaults.write_executor,
	);
	let receipt_polling = or_default(
		&mut substituted,
		"receiptPolling",
		receipt_polling(object.get("receiptPolling")),
		defaults.receipt_polling,
	);
	let request_timeout = or_default(
		&mut substituted,
		"requestTimeout",
		positive_millis(object.get("requestTimeout")),
		defaults.request_timeout,
	);

	let config = Configuration {
		port,
		endpoint_address,
		node_limit,
		block_limit,
		transaction_limit,
		miner_limit,
		worker,
		transaction_mode,
		write_executor,
		receipt_polling,
		request_timeout,
	};
	(config, substituted)
}

fn or_default<T>(
	substituted: &mut Vec<&'static str>,
	key: &'static str,
	value: Option<T>,
	default: T,
) -> T {
	value.unwrap_or_else(|| {
		substituted.push(key);
		default
	})
}

/// Non-negative integral number, JSON floats with no fraction included.
fn integer(value: &Value) -> Option<u64> {
	if let Some(integer) = value.as_u64() {
		return Some(integer);
	}
	let float = value.as_f64()?;
	(float.is_finite() && float >= 0.0 && float.fract() == 0.0 && float <= u64::MAX as f64)
		.then_some(float as u64)
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
	value?
		.as_str()
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.map(str::to_string)
}

fn port(object: &Map<String, Value>) -> Option<u16> {
	integer(object.get("port")?).and_then(|port| u16::try_from(port).ok())
}

fn endpoint_address(object: &Map<String, Value>) -> Option<String> {
	non_empty_string(object.get("endpointAddress"))
		.or_else(|| non_empty_string(object.get("ipc")))
}

fn rate_limit(value: Option<&Value>) -> Option<RateLimitSpec> {
	let entry = value?.as_object()?;
	let field = |name: &str, legacy: &str| entry.get(name).or_else(|| entry.get(legacy));

	let window = integer(field("windowDuration", "windowMs")?)?;
	if window == 0 {
		return None;
	}
	let max_requests = integer(field("maxRequests", "max")?)?;
	let block_duration = integer(field("blockDuration", "delayMs")?)?;
	let rejection_message = field("rejectionMessage", "message")?.as_str()?;

	Some(RateLimitSpec {
		window: Duration::from_millis(window),
		max_requests,
		block_duration: Duration::from_millis(block_duration),
		rejection_message: rejection_message.to_string(),
	})
}

fn worker(value: Option<&Value>) -> Option<WorkerPoolConfig> {
	let entry = value?.as_object()?;
	let min_workers = usize::try_from(integer(entry.get("minWorkers")?)?).ok()?;
	let max_workers = usize::try_from(integer(entry.get("maxWorkers")?)?).ok()?;

	let valid = min_workers >= 1 && min_workers <= max_workers && max_workers <= MAX_WORKERS;
	valid.then_some(WorkerPoolConfig {
		min_workers,
		max_workers,
	})
}

fn transaction_mode(value: Option<&Value>) -> Option<TransactionMode> {
	match value?.as_str()? {
		"sync" => Some(TransactionMode::Sync),
		"async" => Some(TransactionMode::Async),
		_ => None,
	}
}

fn write_executor(value: Option<&Value>) -> Option<ExecutorPolicy> {
	match value?.as_str()? {
		"serial" => Some(ExecutorPolicy::Serial),
		"pool" => Some(ExecutorPolicy::Pool),
		_ => None,
	}
}

fn receipt_polling(value: Option<&Value>) -> Option<RetryConfig> {
	serde_json::from_value::<RetryConfig>(value?.clone())
		.ok()
		.filter(|config| config.retries() <= MAX_RECEIPT_RETRIES)
}

fn positive_millis(value: Option<&Value>) -> Option<Duration> {
	integer(value?)
		.filter(|millis| *millis > 0)
		.map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use serde_json::json;
	use test_case::test_case;

	fn assert_valid(config: &Configuration) {
		for limit in [
			&config.node_limit,
			&config.block_limit,
			&config.transaction_limit,
			&config.miner_limit,
		] {
			assert!(!limit.window.is_zero());
		}
		assert!(config.worker.min_workers >= 1);
		assert!(config.worker.min_workers <= config.worker.max_workers);
		assert!(config.worker.max_workers <= MAX_WORKERS);
		assert!(config.receipt_polling.retries() <= MAX_RECEIPT_RETRIES);
		assert!(!config.endpoint_address.is_empty());
		assert!(!config.request_timeout.is_zero());
	}

	#[test_case(json!(null) ; "null")]
	#[test_case(json!([1, 2, 3]) ; "array")]
	#[test_case(json!("config") ; "string")]
	#[test_case(json!(42) ; "number")]
	fn non_object_reverts_to_defaults(raw: Value) {
		let (config, substituted) = validate_reporting(&raw);
		assert_eq!(config, Configuration::default());
		assert_eq!(substituted, vec!["configuration"]);
	}

	#[test]
	fn empty_object_defaults_every_field() {
		let (config, substituted) = validate_reporting(&json!({}));
		assert_eq!(config, Configuration::default());
		assert_eq!(substituted.len(), 11);
	}

	#[test_case(json!(8080) => 8080)]
	#[test_case(json!(0) => 0)]
	#[test_case(json!(65535) => 65535)]
	#[test_case(json!(8080.0) => 8080 ; "integral float")]
	#[test_case(json!(65536) => DEFAULT_PORT ; "too large")]
	#[test_case(json!(-1) => DEFAULT_PORT ; "negative")]
	#[test_case(json!(80.5) => DEFAULT_PORT ; "fraction")]
	#[test_case(json!("8080") => DEFAULT_PORT ; "string")]
	fn port_validation(port: Value) -> u16 {
		validate(&json!({ "port": port })).port
	}

	#[test]
	fn full_configuration() {
		let raw = json!({
			"port": 8000,
			"endpointAddress": "http://127.0.0.1:8545",
			"nodeLimit": {"windowDuration": 1000, "maxRequests": 5, "blockDuration": 0, "rejectionMessage": "node"},
			"blockLimit": {"windowDuration": 2000, "maxRequests": 0, "blockDuration": 500, "rejectionMessage": "block"},
			"transactionLimit": {"windowDuration": 3000, "maxRequests": 1, "blockDuration": 0, "rejectionMessage": "tx"},
			"minerLimit": {"windowDuration": 4000, "maxRequests": 2, "blockDuration": 0, "rejectionMessage": "miner"},
			"worker": {"minWorkers": 2, "maxWorkers": 4},
			"transactionMode": "sync",
			"writeExecutor": "serial",
			"receiptPolling": {"type": "fibonacci", "base": 1, "max_delay": 100, "retries": 2},
			"requestTimeout": 5000
		});

		let (config, substituted) = validate_reporting(&raw);
		assert!(substituted.is_empty(), "{substituted:?}");
		assert_eq!(config.port, 8000);
		assert_eq!(config.endpoint_address, "http://127.0.0.1:8545");
		assert_eq!(config.block_limit.max_requests, 0);
		assert_eq!(config.block_limit.block_duration, Duration::from_millis(500));
		assert_eq!(config.miner_limit.rejection_message, "miner");
		assert_eq!(
			config.worker,
			WorkerPoolConfig {
				min_workers: 2,
				max_workers: 4
			}
		);
		assert_eq!(config.transaction_mode, TransactionMode::Sync);
		assert_eq!(config.write_executor, ExecutorPolicy::Serial);
		assert_eq!(config.request_timeout, Duration::from_secs(5));
	}

	#[test]
	fn invalid_field_keeps_siblings() {
		let raw = json!({
			"port": "not a port",
			"endpointAddress": "/var/run/geth.ipc",
			"nodeLimit": {"windowDuration": 1000, "maxRequests": "ten", "blockDuration": 0, "rejectionMessage": "node"},
			"blockLimit": {"windowDuration": 1000, "maxRequests": 3, "blockDuration": 0, "rejectionMessage": "block"},
		});

		let (config, substituted) = validate_reporting(&raw);
		assert_eq!(config.port, DEFAULT_PORT);
		assert_eq!(config.endpoint_address, "/var/run/geth.ipc");
		assert_eq!(config.node_limit, RateLimitSpec::default());
		assert_eq!(config.block_limit.max_requests, 3);
		assert!(substituted.contains(&"port"));
		assert!(substituted.contains(&"nodeLimit"));
		assert!(!substituted.contains(&"blockLimit"));
	}

	#[test]
	fn legacy_keys_are_accepted() {
		let raw = json!({
			"ipc": "/home/geth/.ethereum/geth.ipc",
			"nodeLimit": {"windowMs": 60000, "max": 100, "delayMs": 0, "message": "slow down"},
		});

		let config = validate(&raw);
		assert_eq!(config.endpoint_address, "/home/geth/.ethereum/geth.ipc");
		assert_eq!(config.node_limit.window, Duration::from_secs(60));
		assert_eq!(config.node_limit.max_requests, 100);
		assert_eq!(config.node_limit.rejection_message, "slow down");
	}

	#[test_case(json!({"windowDuration": 0, "maxRequests": 1, "blockDuration": 0, "rejectionMessage": "m"}) ; "zero window")]
	#[test_case(json!({"windowDuration": 10, "maxRequests": 1, "rejectionMessage": "m"}) ; "missing block duration")]
	#[test_case(json!({"windowDuration": 10, "maxRequests": 1, "blockDuration": 0, "rejectionMessage": 7}) ; "numeric message")]
	#[test_case(json!({"windowDuration": 10, "maxRequests": -3, "blockDuration": 0, "rejectionMessage": "m"}) ; "negative max")]
	#[test_case(json!([10, 1, 0, "m"]) ; "array")]
	fn invalid_rate_limit_reverts_entry(entry: Value) {
		let config = validate(&json!({ "minerLimit": entry }));
		assert_eq!(config.miner_limit, RateLimitSpec::default());
	}

	#[test_case(json!({"minWorkers": 0, "maxWorkers": 2}) ; "zero min")]
	#[test_case(json!({"minWorkers": 3, "maxWorkers": 2}) ; "min above max")]
	#[test_case(json!({"minWorkers": 1}) ; "missing max")]
	#[test_case(json!({"minWorkers": "1", "maxWorkers": "2"}) ; "strings")]
	#[test_case(json!({"minWorkers": 1000000, "maxWorkers": 1000000}) ; "huge pool")]
	#[test_case(json!({"minWorkers": 1, "maxWorkers": 257}) ; "max above cap")]
	fn invalid_worker_pool_reverts(worker: Value) {
		let config = validate(&json!({ "worker": worker }));
		assert_eq!(config.worker, WorkerPoolConfig::default());
	}

	#[test]
	fn worker_pool_cap_is_inclusive() {
		let config = validate(&json!({ "worker": {"minWorkers": 1, "maxWorkers": MAX_WORKERS} }));
		assert_eq!(config.worker.max_workers, MAX_WORKERS);
	}

	#[test_case(json!({"type": "fibonacci", "base": 1, "max_delay": 100, "retries": 1000000000000u64}) ; "huge fibonacci")]
	#[test_case(json!({"type": "exponential", "base": 1, "max_delay": 100, "retries": 101}) ; "exponential above cap")]
	fn excessive_receipt_retries_revert(polling: Value) {
		let (config, substituted) = validate_reporting(&json!({ "receiptPolling": polling }));
		assert_eq!(config.receipt_polling, RetryConfig::default());
		assert!(substituted.contains(&"receiptPolling"));
	}

	#[test]
	fn root_route_uses_default_limit() {
		let raw = json!({
			"nodeLimit": {"windowDuration": 1000, "maxRequests": 5, "blockDuration": 0, "rejectionMessage": "node"},
		});
		let config = validate(&raw);
		assert_eq!(config.limit(RouteClass::Root), RateLimitSpec::default());
		assert_eq!(config.limit(RouteClass::Node).max_requests, 5);
	}

	fn arbitrary_json() -> impl Strategy<Value = Value> {
		let leaf = prop_oneof![
			Just(Value::Null),
			any::<bool>().prop_map(Value::from),
			any::<i64>().prop_map(Value::from),
			any::<f64>().prop_map(Value::from),
			"[a-z]{0,8}".prop_map(Value::from),
		];
		leaf.prop_recursive(3, 32, 6, |inner| {
			let keys = prop_oneof![
				Just("port".to_string()),
				Just("endpointAddress".to_string()),
				Just("nodeLimit".to_string()),
				Just("worker".to_string()),
				Just("windowDuration".to_string()),
				Just("maxRequests".to_string()),
				Just("minWorkers".to_string()),
				Just("maxWorkers".to_string()),
				"[a-z]{1,6}",
			];
			prop_oneof![
				prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
				prop::collection::hash_map(keys, inner, 0..6)
					.prop_map(|map| Value::Object(map.into_iter().collect())),
			]
		})
	}

	proptest! {
		#[test]
		fn validate_is_total(raw in arbitrary_json()) {
			let config = validate(&raw);
			assert_valid(&config);
		}
	}
}
