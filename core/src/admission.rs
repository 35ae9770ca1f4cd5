//! Per route class admission control.
//!
//! Every route class owns a fixed window limiter keyed by client identity.
//! A client that exceeds `max_requests` within one window is rejected with the
//! route's configured message, and optionally blocked for `block_duration`.

use dashmap::DashMap;
use std::{
	collections::HashMap,
	fmt::{self, Display},
	sync::Arc,
	time::{Duration, Instant},
};
use tracing::{debug, info};

use crate::{
	config::{Configuration, RateLimitSpec},
	shutdown::Monitor,
};

pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouteClass {
	Root,
	Node,
	Block,
	Transaction,
	Miner,
}

impl RouteClass {
	pub const ALL: [RouteClass; 5] = [
		RouteClass::Root,
		RouteClass::Node,
		RouteClass::Block,
		RouteClass::Transaction,
		RouteClass::Miner,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			RouteClass::Root => "root",
			RouteClass::Node => "node",
			RouteClass::Block => "block",
			RouteClass::Transaction => "transaction",
			RouteClass::Miner => "miner",
		}
	}
}

impl Display for RouteClass {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
	Allowed,
	Rejected(String),
}

#[derive(Clone, Debug)]
struct LimiterState {
	window_start: Instant,
	count: u64,
	blocked_until: Option<Instant>,
}

impl LimiterState {
	fn new(now: Instant) -> Self {
		Self {
			window_start: now,
			count: 0,
			blocked_until: None,
		}
	}

	fn is_blocked(&self, now: Instant) -> bool {
		self.blocked_until.is_some_and(|until| now < until)
	}
}

/// Fixed window limiter for a single route class.
pub struct Limiter {
	spec: RateLimitSpec,
	clients: DashMap<String, LimiterState>,
}

impl Limiter {
	pub fn new(spec: RateLimitSpec) -> Self {
		Self {
			spec,
			clients: DashMap::new(),
		}
	}

	/// Counts one request of the client at `now`.
	///
	/// The map entry stays locked for the whole read-increment-compare, so
	/// concurrent requests of one client never lose updates.
	pub fn check(&self, client: &str, now: Instant) -> Admission {
		let mut state = self
			.clients
			.entry(client.to_string())
			.or_insert_with(|| LimiterState::new(now));

		if state.is_blocked(now) {
			return Admission::Rejected(self.spec.rejection_message.clone());
		}

		if state.blocked_until.take().is_some() {
			// penalty served, start over with a fresh window
			state.window_start = now;
			state.count = 0;
		}

		if now.saturating_duration_since(state.window_start) >= self.spec.window {
			state.window_start = now;
			state.count = 0;
		}

		state.count = state.count.saturating_add(1);
		if state.count <= self.spec.max_requests {
			return Admission::Allowed;
		}

		if !self.spec.block_duration.is_zero() {
			state.blocked_until = Some(now + self.spec.block_duration);
		}
		Admission::Rejected(self.spec.rejection_message.clone())
	}

	/// Drops clients whose window expired and who are not blocked.
	pub fn prune(&self, now: Instant) -> usize {
		let before = self.clients.len();
		let window = self.spec.window;
		self.clients.retain(|_, state| {
			state.is_blocked(now) || now.saturating_duration_since(state.window_start) < window
		});
		before - self.clients.len()
	}

	#[cfg(test)]
	pub fn tracked_clients(&self) -> usize {
		self.clients.len()
	}
}

/// Holds one independent [`Limiter`] per route class.
pub struct AdmissionController {
	limiters: HashMap<RouteClass, Limiter>,
}

impl AdmissionController {
	pub fn new(config: &Configuration) -> Self {
		let limiters = RouteClass::ALL
			.into_iter()
			.map(|class| (class, Limiter::new(config.limit(class))))
			.collect();
		Self { limiters }
	}

	pub fn admit(&self, class: RouteClass, client: &str) -> Admission {
		self.admit_at(class, client, Instant::now())
	}

	pub fn admit_at(&self, class: RouteClass, client: &str, now: Instant) -> Admission {
		let Some(limiter) = self.limiters.get(&class) else {
			return Admission::Allowed;
		};

		let admission = limiter.check(client, now);
		if let Admission::Rejected(_) = admission {
			debug!(route = %class, client, "Request rejected by rate limiter");
		}
		admission
	}

	pub fn prune(&self, now: Instant) -> usize {
		self.limiters
			.values()
			.map(|limiter| limiter.prune(now))
			.sum()
	}

	#[cfg(test)]
	pub fn tracked_clients(&self, class: RouteClass) -> usize {
		self.limiters
			.get(&class)
			.map(Limiter::tracked_clients)
			.unwrap_or_default()
	}
}

/// Periodically prunes idle clients until shutdown.
pub async fn run_pruning(controller: Arc<AdmissionController>, interval: Duration, monitor: Monitor) {
	let mut ticker = tokio::time::interval(interval);
	loop {
		tokio::select! {
			_ = monitor.canceled() => {
				info!("Shutdown requested, stopping rate limiter pruning");
				return;
			},
			_ = ticker.tick() => {
				let pruned = controller.prune(Instant::now());
				if pruned > 0 {
					debug!(pruned, "Pruned idle rate limiter entries");
				}
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use test_case::test_case;

	fn spec(window_ms: u64, max_requests: u64, block_ms: u64) -> RateLimitSpec {
		RateLimitSpec {
			window: Duration::from_millis(window_ms),
			max_requests,
			block_duration: Duration::from_millis(block_ms),
			rejection_message: "Too many requests".to_string(),
		}
	}

	#[test_case(1)]
	#[test_case(3)]
	#[test_case(10)]
	fn request_above_limit_is_rejected(max_requests: u64) {
		let limiter = Limiter::new(spec(1000, max_requests, 0));
		let now = Instant::now();
		for _ in 0..max_requests {
			assert_eq!(limiter.check("client", now), Admission::Allowed);
		}
		assert_eq!(
			limiter.check("client", now),
			Admission::Rejected("Too many requests".to_string())
		);
	}

	#[test]
	fn next_window_admits_again() {
		let limiter = Limiter::new(spec(1000, 2, 0));
		let start = Instant::now();
		assert_eq!(limiter.check("client", start), Admission::Allowed);
		assert_eq!(limiter.check("client", start), Admission::Allowed);
		assert!(matches!(
			limiter.check("client", start + Duration::from_millis(999)),
			Admission::Rejected(_)
		));
		assert_eq!(
			limiter.check("client", start + Duration::from_millis(1000)),
			Admission::Allowed
		);
	}

	#[test]
	fn zero_max_rejects_everything() {
		let limiter = Limiter::new(spec(1000, 0, 0));
		let start = Instant::now();
		for window in 0..5 {
			let now = start + Duration::from_millis(window * 1000);
			assert!(matches!(
				limiter.check("client", now),
				Admission::Rejected(_)
			));
		}
	}

	#[test]
	fn clients_are_counted_separately() {
		let limiter = Limiter::new(spec(1000, 1, 0));
		let now = Instant::now();
		assert_eq!(limiter.check("10.0.0.1", now), Admission::Allowed);
		assert_eq!(limiter.check("10.0.0.2", now), Admission::Allowed);
		assert!(matches!(
			limiter.check("10.0.0.1", now),
			Admission::Rejected(_)
		));
	}

	#[test]
	fn blocked_client_stays_rejected() {
		let limiter = Limiter::new(spec(100, 1, 5000));
		let start = Instant::now();
		assert_eq!(limiter.check("client", start), Admission::Allowed);
		assert!(matches!(
			limiter.check("client", start),
			Admission::Rejected(_)
		));
		// next window would admit, but the block still applies
		assert!(matches!(
			limiter.check("client", start + Duration::from_millis(200)),
			Admission::Rejected(_)
		));
		assert_eq!(
			limiter.check("client", start + Duration::from_millis(5000)),
			Admission::Allowed
		);
	}

	#[test]
	fn route_classes_do_not_interfere() {
		let config = Configuration {
			node_limit: spec(1000, 1, 0),
			block_limit: spec(1000, 1, 0),
			..Default::default()
		};
		let controller = AdmissionController::new(&config);
		let now = Instant::now();

		assert_eq!(
			controller.admit_at(RouteClass::Node, "client", now),
			Admission::Allowed
		);
		assert!(matches!(
			controller.admit_at(RouteClass::Node, "client", now),
			Admission::Rejected(_)
		));
		assert_eq!(
			controller.admit_at(RouteClass::Block, "client", now),
			Admission::Allowed
		);
	}

	#[test]
	fn configured_message_is_returned() {
		let mut node_limit = spec(1000, 0, 0);
		node_limit.rejection_message = "Node route is busy".to_string();
		let config = Configuration {
			node_limit,
			..Default::default()
		};
		let controller = AdmissionController::new(&config);
		assert_eq!(
			controller.admit(RouteClass::Node, "client"),
			Admission::Rejected("Node route is busy".to_string())
		);
	}

	#[test]
	fn prune_keeps_active_and_blocked_clients() {
		let limiter = Limiter::new(spec(1000, 1, 10_000));
		let start = Instant::now();
		limiter.check("idle", start);
		limiter.check("blocked", start);
		limiter.check("blocked", start);
		limiter.check("active", start + Duration::from_millis(1500));

		assert_eq!(limiter.prune(start + Duration::from_millis(2000)), 1);
		assert_eq!(limiter.tracked_clients(), 2);
	}

	#[tokio::test]
	async fn pruning_stops_on_shutdown() {
		let mut shutdown = crate::shutdown::Controller::new();
		let controller = Arc::new(AdmissionController::new(&Configuration::default()));
		controller.admit(RouteClass::Node, "client");

		let task = tokio::spawn(run_pruning(
			controller.clone(),
			Duration::from_millis(10),
			shutdown.watch().unwrap(),
		));
		shutdown.shutdown().await;
		assert!(task.await.is_ok());
		assert_eq!(controller.tracked_clients(RouteClass::Node), 1);
	}

	#[test]
	fn concurrent_requests_do_not_lose_updates() {
		let limiter = Arc::new(Limiter::new(spec(60_000, 1000, 0)));
		let now = Instant::now();
		let handles = (0..8)
			.map(|_| {
				let limiter = limiter.clone();
				std::thread::spawn(move || {
					(0..200)
						.filter(|_| limiter.check("client", now) == Admission::Allowed)
						.count()
				})
			})
			.collect::<Vec<_>>();

		let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
		assert_eq!(allowed, 1000);
	}
}
