//! Out-of-band execution of transaction writes.
//!
//! Both policies build a fresh node client for every work item, so no
//! connection state is shared between workers or with request handlers.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use mockall::automock;
use serde_json::Value;
use std::sync::{
	atomic::{AtomicBool, AtomicUsize, Ordering},
	Arc, Mutex,
};
use threadpool::ThreadPool;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, info, warn, Instrument};

use crate::{
	config::WorkerPoolConfig,
	network::rpc::{self, Connect, Node, TransactionRequest},
	utils::spawn_in_span,
};

/// Transaction accepted for asynchronous execution.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkItem {
	pub endpoint: String,
	pub payload: TransactionRequest,
}

#[async_trait]
#[automock]
pub trait Executor: Send + Sync {
	/// Hands the item over without waiting for its execution.
	fn submit(&self, item: WorkItem) -> Result<()>;
	/// Items queued or executing.
	fn pending(&self) -> usize;
	/// Stops accepting work and waits for queued items to finish.
	async fn shutdown(&self);
}

/// Sends one transaction through a freshly built client and logs the outcome.
pub async fn execute<F: Connect>(factory: &F, item: WorkItem) -> Result<Value, rpc::Error> {
	let WorkItem { endpoint, payload } = item;
	let from = payload.from().unwrap_or_default().to_string();
	let to = payload.to().map(str::to_string);

	let result = match factory.build(&endpoint) {
		Ok(client) => client.send_transaction(payload).await,
		Err(error) => Err(error),
	};

	match &result {
		Ok(receipt) => {
			let hash = receipt
				.get("transactionHash")
				.and_then(Value::as_str)
				.unwrap_or_default();
			info!(from, to, hash, "Transaction executed");
		},
		Err(error) => error!(from, endpoint, "Transaction failed: {error}"),
	}
	result
}

/// Thread pool growing from `min_workers` up to `max_workers` while all workers are busy.
pub struct WorkerPool<F: Connect> {
	factory: Arc<F>,
	pool: Mutex<ThreadPool>,
	max_workers: usize,
	closed: AtomicBool,
}

impl<F: Connect> WorkerPool<F> {
	pub fn new(factory: Arc<F>, config: WorkerPoolConfig) -> Self {
		let pool = threadpool::Builder::new()
			.num_threads(config.min_workers.max(1))
			.thread_name("gateway-writer".to_string())
			.build();

		Self {
			factory,
			pool: Mutex::new(pool),
			max_workers: config.max_workers.max(config.min_workers).max(1),
			closed: AtomicBool::new(false),
		}
	}

	#[cfg(test)]
	pub fn workers(&self) -> usize {
		self.pool
			.lock()
			.map(|pool| pool.max_count())
			.unwrap_or_default()
	}
}

#[async_trait]
impl<F: Connect> Executor for WorkerPool<F> {
	fn submit(&self, item: WorkItem) -> Result<()> {
		if self.closed.load(Ordering::Acquire) {
			return Err(eyre!("Write executor is shut down"));
		}

		let mut pool = self
			.pool
			.lock()
			.map_err(|_| eyre!("Worker pool lock is poisoned"))?;

		let workers = pool.max_count();
		if pool.active_count() + pool.queued_count() >= workers && workers < self.max_workers {
			pool.set_num_threads(workers + 1);
		}

		let factory = self.factory.clone();
		let span = tracing::Span::current();
		pool.execute(move || {
			let runtime = match tokio::runtime::Builder::new_current_thread()
				.enable_all()
				.build()
			{
				Ok(runtime) => runtime,
				Err(error) => {
					error!("Cannot start worker runtime: {error}");
					return;
				},
			};
			let _ = runtime.block_on(execute(factory.as_ref(), item).instrument(span));
		});
		Ok(())
	}

	fn pending(&self) -> usize {
		self.pool
			.lock()
			.map(|pool| pool.active_count() + pool.queued_count())
			.unwrap_or_default()
	}

	async fn shutdown(&self) {
		self.closed.store(true, Ordering::Release);

		let pending = self.pending();
		if pending > 0 {
			warn!(pending, "Waiting for queued transactions before shutdown");
		}

		let Ok(pool) = self.pool.lock().map(|pool| pool.clone()) else {
			warn!(pending, "Worker pool lock is poisoned, abandoning queued transactions");
			return;
		};
		if let Err(error) = tokio::task::spawn_blocking(move || pool.join()).await {
			warn!("Worker pool did not shut down cleanly: {error}");
		}
	}
}

/// Single active slot fed by an unbounded FIFO queue.
pub struct SerialQueue {
	sender: Mutex<Option<mpsc::UnboundedSender<WorkItem>>>,
	pending: Arc<AtomicUsize>,
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl SerialQueue {
	pub fn new<F: Connect>(factory: Arc<F>) -> Self {
		let (sender, mut receiver) = mpsc::unbounded_channel::<WorkItem>();
		let pending = Arc::new(AtomicUsize::new(0));

		let handle = spawn_in_span({
			let pending = pending.clone();
			async move {
				while let Some(item) = receiver.recv().await {
					let _ = execute(factory.as_ref(), item).await;
					pending.fetch_sub(1, Ordering::AcqRel);
				}
			}
		});

		Self {
			sender: Mutex::new(Some(sender)),
			pending,
			handle: Mutex::new(Some(handle)),
		}
	}
}

#[async_trait]
impl Executor for SerialQueue {
	fn submit(&self, item: WorkItem) -> Result<()> {
		let sender = self
			.sender
			.lock()
			.map_err(|_| eyre!("Write queue lock is poisoned"))?;
		let Some(sender) = sender.as_ref() else {
			return Err(eyre!("Write executor is shut down"));
		};

		self.pending.fetch_add(1, Ordering::AcqRel);
		if sender.send(item).is_err() {
			self.pending.fetch_sub(1, Ordering::AcqRel);
			return Err(eyre!("Write queue is closed"));
		}
		Ok(())
	}

	fn pending(&self) -> usize {
		self.pending.load(Ordering::Acquire)
	}

	async fn shutdown(&self) {
		if let Ok(mut sender) = self.sender.lock() {
			drop(sender.take());
		}

		let pending = self.pending();
		if pending > 0 {
			warn!(pending, "Waiting for queued transactions before shutdown");
		}

		let handle = self.handle.lock().ok().and_then(|mut handle| handle.take());
		if let Some(handle) = handle {
			if let Err(error) = handle.await {
				warn!("Write queue did not shut down cleanly: {error}");
			}
		}
	}
}
