use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Coordinates gateway shutdown.
///
/// Long running tasks (HTTP server, limiter pruning, write queue) hold a
/// [`Monitor`]. [`Controller::shutdown`] signals every monitor and then waits
/// until all of them have been dropped.
pub struct Controller {
	cancellation_token: CancellationToken,
	/// Cloned into every monitor, dropped on shutdown.
	task_tracker: Option<mpsc::Sender<()>>,
	/// Yields `None` once every tracker clone is gone.
	task_waiter: mpsc::Receiver<()>,
}

impl Controller {
	pub fn new() -> Self {
		let (task_tracker, task_waiter) = mpsc::channel::<()>(1);
		Self {
			cancellation_token: CancellationToken::new(),
			task_tracker: Some(task_tracker),
			task_waiter,
		}
	}

	/// Creates a monitor for a task, `None` once shutdown has completed.
	pub fn watch(&self) -> Option<Monitor> {
		let task_tracker = self.task_tracker.clone()?;
		Some(Monitor {
			cancellation_token: self.cancellation_token.clone(),
			_task_tracker: task_tracker,
		})
	}

	/// Handle that can request shutdown from places without access to the
	/// controller, e.g. the panic hook.
	pub fn trigger(&self) -> Trigger {
		Trigger(self.cancellation_token.clone())
	}

	#[cfg(test)]
	pub fn is_triggered(&self) -> bool {
		self.cancellation_token.is_cancelled()
	}

	/// Resolves once shutdown was requested through a [`Trigger`].
	pub async fn triggered(&self) {
		self.cancellation_token.cancelled().await
	}

	/// Signals all monitors and waits until every one of them is dropped.
	pub async fn shutdown(&mut self) {
		self.cancellation_token.cancel();
		drop(self.task_tracker.take());
		let _ = self.task_waiter.recv().await;
	}
}

impl Default for Controller {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Clone)]
pub struct Trigger(CancellationToken);

impl Trigger {
	pub fn fire(&self) {
		self.0.cancel();
	}
}

/// Observes shutdown requested by the [`Controller`], keeping it waiting while alive.
#[derive(Clone)]
pub struct Monitor {
	cancellation_token: CancellationToken,
	_task_tracker: mpsc::Sender<()>,
}

impl Monitor {
	pub fn is_shutdown(&self) -> bool {
		self.cancellation_token.is_cancelled()
	}

	pub async fn canceled(&self) {
		if self.is_shutdown() {
			return;
		}
		self.cancellation_token.cancelled().await;
	}
}

/// Completes on Ctrl-C or SIGTERM (Ctrl-Close or Ctrl-Shutdown on Windows).
pub async fn user_signal() {
	let ctrl_c = tokio::signal::ctrl_c();

	#[cfg(unix)]
	{
		let terminate = async {
			let mut signal =
				tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
			signal.recv().await;
			std::io::Result::Ok(())
		};

		tokio::select! {
			_ = ctrl_c => {},
			_ = terminate => {},
		}
	}

	#[cfg(windows)]
	{
		let close = async {
			let mut signal = tokio::signal::windows::ctrl_close()?;
			signal.recv().await;
			std::io::Result::Ok(())
		};
		let shutdown = async {
			let mut signal = tokio::signal::windows::ctrl_shutdown()?;
			signal.recv().await;
			std::io::Result::Ok(())
		};

		tokio::select! {
			_ = ctrl_c => {},
			_ = close => {},
			_ = shutdown => {},
		}
	}
}
