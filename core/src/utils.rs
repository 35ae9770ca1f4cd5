use crate::shutdown::Trigger;
use color_eyre::Result;
use futures::Future;
use tokio::task::JoinHandle;
use tracing::{error, Instrument, Level, Subscriber};
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt::format, layer::SubscriberExt, EnvFilter, FmtSubscriber};

pub fn spawn_in_span<F>(future: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tokio::spawn(future.in_current_span())
}

fn env_filter(log_level: Level) -> EnvFilter {
	EnvFilter::new(format!("geth_gateway={log_level},warn"))
}

pub fn install_panic_hooks(shutdown: Trigger) -> Result<()> {
	// initialize color-eyre hooks
	let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default()
		.display_location_section(true)
		.display_env_section(true)
		.into_hooks();

	// install hook as global handler
	eyre_hook.install()?;

	std::panic::set_hook(Box::new(move |panic_info| {
		// stop the server and the write executor
		shutdown.fire();

		let msg = format!("{}", panic_hook.panic_report(panic_info));
		error!("Error: {}", strip_ansi_escapes::strip_str(msg));

		#[cfg(debug_assertions)]
		{
			better_panic::Settings::auto()
				.most_recent_first(false)
				.lineno_suffix(true)
				.verbosity(better_panic::Verbosity::Medium)
				.create_panic_handler()(panic_info);
		}
	}));
	Ok(())
}

pub fn json_subscriber(log_level: Level) -> impl Subscriber + Send + Sync {
	FmtSubscriber::builder()
		.json()
		.with_env_filter(env_filter(log_level))
		.with_span_events(format::FmtSpan::CLOSE)
		.finish()
		.with(ErrorLayer::default())
}

pub fn default_subscriber(log_level: Level) -> impl Subscriber + Send + Sync {
	FmtSubscriber::builder()
		.with_env_filter(env_filter(log_level))
		.with_span_events(format::FmtSpan::CLOSE)
		.finish()
		.with(ErrorLayer::default())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::shutdown::Controller;

	#[test]
	fn filter_targets_gateway_crates() {
		let filter = env_filter(Level::DEBUG).to_string();
		assert!(filter.contains("geth_gateway=debug"));
		assert!(filter.contains("warn"));
	}

	#[tokio::test]
	async fn spawned_task_completes() {
		let shutdown = Controller::new();
		let trigger = shutdown.trigger();
		spawn_in_span(async move { trigger.fire() }).await.unwrap();
		assert!(shutdown.is_triggered());
	}
}
