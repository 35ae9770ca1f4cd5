//! HTTP server of the gateway, see [`super::routes`] for the endpoints.

use color_eyre::{eyre::WrapErr, Result};
use futures::Future;
use hyper::StatusCode;
use std::{convert::Infallible, net::SocketAddr, str::FromStr, sync::Arc};
use tracing::{error, info};
use warp::{
	reject::{InvalidQuery, MethodNotAllowed},
	Filter, Rejection, Reply,
};

use super::{
	routes,
	types::{Envelope, Outcome, TooManyRequests},
};
use crate::{
	admission::AdmissionController, dispatch::Dispatcher, network::rpc::Node, shutdown::Monitor,
};

pub struct Server<C: Node> {
	pub admission: Arc<AdmissionController>,
	pub dispatcher: Arc<Dispatcher<C>>,
}

impl<C: Node + 'static> Server<C> {
	/// Binds the listener and returns the server future, which completes
	/// after shutdown is requested and in-flight requests are answered.
	pub fn bind(
		self,
		host: &str,
		port: u16,
		monitor: Monitor,
	) -> Result<(SocketAddr, impl Future<Output = ()>)> {
		let cors = warp::cors()
			.allow_any_origin()
			.allow_header("content-type")
			.allow_methods(vec!["GET", "POST", "PUT", "DELETE"]);

		let routes = routes::routes(self.admission, self.dispatcher).with(cors);

		let addr = SocketAddr::from_str(format!("{host}:{port}").as_str())
			.wrap_err("Unable to parse host address from config")?;

		// warp graceful shutdown expects a signal that is [`Future<Output = ()>`]
		let shutdown_signal = async move { monitor.canceled().await };
		let (addr, server) = warp::serve(routes)
			.try_bind_with_graceful_shutdown(addr, shutdown_signal)
			.wrap_err_with(|| format!("Unable to bind HTTP server to {addr}"))?;

		info!("Gateway running on http://{addr}");
		Ok((addr, server))
	}
}

pub async fn handle_rejection(error: Rejection) -> Result<warp::reply::Response, Infallible> {
	if let Some(TooManyRequests(message)) = error.find() {
		return Ok(Outcome::Rejected(message.clone()).into_response());
	}

	if error.is_not_found() || error.find::<MethodNotAllowed>().is_some() {
		let reply = Envelope::error("Not Found").with_status(StatusCode::NOT_FOUND);
		return Ok(reply.into_response());
	}

	if let Some(invalid) = error.find::<InvalidQuery>() {
		let reply = Envelope::error(invalid.to_string()).with_status(StatusCode::BAD_REQUEST);
		return Ok(reply.into_response());
	}

	error!("Unhandled rejection: {error:?}");
	let reply = Envelope::error("Internal Server Error")
		.with_status(StatusCode::INTERNAL_SERVER_ERROR);
	Ok(reply.into_response())
}
