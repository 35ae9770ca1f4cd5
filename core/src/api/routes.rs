//! Gateway routes.
//!
//! * `GET /` - greeting
//! * `GET /node` - node info
//! * `GET /block/{block_number}` - block by number, hex quantity or tag
//! * `GET /transaction/{transaction_hash}` - transaction by hash
//! * `POST /transaction?from=..&to=..&value=..` - sends a transaction
//! * `PUT /miner` - starts mining
//! * `DELETE /miner` - stops mining
//!
//! Every route passes its class limiter before any upstream call is made.

use std::{collections::HashMap, convert::Infallible, net::SocketAddr, sync::Arc};
use warp::{Filter, Rejection, Reply};

use super::{handlers, server::handle_rejection, types::TooManyRequests};
use crate::{
	admission::{Admission, AdmissionController, RouteClass},
	dispatch::Dispatcher,
	network::rpc::Node,
	types::client_identity,
};

fn with_dispatcher<C: Node + 'static>(
	dispatcher: Arc<Dispatcher<C>>,
) -> impl Filter<Extract = (Arc<Dispatcher<C>>,), Error = Infallible> + Clone {
	warp::any().map(move || dispatcher.clone())
}

async fn admit(
	admission: Arc<AdmissionController>,
	class: RouteClass,
	remote: Option<SocketAddr>,
) -> Result<(), Rejection> {
	match admission.admit(class, &client_identity(remote)) {
		Admission::Allowed => Ok(()),
		Admission::Rejected(message) => Err(warp::reject::custom(TooManyRequests(message))),
	}
}

/// Counts the request against the class limiter of the remote client.
fn admitted(
	admission: Arc<AdmissionController>,
	class: RouteClass,
) -> impl Filter<Extract = (), Error = Rejection> + Clone {
	warp::addr::remote()
		.and_then(move |remote| admit(admission.clone(), class, remote))
		.untuple_one()
}

pub fn root_route(
	admission: Arc<AdmissionController>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path::end()
		.and(warp::get())
		.and(admitted(admission, RouteClass::Root))
		.then(handlers::root)
}

pub fn node_route<C: Node + 'static>(
	admission: Arc<AdmissionController>,
	dispatcher: Arc<Dispatcher<C>>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path!("node")
		.and(warp::get())
		.and(admitted(admission, RouteClass::Node))
		.and(with_dispatcher(dispatcher))
		.then(handlers::node)
}

pub fn block_route<C: Node + 'static>(
	admission: Arc<AdmissionController>,
	dispatcher: Arc<Dispatcher<C>>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path!("block" / String)
		.and(warp::get())
		.and(admitted(admission, RouteClass::Block))
		.and(with_dispatcher(dispatcher))
		.then(handlers::block)
}

pub fn transaction_route<C: Node + 'static>(
	admission: Arc<AdmissionController>,
	dispatcher: Arc<Dispatcher<C>>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path!("transaction" / String)
		.and(warp::get())
		.and(admitted(admission, RouteClass::Transaction))
		.and(with_dispatcher(dispatcher))
		.then(handlers::transaction)
}

pub fn send_transaction_route<C: Node + 'static>(
	admission: Arc<AdmissionController>,
	dispatcher: Arc<Dispatcher<C>>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path!("transaction")
		.and(warp::post())
		.and(admitted(admission, RouteClass::Transaction))
		.and(warp::query::<HashMap<String, String>>())
		.and(with_dispatcher(dispatcher))
		.then(handlers::send_transaction)
}

pub fn start_miner_route<C: Node + 'static>(
	admission: Arc<AdmissionController>,
	dispatcher: Arc<Dispatcher<C>>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path!("miner")
		.and(warp::put())
		.and(admitted(admission, RouteClass::Miner))
		.and(with_dispatcher(dispatcher))
		.then(handlers::start_miner)
}

pub fn stop_miner_route<C: Node + 'static>(
	admission: Arc<AdmissionController>,
	dispatcher: Arc<Dispatcher<C>>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path!("miner")
		.and(warp::delete())
		.and(admitted(admission, RouteClass::Miner))
		.and(with_dispatcher(dispatcher))
		.then(handlers::stop_miner)
}

pub fn routes<C: Node + 'static>(
	admission: Arc<AdmissionController>,
	dispatcher: Arc<Dispatcher<C>>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
	root_route(admission.clone())
		.or(node_route(admission.clone(), dispatcher.clone()))
		.or(block_route(admission.clone(), dispatcher.clone()))
		.or(transaction_route(admission.clone(), dispatcher.clone()))
		.or(send_transaction_route(admission.clone(), dispatcher.clone()))
		.or(start_miner_route(admission.clone(), dispatcher.clone()))
		.or(stop_miner_route(admission, dispatcher))
		.recover(handle_rejection)
}
