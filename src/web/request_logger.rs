use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;
use tracing::*;

struct RequestStart(Option<Instant>);

/// One line per request: method, uri, status and how long it took.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
	fn info(&self) -> Info {
		Info {
			name: "Request Logger",
			kind: Kind::Request | Kind::Response,
		}
	}

	async fn on_request(&self, request: &mut Request<'_>, _data: &mut Data<'_>) {
		request.local_cache(|| RequestStart(Some(Instant::now())));
	}

	async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
		let elapsed = request
			.local_cache(|| RequestStart(None))
			.0
			.map(|start| start.elapsed().as_secs_f64() * 1000.0);
		match elapsed {
			Some(ms) => info!(
				"{} {} {} {:.3} ms",
				request.method(),
				request.uri(),
				response.status().code,
				ms
			),
			None => info!(
				"{} {} {}",
				request.method(),
				request.uri(),
				response.status().code
			),
		}
	}
}
