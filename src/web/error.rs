use crate::platform::PlatformError;
use crate::web::session::SessionError;
use crate::web::AppState;
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::Request;
use rocket_dyn_templates::Template;
use std::error::Error as StdError;
use tracing::*;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
	#[error("Expected a shop query parameter")]
	MissingShop,
	#[error("Invalid shop domain: {0}")]
	InvalidShop(String),
	#[error("Missing query parameter: {0}")]
	MissingParameter(&'static str),
	#[error("Request origin could not be verified")]
	StateMismatch,
	#[error("Request body is not valid JSON")]
	InvalidBody(#[source] serde_json::Error),
	#[error("Session failure")]
	Session(#[from] SessionError),
	#[error("Platform request failed")]
	Platform(#[from] PlatformError),
}

impl AppError {
	pub fn status(&self) -> Status {
		match self {
			AppError::MissingShop
			| AppError::InvalidShop(_)
			| AppError::MissingParameter(_)
			| AppError::StateMismatch
			| AppError::InvalidBody(_) => Status::BadRequest,
			AppError::Session(_) | AppError::Platform(_) => Status::InternalServerError,
		}
	}
}

#[derive(serde::Serialize)]
struct ErrorPage {
	title: String,
	message: String,
	status: u16,
	/// Only filled in while developing.
	error: Option<String>,
}

fn is_development(request: &Request<'_>) -> bool {
	request
		.rocket()
		.state::<AppState>()
		.map_or(false, |app| app.environment.is_development())
}

/// The `error` page, with `detail` shown only while developing.
pub fn error_page(request: &Request<'_>, status: Status, message: String, detail: Option<String>) -> Template {
	let error = if is_development(request) { detail } else { None };
	Template::render(
		"error",
		ErrorPage {
			title: format!("{} {}", status.code, status.reason_lossy()),
			message,
			status: status.code,
			error,
		},
	)
}

fn error_chain(error: &dyn StdError) -> String {
	let mut chain = format!("{:?}", error);
	let mut source = error.source();
	while let Some(cause) = source {
		chain.push_str(&format!("\ncaused by: {}", cause));
		source = cause.source();
	}
	chain
}

impl<'r> Responder<'r, 'static> for AppError {
	fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
		let status = self.status();
		if status == Status::InternalServerError {
			error!("{} {}: {}", request.method(), request.uri(), error_chain(&self));
		} else {
			warn!("{} {}: {}", request.method(), request.uri(), self);
		}
		let page = error_page(request, status, self.to_string(), Some(error_chain(&self)));
		(status, page).respond_to(request)
	}
}

#[rocket::catch(404)]
pub fn not_found(request: &Request<'_>) -> Template {
	error_page(
		request,
		Status::NotFound,
		"Not Found".to_owned(),
		Some(format!("No route for {} {}", request.method(), request.uri())),
	)
}

#[rocket::catch(default)]
pub fn default_catcher(status: Status, request: &Request<'_>) -> Template {
	error_page(request, status, status.reason_lossy().to_owned(), None)
}
