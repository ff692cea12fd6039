use crate::platform::{PlatformError, HEADER_HMAC, HEADER_SHOP_DOMAIN, HEADER_TOPIC};
use crate::web::AppState;
use rocket::data::{self, Data, FromData, ToByteUnit};
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::Request;

pub const WEBHOOK_LIMIT: &str = "webhook";

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
	#[error("missing `{0}` header")]
	MissingHeader(&'static str),
	#[error("webhook body exceeds the size limit")]
	TooLarge,
	#[error("unable to read webhook body")]
	Io(#[from] std::io::Error),
	#[error("webhook verification failed")]
	Verification(#[from] PlatformError),
	#[error("webhook body is not valid JSON")]
	InvalidJson(#[from] serde_json::Error),
	#[error("application state is not managed")]
	Unmanaged,
}

impl WebhookError {
	pub fn status(&self) -> Status {
		match self {
			WebhookError::MissingHeader(_) | WebhookError::Verification(_) => Status::Unauthorized,
			WebhookError::TooLarge => Status::PayloadTooLarge,
			WebhookError::InvalidJson(_) => Status::BadRequest,
			WebhookError::Io(_) | WebhookError::Unmanaged => Status::InternalServerError,
		}
	}
}

/// A platform callback whose signature checked out.
#[derive(Debug)]
pub struct Webhook {
	pub topic: Option<String>,
	pub shop_domain: Option<String>,
	pub body: serde_json::Value,
}

impl Webhook {
	fn verify(
		app: &AppState,
		request: &Request<'_>,
		raw_body: &[u8],
	) -> Result<Self, WebhookError> {
		let headers = request.headers();
		let hmac = headers
			.get_one(HEADER_HMAC)
			.ok_or(WebhookError::MissingHeader(HEADER_HMAC))?;
		app.platform.verify_webhook(hmac, raw_body)?;
		Ok(Self {
			topic: headers.get_one(HEADER_TOPIC).map(ToOwned::to_owned),
			shop_domain: headers.get_one(HEADER_SHOP_DOMAIN).map(ToOwned::to_owned),
			body: serde_json::from_slice(raw_body)?,
		})
	}
}

#[rocket::async_trait]
impl<'r> FromData<'r> for Webhook {
	type Error = WebhookError;

	async fn from_data(request: &'r Request<'_>, data: Data<'r>) -> data::Outcome<'r, Self> {
		let app = match request.rocket().state::<AppState>() {
			Some(app) => app,
			None => return Outcome::Error((Status::InternalServerError, WebhookError::Unmanaged)),
		};
		let limit = request
			.limits()
			.get(WEBHOOK_LIMIT)
			.unwrap_or_else(|| 1.mebibytes());
		let raw_body = match data.open(limit).into_bytes().await {
			Ok(raw_body) if raw_body.is_complete() => raw_body.into_inner(),
			Ok(_) => return Outcome::Error((Status::PayloadTooLarge, WebhookError::TooLarge)),
			Err(e) => {
				let e = WebhookError::from(e);
				return Outcome::Error((e.status(), e));
			}
		};
		match Self::verify(app, request, &raw_body) {
			Ok(webhook) => Outcome::Success(webhook),
			Err(e) => Outcome::Error((e.status(), e)),
		}
	}
}
