//! The platform install flow, mounted under the auth base url: the authorize redirect, its
//! callback, and a proxy to the admin API for the signed in shop.

use crate::platform::{is_valid_shop, WebhookRegistration};
use crate::web::error::AppError;
use crate::web::session::{Session, SessionError};
use crate::web::AppState;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rocket::http::uri::Origin;
use rocket::http::{ContentType, CookieJar, Status};
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest};
use rocket::response::Redirect;
use rocket::{Request, Route, State};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::*;

pub const ORDERS_CREATE_TOPIC: &str = "orders/create";

const NONCE_LENGTH: usize = 32;

/// A session that went through the install flow.
#[derive(Debug)]
pub struct ShopSession {
	pub shop: String,
	pub access_token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ShopSessionError {
	#[error("no shop is signed in")]
	NotSignedIn,
	#[error("session unavailable")]
	Session(#[from] SessionError),
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ShopSession {
	type Error = ShopSessionError;

	async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
		let session = match request.guard::<Session>().await {
			Outcome::Success(session) => session,
			Outcome::Error((status, e)) => return Outcome::Error((status, e.into())),
			Outcome::Forward(status) => return Outcome::Forward(status),
		};
		match (session.data.shop, session.data.access_token) {
			(Some(shop), Some(access_token)) => Outcome::Success(ShopSession { shop, access_token }),
			_ => Outcome::Error((Status::Unauthorized, ShopSessionError::NotSignedIn)),
		}
	}
}

fn new_nonce() -> String {
	rand::thread_rng()
		.sample_iter(&Alphanumeric)
		.take(NONCE_LENGTH)
		.map(char::from)
		.collect()
}

fn checked_shop(shop: Option<String>) -> Result<String, AppError> {
	let shop = shop.filter(|s| !s.is_empty()).ok_or(AppError::MissingShop)?;
	if is_valid_shop(&shop) {
		Ok(shop)
	} else {
		Err(AppError::InvalidShop(shop))
	}
}

/// Registers the order webhook for a freshly installed shop.  Failures are only logged.
fn after_auth(app: &AppState, shop: String, access_token: String) {
	let platform = Arc::clone(&app.platform);
	let webhook = WebhookRegistration::json(ORDERS_CREATE_TOPIC, app.order_webhook_address());
	tokio::spawn(async move {
		match platform
			.register_webhook(&shop, &access_token, &webhook)
			.await
		{
			Ok(()) => info!("webhook '{}' created for {}", webhook.topic, shop),
			Err(e) => error!("Error creating webhook '{}' for {}. {}", webhook.topic, shop, e),
		}
	});
}

#[rocket::get("/auth?<shop>")]
async fn auth(
	shop: Option<String>,
	mut session: Session,
	app: &State<AppState>,
	cookies: &CookieJar<'_>,
) -> Result<Redirect, AppError> {
	let shop = checked_shop(shop)?;
	let nonce = new_nonce();
	let redirect_uri = format!("{}{}/auth/callback", app.host(), app.auth_base_url);
	let authorize_url = app
		.platform
		.authorize_url(&shop, &app.scopes, &redirect_uri, &nonce);
	session.data.auth_state = Some(nonce);
	session.save(app, cookies).await?;
	info!("Sending {} to the platform to authorize the app", shop);
	Ok(Redirect::to(authorize_url))
}

#[rocket::get("/auth/callback?<shop>&<code>&<state>")]
async fn callback(
	shop: Option<String>,
	code: Option<String>,
	state: Option<String>,
	mut session: Session,
	app: &State<AppState>,
	cookies: &CookieJar<'_>,
) -> Result<Redirect, AppError> {
	let shop = checked_shop(shop)?;
	let code = code.ok_or(AppError::MissingParameter("code"))?;
	let state = state.ok_or(AppError::MissingParameter("state"))?;
	if session.data.auth_state.take().as_deref() != Some(state.as_str()) {
		return Err(AppError::StateMismatch);
	}
	let access_token = app.platform.exchange_token(&shop, &code).await?;
	info!("{} authorized the app", shop);
	session.data.shop = Some(shop.clone());
	session.data.access_token = Some(access_token.clone());
	session.save(app, cookies).await?;
	app.shops.store_shop(shop.as_str(), access_token.as_str());
	after_auth(app, shop, access_token);
	Ok(Redirect::to("/"))
}

#[rocket::get("/logout")]
async fn logout(
	session: Session,
	app: &State<AppState>,
	cookies: &CookieJar<'_>,
) -> Result<Redirect, AppError> {
	session.destroy(app, cookies).await?;
	Ok(Redirect::to("/install"))
}

type ProxyResponse = (Status, (ContentType, String));

async fn proxy(
	app: &AppState,
	shop: ShopSession,
	method: &str,
	path: PathBuf,
	origin: &Origin<'_>,
	body: Option<String>,
) -> Result<ProxyResponse, AppError> {
	let mut path = format!("/{}", path.to_string_lossy().replace('\\', "/"));
	if let Some(query) = origin.query() {
		path.push('?');
		path.push_str(query.as_str());
	}
	let body = match body.as_deref().map(str::trim) {
		Some(body) if !body.is_empty() => {
			Some(serde_json::from_str(body).map_err(AppError::InvalidBody)?)
		}
		_ => None,
	};
	let response = app
		.platform
		.api_request(&shop.shop, &shop.access_token, method, &path, body)
		.await?;
	let status = Status::from_code(response.status).unwrap_or(Status::BadGateway);
	let content_type = response
		.content_type
		.as_deref()
		.and_then(ContentType::parse_flexible)
		.unwrap_or(ContentType::JSON);
	Ok((status, (content_type, response.body)))
}

#[rocket::get("/api/<path..>")]
async fn api_get(
	path: PathBuf,
	shop: ShopSession,
	origin: &Origin<'_>,
	app: &State<AppState>,
) -> Result<ProxyResponse, AppError> {
	proxy(app, shop, "GET", path, origin, None).await
}

#[rocket::delete("/api/<path..>")]
async fn api_delete(
	path: PathBuf,
	shop: ShopSession,
	origin: &Origin<'_>,
	app: &State<AppState>,
) -> Result<ProxyResponse, AppError> {
	proxy(app, shop, "DELETE", path, origin, None).await
}

#[rocket::post("/api/<path..>", data = "<body>")]
async fn api_post(
	path: PathBuf,
	shop: ShopSession,
	origin: &Origin<'_>,
	body: String,
	app: &State<AppState>,
) -> Result<ProxyResponse, AppError> {
	proxy(app, shop, "POST", path, origin, Some(body)).await
}

#[rocket::put("/api/<path..>", data = "<body>")]
async fn api_put(
	path: PathBuf,
	shop: ShopSession,
	origin: &Origin<'_>,
	body: String,
	app: &State<AppState>,
) -> Result<ProxyResponse, AppError> {
	proxy(app, shop, "PUT", path, origin, Some(body)).await
}

pub fn routes() -> Vec<Route> {
	rocket::routes![auth, callback, logout, api_get, api_delete, api_post, api_put]
}
