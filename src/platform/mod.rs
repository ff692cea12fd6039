//! The e-commerce platform as seen by this app: an injected capability covering the OAuth token
//! exchange, webhook verification and registration, and admin API calls.

pub mod http;

pub use http::HttpPlatform;

pub const HEADER_ACCESS_TOKEN: &str = "X-Redhio-Access-Token";
pub const HEADER_HMAC: &str = "X-Redhio-Hmac-Sha256";
pub const HEADER_TOPIC: &str = "X-Redhio-Topic";
pub const HEADER_SHOP_DOMAIN: &str = "X-Redhio-Shop-Domain";

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
	#[error("invalid shop domain: {0}")]
	InvalidShop(String),
	#[error("unable to verify request HMAC")]
	InvalidHmac,
	#[error("unsupported HTTP method: {0}")]
	InvalidMethod(String),
	#[error("platform responded with {status}: {body}")]
	Rejected { status: u16, body: String },
	#[error("platform request failed")]
	Transport(#[from] reqwest::Error),
	#[error("unexpected platform response")]
	Decode(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct WebhookRegistration {
	pub topic: String,
	pub address: String,
	pub format: String,
}

impl WebhookRegistration {
	pub fn json(topic: impl Into<String>, address: impl Into<String>) -> Self {
		Self {
			topic: topic.into(),
			address: address.into(),
			format: "json".to_owned(),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
	pub status: u16,
	pub content_type: Option<String>,
	pub body: String,
}

impl ApiResponse {
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

#[async_trait::async_trait]
pub trait Platform: Send + Sync {
	/// Where to send the merchant to approve the app.
	fn authorize_url(&self, shop: &str, scopes: &[String], redirect_uri: &str, state: &str)
		-> String;

	/// Trades an authorization code for a permanent access token.
	async fn exchange_token(&self, shop: &str, code: &str) -> Result<String, PlatformError>;

	fn verify_webhook(&self, hmac_header: &str, raw_body: &[u8]) -> Result<(), PlatformError>;

	async fn register_webhook(
		&self,
		shop: &str,
		access_token: &str,
		webhook: &WebhookRegistration,
	) -> Result<(), PlatformError>;

	/// Calls `{admin}{path}` on the shop; non-2xx responses are returned, not turned into errors.
	async fn api_request(
		&self,
		shop: &str,
		access_token: &str,
		method: &str,
		path: &str,
		body: Option<serde_json::Value>,
	) -> Result<ApiResponse, PlatformError>;
}

/// Shop domains are bare hostnames like `my-store.redhio.com`.
pub fn is_valid_shop(shop: &str) -> bool {
	shop.contains('.')
		&& shop.chars().next().map_or(false, |c| c.is_ascii_alphanumeric())
		&& shop.split('.').all(|label| {
			!label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
		})
}
