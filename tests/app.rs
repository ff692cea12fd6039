use parking_lot::Mutex;
use rocket::http::{Header, Status};
use rocket::local::asynchronous::Client;
use std::sync::Arc;
use std::time::Duration;
use storefront::config::{Config, Environment};
use storefront::platform::http::sign_webhook;
use storefront::platform::{
	ApiResponse, Platform, PlatformError, WebhookRegistration, HEADER_HMAC, HEADER_SHOP_DOMAIN,
	HEADER_TOPIC,
};
use storefront::web::session::MemorySessionStore;
use storefront::web::{build_rocket, AppState};

const SHOP: &str = "a-store.redhio.com";
const SECRET: &str = "hush";

#[derive(Default)]
struct MockPlatform {
	registered: Mutex<Vec<(String, String, WebhookRegistration)>>,
	api_calls: Mutex<Vec<(String, String, Option<serde_json::Value>)>>,
}

#[async_trait::async_trait]
impl Platform for MockPlatform {
	fn authorize_url(&self, shop: &str, _scopes: &[String], redirect_uri: &str, state: &str) -> String {
		format!(
			"https://{}/admin/oauth/authorize?redirect_uri={}&state={}",
			shop, redirect_uri, state
		)
	}

	async fn exchange_token(&self, _shop: &str, code: &str) -> Result<String, PlatformError> {
		match code {
			"good-code" => Ok("token-1".to_owned()),
			_ => Err(PlatformError::Rejected {
				status: 400,
				body: "bad code".to_owned(),
			}),
		}
	}

	fn verify_webhook(&self, hmac_header: &str, raw_body: &[u8]) -> Result<(), PlatformError> {
		if sign_webhook(SECRET, raw_body)? == hmac_header {
			Ok(())
		} else {
			Err(PlatformError::InvalidHmac)
		}
	}

	async fn register_webhook(
		&self,
		shop: &str,
		access_token: &str,
		webhook: &WebhookRegistration,
	) -> Result<(), PlatformError> {
		self.registered
			.lock()
			.push((shop.to_owned(), access_token.to_owned(), webhook.clone()));
		Ok(())
	}

	async fn api_request(
		&self,
		_shop: &str,
		_access_token: &str,
		method: &str,
		path: &str,
		body: Option<serde_json::Value>,
	) -> Result<ApiResponse, PlatformError> {
		self.api_calls
			.lock()
			.push((method.to_owned(), path.to_owned(), body));
		Ok(ApiResponse {
			status: 200,
			content_type: Some("application/json".to_owned()),
			body: r#"{"models":[]}"#.to_owned(),
		})
	}
}

fn config() -> Config {
	let mut config = Config::default();
	config.platform.api_key = "test-key".to_owned();
	config.platform.host = "https://app.example.com".to_owned();
	config.platform.secret = SECRET.to_owned();
	config
}

async fn client(platform: Arc<MockPlatform>) -> Client {
	client_in(Environment::Development, platform).await
}

async fn client_in(environment: Environment, platform: Arc<MockPlatform>) -> Client {
	let mut config = config();
	config.environment = environment;
	let app = AppState::new(&config, platform, Arc::new(MemorySessionStore::new()));
	let figment = config.web.figment(&config.platform.secret);
	Client::tracked(build_rocket(figment, &config, app))
		.await
		.expect("valid rocket")
}

fn location(response: &rocket::local::asynchronous::LocalResponse<'_>) -> String {
	response
		.headers()
		.get_one("Location")
		.expect("redirect location")
		.to_owned()
}

#[rocket::async_test]
async fn anonymous_home_redirects_to_install() {
	let client = client(Arc::new(MockPlatform::default())).await;
	let response = client.get("/").dispatch().await;
	assert_eq!(response.status(), Status::SeeOther);
	assert_eq!(location(&response), "/install");
}

#[rocket::async_test]
async fn home_with_shop_starts_auth() {
	let client = client(Arc::new(MockPlatform::default())).await;
	let response = client.get(format!("/?shop={}", SHOP)).dispatch().await;
	assert_eq!(response.status(), Status::SeeOther);
	assert_eq!(location(&response), format!("/redhio/auth?shop={}", SHOP));
}

#[rocket::async_test]
async fn install_page_points_at_auth() {
	let client = client(Arc::new(MockPlatform::default())).await;
	let response = client.get("/install").dispatch().await;
	assert_eq!(response.status(), Status::Ok);
	let body = response.into_string().await.unwrap();
	assert!(body.contains(r#"action="/redhio/auth""#));
}

/// Starts the install flow and returns the callback query for `code` with the issued state.
async fn callback_with(client: &Client, code: &str) -> String {
	let response = client
		.get(format!("/redhio/auth?shop={}", SHOP))
		.dispatch()
		.await;
	let authorize = location(&response);
	let state = authorize.split("state=").nth(1).expect("state parameter");
	format!(
		"/redhio/auth/callback?shop={}&code={}&state={}",
		SHOP, code, state
	)
}

#[rocket::async_test]
async fn failure_detail_is_shown_while_developing() {
	let client = client_in(Environment::Development, Arc::new(MockPlatform::default())).await;
	let callback = callback_with(&client, "bad-code").await;
	let response = client.get(callback).dispatch().await;
	assert_eq!(response.status(), Status::InternalServerError);
	let body = response.into_string().await.unwrap();
	assert!(body.contains("Platform request failed"));
	assert!(body.contains("caused by"));
	assert!(body.contains("bad code"));
}

#[rocket::async_test]
async fn failure_detail_is_hidden_in_production() {
	let client = client_in(Environment::Production, Arc::new(MockPlatform::default())).await;
	let callback = callback_with(&client, "bad-code").await;
	let response = client.get(callback).dispatch().await;
	assert_eq!(response.status(), Status::InternalServerError);
	let body = response.into_string().await.unwrap();
	assert!(body.contains("Platform request failed"));
	assert!(!body.contains("caused by"));
	assert!(!body.contains("bad code"));
	assert!(!body.contains("Rejected"));
}

#[rocket::async_test]
async fn auth_requires_a_shop() {
	let client = client(Arc::new(MockPlatform::default())).await;
	let response = client.get("/redhio/auth").dispatch().await;
	assert_eq!(response.status(), Status::BadRequest);
	let response = client.get("/redhio/auth?shop=nope").dispatch().await;
	assert_eq!(response.status(), Status::BadRequest);
}

#[rocket::async_test]
async fn unknown_route_is_not_found() {
	let client = client(Arc::new(MockPlatform::default())).await;
	let response = client.get("/no/such/page").dispatch().await;
	assert_eq!(response.status(), Status::NotFound);
}

#[rocket::async_test]
async fn api_proxy_requires_a_signed_in_shop() {
	let client = client(Arc::new(MockPlatform::default())).await;
	let response = client.get("/redhio/api/models.json").dispatch().await;
	assert_eq!(response.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn callback_rejects_a_foreign_state() {
	let client = client(Arc::new(MockPlatform::default())).await;
	client
		.get(format!("/redhio/auth?shop={}", SHOP))
		.dispatch()
		.await;
	let response = client
		.get(format!(
			"/redhio/auth/callback?shop={}&code=good-code&state=forged",
			SHOP
		))
		.dispatch()
		.await;
	assert_eq!(response.status(), Status::BadRequest);
}

#[rocket::async_test]
async fn install_flow_signs_in_and_registers_the_order_webhook() {
	let platform = Arc::new(MockPlatform::default());
	let client = client(Arc::clone(&platform)).await;

	let response = client
		.get(format!("/redhio/auth?shop={}", SHOP))
		.dispatch()
		.await;
	assert_eq!(response.status(), Status::SeeOther);
	let authorize = location(&response);
	assert!(authorize.starts_with(&format!("https://{}/admin/oauth/authorize", SHOP)));
	assert!(authorize.contains("redirect_uri=https://app.example.com/redhio/auth/callback"));
	let state = authorize
		.split("state=")
		.nth(1)
		.expect("state parameter")
		.to_owned();

	let response = client
		.get(format!(
			"/redhio/auth/callback?shop={}&code=good-code&state={}",
			SHOP, state
		))
		.dispatch()
		.await;
	assert_eq!(response.status(), Status::SeeOther);
	assert_eq!(location(&response), "/");

	// Registration runs in the background
	let mut registered = Vec::new();
	for _ in 0..100 {
		registered = platform.registered.lock().clone();
		if !registered.is_empty() {
			break;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	assert_eq!(registered.len(), 1);
	let (shop, token, webhook) = &registered[0];
	assert_eq!(shop, SHOP);
	assert_eq!(token, "token-1");
	assert_eq!(
		webhook,
		&WebhookRegistration::json("orders/create", "https://app.example.com/order-create")
	);

	let response = client.get("/").dispatch().await;
	assert_eq!(response.status(), Status::Ok);
	let body = response.into_string().await.unwrap();
	assert!(body.contains(SHOP));
	assert!(body.contains("test-key"));
	assert!(body.contains(r#"data-api-base="/redhio/api""#));
	// The console starts from the default draft
	assert!(body.contains("<option selected>GET</option>"));
	assert!(body.contains("Generic ML Model"));
	assert!(body.contains("redhIO"));

	let response = client
		.get("/redhio/api/models.json?limit=1")
		.dispatch()
		.await;
	assert_eq!(response.status(), Status::Ok);
	assert_eq!(response.into_string().await.unwrap(), r#"{"models":[]}"#);
	let response = client
		.post("/redhio/api/models.json")
		.body(r#"{"model":{"name":"x"}}"#)
		.dispatch()
		.await;
	assert_eq!(response.status(), Status::Ok);
	{
		let calls = platform.api_calls.lock();
		assert_eq!(calls[0].0, "GET");
		assert_eq!(calls[0].1, "/models.json?limit=1");
		assert_eq!(calls[0].2, None);
		assert_eq!(calls[1].0, "POST");
		assert_eq!(
			calls[1].2,
			Some(serde_json::json!({"model": {"name": "x"}}))
		);
	}

	let response = client.get("/redhio/logout").dispatch().await;
	assert_eq!(response.status(), Status::SeeOther);
	let response = client.get("/").dispatch().await;
	assert_eq!(location(&response), "/install");
}

#[rocket::async_test]
async fn signed_webhook_is_accepted() {
	let client = client(Arc::new(MockPlatform::default())).await;
	let body = r#"{"id":1,"total_price":"10.00"}"#;
	let response = client
		.post("/order-create")
		.header(Header::new(HEADER_HMAC, sign_webhook(SECRET, body.as_bytes()).unwrap()))
		.header(Header::new(HEADER_TOPIC, "orders/create"))
		.header(Header::new(HEADER_SHOP_DOMAIN, SHOP))
		.body(body)
		.dispatch()
		.await;
	assert_eq!(response.status(), Status::Ok);
}

#[rocket::async_test]
async fn forged_webhook_is_unauthorized_without_a_body() {
	let client = client(Arc::new(MockPlatform::default())).await;
	let body = r#"{"id":1}"#;
	let response = client
		.post("/order-create")
		.header(Header::new(HEADER_HMAC, sign_webhook("not-the-secret", body.as_bytes()).unwrap()))
		.body(body)
		.dispatch()
		.await;
	assert_eq!(response.status(), Status::Unauthorized);
	assert_eq!(response.into_string().await.unwrap_or_default(), "");

	let response = client.post("/order-create").body(body).dispatch().await;
	assert_eq!(response.status(), Status::Unauthorized);
}
