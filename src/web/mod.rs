pub mod auth;
pub mod error;
pub mod request_logger;
pub mod session;
pub mod shops;
pub mod static_files;
pub mod webhook;

use crate::config::{Config, Environment, WebConfig};
use crate::console::RequestDraft;
use crate::platform::Platform;
use crate::system::QuitOnError;
use crate::web::auth::ShopSession;
use crate::web::request_logger::RequestLogger;
use crate::web::session::SessionStore;
use crate::web::shops::ShopStore;
use crate::web::webhook::{Webhook, WebhookError, WEBHOOK_LIMIT};
use base64::Engine;
use rocket::data::{Limits, ToByteUnit};
use rocket::figment::Figment;
use rocket::http::Status;
use rocket::response::Redirect;
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::Template;
use sha2::Digest;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::*;

pub const APP_TITLE: &str = "Redhio Node App";

/// Everything the handlers share, managed by rocket.
pub struct AppState {
	pub environment: Environment,
	pub api_key: String,
	host: String,
	pub scopes: Vec<String>,
	pub auth_base_url: String,
	pub session_ttl: Duration,
	pub platform: Arc<dyn Platform>,
	pub sessions: Arc<dyn SessionStore>,
	pub shops: ShopStore,
}

impl AppState {
	pub fn new(
		config: &Config,
		platform: Arc<dyn Platform>,
		sessions: Arc<dyn SessionStore>,
	) -> Self {
		Self {
			environment: config.environment,
			api_key: config.platform.api_key.clone(),
			host: config.platform.host.trim_end_matches('/').to_owned(),
			scopes: config.platform.scopes.clone(),
			auth_base_url: config.web.auth_base_url.trim_end_matches('/').to_owned(),
			session_ttl: Duration::from_secs(config.web.session_ttl_secs),
			platform,
			sessions,
			shops: ShopStore::new(),
		}
	}

	/// Public URL of the app, without a trailing slash.
	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn order_webhook_address(&self) -> String {
		format!("{}/order-create", self.host)
	}
}

#[derive(serde::Serialize)]
struct InstallPage<'a> {
	title: &'a str,
	auth_url: String,
}

#[derive(serde::Serialize)]
struct AppPage<'a> {
	title: &'a str,
	api_key: &'a str,
	shop: &'a str,
	auth_base: &'a str,
	draft: RequestDraft,
}

#[rocket::get("/install")]
fn install(app: &State<AppState>) -> Template {
	Template::render(
		"install",
		InstallPage {
			title: APP_TITLE,
			auth_url: format!("{}/auth", app.auth_base_url),
		},
	)
}

/// Signed in shops get the app, anyone else is sent into the install flow.
#[rocket::get("/?<shop>")]
fn home(
	shop_session: Option<ShopSession>,
	shop: Option<String>,
	app: &State<AppState>,
) -> Result<Template, Redirect> {
	match shop_session {
		Some(session) => Ok(Template::render(
			"app",
			AppPage {
				title: APP_TITLE,
				api_key: &app.api_key,
				shop: &session.shop,
				auth_base: &app.auth_base_url,
				draft: RequestDraft::default(),
			},
		)),
		None => match shop.filter(|shop| crate::platform::is_valid_shop(shop)) {
			Some(shop) => Err(Redirect::to(format!(
				"{}/auth?shop={}",
				app.auth_base_url, shop
			))),
			None => Err(Redirect::to("/install")),
		},
	}
}

#[rocket::post("/order-create", data = "<webhook>")]
fn order_create(webhook: Result<Webhook, WebhookError>, app: &State<AppState>) -> (Status, ()) {
	let webhook = match webhook {
		Ok(webhook) => webhook,
		Err(e) => {
			error!("Rejected webhook delivery: {}", e);
			return (e.status(), ());
		}
	};
	let installed_at = webhook
		.shop_domain
		.as_deref()
		.and_then(|shop| app.shops.get_shop(shop))
		.map(|record| record.installed_at);
	info!("We got a webhook!");
	info!(
		"Details: topic={:?} shop_domain={:?} installed_at={:?}",
		webhook.topic, webhook.shop_domain, installed_at
	);
	info!("Body: {}", webhook.body);
	(Status::Ok, ())
}

impl WebConfig {
	/// Rocket's own settings; the cookie key is derived from the app secret.
	pub fn figment(&self, secret: &str) -> Figment {
		let secret_key =
			base64::engine::general_purpose::STANDARD.encode(sha2::Sha256::digest(secret.as_bytes()));
		let limits = Limits::default()
			.limit(WEBHOOK_LIMIT, self.webhook_limit_bytes.bytes())
			.limit("string", 1.mebibytes());
		rocket::Config::figment()
			.merge(("address", self.address))
			.merge(("port", self.port))
			.merge(("workers", self.workers))
			.merge(("keep_alive", self.keep_alive))
			.merge(("ident", &self.ident))
			.merge(("log_level", self.log_level))
			.merge(("secret_key", secret_key))
			.merge(("template_dir", &self.template_dir))
			.merge(("limits", limits))
			.merge((
				"shutdown",
				rocket::config::Shutdown {
					// `ctrlc` and signals are already handled by the daemon task
					ctrlc: false,
					#[cfg(unix)]
					signals: Default::default(),
					grace: self.grace,
					mercy: self.mercy,
					..Default::default()
				},
			))
	}
}

/// Assembles the whole app: session state, assets, the auth routes, pages, webhook and catchers.
pub fn build_rocket(figment: Figment, config: &Config, app: AppState) -> Rocket<Build> {
	let development = app.environment.is_development();
	let auth_base_url = if app.auth_base_url.is_empty() {
		"/".to_owned()
	} else {
		app.auth_base_url.clone()
	};
	let rocket = rocket::custom(figment)
		.manage(app)
		.attach(RequestLogger)
		.attach(Template::fairing());
	static_files::mount_assets(rocket, development, &config.web.assets_dir)
		.mount(&auth_base_url, auth::routes())
		.mount("/", rocket::routes![install, home, order_create])
		.register(
			"/",
			rocket::catchers![error::not_found, error::default_catcher],
		)
}

pub struct WebServer;

impl WebServer {
	pub async fn runner(rocket: Rocket<Build>, quit: broadcast::Sender<()>) -> anyhow::Result<()> {
		info!("Igniting the rocket web server");
		let rocket = rocket.ignite().await.quit_on_err(&quit)?;
		let shutdown = rocket.shutdown();
		let mut on_quit = quit.subscribe();
		tokio::spawn(async move {
			let _ = on_quit.recv().await;
			info!("Shutdown requested, sending graceful shutdown request to the rocket web server");
			shutdown.notify();
		});

		info!("Launching the rocket web server");
		rocket.launch().await.quit_on_err(&quit)?;

		info!("Rocket web server had a successful shutdown");
		let _ = quit.send(());
		Ok(())
	}

	pub fn spawn(
		config: &Config,
		app: AppState,
		quit: broadcast::Sender<()>,
	) -> JoinHandle<anyhow::Result<()>> {
		let figment = config.web.figment(&config.platform.secret);
		let rocket = build_rocket(figment, config, app);
		tokio::spawn(Self::runner(rocket, quit))
	}
}
