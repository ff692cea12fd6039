use crate::config::Config;
use crate::console::{run_request, Action, PlatformDispatcher, Store};
use crate::logger::init_logging;
use crate::platform::http::HttpPlatform;
use crate::platform::Platform;
use crate::system_tasks::daemon::Daemon;
use crate::system_tasks::session_purge::SessionPurge;
use crate::web::session::{MemorySessionStore, PgSessionStore, SessionStore};
use crate::web::{AppState, WebServer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::*;

#[derive(StructOpt, Debug)]
#[structopt(about = "Storefront app server and admin API request console")]
pub struct SystemArgs {
	/// Directory holding `config.ron` and `log4rs.ron`, created with defaults when missing
	#[structopt(long, parse(from_os_str))]
	config_dir: Option<PathBuf>,
	#[structopt(subcommand)]
	command: Option<Command>,
}

#[derive(StructOpt, Debug)]
pub enum Command {
	/// Serve the app until interrupted (the default)
	Serve,
	/// Send one admin API request for a shop and print the console state
	Console(ConsoleArgs),
}

#[derive(StructOpt, Debug)]
pub struct ConsoleArgs {
	/// Shop domain, like `my-store.redhio.com`
	#[structopt(long)]
	shop: String,
	#[structopt(long)]
	access_token: String,
	#[structopt(long)]
	verb: Option<String>,
	#[structopt(long)]
	path: Option<String>,
	/// JSON body for verbs that send one
	#[structopt(long)]
	params: Option<String>,
}

pub trait QuitOnError {
	fn quit_on_err(self, quit: &broadcast::Sender<()>) -> Self;
}

impl<T, E: std::fmt::Display> QuitOnError for Result<T, E> {
	fn quit_on_err(self, quit: &broadcast::Sender<()>) -> Self {
		if let Err(e) = &self {
			error!("Quitting due to: {}", e);
			let _ = quit.send(());
		}
		self
	}
}

pub struct System {
	args: SystemArgs,
	config: Config,
	system_tasks: Vec<JoinHandle<anyhow::Result<()>>>,
	quit: broadcast::Sender<()>,
}

impl System {
	pub async fn run() -> anyhow::Result<()> {
		let mut system = Self::new_with_args(SystemArgs::from_args())?;
		system.run_command().await
	}

	pub fn new_with_args(args: SystemArgs) -> anyhow::Result<Self> {
		let dotenv = dotenv::dotenv();
		init_logging(args.config_dir.as_deref())?;
		match dotenv {
			Ok(path) => info!("Loaded environment from {:?}", path),
			// A missing `.env` is normal, the real environment still applies
			Err(e) => debug!("No .env loaded: {}", e),
		}
		let config = Config::load(args.config_dir.as_deref())?;
		info!("Starting in {:?} mode", config.environment);
		let (quit, _recv_quit) = broadcast::channel(1);
		Ok(System {
			args,
			config,
			system_tasks: Vec::new(),
			quit,
		})
	}

	pub fn quit(&self) -> broadcast::Sender<()> {
		self.quit.clone()
	}

	fn platform(&self) -> anyhow::Result<Arc<dyn Platform>> {
		let platform = HttpPlatform::new(&self.config.platform.api_key, &self.config.platform.secret)?
			.admin_base_override(self.config.platform.admin_base_override.clone());
		Ok(Arc::new(platform))
	}

	async fn run_command(&mut self) -> anyhow::Result<()> {
		match self.args.command.take() {
			None | Some(Command::Serve) => self.serve().await,
			Some(Command::Console(args)) => self.console(args).await,
		}
	}

	async fn session_store(&self) -> anyhow::Result<Arc<dyn SessionStore>> {
		if self.config.environment.is_development() {
			info!("Keeping sessions in memory");
			return Ok(Arc::new(MemorySessionStore::new()));
		}
		info!("Keeping sessions in the database");
		let pool = self.config.database.create_database_pool().await?;
		Ok(Arc::new(PgSessionStore::new(pool).await?))
	}

	async fn serve(&mut self) -> anyhow::Result<()> {
		let sessions = self.session_store().await?;
		let app = AppState::new(&self.config, self.platform()?, Arc::clone(&sessions));

		self.system_tasks.push(Daemon::spawn(self.quit()));
		if self.config.environment.purges_sessions() {
			self.system_tasks.push(
				SessionPurge::new(
					sessions,
					Duration::from_secs(self.config.database.purge_interval_secs),
				)
				.spawn(self.quit()),
			);
		}
		self.system_tasks
			.push(WebServer::spawn(&self.config, app, self.quit()));

		let mut result = Ok(());
		while let Some(task) = self.system_tasks.pop() {
			if let Err(e) = task.await? {
				error!("System task failed: {}", e);
				result = Err(e);
			}
		}
		info!("All system tasks have exited");
		result
	}

	async fn console(&self, args: ConsoleArgs) -> anyhow::Result<()> {
		let store = Store::default();
		if let Some(verb) = args.verb {
			store.dispatch(Action::update_verb(verb));
		}
		if let Some(path) = args.path {
			store.dispatch(Action::update_path(path));
		}
		if let Some(params) = args.params {
			store.dispatch(Action::update_params(params));
		}
		let dispatcher = PlatformDispatcher::new(self.platform()?, args.shop, args.access_token);
		let state = run_request(&store, &dispatcher).await;
		println!("{}", serde_json::to_string_pretty(&*state)?);
		if let Some(e) = &state.request_error {
			anyhow::bail!("request failed: {}", e);
		}
		Ok(())
	}
}
