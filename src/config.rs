use rocket::config::LogLevel;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use tracing::*;

const CONFIG_FILE_NAME: &str = "config.ron";

pub const ENV_APP_KEY: &str = "REDHIO_APP_KEY";
pub const ENV_APP_HOST: &str = "REDHIO_APP_HOST";
pub const ENV_APP_SECRET: &str = "REDHIO_APP_SECRET";
pub const ENV_NODE_ENV: &str = "NODE_ENV";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
	#[error("Unable to create configuration directory at: {0:?}")]
	CreateDirError(PathBuf, #[source] std::io::Error),
	#[error("Unable to write missing default configuration file at: {0:?}")]
	UnableToWriteDefaultConfig(PathBuf, #[source] std::io::Error),
	#[error("failed reading configuration file at: {0:?}")]
	FileReadFailure(PathBuf, #[source] std::io::Error),
	#[error("failed parsing configuration file in ron format")]
	RonParseFailure(#[from] ron::Error),
	#[error("`{0}` must be set, either in the environment or the configuration file")]
	MissingValue(&'static str),
}

/// Development unless `NODE_ENV` is exactly `production`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum Environment {
	Development,
	Production,
}

impl Default for Environment {
	fn default() -> Self {
		Environment::Development
	}
}

impl Environment {
	pub fn from_node_env(node_env: Option<&str>) -> Self {
		match node_env {
			Some("production") => Environment::Production,
			_ => Environment::Development,
		}
	}

	pub fn is_development(self) -> bool {
		self == Environment::Development
	}

	/// Only durable production sessions get purged, memory sessions go with the process.
	pub fn purges_sessions(self) -> bool {
		self == Environment::Production
	}
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct PlatformConfig {
	/// The app's API key, `REDHIO_APP_KEY` overrides it.
	pub api_key: String,
	/// Public URL this app is reachable at, `REDHIO_APP_HOST` overrides it.
	pub host: String,
	/// Shared secret for OAuth, webhook signatures and cookies, `REDHIO_APP_SECRET` overrides it.
	pub secret: String,
	pub scopes: Vec<String>,
	/// Talk to this base URL instead of `https://{shop}`, for local platform stand-ins.
	pub admin_base_override: Option<String>,
}

impl Default for PlatformConfig {
	fn default() -> Self {
		Self {
			api_key: String::new(),
			host: String::new(),
			secret: String::new(),
			scopes: vec!["write_orders".to_owned(), "write_products".to_owned()],
			admin_base_override: None,
		}
	}
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct WebConfig {
	/// IP address to serve on. **(default: `0.0.0.0`)**
	pub address: IpAddr,
	/// Port to serve on. **(default: `8000`)**
	pub port: u16,
	/// Number of threads to use for executing futures. **(default: `(num_cores+1)/2`)**
	pub workers: usize,
	/// Keep-alive timeout in seconds; disabled when `0`. **(default: `5`)**
	pub keep_alive: u32,
	/// Value of the `Server` header. **(default: `"Storefront"`)**
	pub ident: String,
	/// Max level rocket logs at, `off`, `critical`, `normal` or `debug`. **(default: `critical`)**
	pub log_level: LogLevel,
	/// Where the page templates live. **(default: `templates`)**
	pub template_dir: PathBuf,
	/// Assets served live at `/assets` in development. **(default: `assets`)**
	pub assets_dir: PathBuf,
	/// Where the platform auth routes are mounted. **(default: `/redhio`)**
	pub auth_base_url: String,
	/// How long an idle session is kept. **(default: 1 day)**
	pub session_ttl_secs: u64,
	/// Largest accepted webhook body. **(default: 1 MiB)**
	pub webhook_limit_bytes: u64,
	/// The grace period: seconds to keep finishing server I/O on shutdown. **(default: `2`)**
	pub grace: u32,
	/// The mercy period: seconds to keep finishing connection I/O on shutdown. **(default: `3`)**
	pub mercy: u32,
}

impl Default for WebConfig {
	fn default() -> Self {
		Self {
			address: Ipv4Addr::new(0, 0, 0, 0).into(),
			port: 8000,
			workers: (rocket::Config::default().workers + 1) / 2,
			keep_alive: 5,
			ident: "Storefront".to_owned(),
			log_level: LogLevel::Critical,
			template_dir: "templates".into(),
			assets_dir: "assets".into(),
			auth_base_url: "/redhio".to_owned(),
			session_ttl_secs: 60 * 60 * 24,
			webhook_limit_bytes: 1024 * 1024,
			grace: 2,
			mercy: 3,
		}
	}
}

/// Backing database for sessions in production.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
	/// `DATABASE_URL` overrides it.
	pub url: String,
	pub max_connections: u8,
	/// How often expired sessions get deleted.
	pub purge_interval_secs: u64,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			url: "postgres://localhost/storefront".to_owned(),
			max_connections: 5,
			purge_interval_secs: 5 * 60,
		}
	}
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Config {
	/// Only ever taken from `NODE_ENV`.
	#[serde(skip)]
	pub environment: Environment,
	pub platform: PlatformConfig,
	pub web: WebConfig,
	pub database: DatabaseConfig,
}

impl Config {
	/// Reads `config.ron` from `config_dir`, writing the defaults there first if it is missing,
	/// then lays the process environment over it.
	pub fn load(config_dir: Option<&Path>) -> Result<Self, ConfigError> {
		let mut config = match config_dir {
			Some(dir) => Self::from_dir(dir)?,
			None => Self::default(),
		};
		config.apply_env(|key| std::env::var(key).ok());
		config.validate()?;
		Ok(config)
	}

	fn from_dir(dir: &Path) -> Result<Self, ConfigError> {
		if !dir.is_dir() {
			std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDirError(dir.into(), e))?;
		}
		let path = dir.join(CONFIG_FILE_NAME);
		if !path.is_file() {
			info!("Writing default configuration to {:?}", path);
			let ron = ron::ser::to_string_pretty(&Self::default(), Default::default())?;
			std::fs::write(&path, ron)
				.map_err(|e| ConfigError::UnableToWriteDefaultConfig(path.clone(), e))?;
		}
		let ron = std::fs::read_to_string(&path)
			.map_err(|e| ConfigError::FileReadFailure(path.clone(), e))?;
		Self::from_ron_str(&ron)
	}

	pub fn from_ron_str(ron: &str) -> Result<Self, ConfigError> {
		Ok(ron::from_str(ron)?)
	}

	/// Environment values win over file values; `lookup` returns `None` for unset keys.
	pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
		if let Some(api_key) = lookup(ENV_APP_KEY) {
			self.platform.api_key = api_key;
		}
		if let Some(host) = lookup(ENV_APP_HOST) {
			self.platform.host = host;
		}
		if let Some(secret) = lookup(ENV_APP_SECRET) {
			self.platform.secret = secret;
		}
		if let Some(url) = lookup(ENV_DATABASE_URL) {
			self.database.url = url;
		}
		self.environment = Environment::from_node_env(lookup(ENV_NODE_ENV).as_deref());
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.platform.api_key.is_empty() {
			return Err(ConfigError::MissingValue(ENV_APP_KEY));
		}
		if self.platform.host.is_empty() {
			return Err(ConfigError::MissingValue(ENV_APP_HOST));
		}
		if self.platform.secret.is_empty() {
			return Err(ConfigError::MissingValue(ENV_APP_SECRET));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |key| vars.get(key).cloned()
	}

	#[test]
	fn environment_flag() {
		assert_eq!(
			Environment::from_node_env(Some("production")),
			Environment::Production
		);
		assert_eq!(
			Environment::from_node_env(Some("staging")),
			Environment::Development
		);
		assert_eq!(Environment::from_node_env(None), Environment::Development);
	}

	#[test]
	fn only_production_purges_sessions() {
		assert!(Environment::Production.purges_sessions());
		assert!(!Environment::Development.purges_sessions());
	}

	#[test]
	fn env_overrides_file_values() {
		let mut config = Config::from_ron_str(
			r#"(platform: (api_key: "from-file", host: "https://file.example.com"))"#,
		)
		.unwrap();
		assert_eq!(config.platform.api_key, "from-file");
		config.apply_env(lookup(&[
			(ENV_APP_KEY, "from-env"),
			(ENV_APP_SECRET, "shh"),
			(ENV_NODE_ENV, "production"),
		]));
		assert_eq!(config.platform.api_key, "from-env");
		assert_eq!(config.platform.host, "https://file.example.com");
		assert_eq!(config.environment, Environment::Production);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn missing_secret_is_rejected() {
		let mut config = Config::default();
		config.apply_env(lookup(&[
			(ENV_APP_KEY, "key"),
			(ENV_APP_HOST, "https://app.example.com"),
		]));
		match config.validate() {
			Err(ConfigError::MissingValue(name)) => assert_eq!(name, ENV_APP_SECRET),
			other => panic!("unexpected: {:?}", other),
		}
	}

	#[test]
	fn default_config_round_trips_through_ron() {
		let ron = ron::ser::to_string_pretty(&Config::default(), Default::default()).unwrap();
		let config = Config::from_ron_str(&ron).unwrap();
		assert_eq!(config.web.auth_base_url, "/redhio");
		assert_eq!(config.platform.scopes, vec!["write_orders", "write_products"]);
	}
}
