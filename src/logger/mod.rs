use log4rs::config::runtime::ConfigErrors;
use log4rs::config::{Config, Deserializers, RawConfig};
use std::path::{Path, PathBuf};
use tracing::log::SetLoggerError;

const DEFAULT_LOGGING_DEFINITION_RON: &str = r#"(
	// Default values for loggers
	root: Root(
		// Default log filter level unless otherwise specified in the loggers section.
		level: Info,
		// The appenders to enable by default from the appenders section.
		appenders: ["console", "log_file"],
	),

	// List of appenders, these receive a log event and do whatever they wish to do with it.
	// Each appender has a `kind` that defines what code it runs, the rest of the key/values are
	// passed to that kind to initialize it.
	appenders: {
		"console": {
			"kind": "console",
			// Either Some("stdout") or Some("stderr"), stdout is left to the `console` command.
			"target": Some("stderr"),
			"encoder": Some({
				// See the log4rs `PatternEncoder` documentation for the pattern syntax.
				"kind": "pattern",
				"pattern": "{d(%H:%M:%S%.3f)} {h({l})} {M}: {m}{n}",
			}),
		},
		"log_file": {
			// Rolls `log/current.log` over to `log/previous-{}.log` once it gets too big.
			"kind": "rolling_file",
			"path": "log/current.log",
			"policy": {
				"kind": "compound",
				"trigger": { "kind": "size", "limit": "10 mb" },
				"roller": {
					"kind": "fixed_window",
					"count": 5,
					"pattern": "log/previous-{}.log",
				},
			},
			"encoder": {
				"kind": "pattern",
				"pattern": "{d} [{t}:{I}:{T}] {l} {M}: {m}{n}",
			},
		},
	},

	loggers: {
		// Loggers inherit from their parents, so `storefront::web` takes `storefront`s values
		// unless overridden.  Levels are Off, Error, Warn, Info, Debug or Trace.
		"storefront": ( level: Debug ),
		"storefront::console::store": ( level: Info ),
		"tracing::span": ( level: Info, appenders: [], additive: true ),
		"rocket": ( level: Warn ),
		"_": ( level: Warn ),
		"hyper": ( level: Info ),
		"reqwest": ( level: Info ),
		"sqlx": ( level: Warn ),
		"want": ( level: Info ),
	},
)
"#;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("Unable to create configuration directory at: {0:?}")]
	CreateDirError(PathBuf, #[source] std::io::Error),
	#[error("Unable to write missing default `log4rs.ron` file at: {0:?}")]
	UnableToWriteDefaultConfig(PathBuf, #[source] std::io::Error),
	#[error("Unable to configure logging system")]
	ConfigFailure(#[from] ConfigErrors),
	#[error("Unable to initialize logging system from configuration")]
	ConfigurationInit(#[from] SetLoggerError),
	#[error("failed parsing configuration file in ron format")]
	RonParseFailure(#[from] ron::Error),
	#[error("failed reading file")]
	FileReadFailure(#[from] std::io::Error),
}

/// Initializes the logging system from `log4rs.ron` in `config_dir`, writing the default
/// definition there first if it is missing.  Without a directory the default is used as is.
pub fn init_logging(config_dir: Option<&Path>) -> Result<(), Error> {
	let config = match config_dir {
		Some(path) => {
			if !path.is_dir() {
				std::fs::create_dir_all(&path)
					.map_err(|e| Error::CreateDirError(path.into(), e))?;
			}
			let logger_config_path = path.join("log4rs.ron");
			if !logger_config_path.is_file() {
				std::fs::write(&logger_config_path, DEFAULT_LOGGING_DEFINITION_RON)
					.map_err(|e| Error::UnableToWriteDefaultConfig(logger_config_path.clone(), e))?;
			}
			config_from_ron_file(&logger_config_path)?
		}
		None => config_from_ron_string(DEFAULT_LOGGING_DEFINITION_RON)?,
	};
	log4rs::init_config(config)?;
	Ok(())
}

fn config_from_ron_file(ron_path: impl AsRef<Path>) -> Result<Config, Error> {
	let ron = std::fs::read_to_string(ron_path)?;
	config_from_ron_string(&ron).map_err(Into::into)
}

fn config_from_ron_string(ron: &str) -> Result<Config, ron::Error> {
	let raw_config: RawConfig = ron::from_str(ron)?;
	let deserializers = Deserializers::default();

	let (appenders, mut errors) = raw_config.appenders_lossy(&deserializers);
	errors.handle();

	let (config, mut errors) = Config::builder()
		.appenders(appenders)
		.loggers(raw_config.loggers())
		.build_lossy(raw_config.root());

	errors.handle();

	Ok(config)
}
