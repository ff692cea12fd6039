use crate::config::DatabaseConfig;
use anyhow::bail;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use std::sync::Arc;
use tracing::*;

pub type DbPool = Arc<PgPool>;

impl DatabaseConfig {
	pub async fn create_database_pool(&self) -> anyhow::Result<DbPool> {
		info!("Initializing postgresql database connection");
		let pool = PgPoolOptions::new()
			.max_connections(self.max_connections as u32)
			.connect(&self.url)
			.await?;

		let pool: DbPool = Arc::new(pool);
		migrate_migration_table(&pool).await?;

		info!("Successfully initialized the database connection pool");
		Ok(pool)
	}
}

async fn migrate_migration_table(pool: &PgPool) -> anyhow::Result<()> {
	pool.execute(
		r#"
		CREATE TABLE IF NOT EXISTS _migrations (
			module text NOT NULL,
			version bigint NOT NULL,
			checksum bytea NOT NULL,
			description text NOT NULL,
			inserted_at timestamp without time zone NOT NULL DEFAULT now(),
			CONSTRAINT _migrations_pkey PRIMARY KEY (module, version)
		);
	"#,
	)
	.await?;
	info!("Migration Table loaded");
	Ok(())
}

/// One forward-only schema step, identified by its position in its module's list.
#[derive(Clone, Copy)]
pub struct Migration {
	pub description: &'static str,
	pub sql_up: &'static str,
}

/// The ordered schema history of one module, applied through the `_migrations` table.
pub struct Migrations {
	pub module: &'static str,
	pub migrations: &'static [Migration],
}

impl Migration {
	pub const fn new(description: &'static str, sql_up: &'static str) -> Self {
		Self {
			description,
			sql_up,
		}
	}

	pub fn checksum(&self) -> [u8; 64] {
		use sha2::Digest;
		let digest = sha2::Sha512::new()
			.chain_update(self.description.as_bytes())
			.chain_update(self.sql_up.as_bytes())
			.finalize();
		let mut checksum = [0; 64];
		checksum.copy_from_slice(&digest);
		checksum
	}
}

impl Migrations {
	pub const fn new(module: &'static str, migrations: &'static [Migration]) -> Self {
		Self { module, migrations }
	}

	pub async fn migrate_up(&self, pool: &PgPool) -> anyhow::Result<()> {
		if self.migrations.is_empty() {
			return Ok(());
		}
		info!("Migrating all up on {}", self.module);
		let mut conn = pool.begin().await?;
		// sqlx decodes neither unsigned integers nor fixed size arrays
		let mut applied = sqlx::query_as::<_, (i64, Vec<u8>)>(
			"SELECT version, checksum FROM _migrations WHERE module = $1 ORDER BY version DESC",
		)
		.bind(self.module)
		.fetch_all(&mut conn)
		.await?;
		for (version, migration) in self.migrations.iter().enumerate() {
			let version = version as i64;
			match applied.pop() {
				Some((applied_version, _)) if applied_version != version => {
					bail!(
						"Version mismatch in {}: {} -> {}",
						self.module,
						applied_version,
						version
					);
				}
				Some((_, checksum)) if checksum[..] != migration.checksum()[..] => {
					bail!(
						"Checksum mismatch in {} for version {}, `{}` was changed after it was applied",
						self.module,
						version,
						migration.description
					);
				}
				Some(_) => {}
				None => {
					info!("Migrate up {}: {}", self.module, migration.description);
					(&mut conn).execute(migration.sql_up).await?;
					sqlx::query("INSERT INTO _migrations(module, version, checksum, description) VALUES ($1, $2, $3, $4)")
						.bind(self.module)
						.bind(version)
						.bind(&migration.checksum()[..])
						.bind(migration.description)
						.execute(&mut conn)
						.await?;
				}
			}
		}
		conn.commit().await?;
		Ok(())
	}
}
