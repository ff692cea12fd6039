//! Server side sessions.  The browser only ever holds the session id, in a private cookie; the
//! data lives in a [`SessionStore`], in memory while developing and in Postgres in production.

use crate::database::{DbPool, Migration, Migrations};
use crate::web::AppState;
use dashmap::DashMap;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest};
use rocket::Request;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::*;
use uuid::Uuid;

pub const COOKIE_SESSION: &str = "app_session";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
	#[error("session database error")]
	Database(#[from] sqlx::Error),
	#[error("stored session data is corrupt")]
	Corrupt(#[from] serde_json::Error),
	#[error("application state is not managed")]
	Unmanaged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
	pub fn generate() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Display for SessionId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		Display::fmt(&self.0, f)
	}
}

impl FromStr for SessionId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::from_str(s)?))
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct SessionData {
	pub shop: Option<String>,
	pub access_token: Option<String>,
	/// OAuth nonce between the auth redirect and its callback.
	pub auth_state: Option<String>,
}

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
	/// `None` for unknown or expired sessions.
	async fn load(&self, id: SessionId) -> Result<Option<SessionData>, SessionError>;

	/// Stores the data and restarts the session's time to live.
	async fn save(&self, id: SessionId, data: &SessionData, ttl: Duration)
		-> Result<(), SessionError>;

	async fn destroy(&self, id: SessionId) -> Result<(), SessionError>;

	/// Drops every expired session, returning how many went away.
	async fn purge_expired(&self) -> Result<u64, SessionError>;
}

/// Non-durable sessions, lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
	sessions: DashMap<SessionId, (SessionData, Instant)>,
}

impl MemorySessionStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
	async fn load(&self, id: SessionId) -> Result<Option<SessionData>, SessionError> {
		let found = match self.sessions.get(&id) {
			Some(entry) if entry.value().1 > Instant::now() => return Ok(Some(entry.value().0.clone())),
			Some(_) => true,
			None => false,
		};
		if found {
			self.sessions.remove(&id);
		}
		Ok(None)
	}

	async fn save(
		&self,
		id: SessionId,
		data: &SessionData,
		ttl: Duration,
	) -> Result<(), SessionError> {
		self.sessions
			.insert(id, (data.clone(), Instant::now() + ttl));
		Ok(())
	}

	async fn destroy(&self, id: SessionId) -> Result<(), SessionError> {
		self.sessions.remove(&id);
		Ok(())
	}

	async fn purge_expired(&self) -> Result<u64, SessionError> {
		let before = self.sessions.len();
		let now = Instant::now();
		self.sessions.retain(|_, (_, expires_at)| *expires_at > now);
		Ok(before.saturating_sub(self.sessions.len()) as u64)
	}
}

/// Durable sessions in the `web_sessions` table.
pub struct PgSessionStore {
	pool: DbPool,
}

impl PgSessionStore {
	pub async fn new(pool: DbPool) -> anyhow::Result<Self> {
		MIGRATIONS.migrate_up(&pool).await?;
		Ok(Self { pool })
	}
}

#[async_trait::async_trait]
impl SessionStore for PgSessionStore {
	async fn load(&self, id: SessionId) -> Result<Option<SessionData>, SessionError> {
		let data = sqlx::query_scalar::<_, String>(
			"SELECT data FROM web_sessions WHERE id = $1 AND expires_at > now()",
		)
		.bind(id.0)
		.fetch_optional(&*self.pool)
		.await?;
		match data {
			Some(data) => Ok(Some(serde_json::from_str(&data)?)),
			None => Ok(None),
		}
	}

	async fn save(
		&self,
		id: SessionId,
		data: &SessionData,
		ttl: Duration,
	) -> Result<(), SessionError> {
		let data = serde_json::to_string(data)?;
		sqlx::query(
			r#"
				INSERT INTO web_sessions (id, data, expires_at)
				VALUES ($1, $2, now() + $3 * interval '1 second')
				ON CONFLICT (id) DO UPDATE
				SET data = EXCLUDED.data, expires_at = EXCLUDED.expires_at;
			"#,
		)
		.bind(id.0)
		.bind(data)
		.bind(ttl.as_secs_f64())
		.execute(&*self.pool)
		.await?;
		Ok(())
	}

	async fn destroy(&self, id: SessionId) -> Result<(), SessionError> {
		sqlx::query("DELETE FROM web_sessions WHERE id = $1")
			.bind(id.0)
			.execute(&*self.pool)
			.await?;
		Ok(())
	}

	async fn purge_expired(&self) -> Result<u64, SessionError> {
		let result = sqlx::query("DELETE FROM web_sessions WHERE expires_at <= now()")
			.execute(&*self.pool)
			.await?;
		Ok(result.rows_affected())
	}
}

/// The current request's session.  Sessions are only written once something is stored in them.
#[derive(Debug)]
pub struct Session {
	id: Option<SessionId>,
	pub data: SessionData,
}

impl Session {
	pub async fn save(&mut self, app: &AppState, cookies: &CookieJar<'_>) -> Result<(), SessionError> {
		let id = *self.id.get_or_insert_with(SessionId::generate);
		app.sessions.save(id, &self.data, app.session_ttl).await?;
		let mut cookie = Cookie::new(COOKIE_SESSION, id.to_string());
		cookie.set_http_only(true);
		cookie.set_same_site(SameSite::Lax);
		cookie.set_path("/");
		cookies.add_private(cookie);
		Ok(())
	}

	pub async fn destroy(self, app: &AppState, cookies: &CookieJar<'_>) -> Result<(), SessionError> {
		if let Some(id) = self.id {
			app.sessions.destroy(id).await?;
		}
		cookies.remove_private(Cookie::new(COOKIE_SESSION, ""));
		Ok(())
	}
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session {
	type Error = SessionError;

	async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
		let app = match request.rocket().state::<AppState>() {
			Some(app) => app,
			None => return Outcome::Error((Status::InternalServerError, SessionError::Unmanaged)),
		};
		let id = request
			.cookies()
			.get_private(COOKIE_SESSION)
			.and_then(|cookie| SessionId::from_str(cookie.value()).ok());
		let id = match id {
			Some(id) => id,
			None => {
				return Outcome::Success(Session {
					id: None,
					data: SessionData::default(),
				})
			}
		};
		match app.sessions.load(id).await {
			Ok(Some(data)) => Outcome::Success(Session { id: Some(id), data }),
			Ok(None) => {
				debug!("session {} is unknown or expired", id);
				Outcome::Success(Session {
					id: None,
					data: SessionData::default(),
				})
			}
			Err(e) => {
				error!("failed loading session {}: {}", id, e);
				Outcome::Error((Status::InternalServerError, e))
			}
		}
	}
}

const MIGRATIONS: Migrations = Migrations::new(
	"WebSessions",
	&[Migration::new(
		"Create web_sessions table",
		r#"
			CREATE TABLE web_sessions (
				id uuid NOT NULL,
				data text NOT NULL,
				expires_at timestamp with time zone NOT NULL,
				CONSTRAINT web_sessions_pkey PRIMARY KEY (id)
			);
			CREATE INDEX web_sessions_expires_at_index ON web_sessions USING btree (expires_at);
		"#,
	)],
);
