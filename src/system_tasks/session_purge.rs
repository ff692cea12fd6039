use crate::web::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::*;

/// Deletes expired sessions every `interval` until quit.
pub struct SessionPurge {
	sessions: Arc<dyn SessionStore>,
	interval: Duration,
}

impl SessionPurge {
	pub fn new(sessions: Arc<dyn SessionStore>, interval: Duration) -> Self {
		Self { sessions, interval }
	}

	pub async fn purge_once(&self) {
		match self.sessions.purge_expired().await {
			Ok(0) => trace!("No expired sessions to purge"),
			Ok(count) => info!("Purged {} expired sessions", count),
			Err(e) => error!("Failed purging expired sessions: {}", e),
		}
	}

	pub fn spawn(self, quit: broadcast::Sender<()>) -> JoinHandle<anyhow::Result<()>> {
		let mut on_quit = quit.subscribe();
		tokio::spawn(async move {
			if self.interval.as_secs() == 0 {
				info!("Session purging is disabled");
				return Ok(());
			}
			let mut ticker = tokio::time::interval(self.interval);
			loop {
				tokio::select! {
					_ = ticker.tick() => self.purge_once().await,
					_ = on_quit.recv() => {
						info!("Session purge task has received a quit request, exiting");
						break;
					}
				}
			}
			Ok(())
		})
	}
}
