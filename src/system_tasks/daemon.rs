use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::*;

/// Turns process signals into a quit broadcast.
pub struct Daemon;

impl Daemon {
	pub fn spawn(do_quit: broadcast::Sender<()>) -> JoinHandle<anyhow::Result<()>> {
		let mut on_quit = do_quit.subscribe();
		tokio::task::spawn(async move {
			info!("Daemon task has launched");
			#[cfg(unix)]
			{
				use tokio::signal::unix::{signal, SignalKind};
				let mut hangup = signal(SignalKind::hangup())?;
				let mut interrupt = signal(SignalKind::interrupt())?;
				let mut quit = signal(SignalKind::quit())?;
				let mut terminate = signal(SignalKind::terminate())?;
				loop {
					let do_break = tokio::select! {
						_ = hangup.recv() => {
							info!("Hangup requested, daemon mode ignores it");
							false
						}
						_ = interrupt.recv() => {
							info!("Interrupt signal received, cleanly exiting...");
							let _ = do_quit.send(());
							true
						}
						_ = quit.recv() => {
							info!("Quit signal received, cleanly exiting...");
							let _ = do_quit.send(());
							true
						}
						_ = terminate.recv() => {
							info!("Terminate signal received, cleanly exiting...");
							let _ = do_quit.send(());
							true
						}
						_ = on_quit.recv() => {
							info!("Daemon task has received a quit requested, exiting");
							true
						}
					};
					if do_break {
						break;
					}
				}
			}

			#[cfg(not(unix))]
			tokio::select! {
				_ = tokio::signal::ctrl_c() => {
					info!("Ctrl+C signal received, cleanly exiting...");
					let _ = do_quit.send(());
				}
				_ = on_quit.recv() => {
					info!("Daemon task has received a quit requested, exiting");
				}
			}

			Ok(())
		})
	}
}
