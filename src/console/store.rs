use crate::console::draft::{reduce, Action, ConsoleState, RequestDraft};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::*;

const ABANDONED_CALL: &str = "request abandoned";

/// Owns the console state; every change goes through [`Store::dispatch`].
pub struct Store {
	state: RwLock<Arc<ConsoleState>>,
	notify: watch::Sender<Arc<ConsoleState>>,
}

impl Default for Store {
	fn default() -> Self {
		Self::new(ConsoleState::default())
	}
}

impl Store {
	pub fn new(initial: ConsoleState) -> Self {
		let initial = Arc::new(initial);
		let (notify, _) = watch::channel(initial.clone());
		Self {
			state: RwLock::new(initial),
			notify,
		}
	}

	pub fn state(&self) -> Arc<ConsoleState> {
		self.state.read().clone()
	}

	pub fn draft(&self) -> RequestDraft {
		self.state.read().request_fields.clone()
	}

	/// Receives every state the store moves to.
	pub fn subscribe(&self) -> watch::Receiver<Arc<ConsoleState>> {
		self.notify.subscribe()
	}

	pub fn dispatch(&self, action: Action) -> Arc<ConsoleState> {
		let mut state = self.state.write();
		let next = reduce(&state, &action);
		if Arc::ptr_eq(&state, &next) {
			debug!("console action {:?} left the state unchanged", action);
			return next;
		}
		debug!(
			"console action {:?}: {:?} -> {:?}",
			action, **state, *next
		);
		*state = next.clone();
		// Stored even without receivers, late subscribers start from it
		self.notify.send_replace(next.clone());
		next
	}

	/// Starts the call lifecycle.  The returned handle must be finished with exactly one of
	/// [`PendingCall::complete`] or [`PendingCall::fail`].
	pub fn begin_call(&self) -> PendingCall<'_> {
		self.dispatch(Action::RequestStart);
		PendingCall {
			store: self,
			finished: false,
		}
	}
}

#[must_use = "a started call must be completed or failed"]
pub struct PendingCall<'s> {
	store: &'s Store,
	finished: bool,
}

impl<'s> PendingCall<'s> {
	pub fn complete(mut self, response_body: impl Into<String>) -> Arc<ConsoleState> {
		self.finished = true;
		self.store.dispatch(Action::request_complete(response_body))
	}

	pub fn fail(mut self, request_error: impl Into<String>) -> Arc<ConsoleState> {
		self.finished = true;
		self.store.dispatch(Action::request_error(request_error))
	}
}

impl<'s> Drop for PendingCall<'s> {
	fn drop(&mut self) {
		if !self.finished {
			warn!("console call dropped before it finished");
			self.store.dispatch(Action::request_error(ABANDONED_CALL));
		}
	}
}
