//! Runs the drafted call.  The store only ever sees `REQUEST_START` followed by exactly one of
//! `REQUEST_COMPLETE` or `REQUEST_ERROR`, in that order.

use crate::console::draft::{ConsoleState, RequestDraft};
use crate::console::store::Store;
use crate::platform::Platform;
use std::sync::Arc;
use tracing::*;

/// Verbs that never carry the draft's params as a body.
const BODYLESS_VERBS: &[&str] = &["GET", "HEAD", "DELETE", "OPTIONS"];

#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync {
	/// Sends the draft, yielding the response body or a displayable error.
	async fn send(&self, draft: &RequestDraft) -> Result<String, String>;
}

pub async fn run_request(store: &Store, dispatcher: &dyn Dispatcher) -> Arc<ConsoleState> {
	let draft = store.draft();
	let call = store.begin_call();
	info!("console sending {} {}", draft.verb, draft.path);
	match dispatcher.send(&draft).await {
		Ok(body) => call.complete(body),
		Err(e) => {
			warn!("console call to {} failed: {}", draft.path, e);
			call.fail(e)
		}
	}
}

/// The JSON body for a draft, `None` for verbs that do not send one.
pub fn draft_body(draft: &RequestDraft) -> Result<Option<serde_json::Value>, String> {
	let verb = draft.verb.trim().to_ascii_uppercase();
	if BODYLESS_VERBS.contains(&verb.as_str()) {
		return Ok(None);
	}
	serde_json::from_str(&draft.params)
		.map(Some)
		.map_err(|e| format!("params are not valid JSON: {}", e))
}

/// Re-indents JSON bodies for display, leaves anything else alone.
fn display_body(body: String) -> String {
	match serde_json::from_str::<serde_json::Value>(&body) {
		Ok(value) => serde_json::to_string_pretty(&value).unwrap_or(body),
		Err(_) => body,
	}
}

/// Sends drafts to one shop's admin API with its access token.
pub struct PlatformDispatcher {
	platform: Arc<dyn Platform>,
	shop: String,
	access_token: String,
}

impl PlatformDispatcher {
	pub fn new(
		platform: Arc<dyn Platform>,
		shop: impl Into<String>,
		access_token: impl Into<String>,
	) -> Self {
		Self {
			platform,
			shop: shop.into(),
			access_token: access_token.into(),
		}
	}
}

#[async_trait::async_trait]
impl Dispatcher for PlatformDispatcher {
	async fn send(&self, draft: &RequestDraft) -> Result<String, String> {
		let body = draft_body(draft)?;
		let response = self
			.platform
			.api_request(
				&self.shop,
				&self.access_token,
				&draft.verb,
				&draft.path,
				body,
			)
			.await
			.map_err(|e| e.to_string())?;
		if response.is_success() {
			Ok(display_body(response.body))
		} else {
			Err(format!("{}: {}", response.status, response.body))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::console::draft::Action;
	use crate::platform::{ApiResponse, PlatformError, WebhookRegistration};
	use parking_lot::Mutex;
	use tokio::sync::watch;

	struct Canned(Result<String, String>);

	#[async_trait::async_trait]
	impl Dispatcher for Canned {
		async fn send(&self, _draft: &RequestDraft) -> Result<String, String> {
			self.0.clone()
		}
	}

	#[derive(Default)]
	struct RecordingPlatform {
		calls: Mutex<Vec<(String, String, Option<serde_json::Value>)>>,
		status: u16,
	}

	#[async_trait::async_trait]
	impl Platform for RecordingPlatform {
		fn authorize_url(&self, _: &str, _: &[String], _: &str, _: &str) -> String {
			String::new()
		}

		async fn exchange_token(&self, _: &str, _: &str) -> Result<String, PlatformError> {
			unimplemented!()
		}

		fn verify_webhook(&self, _: &str, _: &[u8]) -> Result<(), PlatformError> {
			unimplemented!()
		}

		async fn register_webhook(
			&self,
			_: &str,
			_: &str,
			_: &WebhookRegistration,
		) -> Result<(), PlatformError> {
			unimplemented!()
		}

		async fn api_request(
			&self,
			_shop: &str,
			_access_token: &str,
			method: &str,
			path: &str,
			body: Option<serde_json::Value>,
		) -> Result<ApiResponse, PlatformError> {
			self.calls
				.lock()
				.push((method.to_owned(), path.to_owned(), body));
			Ok(ApiResponse {
				status: self.status,
				content_type: Some("application/json".to_owned()),
				body: r#"{"ok":true}"#.to_owned(),
			})
		}
	}

	#[tokio::test]
	async fn successful_call_completes() {
		let store = Store::default();
		let state = run_request(&store, &Canned(Ok(r#"{"ok":true}"#.to_owned()))).await;
		assert!(!state.request_in_progress);
		assert_eq!(state.request_error, None);
		assert_eq!(state.response_body, r#"{"ok":true}"#);
	}

	#[tokio::test]
	async fn failed_call_records_the_error() {
		let store = Store::default();
		let state = run_request(&store, &Canned(Err("timeout".to_owned()))).await;
		assert!(!state.request_in_progress);
		assert_eq!(state.request_error.as_deref(), Some("timeout"));
		assert_eq!(state.response_body, "");
	}

	struct ObservesStart(watch::Receiver<Arc<ConsoleState>>);

	#[async_trait::async_trait]
	impl Dispatcher for ObservesStart {
		async fn send(&self, _draft: &RequestDraft) -> Result<String, String> {
			if self.0.borrow().request_in_progress {
				Ok("started".to_owned())
			} else {
				Err("sent before the call started".to_owned())
			}
		}
	}

	#[tokio::test]
	async fn call_is_in_progress_while_sending() {
		let store = Store::default();
		let state = run_request(&store, &ObservesStart(store.subscribe())).await;
		assert_eq!(state.response_body, "started");
		assert!(!store.state().request_in_progress);
	}

	#[test]
	fn bodyless_verbs_skip_params() {
		let draft = RequestDraft {
			verb: "get".to_owned(),
			path: "/models.json".to_owned(),
			params: "not json".to_owned(),
		};
		assert_eq!(draft_body(&draft), Ok(None));
	}

	#[tokio::test]
	async fn malformed_params_fail_without_a_network_call() {
		let platform = Arc::new(RecordingPlatform {
			status: 200,
			..Default::default()
		});
		let store = Store::default();
		store.dispatch(Action::update_verb("POST"));
		store.dispatch(Action::update_params("{ nope"));
		let dispatcher = PlatformDispatcher::new(platform.clone(), "shop.redhio.com", "tok");
		let state = run_request(&store, &dispatcher).await;
		assert!(state
			.request_error
			.as_deref()
			.unwrap()
			.starts_with("params are not valid JSON"));
		assert!(platform.calls.lock().is_empty());
	}

	#[tokio::test]
	async fn post_sends_params_and_pretty_prints_the_response() {
		let platform = Arc::new(RecordingPlatform {
			status: 201,
			..Default::default()
		});
		let store = Store::default();
		store.dispatch(Action::update_verb("POST"));
		let dispatcher = PlatformDispatcher::new(platform.clone(), "shop.redhio.com", "tok");
		let state = run_request(&store, &dispatcher).await;
		assert_eq!(state.response_body, "{\n  \"ok\": true\n}");
		let calls = platform.calls.lock();
		assert_eq!(calls.len(), 1);
		assert_eq!(calls[0].0, "POST");
		assert_eq!(calls[0].1, "/models.json");
		assert_eq!(
			calls[0].2.as_ref().unwrap()["model"]["title"],
			"Generic ML Model"
		);
	}

	#[tokio::test]
	async fn error_status_becomes_a_call_error() {
		let platform = Arc::new(RecordingPlatform {
			status: 422,
			..Default::default()
		});
		let store = Store::default();
		let dispatcher = PlatformDispatcher::new(platform, "shop.redhio.com", "tok");
		let state = run_request(&store, &dispatcher).await;
		assert_eq!(state.request_error.as_deref(), Some(r#"422: {"ok":true}"#));
	}
}
