//! The request draft and the pure transition function over it.
//!
//! Everything the console can do to its state is an [`Action`], and the only way to get a new
//! state is [`reduce`].  Network work happens elsewhere, see [`crate::console::dispatch`].

use std::sync::Arc;

const DEFAULT_VERB: &str = "GET";
const DEFAULT_PATH: &str = "/models.json";
const DEFAULT_PARAMS: &str = r#"{
  "model": {
    "title": "Generic ML Model",
    "body_html": "<strong>Good AI!</strong>",
    "vendor": "redhIO",
    "product_type": "ML Model"
  }
}"#;

/// Description of a not-yet-sent admin API call.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct RequestDraft {
	pub verb: String,
	pub path: String,
	/// Serialized JSON, kept verbatim as typed.
	pub params: String,
}

impl Default for RequestDraft {
	fn default() -> Self {
		Self {
			verb: DEFAULT_VERB.to_owned(),
			path: DEFAULT_PATH.to_owned(),
			params: DEFAULT_PARAMS.to_owned(),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleState {
	pub request_fields: RequestDraft,
	pub request_in_progress: bool,
	pub request_error: Option<String>,
	pub response_body: String,
}

impl Default for ConsoleState {
	fn default() -> Self {
		Self {
			request_fields: RequestDraft::default(),
			request_in_progress: false,
			request_error: None,
			response_body: String::new(),
		}
	}
}

/// Shaped like `{"type": "UPDATE_VERB", "payload": {"verb": "POST"}}` on the wire.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
	UpdateVerb {
		verb: String,
	},
	UpdatePath {
		path: String,
	},
	UpdateParams {
		params: String,
	},
	RequestStart,
	#[serde(rename_all = "camelCase")]
	RequestComplete {
		response_body: String,
	},
	#[serde(rename_all = "camelCase")]
	RequestError {
		request_error: String,
	},
	#[serde(other)]
	Unknown,
}

impl Action {
	pub fn update_verb(verb: impl Into<String>) -> Self {
		Action::UpdateVerb { verb: verb.into() }
	}

	pub fn update_path(path: impl Into<String>) -> Self {
		Action::UpdatePath { path: path.into() }
	}

	pub fn update_params(params: impl Into<String>) -> Self {
		Action::UpdateParams {
			params: params.into(),
		}
	}

	pub fn request_complete(response_body: impl Into<String>) -> Self {
		Action::RequestComplete {
			response_body: response_body.into(),
		}
	}

	pub fn request_error(request_error: impl Into<String>) -> Self {
		Action::RequestError {
			request_error: request_error.into(),
		}
	}
}

/// Applies one action.  Never fails; an unrecognized action hands back the very same `Arc`.
pub fn reduce(state: &Arc<ConsoleState>, action: &Action) -> Arc<ConsoleState> {
	let mut next = ConsoleState::clone(state);
	match action {
		Action::UpdateVerb { verb } => {
			next.response_body.clear();
			next.request_fields.verb = verb.clone();
		}
		Action::UpdatePath { path } => {
			next.response_body.clear();
			next.request_fields.path = path.clone();
		}
		Action::UpdateParams { params } => {
			next.response_body.clear();
			next.request_fields.params = params.clone();
		}
		Action::RequestStart => {
			next.request_in_progress = true;
			next.request_error = None;
			next.response_body.clear();
		}
		Action::RequestComplete { response_body } => {
			next.request_in_progress = false;
			next.request_error = None;
			next.response_body = response_body.clone();
		}
		Action::RequestError { request_error } => {
			next.request_in_progress = false;
			next.request_error = Some(request_error.clone());
		}
		Action::Unknown => return Arc::clone(state),
	}
	Arc::new(next)
}
