//! The admin API request console: a draft, a store around it, and the code that sends it.

pub mod dispatch;
pub mod draft;
pub mod store;

pub use dispatch::{run_request, Dispatcher, PlatformDispatcher};
pub use draft::{reduce, Action, ConsoleState, RequestDraft};
pub use store::{PendingCall, Store};
