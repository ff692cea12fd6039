pub mod daemon;
pub mod session_purge;
