//! HTTP request handlers.

pub mod hooks;
pub mod intake;

pub use hooks::{list_hooks, update_hooks};
pub use intake::accept_event;
