//! WebDriver implementation of the agent's browser capability.
//!
//! This crate adapts a `fantoccini` client to the [`steer_agent::PageDriver`]
//! trait:
//!
//! - [`driver::SteerBrowser`]: session lifecycle (connect, navigate, close)
//! - [`dom`]: element queries, form-state mutation, and the DOM inventory
//!   snapshot script
pub mod dom;
pub mod driver;

pub use driver::SteerBrowser;
