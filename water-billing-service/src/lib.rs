//! Water utility billing: system loss, monthly bill generation, payment
//! collection and the reports built on them.

pub mod billing;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::{build_router, AppState, Application};
