//! togglgo-core: pure domain logic, no HTTP server.
//!
//! This crate contains the conversation flow, credential storage, the Toggl
//! API client and the localized messages for the Toggl Go voice action.
//! The web crate decodes platform requests into `types::Turn` and encodes
//! `types::TurnOutcome` back.

pub mod config;
pub mod credentials;
pub mod flow;
pub mod identity;
pub mod messages;
pub mod timer_api;
pub mod types;

#[cfg(test)]
mod test_http;
