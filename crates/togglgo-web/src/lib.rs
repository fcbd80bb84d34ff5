//! togglgo-web: Dialogflow fulfillment webhook for Toggl Go.

pub mod server;
