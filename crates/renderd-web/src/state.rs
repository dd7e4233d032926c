//! Shared application state for the web server.
//!
//! [`AppState`] is cloned cheaply (it only holds a [`BrokerHandle`], which is
//! itself a cheap handle around a channel sender) and shared across every
//! Axum request handler.

use renderd_core::BrokerHandle;

/// State accessible from every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub broker: BrokerHandle,
}
