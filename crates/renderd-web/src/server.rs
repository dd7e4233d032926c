//! Main web server setup and startup.
//!
//! [`WebServer`] composes the Axum router and starts the HTTP listener.

use axum::Router;
use axum::routing::{get, post};

use renderd_core::BrokerHandle;

use crate::WebConfig;
use crate::api;
use crate::state::AppState;

/// The renderd HTTP front-end.
pub struct WebServer {
    config: WebConfig,
    state: AppState,
}

impl WebServer {
    pub fn new(config: WebConfig, broker: BrokerHandle) -> Self {
        Self {
            config,
            state: AppState { broker },
        }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/", post(api::dispatch))
            .route("/status", get(api::status))
            .fallback(api::not_found)
            .with_state(self.state.clone())
    }

    /// Start the server and block until it is shut down.
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr = self.addr();
        let router = self.router();

        tracing::info!(addr = %addr, "starting web server");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router).await
    }
}
