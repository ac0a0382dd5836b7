// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! API server and routing.

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::handlers;
use crate::state::AppState;

// =============================================================================
// ApiServer
// =============================================================================

/// The HTTP server.
pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    /// Creates a server over the shared state.
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Builds the router with every route and middleware layer.
    pub fn router(&self) -> Router {
        let api = Router::new()
            // Health
            .route("/health", get(handlers::health))
            // Devices
            .route(
                "/devices",
                get(handlers::list_devices).post(handlers::create_device),
            )
            .route(
                "/devices/{id}",
                get(handlers::get_device)
                    .put(handlers::update_device)
                    .delete(handlers::delete_device),
            )
            // Readings
            .route("/reading/latest", get(handlers::latest_readings))
            .route("/reading/device/{id}", get(handlers::recent_readings))
            .route("/reading/filter", get(handlers::filter_readings))
            .route("/reading/export/csv", get(handlers::export_csv))
            .route("/reading/stats", get(handlers::reading_stats))
            // Polling control
            .route("/polling/stats", get(handlers::polling_stats))
            .route("/polling/restart", post(handlers::restart_polling))
            .route("/polling/pause", post(handlers::pause_polling))
            .route("/polling/resume", post(handlers::resume_polling))
            // Configuration
            .route("/config/com-ports", get(handlers::com_ports))
            .route("/config/verify-pin", post(handlers::verify_pin))
            .route("/config/clear-settings", post(handlers::clear_settings))
            // Pyrometer parameters
            .route(
                "/pyrometer/emissivity",
                get(handlers::get_emissivity).post(handlers::set_emissivity),
            )
            .route(
                "/pyrometer/slope",
                get(handlers::get_slope).post(handlers::set_slope),
            )
            .route(
                "/pyrometer/measurement-mode",
                get(handlers::get_measurement_mode).post(handlers::set_measurement_mode),
            )
            .route(
                "/pyrometer/time-interval",
                get(handlers::get_time_interval).post(handlers::set_time_interval),
            )
            .route(
                "/pyrometer/temp-lower-limit",
                get(handlers::get_temp_lower_limit).post(handlers::set_temp_lower_limit),
            )
            .route(
                "/pyrometer/temp-upper-limit",
                get(handlers::get_temp_upper_limit).post(handlers::set_temp_upper_limit),
            )
            .route("/pyrometer/all-parameters", get(handlers::all_parameters))
            // Live stream
            .route("/ws", get(handlers::ws_handler));

        Router::new()
            .nest("/api", api)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(self.state.clone())
    }

    /// Runs the server until `shutdown_signal` resolves.
    pub async fn run_with_shutdown(
        self,
        addr: SocketAddr,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> ApiResult<()> {
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to bind {}: {}", addr, e)))?;

        info!(addr = %addr, "API server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ApiError::Internal(format!("server error: {}", e)))?;

        info!("API server shutdown complete");
        Ok(())
    }
}
