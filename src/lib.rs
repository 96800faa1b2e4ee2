//! Storefront Checkout API Library
//!
//! This crate turns a cart plus a set of dynamic store policies (shipping
//! fee rules, tax rules, coupon rules) into a single authoritative total and
//! drives the customer through the multi-step settlement flow that ends in
//! an immutable order record.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod clients;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use crate::clients::http::HttpClients;
use crate::errors::ServiceError;
use crate::services::{CheckoutService, OrderSubmissionService, PaymentProofWorkflow};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub checkout: Arc<CheckoutService>,
}

impl AppState {
    /// Wires the service graph over the HTTP collaborator clients.
    pub fn from_config(
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Result<Self, ServiceError> {
        let clients = Arc::new(HttpClients::from_config(&config)?);

        let proof_workflow = PaymentProofWorkflow::new(
            clients.clone(),
            config.evidence_max_bytes,
            config.evidence_allowed_mime_prefix.clone(),
        );
        let submission = OrderSubmissionService::new(
            clients.clone(),
            clients.clone(),
            event_sender.clone(),
            Duration::from_secs(config.submit_timeout_secs),
        );
        let checkout = Arc::new(CheckoutService::new(
            clients.clone(),
            clients,
            proof_workflow,
            submission,
            event_sender.clone(),
            &config.phone_pattern,
        )?);

        Ok(Self {
            config,
            event_sender,
            checkout,
        })
    }
}

/// Full v1 API surface.
pub fn api_v1_routes(config: &config::AppConfig) -> Router<AppState> {
    Router::new().nest(
        "/checkout",
        handlers::checkout::checkout_routes(config.evidence_max_bytes),
    )
}
