//! External collaborators of the checkout core.
//!
//! The storefront delegates durable state to remote services: store policy
//! configuration, the coupon catalog, the evidence object store, the order
//! API, and the cart state store. Each is modelled as an async trait so the
//! checkout services never depend on a concrete transport; `http` provides
//! the production reqwest implementations and the integration tests supply
//! in-memory fakes.

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{Coupon, NewOrder, Order, PolicyConfig};

/// Read-only source of the shipping/tax policy snapshot.
#[async_trait]
pub trait PolicyProvider: Send + Sync {
    async fn fetch_policy(&self) -> Result<PolicyConfig, ServiceError>;
}

/// Read-only source of the coupon catalog. Matching and eligibility checks
/// happen locally; the catalog is fetched once per session.
#[async_trait]
pub trait CouponCatalog: Send + Sync {
    async fn fetch_coupons(&self) -> Result<Vec<Coupon>, ServiceError>;
}

/// Object store for payment-proof screenshots. Returns a stable URL the
/// order record can reference.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn upload(
        &self,
        bytes: Bytes,
        content_type: &str,
        file_name: Option<&str>,
    ) -> Result<String, ServiceError>;
}

/// The sole write that produces a durable order. The idempotency key inside
/// `NewOrder` lets the remote side collapse retried submissions.
#[async_trait]
pub trait OrderApi: Send + Sync {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, ServiceError>;
}

/// Cart state store; cleared exactly once, after a confirmed order.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn clear_cart(&self, cart_id: Uuid) -> Result<(), ServiceError>;
}
