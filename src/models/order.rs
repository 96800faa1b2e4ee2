use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use super::cart::CartLine;
use super::payment_proof::PaymentProof;

/// How the order is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMode {
    /// Full amount collected at delivery.
    Cod,
    /// 15% upfront via mobile wallet, verified by human review of the proof.
    Advance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    PaymentVerified,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

/// Derived monetary breakdown for one checkout session.
///
/// Recomputed whenever an input changes and never persisted on its own; the
/// only durable copy is the snapshot inside an `Order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
}

/// Customer-entered delivery and contact details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub postal_code: Option<String>,
}

/// Create-order request sent to the external order API.
///
/// The idempotency key is fixed per checkout session, so a retried
/// submission after an ambiguous failure cannot create a duplicate order.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
    pub idempotency_key: Uuid,
    pub customer: CustomerInfo,
    pub items: Vec<CartLine>,
    pub totals: OrderTotals,
    pub payment_mode: PaymentMode,
    pub payment_status: PaymentStatus,
    pub payment_proof: Option<PaymentProof>,
    pub status: OrderStatus,
}

/// Immutable order record as returned by the order API.
///
/// A snapshot of cart and totals at submission time; later changes to
/// products or prices never retroactively affect it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer: CustomerInfo,
    pub items: Vec<CartLine>,
    pub totals: OrderTotals,
    pub payment_mode: PaymentMode,
    pub payment_status: PaymentStatus,
    pub payment_proof: Option<PaymentProof>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}
