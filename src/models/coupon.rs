use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discount shape of a coupon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// A named discount rule owned by the coupon catalog service.
///
/// The checkout core only reads coupons; `used_count` is incremented by the
/// order API after a successful order, never by validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_purchase: Decimal,
    #[serde(default)]
    pub max_discount: Option<Decimal>,
    pub expires_at: DateTime<Utc>,
    #[serde(default = "default_usage_limit")]
    pub usage_limit: u32,
    #[serde(default)]
    pub used_count: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_usage_limit() -> u32 {
    u32::MAX
}

fn default_active() -> bool {
    true
}
