//! Coupon validation.
//!
//! Pure lookup and eligibility checks against a catalog snapshot. Safe to
//! call speculatively (e.g. to preview a discount while the customer types a
//! code): nothing here mutates the coupon or its usage count. Incrementing
//! `used_count` is an effect that belongs to the order API after a
//! successful order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::errors::CouponRejection;
use crate::models::Coupon;

/// Validates a coupon code against the session's catalog snapshot.
///
/// Codes are matched case-insensitively. Checks run in a fixed order so the
/// reported reason is stable: existence, active flag, expiry, usage limit,
/// minimum purchase.
pub fn validate_coupon<'a>(
    code: &str,
    catalog: &'a [Coupon],
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<&'a Coupon, CouponRejection> {
    let coupon = catalog
        .iter()
        .find(|c| c.code.eq_ignore_ascii_case(code.trim()))
        .ok_or(CouponRejection::NotFound)?;

    if !coupon.active {
        return Err(CouponRejection::Inactive);
    }
    if now >= coupon.expires_at {
        return Err(CouponRejection::Expired);
    }
    if coupon.used_count >= coupon.usage_limit {
        return Err(CouponRejection::UsageLimitReached);
    }
    if subtotal < coupon.min_purchase {
        debug!(
            code = %coupon.code,
            %subtotal,
            min_purchase = %coupon.min_purchase,
            "Coupon below minimum purchase"
        );
        return Err(CouponRejection::BelowMinPurchase);
    }

    Ok(coupon)
}
