//! Order pricing engine.
//!
//! Pure and deterministic: `(cart lines, policy, coupon)` in, `OrderTotals`
//! out. Safe to call on every input change (cart edits, coupon keystrokes,
//! payment-mode switches) because it holds no state and performs no I/O.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::models::{CartLine, Coupon, DiscountType, OrderTotals, PolicyConfig};

/// Shipping speed chosen by the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingChoice {
    #[default]
    Standard,
    Express,
}

/// Rounds a monetary value to the currency's minor unit, half-up.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Computes the authoritative totals for one cart under one policy snapshot.
///
/// Each derived field is rounded individually and `total` is summed from the
/// already-rounded components, so repeated display of the same totals is
/// stable. Negative quantities or prices contribute zero rather than erroring;
/// upstream capture already rejects them.
pub fn compute_totals(
    lines: &[CartLine],
    policy: &PolicyConfig,
    shipping: ShippingChoice,
    coupon: Option<&Coupon>,
) -> OrderTotals {
    let subtotal = round_money(
        lines
            .iter()
            .fold(Decimal::ZERO, |acc, line| acc + line.line_total()),
    );

    let shipping_cost = round_money(shipping_cost(subtotal, policy, shipping));

    let tax_amount = if policy.tax.enabled {
        // Tax is computed on the subtotal only, never on shipping or the
        // post-discount amount.
        round_money(subtotal * policy.tax.rate_percent / Decimal::from(100))
    } else {
        Decimal::ZERO
    };

    let discount_amount = coupon
        .map(|c| discount_amount(c, subtotal))
        .unwrap_or(Decimal::ZERO);

    OrderTotals {
        subtotal,
        shipping_cost,
        tax_amount,
        discount_amount,
        total: subtotal + shipping_cost + tax_amount - discount_amount,
    }
}

fn shipping_cost(subtotal: Decimal, policy: &PolicyConfig, shipping: ShippingChoice) -> Decimal {
    let rules = &policy.shipping;
    if rules.free_shipping_enabled && subtotal >= rules.free_shipping_threshold {
        return Decimal::ZERO;
    }
    match shipping {
        ShippingChoice::Standard => rules.standard_fee,
        ShippingChoice::Express => rules.express_fee,
    }
}

/// Discount for an already-validated coupon, capped at the subtotal.
pub fn discount_amount(coupon: &Coupon, subtotal: Decimal) -> Decimal {
    let raw = match coupon.discount_type {
        DiscountType::Percentage => {
            let discount = subtotal * coupon.discount_value / Decimal::from(100);
            match coupon.max_discount {
                Some(cap) => discount.min(cap),
                None => discount,
            }
        }
        DiscountType::Fixed => coupon.discount_value,
    };
    round_money(raw).min(subtotal).max(Decimal::ZERO)
}
