use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single line of the cart as captured from the caller.
///
/// Lines are read-only input to the checkout core; quantity and price are
/// validated at capture time, so the pricing engine only has to be defensive
/// about them, never mutate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl CartLine {
    /// Line total, treating negative price or quantity as zero contribution.
    pub fn line_total(&self) -> Decimal {
        if self.unit_price.is_sign_negative() || self.quantity < 0 {
            return Decimal::ZERO;
        }
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Immutable cart snapshot owned by one checkout session.
///
/// Taken once when the session starts so a cart changing mid-checkout can
/// never silently alter an in-flight total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn new(id: Uuid, lines: Vec<CartLine>) -> Self {
        Self { id, lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn subtotal(&self) -> Decimal {
        self.lines
            .iter()
            .fold(Decimal::ZERO, |acc, line| acc + line.line_total())
    }
}
