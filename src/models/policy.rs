use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Store policy snapshot fetched from the configuration service.
///
/// One immutable snapshot is taken per checkout session; policies are
/// refetched, never mutated in place. Every field carries a serde default so
/// that a field absent from the remote payload reads as "feature disabled"
/// rather than a deserialization error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub shipping: ShippingPolicy,
    #[serde(default)]
    pub tax: TaxPolicy,
}

/// Shipping fee rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingPolicy {
    #[serde(default)]
    pub standard_fee: Decimal,
    #[serde(default)]
    pub express_fee: Decimal,
    #[serde(default)]
    pub free_shipping_enabled: bool,
    #[serde(default)]
    pub free_shipping_threshold: Decimal,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            standard_fee: Decimal::ZERO,
            express_fee: Decimal::ZERO,
            free_shipping_enabled: false,
            free_shipping_threshold: Decimal::ZERO,
        }
    }
}

/// Tax rules. Tax is computed on the subtotal only, never on shipping or the
/// post-discount amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxPolicy {
    #[serde(default)]
    pub enabled: bool,
    /// Rate as a percentage, e.g. 7.5 for 7.5%.
    #[serde(default)]
    pub rate_percent: Decimal,
    #[serde(default = "default_tax_label")]
    pub label: String,
}

fn default_tax_label() -> String {
    "Tax".to_string()
}

impl Default for TaxPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            rate_percent: Decimal::ZERO,
            label: default_tax_label(),
        }
    }
}
