pub mod cart;
pub mod coupon;
pub mod order;
pub mod payment_proof;
pub mod policy;

pub use cart::{Cart, CartLine};
pub use coupon::{Coupon, DiscountType};
pub use order::{
    CustomerInfo, NewOrder, Order, OrderStatus, OrderTotals, PaymentMode, PaymentStatus,
};
pub use payment_proof::{EvidenceFile, PaymentProof, WalletProvider};
pub use policy::{PolicyConfig, ShippingPolicy, TaxPolicy};
