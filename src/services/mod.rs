pub mod checkout;
pub mod coupons;
pub mod payment_proof;
pub mod pricing;
pub mod submission;

pub use checkout::{CheckoutService, CheckoutSession, CheckoutSessionView, CheckoutStep};
pub use payment_proof::PaymentProofWorkflow;
pub use submission::OrderSubmissionService;
