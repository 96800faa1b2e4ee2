//! Shared in-memory collaborators for the checkout integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::clients::{CartStore, CouponCatalog, EvidenceStore, OrderApi, PolicyProvider};
use storefront_api::errors::ServiceError;
use storefront_api::events::EventSender;
use storefront_api::models::{
    Cart, CartLine, Coupon, DiscountType, NewOrder, Order, PolicyConfig, ShippingPolicy, TaxPolicy,
};
use storefront_api::services::{
    CheckoutService, OrderSubmissionService, PaymentProofWorkflow,
};

pub struct FakePolicyProvider(pub PolicyConfig);

#[async_trait]
impl PolicyProvider for FakePolicyProvider {
    async fn fetch_policy(&self) -> Result<PolicyConfig, ServiceError> {
        Ok(self.0.clone())
    }
}

pub struct FakeCouponCatalog(pub Vec<Coupon>);

#[async_trait]
impl CouponCatalog for FakeCouponCatalog {
    async fn fetch_coupons(&self) -> Result<Vec<Coupon>, ServiceError> {
        Ok(self.0.clone())
    }
}

pub struct FakeEvidenceStore {
    pub uploads: AtomicUsize,
}

#[async_trait]
impl EvidenceStore for FakeEvidenceStore {
    async fn upload(
        &self,
        _bytes: Bytes,
        _content_type: &str,
        _file_name: Option<&str>,
    ) -> Result<String, ServiceError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://cdn.example/evidence/{}.png", n))
    }
}

/// Order API fake that records every request and can be told to fail or to
/// hold each call open for a while (to exercise the re-entrancy guard).
pub struct FakeOrderApi {
    pub calls: AtomicUsize,
    pub fail_first: AtomicUsize,
    pub delay: Duration,
    pub requests: Mutex<Vec<NewOrder>>,
}

impl FakeOrderApi {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(0),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_first(n: usize) -> Self {
        let api = Self::new();
        api.fail_first.store(n, Ordering::SeqCst);
        api
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }
}

#[async_trait]
impl OrderApi for FakeOrderApi {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ServiceError::ExternalServiceError(
                "order api returned 503".to_string(),
            ));
        }
        self.requests.lock().unwrap().push(order.clone());
        Ok(Order {
            id: Uuid::new_v4(),
            customer: order.customer.clone(),
            items: order.items.clone(),
            totals: order.totals,
            payment_mode: order.payment_mode,
            payment_status: order.payment_status,
            payment_proof: order.payment_proof.clone(),
            status: order.status,
            created_at: Utc::now(),
        })
    }
}

pub struct FakeCartStore {
    pub cleared: AtomicUsize,
}

#[async_trait]
impl CartStore for FakeCartStore {
    async fn clear_cart(&self, _cart_id: Uuid) -> Result<(), ServiceError> {
        self.cleared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub const PHONE_PATTERN: &str = r"^(\+88)?01[3-9]\d{8}$";

/// Standard-fee 100, free shipping at 5000, tax disabled.
pub fn default_policy() -> PolicyConfig {
    PolicyConfig {
        shipping: ShippingPolicy {
            standard_fee: dec!(100),
            express_fee: dec!(250),
            free_shipping_enabled: true,
            free_shipping_threshold: dec!(5000),
        },
        tax: TaxPolicy::default(),
    }
}

/// FLAT1500: fixed 1500 off, minimum purchase 7000.
pub fn flat1500() -> Coupon {
    Coupon {
        id: Uuid::new_v4(),
        code: "FLAT1500".to_string(),
        discount_type: DiscountType::Fixed,
        discount_value: dec!(1500),
        min_purchase: dec!(7000),
        max_discount: None,
        expires_at: Utc::now() + ChronoDuration::days(30),
        usage_limit: 100,
        used_count: 0,
        active: true,
    }
}

pub fn cart_with_subtotal_7500() -> Cart {
    Cart::new(
        Uuid::new_v4(),
        vec![CartLine {
            product_id: Uuid::new_v4(),
            name: "Ceramic dinner set".to_string(),
            unit_price: dec!(2500),
            quantity: 3,
        }],
    )
}

pub fn cart_with_lines(lines: Vec<(rust_decimal::Decimal, i32)>) -> Cart {
    Cart::new(
        Uuid::new_v4(),
        lines
            .into_iter()
            .map(|(unit_price, quantity)| CartLine {
                product_id: Uuid::new_v4(),
                name: "Item".to_string(),
                unit_price,
                quantity,
            })
            .collect(),
    )
}

pub struct TestHarness {
    pub checkout: Arc<CheckoutService>,
    pub order_api: Arc<FakeOrderApi>,
    pub cart_store: Arc<FakeCartStore>,
    pub evidence_store: Arc<FakeEvidenceStore>,
}

/// Wires a checkout service over in-memory collaborators.
pub fn harness(policy: PolicyConfig, coupons: Vec<Coupon>, order_api: FakeOrderApi) -> TestHarness {
    let order_api = Arc::new(order_api);
    let cart_store = Arc::new(FakeCartStore {
        cleared: AtomicUsize::new(0),
    });
    let evidence_store = Arc::new(FakeEvidenceStore {
        uploads: AtomicUsize::new(0),
    });
    let (tx, _rx) = mpsc::channel(64);
    let event_sender = EventSender::new(tx);

    let proof_workflow = PaymentProofWorkflow::new(
        evidence_store.clone(),
        2 * 1024 * 1024,
        "image/".to_string(),
    );
    let submission = OrderSubmissionService::new(
        order_api.clone(),
        cart_store.clone(),
        event_sender.clone(),
        Duration::from_secs(5),
    );
    let checkout = Arc::new(
        CheckoutService::new(
            Arc::new(FakePolicyProvider(policy)),
            Arc::new(FakeCouponCatalog(coupons)),
            proof_workflow,
            submission,
            event_sender,
            PHONE_PATTERN,
        )
        .expect("checkout service"),
    );

    TestHarness {
        checkout,
        order_api,
        cart_store,
        evidence_store,
    }
}

pub fn valid_address() -> storefront_api::services::checkout::AddressInput {
    serde_json::from_value(serde_json::json!({
        "full_name": "Ayesha Rahman",
        "email": "ayesha@example.com",
        "phone": "01712345678",
        "address_line1": "House 12, Road 5",
        "address_line2": "Dhanmondi",
        "city": "Dhaka",
        "postal_code": "1209"
    }))
    .expect("valid address input")
}
