//! Terminal order submission.
//!
//! Assembles the immutable order record from the session's accumulated state
//! and performs exactly one create-order call per user intent. The caller
//! (the checkout state machine) guarantees re-entrancy protection; this
//! service guarantees the timeout, the idempotency key, and that cart-clear
//! only happens after a confirmed success.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::clients::{CartStore, OrderApi};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    CartLine, CustomerInfo, NewOrder, Order, OrderStatus, OrderTotals, PaymentMode, PaymentProof,
    PaymentStatus,
};

/// Everything the submission needs from a finished checkout session.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub idempotency_key: Uuid,
    pub cart_id: Uuid,
    pub customer: CustomerInfo,
    pub items: Vec<CartLine>,
    pub totals: OrderTotals,
    pub payment_mode: PaymentMode,
    pub payment_proof: Option<PaymentProof>,
}

#[derive(Clone)]
pub struct OrderSubmissionService {
    order_api: Arc<dyn OrderApi>,
    cart_store: Arc<dyn CartStore>,
    event_sender: EventSender,
    timeout: Duration,
}

impl OrderSubmissionService {
    pub fn new(
        order_api: Arc<dyn OrderApi>,
        cart_store: Arc<dyn CartStore>,
        event_sender: EventSender,
        timeout: Duration,
    ) -> Self {
        Self {
            order_api,
            cart_store,
            event_sender,
            timeout,
        }
    }

    /// Creates the order remotely and clears the cart on confirmed success.
    ///
    /// The remote call reuses the session's idempotency key on every
    /// attempt, so a retry after an ambiguous failure (e.g. a timeout after
    /// the server persisted the order) cannot create a duplicate. On any
    /// failure no partial order is considered to exist from the caller's
    /// point of view.
    #[instrument(skip(self, request), fields(idempotency_key = %request.idempotency_key))]
    pub async fn submit_order(&self, request: SubmissionRequest) -> Result<Order, ServiceError> {
        let payment_status = match request.payment_mode {
            PaymentMode::Cod => PaymentStatus::Unpaid,
            // The advance transfer is claimed, not verified; a human reviews
            // the proof before the order moves to PaymentVerified.
            PaymentMode::Advance => PaymentStatus::PartiallyPaid,
        };

        let new_order = NewOrder {
            idempotency_key: request.idempotency_key,
            customer: request.customer,
            items: request.items,
            totals: request.totals,
            payment_mode: request.payment_mode,
            payment_status,
            payment_proof: request.payment_proof,
            status: OrderStatus::Pending,
        };

        let order = match tokio::time::timeout(
            self.timeout,
            self.order_api.create_order(&new_order),
        )
        .await
        {
            Ok(Ok(order)) => order,
            Ok(Err(e)) => {
                error!("Order creation failed: {}", e);
                return Err(ServiceError::SubmissionFailed(e.to_string()));
            }
            Err(_) => {
                error!("Order creation timed out after {:?}", self.timeout);
                return Err(ServiceError::Timeout(format!(
                    "order creation did not complete within {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        info!(order_id = %order.id, "Order created");
        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;

        // The order exists either way; a failed cart-clear only risks a
        // stale cart, so it must not fail the submission.
        if let Err(e) = self.cart_store.clear_cart(request.cart_id).await {
            warn!(cart_id = %request.cart_id, "Cart clear failed after order creation: {}", e);
        } else {
            self.event_sender
                .send_or_log(Event::CartCleared {
                    cart_id: request.cart_id,
                })
                .await;
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct FakeOrderApi {
        calls: AtomicUsize,
        behavior: Behavior,
    }

    enum Behavior {
        Succeed,
        Fail,
        Hang,
    }

    #[async_trait]
    impl OrderApi for FakeOrderApi {
        async fn create_order(&self, order: &NewOrder) -> Result<Order, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(Order {
                    id: Uuid::new_v4(),
                    customer: order.customer.clone(),
                    items: order.items.clone(),
                    totals: order.totals,
                    payment_mode: order.payment_mode,
                    payment_status: order.payment_status,
                    payment_proof: order.payment_proof.clone(),
                    status: order.status,
                    created_at: Utc::now(),
                }),
                Behavior::Fail => Err(ServiceError::ExternalServiceError(
                    "order api returned 503".to_string(),
                )),
                Behavior::Hang => {
                    futures::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    struct FakeCartStore {
        cleared: AtomicUsize,
    }

    #[async_trait]
    impl CartStore for FakeCartStore {
        async fn clear_cart(&self, _cart_id: Uuid) -> Result<(), ServiceError> {
            self.cleared.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn request() -> SubmissionRequest {
        SubmissionRequest {
            idempotency_key: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            customer: CustomerInfo {
                full_name: "Test Customer".to_string(),
                email: "customer@example.com".to_string(),
                phone: "01712345678".to_string(),
                address_line1: "12 Test Road".to_string(),
                address_line2: None,
                city: "Dhaka".to_string(),
                postal_code: Some("1207".to_string()),
            },
            items: vec![CartLine {
                product_id: Uuid::new_v4(),
                name: "Widget".to_string(),
                unit_price: dec!(100),
                quantity: 2,
            }],
            totals: OrderTotals {
                subtotal: dec!(200),
                shipping_cost: dec!(50),
                tax_amount: dec!(0),
                discount_amount: dec!(0),
                total: dec!(250),
            },
            payment_mode: PaymentMode::Cod,
            payment_proof: None,
        }
    }

    fn service(behavior: Behavior, timeout: Duration) -> (OrderSubmissionService, Arc<FakeOrderApi>, Arc<FakeCartStore>) {
        let api = Arc::new(FakeOrderApi {
            calls: AtomicUsize::new(0),
            behavior,
        });
        let cart = Arc::new(FakeCartStore {
            cleared: AtomicUsize::new(0),
        });
        let (tx, _rx) = mpsc::channel(16);
        let svc = OrderSubmissionService::new(
            api.clone(),
            cart.clone(),
            EventSender::new(tx),
            timeout,
        );
        (svc, api, cart)
    }

    #[tokio::test]
    async fn success_creates_order_and_clears_cart_once() {
        let (svc, api, cart) = service(Behavior::Succeed, Duration::from_secs(5));
        let order = svc.submit_order(request()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cart.cleared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn advance_mode_records_partial_payment() {
        let (svc, _api, _cart) = service(Behavior::Succeed, Duration::from_secs(5));
        let mut req = request();
        req.payment_mode = PaymentMode::Advance;
        let order = svc.submit_order(req).await.unwrap();
        assert_eq!(order.payment_status, PaymentStatus::PartiallyPaid);
    }

    #[tokio::test]
    async fn remote_failure_surfaces_and_skips_cart_clear() {
        let (svc, api, cart) = service(Behavior::Fail, Duration::from_secs(5));
        let result = svc.submit_order(request()).await;
        assert_matches!(result, Err(ServiceError::SubmissionFailed(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cart.cleared.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hanging_remote_call_times_out() {
        let (svc, _api, cart) = service(Behavior::Hang, Duration::from_millis(20));
        let result = svc.submit_order(request()).await;
        assert_matches!(result, Err(ServiceError::Timeout(_)));
        assert_eq!(cart.cleared.load(Ordering::SeqCst), 0);
    }
}
