//! Checkout orchestration.
//!
//! `CheckoutService` owns every in-flight checkout session and drives the
//! step transitions: address capture, review/payment selection, proof
//! capture (Advance mode only), submission. Totals are recomputed through
//! the pricing engine whenever cart, policy, coupon, or shipping state
//! changes, so the displayed breakdown is always derived, never accumulated.
//!
//! The session holds an immutable cart snapshot taken at creation; a cart
//! changing mid-checkout can never silently alter an in-flight total. The
//! `Submitting` step structurally forbids re-entry: a second submit while
//! one is pending is rejected, which is the idempotency contract for "at
//! most one order per user intent".

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::clients::{CouponCatalog, PolicyProvider};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    Cart, Coupon, CustomerInfo, EvidenceFile, Order, OrderTotals, PaymentMode, PaymentProof,
    PolicyConfig, WalletProvider,
};
use crate::services::coupons::validate_coupon;
use crate::services::payment_proof::{advance_split, AdvanceSplit, PaymentProofWorkflow};
use crate::services::pricing::{compute_totals, ShippingChoice};
use crate::services::submission::{OrderSubmissionService, SubmissionRequest};

/// Where a session is in the checkout flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckoutStep {
    AddressCapture,
    Review,
    ProofCapture,
    Submitting,
    Completed,
    Failed,
}

/// One checkout attempt. Owned exclusively by the service's session store;
/// destroyed on abandonment, kept as a `Completed` tombstone on success.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: Uuid,
    /// Fixed for the session's lifetime; reused on every submit attempt so
    /// the order API can collapse duplicates.
    pub idempotency_key: Uuid,
    pub cart: Cart,
    pub policy: PolicyConfig,
    pub coupon_catalog: Vec<Coupon>,
    pub step: CheckoutStep,
    pub customer: Option<CustomerInfo>,
    pub payment_mode: PaymentMode,
    pub shipping: ShippingChoice,
    pub applied_coupon: Option<Coupon>,
    pub proof: PaymentProof,
    pub terms_accepted: bool,
    pub totals: OrderTotals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckoutSession {
    fn recompute_totals(&mut self) {
        self.totals = compute_totals(
            &self.cart.lines,
            &self.policy,
            self.shipping,
            self.applied_coupon.as_ref(),
        );
        self.updated_at = Utc::now();
    }
}

/// Read-only snapshot returned to handlers.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSessionView {
    pub id: Uuid,
    pub step: CheckoutStep,
    pub cart: Cart,
    pub customer: Option<CustomerInfo>,
    pub payment_mode: PaymentMode,
    pub shipping: ShippingChoice,
    pub coupon_code: Option<String>,
    pub totals: OrderTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advance: Option<AdvanceSplit>,
    pub proof: PaymentProof,
    pub terms_accepted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CheckoutSession> for CheckoutSessionView {
    fn from(session: &CheckoutSession) -> Self {
        let advance = matches!(session.payment_mode, PaymentMode::Advance)
            .then(|| advance_split(session.totals.total));
        Self {
            id: session.id,
            step: session.step,
            cart: session.cart.clone(),
            customer: session.customer.clone(),
            payment_mode: session.payment_mode,
            shipping: session.shipping,
            coupon_code: session.applied_coupon.as_ref().map(|c| c.code.clone()),
            totals: session.totals,
            advance,
            proof: session.proof.clone(),
            terms_accepted: session.terms_accepted,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// Delivery and contact details captured from the address form.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddressInput {
    #[validate(length(min = 1, message = "full name is required"))]
    pub full_name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    pub phone: String,
    #[validate(length(min = 1, message = "address is required"))]
    pub address_line1: String,
    pub address_line2: Option<String>,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    pub postal_code: Option<String>,
}

/// Wallet transfer details entered during proof capture.
#[derive(Debug, Clone, Deserialize)]
pub struct ProofDetailsInput {
    pub method: WalletProvider,
    pub sender_phone: String,
    pub transaction_id: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    policy_provider: Arc<dyn PolicyProvider>,
    coupon_catalog: Arc<dyn CouponCatalog>,
    proof_workflow: PaymentProofWorkflow,
    submission: OrderSubmissionService,
    event_sender: EventSender,
    sessions: Arc<DashMap<Uuid, CheckoutSession>>,
    phone_regex: Arc<Regex>,
}

impl CheckoutService {
    pub fn new(
        policy_provider: Arc<dyn PolicyProvider>,
        coupon_catalog: Arc<dyn CouponCatalog>,
        proof_workflow: PaymentProofWorkflow,
        submission: OrderSubmissionService,
        event_sender: EventSender,
        phone_pattern: &str,
    ) -> Result<Self, ServiceError> {
        let phone_regex = Regex::new(phone_pattern).map_err(|e| {
            ServiceError::InternalError(format!("invalid phone pattern '{}': {}", phone_pattern, e))
        })?;
        Ok(Self {
            policy_provider,
            coupon_catalog,
            proof_workflow,
            submission,
            event_sender,
            sessions: Arc::new(DashMap::new()),
            phone_regex: Arc::new(phone_regex),
        })
    }

    /// Starts a checkout session from a cart snapshot.
    ///
    /// Fetches the policy and coupon-catalog snapshots the session will use
    /// for its whole lifetime. An empty cart is fatal: there is nothing to
    /// check out, so no session is created.
    #[instrument(skip(self, cart), fields(cart_id = %cart.id))]
    pub async fn start_session(&self, cart: Cart) -> Result<CheckoutSessionView, ServiceError> {
        if cart.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Cart is empty".to_string(),
            ));
        }

        let policy = self.policy_provider.fetch_policy().await?;
        let coupon_catalog = self.coupon_catalog.fetch_coupons().await?;

        let session_id = Uuid::new_v4();
        let now = Utc::now();
        let mut session = CheckoutSession {
            id: session_id,
            idempotency_key: Uuid::new_v4(),
            cart,
            policy,
            coupon_catalog,
            step: CheckoutStep::AddressCapture,
            customer: None,
            payment_mode: PaymentMode::Cod,
            shipping: ShippingChoice::Standard,
            applied_coupon: None,
            proof: PaymentProof::default(),
            terms_accepted: false,
            totals: OrderTotals::default(),
            created_at: now,
            updated_at: now,
        };
        session.recompute_totals();

        let cart_id = session.cart.id;
        let view = CheckoutSessionView::from(&session);
        self.sessions.insert(session_id, session);

        self.event_sender
            .send_or_log(Event::CheckoutStarted {
                session_id,
                cart_id,
            })
            .await;

        info!(%session_id, "Checkout session started");
        Ok(view)
    }

    /// Returns the current session snapshot.
    pub fn session(&self, session_id: Uuid) -> Result<CheckoutSessionView, ServiceError> {
        self.sessions
            .get(&session_id)
            .map(|s| CheckoutSessionView::from(&*s))
            .ok_or_else(|| ServiceError::NotFound(format!("Session {} not found", session_id)))
    }

    /// Captures the delivery address and contact details.
    ///
    /// All field errors are reported together and the session stays in its
    /// current step on failure; there is no partial transition. Editing the
    /// address again from `Review` or `Failed` is allowed so a failed
    /// submission never forces re-entry from scratch.
    #[instrument(skip(self, input))]
    pub async fn submit_address(
        &self,
        session_id: Uuid,
        input: AddressInput,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let customer = self.validate_address(input)?;

        let view = {
            let mut session = self.get_session_mut(session_id)?;
            match session.step {
                CheckoutStep::AddressCapture | CheckoutStep::Review | CheckoutStep::Failed => {}
                step => {
                    return Err(ServiceError::InvalidOperation(format!(
                        "Cannot edit address while session is {}",
                        step
                    )))
                }
            }
            session.customer = Some(customer);
            session.step = CheckoutStep::Review;
            session.recompute_totals();
            CheckoutSessionView::from(&*session)
        };

        self.event_sender
            .send_or_log(Event::AddressCaptured { session_id })
            .await;
        Ok(view)
    }

    /// Selects the settlement mode. Switching from Advance back to COD drops
    /// the session out of proof capture; entered proof fields are kept in
    /// case the customer switches back.
    #[instrument(skip(self))]
    pub fn select_payment_mode(
        &self,
        session_id: Uuid,
        mode: PaymentMode,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let mut session = self.get_session_mut(session_id)?;
        match session.step {
            CheckoutStep::Review | CheckoutStep::ProofCapture | CheckoutStep::Failed => {}
            step => {
                return Err(ServiceError::InvalidOperation(format!(
                    "Cannot change payment mode while session is {}",
                    step
                )))
            }
        }
        session.payment_mode = mode;
        if matches!(mode, PaymentMode::Cod) && session.step == CheckoutStep::ProofCapture {
            session.step = CheckoutStep::Review;
        }
        session.updated_at = Utc::now();
        Ok(CheckoutSessionView::from(&*session))
    }

    /// Selects standard or express shipping and recomputes totals.
    #[instrument(skip(self))]
    pub fn select_shipping(
        &self,
        session_id: Uuid,
        shipping: ShippingChoice,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let mut session = self.get_session_mut(session_id)?;
        match session.step {
            CheckoutStep::Review | CheckoutStep::Failed => {}
            step => {
                return Err(ServiceError::InvalidOperation(format!(
                    "Cannot change shipping while session is {}",
                    step
                )))
            }
        }
        session.shipping = shipping;
        session.recompute_totals();
        Ok(CheckoutSessionView::from(&*session))
    }

    /// Validates and applies a coupon code against the session's catalog
    /// snapshot. Rejection leaves the session untouched, so the code can be
    /// previewed speculatively.
    #[instrument(skip(self))]
    pub async fn apply_coupon(
        &self,
        session_id: Uuid,
        code: &str,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let view = {
            let mut session = self.get_session_mut(session_id)?;
            match session.step {
                CheckoutStep::Review | CheckoutStep::Failed => {}
                step => {
                    return Err(ServiceError::InvalidOperation(format!(
                        "Cannot apply a coupon while session is {}",
                        step
                    )))
                }
            }
            let coupon = validate_coupon(
                code,
                &session.coupon_catalog,
                session.totals.subtotal,
                Utc::now(),
            )?
            .clone();
            session.applied_coupon = Some(coupon);
            session.recompute_totals();
            CheckoutSessionView::from(&*session)
        };

        self.event_sender
            .send_or_log(Event::CouponApplied {
                session_id,
                code: view.coupon_code.clone().unwrap_or_default(),
            })
            .await;
        Ok(view)
    }

    /// Removes the applied coupon, if any, and recomputes totals.
    #[instrument(skip(self))]
    pub async fn remove_coupon(
        &self,
        session_id: Uuid,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let view = {
            let mut session = self.get_session_mut(session_id)?;
            session.applied_coupon = None;
            session.recompute_totals();
            CheckoutSessionView::from(&*session)
        };
        self.event_sender
            .send_or_log(Event::CouponRemoved { session_id })
            .await;
        Ok(view)
    }

    /// Moves an Advance-mode session from review into proof capture.
    #[instrument(skip(self))]
    pub fn begin_proof_capture(
        &self,
        session_id: Uuid,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let mut session = self.get_session_mut(session_id)?;
        match (session.step, session.payment_mode) {
            (CheckoutStep::Review | CheckoutStep::Failed, PaymentMode::Advance) => {}
            (_, PaymentMode::Cod) => {
                return Err(ServiceError::InvalidOperation(
                    "Proof capture applies only to advance payment".to_string(),
                ))
            }
            (step, _) => {
                return Err(ServiceError::InvalidOperation(format!(
                    "Cannot begin proof capture while session is {}",
                    step
                )))
            }
        }
        session.step = CheckoutStep::ProofCapture;
        session.updated_at = Utc::now();
        Ok(CheckoutSessionView::from(&*session))
    }

    /// Records the wallet transfer details. Does not clear the uploaded
    /// evidence reference; the pieces of the proof accumulate independently.
    #[instrument(skip(self, input))]
    pub fn set_proof_details(
        &self,
        session_id: Uuid,
        input: ProofDetailsInput,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let mut errors = Vec::new();
        if !self.phone_regex.is_match(input.sender_phone.trim()) {
            errors.push("sender_phone: must be a valid local phone number".to_string());
        }
        if input.transaction_id.trim().is_empty() {
            errors.push("transaction_id: is required".to_string());
        }
        if !errors.is_empty() {
            return Err(ServiceError::FieldValidation(errors));
        }

        let mut session = self.get_session_mut(session_id)?;
        if session.step != CheckoutStep::ProofCapture {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot record proof details while session is {}",
                session.step
            )));
        }
        session.proof.method = Some(input.method);
        session.proof.sender_phone = Some(input.sender_phone.trim().to_string());
        session.proof.transaction_id = Some(input.transaction_id.trim().to_string());
        session.updated_at = Utc::now();
        Ok(CheckoutSessionView::from(&*session))
    }

    /// Uploads the evidence screenshot and stores its stable URL.
    ///
    /// The session cannot leave proof capture until this has succeeded. On
    /// failure the specific upload error is surfaced and previously entered
    /// method/phone/transaction fields are untouched.
    #[instrument(skip(self, file))]
    pub async fn attach_evidence(
        &self,
        session_id: Uuid,
        file: EvidenceFile,
    ) -> Result<CheckoutSessionView, ServiceError> {
        {
            let session = self.get_session_mut(session_id)?;
            if session.step != CheckoutStep::ProofCapture {
                return Err(ServiceError::InvalidOperation(format!(
                    "Cannot upload evidence while session is {}",
                    session.step
                )));
            }
        }

        // The upload runs without the session lock; only one client drives a
        // session, so the step cannot move underneath it (leaving
        // ProofCapture requires the evidence URL this call produces).
        let url = self.proof_workflow.upload_evidence(file).await?;

        let view = {
            let mut session = self.get_session_mut(session_id)?;
            if session.step != CheckoutStep::ProofCapture {
                warn!(%session_id, "Session left proof capture during upload; dropping evidence reference");
                return Err(ServiceError::InvalidOperation(
                    "Session is no longer capturing proof".to_string(),
                ));
            }
            session.proof.evidence_url = Some(url.clone());
            session.updated_at = Utc::now();
            CheckoutSessionView::from(&*session)
        };

        self.event_sender
            .send_or_log(Event::EvidenceUploaded { session_id, url })
            .await;
        Ok(view)
    }

    /// Submits the order. Exactly one order is created per session however
    /// many times this is called: while an attempt is in flight the session
    /// sits in `Submitting` and further calls are rejected; after success it
    /// sits in `Completed`; after failure it returns to `Failed` with all
    /// entered data intact and may retry under the same idempotency key.
    ///
    /// The attempt itself runs on a detached task: once `Submitting` has been
    /// entered there is no cancellation, so a caller that disappears mid-call
    /// (a dropped connection) cannot strand the session in `Submitting` with
    /// the remote order possibly created.
    #[instrument(skip(self))]
    pub async fn submit(
        &self,
        session_id: Uuid,
        terms_accepted: bool,
    ) -> Result<Order, ServiceError> {
        let request = self.begin_submission(session_id, terms_accepted)?;

        self.event_sender
            .send_or_log(Event::CheckoutSubmitted { session_id })
            .await;

        // A dropped JoinHandle detaches rather than cancels, so the state
        // transition out of Submitting always completes.
        let service = self.clone();
        let attempt =
            tokio::spawn(async move { service.finish_submission(session_id, request).await });

        match attempt.await {
            Ok(result) => result,
            Err(e) => Err(ServiceError::InternalError(format!(
                "submission task failed: {}",
                e
            ))),
        }
    }

    async fn finish_submission(
        &self,
        session_id: Uuid,
        request: SubmissionRequest,
    ) -> Result<Order, ServiceError> {
        match self.submission.submit_order(request).await {
            Ok(order) => {
                if let Some(mut session) = self.sessions.get_mut(&session_id) {
                    session.step = CheckoutStep::Completed;
                    session.updated_at = Utc::now();
                }
                info!(%session_id, order_id = %order.id, "Checkout completed");
                Ok(order)
            }
            Err(e) => {
                if let Some(mut session) = self.sessions.get_mut(&session_id) {
                    session.step = CheckoutStep::Failed;
                    session.updated_at = Utc::now();
                }
                self.event_sender
                    .send_or_log(Event::CheckoutFailed {
                        session_id,
                        reason: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    /// Abandons a session. Free of side effects before submission has
    /// begun; refused while an attempt is in flight.
    #[instrument(skip(self))]
    pub async fn abandon(&self, session_id: Uuid) -> Result<(), ServiceError> {
        // The guard and the removal must be one atomic step so a submit
        // racing in between cannot have its session deleted mid-flight.
        let removed = self
            .sessions
            .remove_if(&session_id, |_, s| s.step != CheckoutStep::Submitting);
        match removed {
            Some(_) => {
                self.event_sender
                    .send_or_log(Event::CheckoutAbandoned { session_id })
                    .await;
                Ok(())
            }
            None if self.sessions.contains_key(&session_id) => {
                Err(ServiceError::InvalidOperation(
                    "Cannot abandon while submission is in flight".to_string(),
                ))
            }
            None => Err(ServiceError::NotFound(format!(
                "Session {} not found",
                session_id
            ))),
        }
    }

    /// Runs the submit guards and flips the session into `Submitting` under
    /// the entry lock, returning the assembled request. This is the only
    /// place the in-flight state is entered, so checking and setting it
    /// atomically here is what makes double submits no-ops.
    fn begin_submission(
        &self,
        session_id: Uuid,
        terms_accepted: bool,
    ) -> Result<SubmissionRequest, ServiceError> {
        let mut session = self.get_session_mut(session_id)?;

        match session.step {
            CheckoutStep::Submitting => {
                return Err(ServiceError::InvalidOperation(
                    "Submission already in progress".to_string(),
                ))
            }
            CheckoutStep::Completed => {
                return Err(ServiceError::InvalidOperation(
                    "Session already completed".to_string(),
                ))
            }
            CheckoutStep::AddressCapture => {
                return Err(ServiceError::InvalidOperation(
                    "Address has not been captured".to_string(),
                ))
            }
            CheckoutStep::Review | CheckoutStep::ProofCapture | CheckoutStep::Failed => {}
        }

        let customer = session.customer.clone().ok_or_else(|| {
            ServiceError::InvalidOperation("Address has not been captured".to_string())
        })?;

        // Coupon eligibility can lapse between apply and submit (expiry,
        // usage race); revalidate so a stale discount never reaches the
        // order record.
        if let Some(coupon) = session.applied_coupon.clone() {
            if let Err(rejection) = validate_coupon(
                &coupon.code,
                &session.coupon_catalog,
                session.totals.subtotal,
                Utc::now(),
            ) {
                session.applied_coupon = None;
                session.recompute_totals();
                return Err(rejection.into());
            }
        }

        let proof = match session.payment_mode {
            PaymentMode::Cod => {
                if !terms_accepted {
                    return Err(ServiceError::ValidationError(
                        "Terms must be accepted before placing the order".to_string(),
                    ));
                }
                None
            }
            PaymentMode::Advance => {
                if !session.proof.is_complete() {
                    return Err(ServiceError::InvalidOperation(
                        "Payment proof is incomplete: method, sender phone, transaction id, and uploaded evidence are required".to_string(),
                    ));
                }
                Some(session.proof.clone())
            }
        };

        session.terms_accepted = terms_accepted;
        session.step = CheckoutStep::Submitting;
        session.updated_at = Utc::now();

        Ok(SubmissionRequest {
            idempotency_key: session.idempotency_key,
            cart_id: session.cart.id,
            customer,
            items: session.cart.lines.clone(),
            totals: session.totals,
            payment_mode: session.payment_mode,
            payment_proof: proof,
        })
    }

    fn get_session_mut(
        &self,
        session_id: Uuid,
    ) -> Result<dashmap::mapref::one::RefMut<'_, Uuid, CheckoutSession>, ServiceError> {
        self.sessions
            .get_mut(&session_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Session {} not found", session_id)))
    }

    /// Collects every field error at once so the form can re-render without
    /// losing entered data.
    fn validate_address(&self, input: AddressInput) -> Result<CustomerInfo, ServiceError> {
        let mut errors: Vec<String> = match input.validate() {
            Ok(()) => Vec::new(),
            Err(e) => match ServiceError::from(e) {
                ServiceError::FieldValidation(fields) => fields,
                other => return Err(other),
            },
        };

        if !self.phone_regex.is_match(input.phone.trim()) {
            errors.push("phone: must be a valid local phone number".to_string());
        }

        if !errors.is_empty() {
            errors.sort();
            return Err(ServiceError::FieldValidation(errors));
        }

        Ok(CustomerInfo {
            full_name: input.full_name.trim().to_string(),
            email: input.email.trim().to_string(),
            phone: input.phone.trim().to_string(),
            address_line1: input.address_line1.trim().to_string(),
            address_line2: input.address_line2.map(|s| s.trim().to_string()),
            city: input.city.trim().to_string(),
            postal_code: input.postal_code.map(|s| s.trim().to_string()),
        })
    }
}
