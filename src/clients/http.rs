//! HTTP implementations of the external collaborator traits.
//!
//! One shared `reqwest::Client` with a per-request timeout serves all five
//! collaborators. Transport and non-2xx failures are mapped onto
//! `ServiceError::ExternalServiceError`; the order API additionally carries
//! the session's idempotency key as a header so the remote side can collapse
//! retried submissions.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::{ServiceError, UploadError};
use crate::models::{Coupon, NewOrder, Order, PolicyConfig};

use super::{CartStore, CouponCatalog, EvidenceStore, OrderApi, PolicyProvider};

const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Shared HTTP client pointed at the storefront's collaborator services.
#[derive(Clone)]
pub struct HttpClients {
    client: reqwest::Client,
    policy_service_url: String,
    coupon_service_url: String,
    evidence_store_url: String,
    order_api_url: String,
    cart_service_url: String,
}

impl HttpClients {
    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_client_timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client build failed: {}", e)))?;

        Ok(Self {
            client,
            policy_service_url: trim_base(&config.policy_service_url),
            coupon_service_url: trim_base(&config.coupon_service_url),
            evidence_store_url: trim_base(&config.evidence_store_url),
            order_api_url: trim_base(&config.order_api_url),
            cart_service_url: trim_base(&config.cart_service_url),
        })
    }

    #[cfg(test)]
    fn for_base_url(base: &str) -> Self {
        let base = trim_base(base);
        Self {
            client: reqwest::Client::new(),
            policy_service_url: base.clone(),
            coupon_service_url: base.clone(),
            evidence_store_url: base.clone(),
            order_api_url: base.clone(),
            cart_service_url: base,
        }
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn transport_error(context: &str, e: reqwest::Error) -> ServiceError {
    ServiceError::ExternalServiceError(format!("{}: {}", context, e))
}

async fn expect_success(
    context: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::ExternalServiceError(format!(
        "{} returned {}: {}",
        context,
        status,
        body.chars().take(200).collect::<String>()
    )))
}

#[async_trait]
impl PolicyProvider for HttpClients {
    #[instrument(skip(self))]
    async fn fetch_policy(&self) -> Result<PolicyConfig, ServiceError> {
        let url = format!("{}/store-policy", self.policy_service_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error("policy fetch", e))?;
        let policy = expect_success("policy service", response)
            .await?
            .json::<PolicyConfig>()
            .await
            .map_err(|e| transport_error("policy decode", e))?;
        debug!("Fetched policy snapshot");
        Ok(policy)
    }
}

#[async_trait]
impl CouponCatalog for HttpClients {
    #[instrument(skip(self))]
    async fn fetch_coupons(&self) -> Result<Vec<Coupon>, ServiceError> {
        let url = format!("{}/coupons", self.coupon_service_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error("coupon fetch", e))?;
        let coupons = expect_success("coupon service", response)
            .await?
            .json::<Vec<Coupon>>()
            .await
            .map_err(|e| transport_error("coupon decode", e))?;
        debug!(count = coupons.len(), "Fetched coupon catalog");
        Ok(coupons)
    }
}

/// Response shape of the evidence object store.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    ok: bool,
    #[serde(default)]
    url: Option<String>,
}

#[async_trait]
impl EvidenceStore for HttpClients {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        bytes: Bytes,
        content_type: &str,
        file_name: Option<&str>,
    ) -> Result<String, ServiceError> {
        let url = format!("{}/uploads", self.evidence_store_url);

        let mut part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .mime_str(content_type)
            .map_err(|e| UploadError::UnsupportedType(e.to_string()))?;
        if let Some(name) = file_name {
            part = part.file_name(name.to_string());
        }
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::Transport(format!(
                "evidence store returned {}",
                response.status()
            ))
            .into());
        }

        let body = response
            .json::<UploadResponse>()
            .await
            .map_err(|e| UploadError::Transport(format!("upload response decode: {}", e)))?;

        match (body.ok, body.url) {
            (true, Some(url)) => Ok(url),
            _ => Err(UploadError::Transport(
                "evidence store reported failure or returned no url".to_string(),
            )
            .into()),
        }
    }
}

#[async_trait]
impl OrderApi for HttpClients {
    #[instrument(skip(self, order), fields(idempotency_key = %order.idempotency_key))]
    async fn create_order(&self, order: &NewOrder) -> Result<Order, ServiceError> {
        let url = format!("{}/orders", self.order_api_url);
        let response = self
            .client
            .post(&url)
            .header(IDEMPOTENCY_KEY_HEADER, order.idempotency_key.to_string())
            .json(order)
            .send()
            .await
            .map_err(|e| transport_error("order creation", e))?;
        expect_success("order api", response)
            .await?
            .json::<Order>()
            .await
            .map_err(|e| transport_error("order decode", e))
    }
}

#[async_trait]
impl CartStore for HttpClients {
    #[instrument(skip(self))]
    async fn clear_cart(&self, cart_id: Uuid) -> Result<(), ServiceError> {
        let url = format!("{}/carts/{}", self.cart_service_url, cart_id);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| transport_error("cart clear", e))?;
        expect_success("cart service", response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_policy_treats_absent_fields_as_disabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/store-policy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "shipping": {"standard_fee": "100"}
            })))
            .mount(&server)
            .await;

        let clients = HttpClients::for_base_url(&server.uri());
        let policy = clients.fetch_policy().await.unwrap();
        assert!(!policy.shipping.free_shipping_enabled);
        assert!(!policy.tax.enabled);
    }

    #[tokio::test]
    async fn fetch_policy_maps_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/store-policy"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let clients = HttpClients::for_base_url(&server.uri());
        let result = clients.fetch_policy().await;
        assert_matches!(result, Err(ServiceError::ExternalServiceError(_)));
    }

    #[tokio::test]
    async fn upload_without_url_is_a_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/uploads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": false})))
            .mount(&server)
            .await;

        let clients = HttpClients::for_base_url(&server.uri());
        let result = clients
            .upload(Bytes::from_static(b"fake image"), "image/png", None)
            .await;
        assert_matches!(
            result,
            Err(ServiceError::UploadFailed(UploadError::Transport(_)))
        );
    }

    #[tokio::test]
    async fn create_order_sends_idempotency_key_header() {
        use crate::models::{
            CartLine, CustomerInfo, OrderStatus, OrderTotals, PaymentMode, PaymentStatus,
        };
        use rust_decimal_macros::dec;

        let key = Uuid::new_v4();
        let order_id = Uuid::new_v4();
        let customer = CustomerInfo {
            full_name: "Test Customer".to_string(),
            email: "customer@example.com".to_string(),
            phone: "01712345678".to_string(),
            address_line1: "12 Test Road".to_string(),
            address_line2: None,
            city: "Dhaka".to_string(),
            postal_code: None,
        };
        let new_order = NewOrder {
            idempotency_key: key,
            customer: customer.clone(),
            items: vec![CartLine {
                product_id: Uuid::new_v4(),
                name: "Widget".to_string(),
                unit_price: dec!(100),
                quantity: 1,
            }],
            totals: OrderTotals::default(),
            payment_mode: PaymentMode::Cod,
            payment_status: PaymentStatus::Unpaid,
            payment_proof: None,
            status: OrderStatus::Pending,
        };

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header(IDEMPOTENCY_KEY_HEADER, key.to_string().as_str()))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": order_id,
                "customer": serde_json::to_value(&customer).unwrap(),
                "items": [],
                "totals": {
                    "subtotal": "0", "shipping_cost": "0", "tax_amount": "0",
                    "discount_amount": "0", "total": "0"
                },
                "payment_mode": "cod",
                "payment_status": "unpaid",
                "payment_proof": null,
                "status": "pending",
                "created_at": "2026-01-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let clients = HttpClients::for_base_url(&server.uri());
        let order = clients.create_order(&new_order).await.unwrap();
        assert_eq!(order.id, order_id);
    }
}
