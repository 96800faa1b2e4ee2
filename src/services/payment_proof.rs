//! Advance-payment proof workflow.
//!
//! Invoked only when the session pays in Advance mode. Validates the
//! evidence screenshot before it ever leaves the process, sequences the
//! upload so the state machine cannot leave proof capture without a stable
//! object-store URL, and computes the 15% advance split.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, instrument};

use crate::clients::EvidenceStore;
use crate::errors::{ServiceError, UploadError};
use crate::models::EvidenceFile;
use crate::services::pricing::round_money;

/// Share of the total collected upfront in Advance mode.
const ADVANCE_RATE: Decimal = dec!(0.15);

/// The upfront/remainder split of an order total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct AdvanceSplit {
    pub advance_amount: Decimal,
    pub remaining_amount: Decimal,
}

/// Splits `total` into the advance payment and the amount due at delivery.
///
/// The remainder is `total - advance`, not `round(total * 0.85)`, so the two
/// parts always sum exactly to the total.
pub fn advance_split(total: Decimal) -> AdvanceSplit {
    let advance_amount = round_money(total * ADVANCE_RATE);
    AdvanceSplit {
        advance_amount,
        remaining_amount: total - advance_amount,
    }
}

#[derive(Clone)]
pub struct PaymentProofWorkflow {
    evidence_store: Arc<dyn EvidenceStore>,
    max_bytes: usize,
    allowed_mime_prefix: String,
}

impl PaymentProofWorkflow {
    pub fn new(
        evidence_store: Arc<dyn EvidenceStore>,
        max_bytes: usize,
        allowed_mime_prefix: String,
    ) -> Self {
        Self {
            evidence_store,
            max_bytes,
            allowed_mime_prefix,
        }
    }

    /// Validates and uploads an evidence file, returning its stable URL.
    ///
    /// Size and MIME checks happen before any network call. On failure the
    /// caller keeps whatever proof fields were already entered; only the
    /// evidence reference is withheld.
    #[instrument(skip(self, file), fields(size = file.bytes.len(), content_type = %file.content_type))]
    pub async fn upload_evidence(&self, file: EvidenceFile) -> Result<String, ServiceError> {
        self.validate(&file)?;

        let url = self
            .evidence_store
            .upload(file.bytes, &file.content_type, file.file_name.as_deref())
            .await?;

        info!(%url, "Evidence uploaded");
        Ok(url)
    }

    fn validate(&self, file: &EvidenceFile) -> Result<(), UploadError> {
        if file.bytes.is_empty() {
            return Err(UploadError::Transport("empty upload body".to_string()));
        }
        if file.bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                size: file.bytes.len(),
                limit: self.max_bytes,
            });
        }
        if !file.content_type.starts_with(&self.allowed_mime_prefix) {
            return Err(UploadError::UnsupportedType(file.content_type.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bytes::Bytes;

    struct StubStore {
        fail: bool,
    }

    #[async_trait]
    impl EvidenceStore for StubStore {
        async fn upload(
            &self,
            _bytes: Bytes,
            _content_type: &str,
            _file_name: Option<&str>,
        ) -> Result<String, ServiceError> {
            if self.fail {
                Err(ServiceError::UploadFailed(UploadError::Transport(
                    "connection reset".to_string(),
                )))
            } else {
                Ok("https://cdn.example/evidence/abc.png".to_string())
            }
        }
    }

    fn workflow(fail: bool) -> PaymentProofWorkflow {
        PaymentProofWorkflow::new(Arc::new(StubStore { fail }), 1024, "image/".to_string())
    }

    fn file(len: usize, content_type: &str) -> EvidenceFile {
        EvidenceFile {
            bytes: Bytes::from(vec![0u8; len]),
            content_type: content_type.to_string(),
            file_name: Some("proof.png".to_string()),
        }
    }

    #[test]
    fn advance_split_sums_exactly_to_total() {
        let split = advance_split(dec!(10000.33));
        assert_eq!(
            split.advance_amount + split.remaining_amount,
            dec!(10000.33)
        );
        assert_eq!(split.advance_amount, dec!(1500.05));
    }

    #[test]
    fn advance_split_of_round_total() {
        let split = advance_split(dec!(2000));
        assert_eq!(split.advance_amount, dec!(300.00));
        assert_eq!(split.remaining_amount, dec!(1700.00));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_before_upload() {
        let result = workflow(true).upload_evidence(file(2048, "image/png")).await;
        assert_matches!(
            result,
            Err(ServiceError::UploadFailed(UploadError::TooLarge { .. }))
        );
    }

    #[tokio::test]
    async fn wrong_mime_type_is_rejected() {
        let result = workflow(false)
            .upload_evidence(file(10, "application/pdf"))
            .await;
        assert_matches!(
            result,
            Err(ServiceError::UploadFailed(UploadError::UnsupportedType(_)))
        );
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let result = workflow(true).upload_evidence(file(10, "image/jpeg")).await;
        assert_matches!(
            result,
            Err(ServiceError::UploadFailed(UploadError::Transport(_)))
        );
    }

    #[tokio::test]
    async fn successful_upload_returns_stable_url() {
        let url = workflow(false)
            .upload_evidence(file(10, "image/png"))
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example/evidence/abc.png");
    }
}
