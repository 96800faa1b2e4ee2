use serde::{Deserialize, Serialize};
use strum::Display;

/// Mobile wallet used for the advance transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WalletProvider {
    Bkash,
    Nagad,
}

/// User-submitted evidence of an out-of-band wallet transfer.
///
/// Built up incrementally during proof capture; `evidence_url` is only set
/// once the screenshot has finished uploading to the object store, and the
/// state machine refuses to leave proof capture without it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentProof {
    pub method: Option<WalletProvider>,
    pub sender_phone: Option<String>,
    pub transaction_id: Option<String>,
    pub evidence_url: Option<String>,
}

impl PaymentProof {
    /// All four pieces present, including a stable evidence reference.
    pub fn is_complete(&self) -> bool {
        self.method.is_some()
            && self.sender_phone.as_deref().is_some_and(|s| !s.trim().is_empty())
            && self.transaction_id.as_deref().is_some_and(|s| !s.trim().is_empty())
            && self.evidence_url.is_some()
    }
}

/// Raw evidence file as received from the client.
#[derive(Debug, Clone)]
pub struct EvidenceFile {
    pub bytes: bytes::Bytes,
    pub content_type: String,
    pub file_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_without_evidence_url() {
        let proof = PaymentProof {
            method: Some(WalletProvider::Bkash),
            sender_phone: Some("01712345678".to_string()),
            transaction_id: Some("TX12345".to_string()),
            evidence_url: None,
        };
        assert!(!proof.is_complete());
    }

    #[test]
    fn blank_transaction_id_is_incomplete() {
        let proof = PaymentProof {
            method: Some(WalletProvider::Nagad),
            sender_phone: Some("01712345678".to_string()),
            transaction_id: Some("   ".to_string()),
            evidence_url: Some("https://cdn.example/evidence/1.png".to_string()),
        };
        assert!(!proof.is_complete());
    }
}
