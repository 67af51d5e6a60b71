//! Webhook signature verification.
//!
//! The gateway signs `"{timestamp}.{raw body}"` with HMAC-SHA256 using the
//! shared endpoint secret and sends `Stripe-Signature: t=<unix>,v1=<hex>`.
//! The timestamp bounds replay of captured deliveries.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::event::GatewayEvent;
use super::errors::WebhookError;

/// Maximum allowed clock skew for future timestamps.
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed components of the signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when the signature was generated.
    pub timestamp: i64,
    /// Every `v1` signature present. The gateway sends several while a
    /// secret is being rolled.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses `t=<timestamp>,v1=<signature>[,v1=<signature>][,v0=<legacy>]`.
    ///
    /// Unknown keys (including the legacy `v0`) are ignored.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| WebhookError::MalformedHeader("expected key=value".to_string()))?;

            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        WebhookError::MalformedHeader("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    v1_signatures.push(hex::decode(value).map_err(|_| {
                        WebhookError::MalformedHeader("invalid v1 signature hex".to_string())
                    })?);
                }
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| WebhookError::MalformedHeader("missing timestamp".to_string()))?;
        if v1_signatures.is_empty() {
            return Err(WebhookError::MalformedHeader(
                "missing v1 signature".to_string(),
            ));
        }

        Ok(SignatureHeader {
            timestamp,
            v1_signatures,
        })
    }
}

/// Verifies gateway webhook deliveries against the shared secret.
pub struct WebhookVerifier {
    secret: Secret<String>,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    /// Creates a verifier accepting signatures up to `tolerance_secs` old.
    pub fn new(secret: Secret<String>, tolerance_secs: u64) -> Self {
        Self {
            secret,
            tolerance_secs: i64::try_from(tolerance_secs).unwrap_or(i64::MAX),
        }
    }

    /// Verifies the signature, then decodes the event envelope.
    ///
    /// # Errors
    ///
    /// - `MalformedHeader` - header missing parts or not hex
    /// - `TimestampOutOfRange` - signature older than the tolerance
    /// - `InvalidTimestamp` - signature from the future
    /// - `InvalidSignature` - no `v1` signature matches
    /// - `ParseError` - authentic payload that is not an event envelope
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, WebhookError> {
        self.verify(payload, signature_header, chrono::Utc::now().timestamp())?;
        serde_json::from_slice(payload).map_err(|e| WebhookError::ParseError(e.to_string()))
    }

    /// Checks authenticity only, against an explicit clock.
    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<(), WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;
        self.validate_timestamp(header.timestamp, now)?;

        let expected = compute_signature(self.secret.expose_secret(), header.timestamp, payload);
        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate));
        if !matched {
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }

    fn validate_timestamp(&self, timestamp: i64, now: i64) -> Result<(), WebhookError> {
        let age = now.saturating_sub(timestamp);
        if age > self.tolerance_secs {
            return Err(WebhookError::TimestampOutOfRange);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(WebhookError::InvalidTimestamp);
        }
        Ok(())
    }
}

fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Builds a valid signature header for `payload`, as the gateway would.
///
/// Used by tests and by operators replaying captured deliveries.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(compute_signature(secret, timestamp, payload))
    )
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret_12345";
    const NOW: i64 = 1_780_000_000;
    const PAYLOAD: &str = r#"{"id":"evt_1","type":"payment_intent.succeeded","created":1780000000,"data":{"object":{"id":"pi_abc"}},"livemode":false}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(Secret::new(SECRET.to_string()), 300)
    }

    // ══════════════════════════════════════════════════════════════
    // Header parsing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parse_header_with_v1_only() {
        let header = SignatureHeader::parse(&format!("t=1234567890,v1={}", "a".repeat(64))).unwrap();
        assert_eq!(header.timestamp, 1234567890);
        assert_eq!(header.v1_signatures.len(), 1);
        assert_eq!(header.v1_signatures[0].len(), 32);
    }

    #[test]
    fn parse_header_collects_every_v1_and_skips_v0() {
        let header = SignatureHeader::parse(&format!(
            "t=1,v1={},v1={},v0={}",
            "a".repeat(64),
            "b".repeat(64),
            "c".repeat(64)
        ))
        .unwrap();
        assert_eq!(header.v1_signatures.len(), 2);
    }

    #[test]
    fn parse_header_failures() {
        for bad in [
            format!("v1={}", "a".repeat(64)),
            "t=1234567890".to_string(),
            format!("t=soon,v1={}", "a".repeat(64)),
            "t=1,v1=not_hex".to_string(),
            "t1234567890".to_string(),
            String::new(),
        ] {
            assert!(
                matches!(SignatureHeader::parse(&bad), Err(WebhookError::MalformedHeader(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Signature verification
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn valid_signature_verifies() {
        let header = sign_payload(SECRET, NOW, PAYLOAD.as_bytes());
        assert!(verifier().verify(PAYLOAD.as_bytes(), &header, NOW).is_ok());
    }

    #[test]
    fn verify_and_parse_decodes_envelope() {
        let now = chrono::Utc::now().timestamp();
        let header = sign_payload(SECRET, now, PAYLOAD.as_bytes());
        let event = verifier().verify_and_parse(PAYLOAD.as_bytes(), &header).unwrap();
        assert_eq!(event.id, "evt_1");
    }

    #[test]
    fn any_matching_v1_is_accepted() {
        let good = sign_payload(SECRET, NOW, PAYLOAD.as_bytes());
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", NOW, "0".repeat(64), good_sig);
        assert!(verifier().verify(PAYLOAD.as_bytes(), &header, NOW).is_ok());
    }

    #[test]
    fn wrong_secret_fails() {
        let header = sign_payload("whsec_other", NOW, PAYLOAD.as_bytes());
        assert_eq!(
            verifier().verify(PAYLOAD.as_bytes(), &header, NOW),
            Err(WebhookError::InvalidSignature)
        );
    }

    #[test]
    fn tampered_payload_fails() {
        let header = sign_payload(SECRET, NOW, PAYLOAD.as_bytes());
        let tampered = PAYLOAD.replace("pi_abc", "pi_xyz");
        assert_eq!(
            verifier().verify(tampered.as_bytes(), &header, NOW),
            Err(WebhookError::InvalidSignature)
        );
    }

    #[test]
    fn authentic_garbage_is_parse_error() {
        let body = b"not json";
        let now = chrono::Utc::now().timestamp();
        let header = sign_payload(SECRET, now, body);
        assert!(matches!(
            verifier().verify_and_parse(body, &header),
            Err(WebhookError::ParseError(_))
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // Timestamp tolerance
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn timestamp_at_tolerance_boundary_succeeds() {
        assert!(verifier().validate_timestamp(NOW - 300, NOW).is_ok());
    }

    #[test]
    fn timestamp_past_tolerance_fails() {
        assert_eq!(
            verifier().validate_timestamp(NOW - 301, NOW),
            Err(WebhookError::TimestampOutOfRange)
        );
    }

    #[test]
    fn tolerance_is_configurable() {
        let strict = WebhookVerifier::new(Secret::new(SECRET.to_string()), 10);
        assert_eq!(
            strict.validate_timestamp(NOW - 11, NOW),
            Err(WebhookError::TimestampOutOfRange)
        );
    }

    #[test]
    fn small_future_skew_is_tolerated() {
        assert!(verifier().validate_timestamp(NOW + 30, NOW).is_ok());
        assert_eq!(
            verifier().validate_timestamp(NOW + 61, NOW),
            Err(WebhookError::InvalidTimestamp)
        );
    }

    #[test]
    fn stale_signature_is_rejected_even_if_valid() {
        let header = sign_payload(SECRET, NOW - 3600, PAYLOAD.as_bytes());
        assert_eq!(
            verifier().verify(PAYLOAD.as_bytes(), &header, NOW),
            Err(WebhookError::TimestampOutOfRange)
        );
    }
}
