//! HMAC-SHA256 verification for inbound callbacks.
//!
//! Two schemes are accepted:
//! - the upload service signs the raw body: `hmac-sha256=<hex>`
//! - the payment processor signs `"{timestamp}.{body}"` and sends
//!   `t=<unix>,v1=<hex>[,v1=<hex>...]`

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, ServiceError};

type HmacSha256 = Hmac<Sha256>;

pub const UPLOAD_SIGNATURE_HEADER: &str = "x-upload-signature";
pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a signed webhook, in seconds.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

fn mac(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length")
}

fn verify_hex(mac: HmacSha256, signature_hex: &str) -> bool {
    match hex::decode(signature_hex) {
        Ok(bytes) => mac.verify_slice(&bytes).is_ok(),
        Err(_) => false,
    }
}

/// Sign a body the way the upload service does. Used by tests and tooling.
pub fn sign_upload(secret: &str, body: &[u8]) -> String {
    let mut mac = mac(secret);
    mac.update(body);
    format!("hmac-sha256={}", hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_upload(secret: &str, body: &[u8], header: Option<&str>) -> Result<()> {
    let header = header.ok_or(ServiceError::InvalidSignature("missing signature header"))?;
    let signature = header
        .strip_prefix("hmac-sha256=")
        .ok_or(ServiceError::InvalidSignature("unsupported signature scheme"))?;

    let mut mac = mac(secret);
    mac.update(body);
    if verify_hex(mac, signature) {
        Ok(())
    } else {
        Err(ServiceError::InvalidSignature("signature mismatch"))
    }
}

/// Sign a webhook payload the way the payment processor does.
pub fn sign_webhook(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = mac(secret);
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_webhook(secret: &str, body: &[u8], header: Option<&str>, now: i64) -> Result<()> {
    let header = header.ok_or(ServiceError::InvalidSignature("missing signature header"))?;

    let mut timestamp: Option<i64> = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(ServiceError::InvalidSignature("missing timestamp"))?;
    if now.abs_diff(timestamp) > WEBHOOK_TOLERANCE_SECS.unsigned_abs() {
        return Err(ServiceError::InvalidSignature("timestamp outside tolerance"));
    }

    let matched = candidates.iter().any(|candidate| {
        let mut mac = mac(secret);
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        verify_hex(mac, candidate)
    });

    if matched {
        Ok(())
    } else {
        Err(ServiceError::InvalidSignature("signature mismatch"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_signature_roundtrip() {
        let body = br#"{"file":{}}"#;
        let header = sign_upload("upl_secret", body);
        assert!(verify_upload("upl_secret", body, Some(&header)).is_ok());
    }

    #[test]
    fn upload_signature_rejects_tampering() {
        let header = sign_upload("upl_secret", b"original");
        assert!(verify_upload("upl_secret", b"tampered", Some(&header)).is_err());
        assert!(verify_upload("other_secret", b"original", Some(&header)).is_err());
        assert!(verify_upload("upl_secret", b"original", None).is_err());
        assert!(verify_upload("upl_secret", b"original", Some("sha1=abc")).is_err());
        assert!(verify_upload("upl_secret", b"original", Some("hmac-sha256=zz")).is_err());
    }

    #[test]
    fn webhook_signature_roundtrip() {
        let body = br#"{"type":"ping"}"#;
        let header = sign_webhook("whsec_1", 1_700_000_000, body);
        assert!(verify_webhook("whsec_1", body, Some(&header), 1_700_000_010).is_ok());
    }

    #[test]
    fn webhook_signature_accepts_any_matching_v1() {
        let body = b"{}";
        let good = sign_webhook("whsec_1", 100, body);
        let good_sig = good.split_once(",v1=").unwrap().1;
        let header = format!("t=100,v1=deadbeef,v1={}", good_sig);
        assert!(verify_webhook("whsec_1", body, Some(&header), 100).is_ok());
    }

    #[test]
    fn webhook_signature_rejects_stale_timestamps() {
        let body = b"{}";
        let header = sign_webhook("whsec_1", 1_000, body);
        let err = verify_webhook("whsec_1", body, Some(&header), 1_000 + WEBHOOK_TOLERANCE_SECS + 1);
        assert!(matches!(err, Err(ServiceError::InvalidSignature("timestamp outside tolerance"))));
    }

    #[test]
    fn webhook_signature_rejects_extreme_timestamps() {
        for header in ["t=-9223372036854775808,v1=00", "t=9223372036854775807,v1=00"] {
            let err = verify_webhook("whsec_1", b"{}", Some(header), 1_700_000_000);
            assert!(matches!(err, Err(ServiceError::InvalidSignature("timestamp outside tolerance"))));
        }
    }
}
