//! # Gateway signatures
//!
//! The gateway signs two kinds of messages with HMAC-SHA256, each with its own secret:
//!
//! * Payment confirmations handed to the customer's browser. The message is `{gateway_order_id}|{payment_id}` and the
//!   key is the API key secret.
//! * Webhook deliveries. The message is the raw request body, byte for byte, and the key is the webhook secret.
//!
//! Signatures travel as lowercase hex. Comparison is constant-time.
use hmac::{Hmac, Mac};
use log::trace;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `message` under `secret`.
pub fn calculate_signature(secret: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take a key of any size");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks `provided` against the HMAC of `message`. Malformed hex is simply a mismatch.
pub fn verify_signature(secret: &[u8], message: &[u8], provided: &str) -> bool {
    let Ok(provided) = hex::decode(provided.trim()) else {
        trace!("🔐️ Signature is not valid hex");
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&provided).is_ok()
}

/// The message the gateway signs when it hands a payment confirmation to the browser.
pub fn confirmation_message(gateway_order_id: &str, payment_id: &str) -> String {
    format!("{gateway_order_id}|{payment_id}")
}

#[cfg(test)]
mod test {
    use super::*;

    // RFC 4231, test case 2
    #[test]
    fn known_vector() {
        let sig = calculate_signature(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(sig, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
        assert!(verify_signature(b"Jefe", b"what do ya want for nothing?", &sig));
        assert!(verify_signature(b"Jefe", b"what do ya want for nothing?", &sig.to_uppercase()));
    }

    #[test]
    fn confirmation_signatures() {
        let msg = confirmation_message("order_9A33XWu170gUtm", "pay_29QQoUBi66xm2f");
        assert_eq!(msg, "order_9A33XWu170gUtm|pay_29QQoUBi66xm2f");
        let sig = calculate_signature(b"key_secret", msg.as_bytes());
        assert!(verify_signature(b"key_secret", msg.as_bytes(), &sig));
        assert!(!verify_signature(b"webhook_secret", msg.as_bytes(), &sig));
        let swapped = confirmation_message("pay_29QQoUBi66xm2f", "order_9A33XWu170gUtm");
        assert!(!verify_signature(b"key_secret", swapped.as_bytes(), &sig));
    }

    #[test]
    fn body_must_match_byte_for_byte() {
        let body = br#"{"event":"payment.captured"}"#;
        let sig = calculate_signature(b"whsec", body);
        assert!(verify_signature(b"whsec", body, &sig));
        let with_newline = br#"{"event":"payment.captured"}
"#;
        assert!(!verify_signature(b"whsec", with_newline, &sig));
        assert!(!verify_signature(b"whsec", br#"{"event":"payment.captured"} "#, &sig));
    }

    #[test]
    fn garbage_signatures() {
        assert!(!verify_signature(b"k", b"m", ""));
        assert!(!verify_signature(b"k", b"m", "not hex"));
        assert!(!verify_signature(b"k", b"m", "abcd"));
    }
}
