//! TOTP enrollment and verification.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::Serialize;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::config::SecurityConfig;

const DIGITS: usize = 6;
const STEP_SECONDS: u64 = 30;
const SECRET_BYTES: usize = 20;

/// A freshly generated secret waiting to be confirmed by the user.
#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
    /// Base32 secret, for manual entry.
    pub secret: String,
    /// `otpauth://totp/...` URI, what the QR code encodes.
    pub otpauth_url: String,
}

#[derive(Debug, Clone)]
pub struct TwoFactor {
    issuer: String,
    skew: u8,
}

impl TwoFactor {
    #[must_use]
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            issuer: config.totp_issuer.clone(),
            skew: config.totp_skew,
        }
    }

    #[must_use]
    pub fn generate(&self, account: &str) -> Enrollment {
        let bytes: [u8; SECRET_BYTES] = rand::rng().random();
        let totp = self.totp(bytes.to_vec(), account);

        Enrollment {
            secret: totp.get_secret_base32(),
            otpauth_url: totp.get_url(),
        }
    }

    /// Checks `token` against `secret` for the current time.
    #[must_use]
    pub fn verify(&self, secret: &str, token: &str) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        self.verify_at(secret, token, now)
    }

    /// Checks `token` against `secret` at unix time `time`, accepting codes
    /// up to `skew` steps either side.
    #[must_use]
    pub fn verify_at(&self, secret: &str, token: &str, time: u64) -> bool {
        let token = token.trim();
        if token.len() != DIGITS || !token.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }

        let Some(bytes) = decode_secret(secret) else {
            return false;
        };

        self.totp(bytes, "").check(token, time)
    }

    fn totp(&self, secret: Vec<u8>, account: &str) -> TOTP {
        TOTP::new_unchecked(
            Algorithm::SHA1,
            DIGITS,
            self.skew,
            STEP_SECONDS,
            secret,
            Some(self.issuer.clone()),
            account.to_string(),
        )
    }
}

fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let normalized: String = secret
        .trim()
        .trim_end_matches('=')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    if normalized.is_empty() {
        return None;
    }

    Secret::Encoded(normalized)
        .to_bytes()
        .ok()
        .filter(|bytes| !bytes.is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Current code for `secret`, as an authenticator app would show it.
    pub(crate) fn current_code(secret: &str) -> String {
        let bytes = decode_secret(secret).unwrap();
        TOTP::new_unchecked(
            Algorithm::SHA1,
            DIGITS,
            0,
            STEP_SECONDS,
            bytes,
            None,
            String::new(),
        )
        .generate_current()
        .unwrap()
    }

    fn code_at(secret: &str, time: u64) -> String {
        let bytes = decode_secret(secret).unwrap();
        TOTP::new_unchecked(
            Algorithm::SHA1,
            DIGITS,
            0,
            STEP_SECONDS,
            bytes,
            None,
            String::new(),
        )
        .generate(time)
    }

    fn verifier() -> TwoFactor {
        TwoFactor::new(&SecurityConfig::default())
    }

    #[test]
    fn generated_secret_is_base32_and_url_carries_it() {
        let enrollment = verifier().generate("alice");

        assert!(!enrollment.secret.is_empty());
        assert!(
            enrollment
                .secret
                .chars()
                .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c))
        );
        assert!(enrollment.otpauth_url.starts_with("otpauth://totp/"));
        assert!(enrollment.otpauth_url.contains(&enrollment.secret));
        assert!(enrollment.otpauth_url.contains("issuer=Sorbet"));
    }

    #[test]
    fn secrets_differ_between_enrollments() {
        let tf = verifier();
        assert_ne!(tf.generate("a").secret, tf.generate("a").secret);
    }

    #[test]
    fn accepts_current_code() {
        let tf = verifier();
        let secret = tf.generate("alice").secret;
        assert!(tf.verify(&secret, &current_code(&secret)));
    }

    #[test]
    fn window_is_three_steps_either_side() {
        let tf = verifier();
        let secret = tf.generate("alice").secret;
        let now = 1_700_000_010;

        assert!(tf.verify_at(&secret, &code_at(&secret, now - 3 * STEP_SECONDS), now));
        assert!(tf.verify_at(&secret, &code_at(&secret, now + 3 * STEP_SECONDS), now));

        // Two codes six steps apart can collide, so only assert rejection
        // when the far code differs from every code inside the window.
        let far = code_at(&secret, now - 6 * STEP_SECONDS);
        let inside: Vec<String> = (0..=6)
            .map(|i| code_at(&secret, now - 3 * STEP_SECONDS + i * STEP_SECONDS))
            .collect();
        if !inside.contains(&far) {
            assert!(!tf.verify_at(&secret, &far, now));
        }
    }

    #[test]
    fn malformed_input_never_verifies() {
        let tf = verifier();
        let secret = tf.generate("alice").secret;

        assert!(!tf.verify(&secret, ""));
        assert!(!tf.verify(&secret, "12345"));
        assert!(!tf.verify(&secret, "abcdef"));
        assert!(!tf.verify("", "123456"));
        assert!(!tf.verify("not base32 at all!", "123456"));
    }

    #[test]
    fn lowercase_and_padded_secrets_decode() {
        let tf = verifier();
        let secret = tf.generate("alice").secret;
        let code = current_code(&secret);

        assert!(tf.verify(&secret.to_lowercase(), &code));
        assert!(tf.verify(&format!("{secret}===="), &code));
    }
}
