//! Keyed-hash tokenization
//!
//! HMAC-SHA256 over (kind, original value) under a per-deployment secret.
//! Same (kind, value, secret) yields the same token byte-for-byte;
//! different secrets yield different tokens. Prefixes are stable per kind.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use finsight_core::PiiKind;

type HmacSha256 = Hmac<Sha256>;

/// Hex digits taken from the MAC for the token body.
const TOKEN_HEX_LEN: usize = 16;

/// Deterministic keyed tokenizer.
#[derive(Clone)]
pub struct Tokenizer {
    secret: Vec<u8>,
}

impl Tokenizer {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Produce the token for a (kind, value) pair.
    pub fn tokenize(&self, kind: PiiKind, value: &str) -> String {
        let digest = self.keyed_hex(kind, value);
        match kind {
            PiiKind::Email => {
                format!("EMAIL_{}@anon.{}", digest, domain_class(value))
            },
            _ => format!("{}_{}", kind.token_prefix(), digest),
        }
    }

    /// True when `token` is what this tokenizer would produce for the
    /// original value. Used for integrity verification on reversal.
    pub fn verify(&self, kind: PiiKind, original: &str, token: &str) -> bool {
        self.tokenize(kind, original) == token
    }

    fn keyed_hex(&self, kind: PiiKind, value: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(kind.as_str().as_bytes());
        mac.update(&[0x1f]);
        mac.update(value.as_bytes());
        let bytes = mac.finalize().into_bytes();

        let mut hex = String::with_capacity(TOKEN_HEX_LEN);
        for b in bytes.iter().take(TOKEN_HEX_LEN / 2) {
            hex.push_str(&format!("{:02x}", b));
        }
        hex
    }
}

/// Map an email's domain to a coarse class so the token keeps the domain's
/// character without revealing it.
fn domain_class(email: &str) -> &'static str {
    let domain = email
        .rsplit_once('@')
        .map(|(_, d)| d.to_lowercase())
        .unwrap_or_default();

    const FREEMAIL: &[&str] = &[
        "gmail.com",
        "yahoo.com",
        "hotmail.com",
        "outlook.com",
        "icloud.com",
        "proton.me",
        "protonmail.com",
    ];

    if FREEMAIL.contains(&domain.as_str()) {
        "mail"
    } else if domain.ends_with(".edu") {
        "edu"
    } else if domain.ends_with(".gov") {
        "gov"
    } else if domain.ends_with(".org") {
        "org"
    } else {
        "biz"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism() {
        let tokenizer = Tokenizer::new("secret-a");
        let a = tokenizer.tokenize(PiiKind::Name, "Jane Doe");
        let b = tokenizer.tokenize(PiiKind::Name, "Jane Doe");
        assert_eq!(a, b);
    }

    #[test]
    fn test_secret_changes_token() {
        let a = Tokenizer::new("secret-a").tokenize(PiiKind::Name, "Jane Doe");
        let b = Tokenizer::new("secret-b").tokenize(PiiKind::Name, "Jane Doe");
        assert_ne!(a, b);
        // Prefix is stable regardless of secret
        assert!(a.starts_with("USER_"));
        assert!(b.starts_with("USER_"));
    }

    #[test]
    fn test_kind_separates_token_space() {
        let tokenizer = Tokenizer::new("secret");
        let as_name = tokenizer.tokenize(PiiKind::Name, "12345");
        let as_account = tokenizer.tokenize(PiiKind::BankAccount, "12345");
        // Same value under different kinds yields different digests, not
        // just different prefixes.
        let name_digest = as_name.strip_prefix("USER_").unwrap();
        let account_digest = as_account.strip_prefix("ACCT_").unwrap();
        assert_ne!(name_digest, account_digest);
    }

    #[test]
    fn test_token_does_not_contain_original() {
        let tokenizer = Tokenizer::new("secret");
        let token = tokenizer.tokenize(PiiKind::Phone, "5551234");
        assert!(!token.contains("5551234"));
    }

    #[test]
    fn test_email_shape_and_domain_class() {
        let tokenizer = Tokenizer::new("secret");

        let corp = tokenizer.tokenize(PiiKind::Email, "info@ts.com");
        assert!(corp.starts_with("EMAIL_"));
        assert!(corp.ends_with("@anon.biz"));

        let free = tokenizer.tokenize(PiiKind::Email, "someone@gmail.com");
        assert!(free.ends_with("@anon.mail"));

        let edu = tokenizer.tokenize(PiiKind::Email, "prof@cs.stanford.edu");
        assert!(edu.ends_with("@anon.edu"));
    }

    #[test]
    fn test_verify_round_trip() {
        let tokenizer = Tokenizer::new("secret");
        let token = tokenizer.tokenize(PiiKind::Iban, "DE89370400440532013000");
        assert!(tokenizer.verify(PiiKind::Iban, "DE89370400440532013000", &token));
        assert!(!tokenizer.verify(PiiKind::Iban, "DE00000000000000000000", &token));
    }
}
