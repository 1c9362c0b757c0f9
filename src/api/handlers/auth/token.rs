//! Bearer tokens: generation, hashing and plaintext validation.
//!
//! The plaintext is 26 characters drawn from the base32 alphabet and only
//! exists at issuance and presentation. Storage only ever sees its SHA-256
//! digest.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::{RngCore, rngs::OsRng};
use secrecy::SecretString;
use sha2::{Digest, Sha256};
use std::{fmt, time::Duration};
use subtle::ConstantTimeEq;

use crate::api::validator::Validator;

pub const TOKEN_PLAINTEXT_LEN: usize = 26;
const TOKEN_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Purpose a token was issued for. Tokens never cross scopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::Authentication => "authentication",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 digest of a token plaintext. Equality is constant time.
#[derive(Clone, Copy, Eq)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    #[must_use]
    pub fn of(plaintext: &str) -> Self {
        Self(Sha256::digest(plaintext.as_bytes()).into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl PartialEq for TokenHash {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenHash(***)")
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub plaintext: SecretString,
    pub hash: TokenHash,
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: Scope,
}

impl Token {
    /// Generate a fresh token for `user_id` valid for `ttl`.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails or `ttl` is out of range.
    pub fn generate(user_id: i64, ttl: Duration, scope: Scope) -> Result<Self> {
        let plaintext = generate_plaintext()?;
        let ttl = chrono::Duration::from_std(ttl).context("token ttl out of range")?;
        let hash = TokenHash::of(&plaintext);
        Ok(Self {
            plaintext: SecretString::from(plaintext),
            hash,
            user_id,
            expiry: Utc::now() + ttl,
            scope,
        })
    }
}

fn generate_plaintext() -> Result<String> {
    let mut bytes = [0u8; TOKEN_PLAINTEXT_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    // 256 is a multiple of 32, so masking keeps every symbol equally likely.
    Ok(bytes
        .iter()
        .map(|byte| char::from(TOKEN_ALPHABET[usize::from(byte & 0x1f)]))
        .collect())
}

/// Structural check applied before any lookup.
#[must_use]
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_PLAINTEXT_LEN
}

pub fn validate_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(is_well_formed(plaintext), "token", "must be 26 bytes long");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn generated_tokens_are_26_base32_chars() {
        let token = Token::generate(7, Duration::from_secs(60), Scope::Authentication).unwrap();
        let plaintext = token.plaintext.expose_secret();
        assert_eq!(plaintext.len(), TOKEN_PLAINTEXT_LEN);
        assert!(plaintext.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
        assert_eq!(token.hash, TokenHash::of(plaintext));
        assert!(token.expiry > Utc::now());
    }

    #[test]
    fn generated_tokens_differ() {
        let first = Token::generate(1, Duration::from_secs(60), Scope::Activation).unwrap();
        let second = Token::generate(1, Duration::from_secs(60), Scope::Activation).unwrap();
        assert_ne!(first.hash, second.hash);
    }

    #[test]
    fn hash_is_stable() {
        assert_eq!(TokenHash::of("token"), TokenHash::of("token"));
        assert_ne!(TokenHash::of("token"), TokenHash::of("other"));
    }

    #[test]
    fn plaintext_validation() {
        let mut v = Validator::new();
        validate_plaintext(&mut v, "ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        assert!(v.valid());

        let mut v = Validator::new();
        validate_plaintext(&mut v, "short");
        assert!(!v.valid());

        let mut v = Validator::new();
        validate_plaintext(&mut v, "");
        assert!(!v.valid());
    }

    #[test]
    fn debug_never_prints_secrets() {
        let token = Token::generate(1, Duration::from_secs(60), Scope::Authentication).unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains(token.plaintext.expose_secret()));
    }

    #[test]
    fn scope_names() {
        assert_eq!(Scope::Activation.to_string(), "activation");
        assert_eq!(Scope::Authentication.as_str(), "authentication");
    }
}
