use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const MAX_ISSUED_TOKENS: usize = 20_000;

#[derive(Debug, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in_seconds: i64,
}

/// Anti-forgery predicate consulted by the validator.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str, client: &str) -> bool;

    fn issue(&self, client: &str) -> IssuedToken;
}

/// Accepts any non-empty token. Offers no protection; kept as the default so
/// plain form posts keep working without a token round-trip.
#[derive(Debug, Default)]
pub struct PlaceholderVerifier;

impl TokenVerifier for PlaceholderVerifier {
    fn verify(&self, token: &str, _client: &str) -> bool {
        !token.trim().is_empty()
    }

    fn issue(&self, _client: &str) -> IssuedToken {
        IssuedToken {
            token: Uuid::new_v4().simple().to_string(),
            expires_in_seconds: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct TokenRecord {
    client: String,
    created_at: DateTime<Utc>,
}

type TokenMap = HashMap<String, TokenRecord>;

/// Single-use tokens bound to the client that requested them. Only digests
/// are kept in memory.
#[derive(Debug)]
pub struct IssuedTokenStore {
    tokens: Mutex<TokenMap>,
    ttl_seconds: i64,
}

impl IssuedTokenStore {
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            ttl_seconds,
        }
    }

    fn issue_at(&self, client: &str, now: DateTime<Utc>) -> IssuedToken {
        let token = Uuid::new_v4().simple().to_string();
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        prune_tokens(&mut tokens, now, self.ttl_seconds);
        tokens.insert(
            token_digest(&token),
            TokenRecord {
                client: client.to_string(),
                created_at: now,
            },
        );
        trim_tokens(&mut tokens);

        IssuedToken {
            token,
            expires_in_seconds: self.ttl_seconds,
        }
    }

    fn verify_at(&self, token: &str, client: &str, now: DateTime<Utc>) -> bool {
        let record = {
            let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
            prune_tokens(&mut tokens, now, self.ttl_seconds);
            tokens.remove(&token_digest(token.trim()))
        };

        record.is_some_and(|record| record.client == client)
    }
}

impl TokenVerifier for IssuedTokenStore {
    fn verify(&self, token: &str, client: &str) -> bool {
        self.verify_at(token, client, Utc::now())
    }

    fn issue(&self, client: &str) -> IssuedToken {
        self.issue_at(client, Utc::now())
    }
}

fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn prune_tokens(tokens: &mut TokenMap, now: DateTime<Utc>, ttl_seconds: i64) {
    tokens.retain(|_, record| (now - record.created_at).num_seconds() <= ttl_seconds);
}

fn trim_tokens(tokens: &mut TokenMap) {
    if tokens.len() <= MAX_ISSUED_TOKENS {
        return;
    }

    let overflow = tokens.len() - MAX_ISSUED_TOKENS;
    let mut oldest = tokens
        .iter()
        .map(|(digest, record)| (digest.clone(), record.created_at))
        .collect::<Vec<_>>();
    oldest.sort_by_key(|(_, created_at)| *created_at);

    for (digest, _) in oldest.into_iter().take(overflow) {
        tokens.remove(&digest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_accepts_any_non_blank_token() {
        let verifier = PlaceholderVerifier;

        assert!(verifier.verify("x", "127.0.0.1"));
        assert!(!verifier.verify("", "127.0.0.1"));
        assert!(!verifier.verify("   ", "127.0.0.1"));
    }

    #[test]
    fn issued_token_is_single_use() {
        let store = IssuedTokenStore::new(60);
        let issued = store.issue("10.0.0.1");

        assert_eq!(issued.expires_in_seconds, 60);
        assert!(store.verify(&issued.token, "10.0.0.1"));
        assert!(!store.verify(&issued.token, "10.0.0.1"));
    }

    #[test]
    fn issued_token_is_bound_to_client() {
        let store = IssuedTokenStore::new(60);
        let issued = store.issue("10.0.0.1");

        assert!(!store.verify(&issued.token, "10.0.0.2"));
    }

    #[test]
    fn issued_token_expires() {
        let store = IssuedTokenStore::new(60);
        let issued_at = Utc::now() - chrono::Duration::seconds(120);
        let issued = store.issue_at("10.0.0.1", issued_at);

        assert!(!store.verify_at(&issued.token, "10.0.0.1", Utc::now()));
    }

    #[test]
    fn unknown_token_is_rejected() {
        let store = IssuedTokenStore::new(60);
        assert!(!store.verify("never-issued", "10.0.0.1"));
    }

    #[test]
    fn trimming_drops_oldest_tokens_first() {
        let now = Utc::now();
        let mut tokens = TokenMap::new();
        for index in 0..(MAX_ISSUED_TOKENS + 2) {
            tokens.insert(
                format!("digest-{index}"),
                TokenRecord {
                    client: "c".to_string(),
                    created_at: now + chrono::Duration::seconds(index as i64),
                },
            );
        }

        trim_tokens(&mut tokens);

        assert_eq!(tokens.len(), MAX_ISSUED_TOKENS);
        assert!(!tokens.contains_key("digest-0"));
        assert!(!tokens.contains_key("digest-1"));
        assert!(tokens.contains_key("digest-2"));
    }
}
