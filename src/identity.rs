//! Caller identity.
//!
//! The receipt core performs no authentication of its own: an
//! [`IdentityProvider`] maps request headers to an [`AccountId`] and the core
//! trusts the answer. [`TokenIdentity`] is the bundled provider. It accepts a
//! bearer token (or a `session` cookie) and looks up its SHA-256 digest in a
//! JSON identity file, so the file never holds usable tokens.
//!
//! ```json
//! { "accounts": [ { "account_id": 1, "token_sha256": "9f86d0…" } ] }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts, HeaderMap};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::receipt::AccountId;

/// Resolves the account behind a request, if any.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Option<AccountId>;
}

#[derive(Debug, Deserialize)]
struct IdentityFile {
    #[serde(default)]
    accounts: Vec<IdentityEntry>,
}

#[derive(Debug, Deserialize)]
struct IdentityEntry {
    account_id: i64,
    token_sha256: String,
}

/// Static token → account table loaded at startup.
#[derive(Debug, Default)]
pub struct TokenIdentity {
    by_digest: HashMap<String, AccountId>,
}

impl TokenIdentity {
    /// Load the identity file. A missing file yields an empty table, which
    /// rejects every request.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Identity file {} not found; all requests will be unauthenticated",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read identity file: {:?}", path))?;
        let file: IdentityFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse identity file: {:?}", path))?;

        let mut by_digest = HashMap::new();
        for entry in file.accounts {
            let digest = entry.token_sha256.trim().to_ascii_lowercase();
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                anyhow::bail!(
                    "Invalid token_sha256 for account {} in {:?}",
                    entry.account_id,
                    path
                );
            }
            by_digest.insert(digest, AccountId(entry.account_id));
        }

        info!("Loaded {} identities from {:?}", by_digest.len(), path);
        Ok(Self { by_digest })
    }

    /// Build a table directly from plaintext tokens.
    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = (&'a str, AccountId)>) -> Self {
        Self {
            by_digest: tokens
                .into_iter()
                .map(|(token, account)| (token_digest(token), account))
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for TokenIdentity {
    async fn resolve(&self, headers: &HeaderMap) -> Option<AccountId> {
        let token = presented_token(headers)?;
        self.by_digest.get(&token_digest(token)).copied()
    }
}

/// Lowercase hex SHA-256 of a token.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Bearer token from `Authorization`, falling back to a `session` cookie.
fn presented_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token);
            }
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == "session" && !value.is_empty())
        .map(|(_, value)| value)
}

/// The resolved caller of a request; `None` when no identity matched.
///
/// Never rejects: the pipeline and retrieval service decide what an
/// anonymous caller gets.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Option<AccountId>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    Arc<dyn IdentityProvider>: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = Arc::<dyn IdentityProvider>::from_ref(state);
        Ok(Caller(identity.resolve(&parts.headers).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use tempfile::TempDir;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_token_digest() {
        assert_eq!(
            token_digest("test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[tokio::test]
    async fn test_resolve_bearer_and_cookie() {
        let identity = TokenIdentity::from_tokens([("tok-1", AccountId(1)), ("tok-2", AccountId(2))]);

        let bearer = headers(&[(header::AUTHORIZATION, "Bearer tok-1")]);
        assert_eq!(identity.resolve(&bearer).await, Some(AccountId(1)));

        let cookie = headers(&[(header::COOKIE, "theme=dark; session=tok-2")]);
        assert_eq!(identity.resolve(&cookie).await, Some(AccountId(2)));

        let unknown = headers(&[(header::AUTHORIZATION, "Bearer nope")]);
        assert_eq!(identity.resolve(&unknown).await, None);

        assert_eq!(identity.resolve(&HeaderMap::new()).await, None);

        let basic = headers(&[(header::AUTHORIZATION, "Basic dG9rLTE=")]);
        assert_eq!(identity.resolve(&basic).await, None);
    }

    #[tokio::test]
    async fn test_load_identity_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("identities.json");
        std::fs::write(
            &path,
            format!(
                r#"{{"accounts": [{{"account_id": 7, "token_sha256": "{}"}}]}}"#,
                token_digest("secret").to_uppercase()
            ),
        )
        .unwrap();

        let identity = TokenIdentity::load(&path).unwrap();
        assert_eq!(identity.by_digest.len(), 1);

        let h = headers(&[(header::AUTHORIZATION, "Bearer secret")]);
        assert_eq!(identity.resolve(&h).await, Some(AccountId(7)));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let identity = TokenIdentity::load(&tmp.path().join("absent.json")).unwrap();
        assert!(identity.by_digest.is_empty());
    }

    #[test]
    fn test_load_rejects_bad_digest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("identities.json");
        std::fs::write(&path, r#"{"accounts": [{"account_id": 1, "token_sha256": "plaintext"}]}"#)
            .unwrap();

        assert!(TokenIdentity::load(&path).is_err());
    }
}
