//! Bearer token authorization
//!
//! Every resource route requires an `Authorization: Bearer <token>` header
//! where `<token>` is the id of a document in the configured token
//! collection. A token document may carry a `valid_until` datetime; a token
//! whose `valid_until` lies in the past is treated as unknown.

use crate::core::error::{AuthError, DocrestResult};
use crate::core::json::{as_datetime, date_value, oid_value, parse_object_id};
use crate::core::store::{CollectionRef, DocumentStore};
use anyhow::Result;
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;

/// Who is calling
#[derive(Debug, Clone, PartialEq)]
pub enum AuthContext {
    /// A caller holding a valid token
    Token(Token),

    /// Authorization is disabled
    Anonymous,
}

impl AuthContext {
    pub fn token_id(&self) -> Option<&ObjectId> {
        match self {
            AuthContext::Token(token) => Some(&token.id),
            AuthContext::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthContext::Token(_))
    }
}

/// A stored token document
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub id: ObjectId,
    pub valid_until: Option<DateTime<Utc>>,
    /// The full stored document
    pub document: Value,
}

impl Token {
    pub fn from_document(document: Value) -> Option<Self> {
        let id = crate::core::json::as_object_id(document.get("_id")?)?;
        let valid_until = document.get("valid_until").and_then(as_datetime);
        Some(Self {
            id,
            valid_until,
            document,
        })
    }

    pub fn is_valid_at(&self, now: &DateTime<Utc>) -> bool {
        self.valid_until.is_none_or(|until| until >= *now)
    }
}

/// Split an `Authorization` header value into its token
///
/// The value must be exactly two space-separated parts; the scheme is
/// compared case-insensitively.
pub fn parse_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingHeader)?;
    let parts: Vec<&str> = header.split(' ').collect();
    let [scheme, token] = parts.as_slice() else {
        return Err(AuthError::SyntaxError);
    };
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::BadScheme);
    }
    Ok(*token)
}

/// Token lookup
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Find a currently valid token by its raw header value
    async fn find_token(&self, target: &CollectionRef, raw: &str) -> Result<Option<Token>>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> TokenStore for S {
    async fn find_token(&self, target: &CollectionRef, raw: &str) -> Result<Option<Token>> {
        let Some(id) = parse_object_id(raw) else {
            return Ok(None);
        };
        let now = Utc::now();
        let filter = json!({
            "_id": oid_value(&id),
            "valid_until": { "$not": { "$lt": date_value(&now) } }
        });
        let found = self.find_one(target, &filter, None).await?;
        Ok(found
            .and_then(Token::from_document)
            .filter(|token| token.is_valid_at(&now)))
    }
}

/// Decides who is calling from the request headers
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> DocrestResult<AuthContext>;
}

/// Looks bearer tokens up in a token collection
pub struct BearerAuthProvider {
    store: Arc<dyn DocumentStore>,
    tokens: CollectionRef,
}

impl BearerAuthProvider {
    pub fn new(store: Arc<dyn DocumentStore>, tokens: CollectionRef) -> Self {
        Self { store, tokens }
    }
}

#[async_trait]
impl AuthProvider for BearerAuthProvider {
    async fn authenticate(&self, headers: &HeaderMap) -> DocrestResult<AuthContext> {
        let header = headers
            .get(AUTHORIZATION)
            .map(|value| value.to_str().map_err(|_| AuthError::SyntaxError))
            .transpose()?;
        let raw = parse_bearer(header).inspect_err(|err| {
            tracing::warn!(code = err.error_code(), "rejected authorization header");
        })?;

        match self.store.find_token(&self.tokens, raw).await? {
            Some(token) => Ok(AuthContext::Token(token)),
            None => {
                tracing::warn!(collection = %self.tokens, "unknown or expired token");
                Err(AuthError::TokenNotFound.into())
            }
        }
    }
}

/// Lets every request through (authorization disabled)
pub struct NoAuthProvider;

#[async_trait]
impl AuthProvider for NoAuthProvider {
    async fn authenticate(&self, _headers: &HeaderMap) -> DocrestResult<AuthContext> {
        Ok(AuthContext::Anonymous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DocrestError;
    use crate::storage::InMemoryDocumentStore;
    use axum::http::HeaderValue;
    use chrono::Duration;

    fn tokens() -> CollectionRef {
        CollectionRef::new("http_storage", "auth")
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    async fn provider_with(documents: Vec<Value>) -> (BearerAuthProvider, Vec<ObjectId>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let mut ids = Vec::new();
        for doc in documents {
            ids.push(store.insert_one(&tokens(), doc).await.unwrap());
        }
        (BearerAuthProvider::new(store, tokens()), ids)
    }

    fn auth_code(result: DocrestResult<AuthContext>) -> &'static str {
        match result {
            Err(DocrestError::Auth(err)) => err.error_code(),
            other => panic!("expected an auth error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer(Some("Bearer abc")), Ok("abc"));
        assert_eq!(parse_bearer(Some("bEaReR abc")), Ok("abc"));
        assert_eq!(parse_bearer(None), Err(AuthError::MissingHeader));
        assert_eq!(parse_bearer(Some("Basic abc")), Err(AuthError::BadScheme));
        assert_eq!(parse_bearer(Some("Bearer")), Err(AuthError::SyntaxError));
        assert_eq!(parse_bearer(Some("Bearer a b")), Err(AuthError::SyntaxError));
    }

    #[tokio::test]
    async fn test_valid_tokens_authenticate() {
        let future = Utc::now() + Duration::hours(1);
        let (provider, ids) =
            provider_with(vec![json!({"user": "a"}), json!({"valid_until": date_value(&future)})]).await;

        for id in ids {
            let ctx = provider
                .authenticate(&headers(&format!("Bearer {}", id.to_hex())))
                .await
                .unwrap();
            assert_eq!(ctx.token_id(), Some(&id));
        }
    }

    #[tokio::test]
    async fn test_expired_and_unknown_tokens_are_rejected() {
        let past = Utc::now() - Duration::hours(1);
        let (provider, ids) = provider_with(vec![json!({"valid_until": date_value(&past)})]).await;

        let expired = provider
            .authenticate(&headers(&format!("Bearer {}", ids[0].to_hex())))
            .await;
        assert_eq!(auth_code(expired), "authorization:not-found");

        let unknown = provider
            .authenticate(&headers(&format!("Bearer {}", ObjectId::new().to_hex())))
            .await;
        assert_eq!(auth_code(unknown), "authorization:not-found");

        let garbage = provider.authenticate(&headers("Bearer not-an-id")).await;
        assert_eq!(auth_code(garbage), "authorization:not-found");
    }

    #[tokio::test]
    async fn test_header_shape_errors() {
        let (provider, _) = provider_with(vec![]).await;
        assert_eq!(
            auth_code(provider.authenticate(&HeaderMap::new()).await),
            "authorization:missing-header"
        );
        assert_eq!(
            auth_code(provider.authenticate(&headers("Token abc")).await),
            "authorization:bad-scheme"
        );
        assert_eq!(
            auth_code(provider.authenticate(&headers("Bearer")).await),
            "authorization:syntax-error"
        );
    }

    #[tokio::test]
    async fn test_no_auth_provider_is_anonymous() {
        let ctx = NoAuthProvider.authenticate(&HeaderMap::new()).await.unwrap();
        assert!(!ctx.is_authenticated());
    }
}
