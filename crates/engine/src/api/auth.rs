//! In-world request authentication.
//!
//! Requests from scripted objects carry the virtual world's identity headers
//! plus `X-RPHUD-Token`, the hex HMAC-SHA256 of the owner key under the
//! shared secret.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hmac::{Hmac, Mac};
use rphud_domain::common::collapse_whitespace;
use sha2::Sha256;

use super::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

pub const SHARD_HEADER: &str = "x-secondlife-shard";
pub const REGION_HEADER: &str = "x-secondlife-region";
pub const OWNER_KEY_HEADER: &str = "x-secondlife-owner-key";
pub const OWNER_NAME_HEADER: &str = "x-secondlife-owner-name";
pub const TOKEN_HEADER: &str = "x-rphud-token";

const USER_AGENT_PREFIX: &str = "Second Life LSL/";
const MAX_OWNER_NAME_CHARS: usize = 64;

/// Shared secret for request signatures.
#[derive(Clone)]
pub struct SharedSecret(Arc<[u8]>);

impl SharedSecret {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self(Arc::from(secret.as_ref()))
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC takes keys of any length.
        <HmacSha256 as Mac>::new_from_slice(&self.0)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"))
    }

    /// Lowercase hex signature for `owner_key`.
    pub fn sign(&self, owner_key: &str) -> String {
        let mut mac = self.mac();
        mac.update(owner_key.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time check of a hex signature.
    pub fn verify(&self, owner_key: &str, signature_hex: &str) -> bool {
        let Ok(signature) = hex::decode(signature_hex.trim()) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(owner_key.as_bytes());
        mac.verify_slice(&signature).is_ok()
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Verified identity of the avatar that owns the calling object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondLifeIdentity {
    pub owner_key: String,
    pub owner_name: String,
    pub shard: String,
    pub region: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing header {0}")]
    MissingHeader(&'static str),
    #[error("user agent is not an in-world script")]
    UserAgent,
    #[error("owner key is not a UUID")]
    OwnerKey,
    #[error("signature mismatch")]
    Signature,
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, AuthError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingHeader(name))
}

/// Checks identity headers and the request signature.
pub fn authenticate(
    headers: &HeaderMap,
    secret: &SharedSecret,
) -> Result<SecondLifeIdentity, AuthError> {
    let shard = header(headers, SHARD_HEADER)?;
    let region = header(headers, REGION_HEADER)?;
    let user_agent = header(headers, "user-agent")?;
    if !user_agent.starts_with(USER_AGENT_PREFIX) {
        return Err(AuthError::UserAgent);
    }

    let owner_key = header(headers, OWNER_KEY_HEADER)?;
    let owner_key = uuid::Uuid::parse_str(owner_key)
        .map_err(|_| AuthError::OwnerKey)?
        .hyphenated()
        .to_string();

    let owner_name = collapse_whitespace(header(headers, OWNER_NAME_HEADER)?, MAX_OWNER_NAME_CHARS);
    if owner_name.is_empty() {
        return Err(AuthError::MissingHeader(OWNER_NAME_HEADER));
    }

    let token = header(headers, TOKEN_HEADER)?;
    if !secret.verify(&owner_key, token) {
        return Err(AuthError::Signature);
    }

    Ok(SecondLifeIdentity {
        owner_key,
        owner_name,
        shard: shard.to_string(),
        region: region.to_string(),
    })
}

/// Middleware rejecting unauthenticated in-world requests with 403.
pub async fn require_identity(
    State(secret): State<SharedSecret>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(request.headers(), &secret) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(error = %e, uri = %request.uri(), "Rejected in-world request");
            ApiError::Forbidden.into_response()
        }
    }
}

/// Extractor for the identity inserted by [`require_identity`].
#[derive(Debug, Clone)]
pub struct Identity(pub SecondLifeIdentity);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SecondLifeIdentity>()
            .cloned()
            .map(Identity)
            .ok_or(ApiError::Forbidden)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{signed, OWNER_KEY};
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn headers(builder: axum::http::request::Builder) -> HeaderMap {
        builder.body(()).unwrap().headers().clone()
    }

    fn secret() -> SharedSecret {
        SharedSecret::new("s3cret")
    }

    #[test]
    fn accepts_signed_headers() {
        let secret = secret();
        let identity =
            authenticate(&headers(signed(HttpRequest::builder(), &secret, OWNER_KEY)), &secret)
                .unwrap();
        assert_eq!(identity.owner_key, OWNER_KEY);
        assert_eq!(identity.owner_name, "Resident One");
        assert_eq!(identity.region, "Sandbox (256, 512)");
    }

    #[test]
    fn rejects_wrong_secret() {
        let other = SharedSecret::new("other");
        let err = authenticate(
            &headers(signed(HttpRequest::builder(), &other, OWNER_KEY)),
            &secret(),
        )
        .unwrap_err();
        assert_eq!(err, AuthError::Signature);
    }

    #[test]
    fn rejects_bad_user_agent_and_owner_key() {
        let secret = secret();
        let mut map = headers(signed(HttpRequest::builder(), &secret, OWNER_KEY));
        map.insert("user-agent", "curl/8.0".parse().unwrap());
        assert_eq!(authenticate(&map, &secret).unwrap_err(), AuthError::UserAgent);

        let map = headers(signed(HttpRequest::builder(), &secret, "not-a-uuid"));
        assert_eq!(authenticate(&map, &secret).unwrap_err(), AuthError::OwnerKey);
    }

    #[test]
    fn rejects_missing_headers() {
        let secret = secret();
        let mut map = headers(signed(HttpRequest::builder(), &secret, OWNER_KEY));
        map.remove(SHARD_HEADER);
        assert_eq!(
            authenticate(&map, &secret).unwrap_err(),
            AuthError::MissingHeader(SHARD_HEADER)
        );
    }

    #[test]
    fn verify_rejects_non_hex() {
        assert!(!secret().verify(OWNER_KEY, "zz-not-hex"));
        assert!(secret().verify(OWNER_KEY, &secret().sign(OWNER_KEY)));
    }

    #[tokio::test]
    async fn middleware_inserts_identity() {
        let secret = secret();
        let router = Router::new()
            .route(
                "/",
                get(|Identity(identity): Identity| async move { identity.owner_name }),
            )
            .route_layer(from_fn_with_state(secret.clone(), require_identity));

        let ok = router
            .clone()
            .oneshot(
                signed(HttpRequest::builder().uri("/"), &secret, OWNER_KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let body = axum::body::to_bytes(ok.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Resident One");

        let rejected = router
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);
    }
}
