// auth/mod.rs — Credential gates for every mutating operation.
//
// Two tiers:
//   - `authenticate` — end-user bearer JWT (HS256 against the configured
//     secret, expiry enforced).
//   - `authorize_gdpr` — data-lifecycle actions affect other users' data, so
//     they require the dedicated service credential, not an end-user token.

use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::errors::ApiError;

/// The authenticated identity attached to a request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    email: Option<String>,
    #[allow(dead_code)]
    exp: usize,
}

/// Extract the token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Authentication("Missing authorization header".to_string()))?;

    let token = value.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::Authentication("Invalid authorization format. Expected: Bearer <token>".to_string())
    })?;

    if token.is_empty() {
        return Err(ApiError::Authentication("Token not provided".to_string()));
    }
    Ok(token)
}

/// Verify the end-user bearer credential and return the caller's identity.
///
/// Fails with `Authentication` when the header is absent or malformed, the
/// signature does not verify, or the token has expired.
pub fn authenticate(headers: &HeaderMap, jwt_secret: &str) -> Result<Principal, ApiError> {
    let token = bearer_token(headers)?;

    if jwt_secret.is_empty() {
        return Err(ApiError::Authentication("Server configuration error".to_string()));
    }

    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        use jsonwebtoken::errors::ErrorKind;
        let msg = match e.kind() {
            ErrorKind::ExpiredSignature => "Token expired",
            ErrorKind::InvalidToken | ErrorKind::InvalidSignature => "Invalid token",
            _ => "Token verification failed",
        };
        ApiError::Authentication(msg.to_string())
    })?;

    Ok(Principal {
        user_id: data.claims.sub,
        email: data.claims.email,
    })
}

/// Gate for data-lifecycle actions: the bearer credential must equal the
/// configured service key exactly. Deliberately stricter than user auth.
pub fn authorize_gdpr(headers: &HeaderMap, service_key: &str) -> Result<(), ApiError> {
    let token = bearer_token(headers)?;

    if service_key.is_empty() {
        return Err(ApiError::Authorization(
            "Data-lifecycle actions are not enabled on this server".to_string(),
        ));
    }
    if token != service_key {
        return Err(ApiError::Authorization(
            "This action requires the data-lifecycle service credential".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    const SECRET: &str = "test-secret";

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        email: Option<String>,
        exp: usize,
    }

    fn make_token(sub: &str, exp_offset_secs: i64) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset_secs) as usize;
        encode(
            &Header::default(),
            &TestClaims {
                sub: sub.to_string(),
                email: Some(format!("{sub}@example.com")),
                exp,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn valid_token_yields_principal() {
        let headers = headers_with(&format!("Bearer {}", make_token("u1", 3600)));
        let principal = authenticate(&headers, SECRET).unwrap();
        assert_eq!(principal.user_id, "u1");
        assert_eq!(principal.email.as_deref(), Some("u1@example.com"));
    }

    #[test]
    fn missing_header_is_authentication_error() {
        let err = authenticate(&HeaderMap::new(), SECRET).unwrap_err();
        assert!(matches!(err, ApiError::Authentication(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let headers = headers_with(&format!("Bearer {}", make_token("u1", -3600)));
        let err = authenticate(&headers, SECRET).unwrap_err();
        assert!(matches!(err, ApiError::Authentication(msg) if msg == "Token expired"));
    }

    #[test]
    fn wrong_signature_is_rejected() {
        let token = encode(
            &Header::default(),
            &TestClaims {
                sub: "u1".into(),
                email: None,
                exp: (chrono::Utc::now().timestamp() + 3600) as usize,
            },
            &EncodingKey::from_secret(b"other-secret"),
        )
        .unwrap();
        let headers = headers_with(&format!("Bearer {token}"));
        assert!(authenticate(&headers, SECRET).is_err());
    }

    #[test]
    fn gdpr_gate_requires_exact_service_key() {
        let headers = headers_with("Bearer svc-key");
        assert!(authorize_gdpr(&headers, "svc-key").is_ok());

        let err = authorize_gdpr(&headers, "different-key").unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        // An end-user JWT never passes the service gate.
        let user = headers_with(&format!("Bearer {}", make_token("u1", 3600)));
        assert!(matches!(
            authorize_gdpr(&user, "svc-key").unwrap_err(),
            ApiError::Authorization(_)
        ));

        // Unconfigured key disables the endpoint entirely.
        assert!(matches!(
            authorize_gdpr(&headers, "").unwrap_err(),
            ApiError::Authorization(_)
        ));
    }
}
