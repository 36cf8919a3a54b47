use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

/// Header carrying a static Iterable API key.
pub const API_KEY_HEADER: &str = "api-key";

/// Lifetime of a minted signed token, in seconds.
pub const TOKEN_TTL_SECS: i64 = 3600;

/// How the client authenticates against Iterable.
#[derive(Clone, PartialEq)]
pub enum AuthConfig {
    /// Fixed key sent verbatim on every call.
    ApiKey(String),
    /// Shared secret used to mint a short-lived HS256 JWT.
    SignedToken { secret: String, issuer: String },
}

// Credentials stay out of Debug output (and therefore out of logs).
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthConfig::ApiKey(_) => f.write_str("ApiKey([REDACTED])"),
            AuthConfig::SignedToken { issuer, .. } => f
                .debug_struct("SignedToken")
                .field("secret", &"[REDACTED]")
                .field("issuer", issuer)
                .finish(),
        }
    }
}

/// JWT claims minted for the signed-token scheme.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub iss: String, // Issuer
    pub iat: i64,    // Issued at timestamp
    pub exp: i64,    // Expiration timestamp
}

/// Mint a signed token valid for [`TOKEN_TTL_SECS`] from `now`.
pub fn mint_token(
    secret: &str,
    issuer: &str,
    now: DateTime<Utc>,
) -> Result<(String, DateTime<Utc>), jsonwebtoken::errors::Error> {
    let expires_at = now + Duration::seconds(TOKEN_TTL_SECS);
    let claims = Claims {
        iss: issuer.to_string(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok((token, expires_at))
}

#[derive(Clone)]
enum Credential {
    ApiKey(HeaderValue),
    Bearer {
        value: HeaderValue,
        expires_at: DateTime<Utc>,
    },
    Missing,
}

/// Produces request headers for the active auth scheme.
///
/// Construction never fails. A missing or unusable credential yields headers
/// without one, and Iterable rejects the calls at runtime.
#[derive(Clone)]
pub struct AuthManager {
    credential: Credential,
}

impl AuthManager {
    pub fn new(auth: Option<&AuthConfig>) -> Self {
        let credential = match auth {
            Some(AuthConfig::ApiKey(key)) => match HeaderValue::from_str(key) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    Credential::ApiKey(value)
                }
                Err(_) => {
                    tracing::error!("Iterable API key contains invalid header characters");
                    Credential::Missing
                }
            },
            Some(AuthConfig::SignedToken { secret, issuer }) => {
                match mint_token(secret, issuer, Utc::now()) {
                    Ok((token, expires_at)) => {
                        match HeaderValue::from_str(&format!("Bearer {}", token)) {
                            Ok(mut value) => {
                                value.set_sensitive(true);
                                tracing::info!("Signed Iterable token minted, expires at {}", expires_at);
                                Credential::Bearer { value, expires_at }
                            }
                            Err(_) => {
                                tracing::error!("Minted token is not a valid header value");
                                Credential::Missing
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to mint signed Iterable token: {}", e);
                        Credential::Missing
                    }
                }
            }
            None => Credential::Missing,
        };

        if let Credential::Missing = credential {
            tracing::warn!("No usable Iterable credential configured; calls will be rejected");
        }

        Self { credential }
    }

    /// Headers for one request.
    ///
    /// The signed token is never refreshed; once it has expired this logs a
    /// warning on every call and keeps sending it.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match &self.credential {
            Credential::ApiKey(value) => {
                headers.insert(HeaderName::from_static(API_KEY_HEADER), value.clone());
            }
            Credential::Bearer { value, expires_at } => {
                if Utc::now() >= *expires_at {
                    tracing::warn!(
                        "Signed Iterable token expired at {}; remote side will reject calls",
                        expires_at
                    );
                }
                headers.insert(AUTHORIZATION, value.clone());
            }
            Credential::Missing => {}
        }

        headers
    }

    /// Expiry of the signed token, if that scheme is active.
    pub fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        match &self.credential {
            Credential::Bearer { expires_at, .. } => Some(*expires_at),
            _ => None,
        }
    }

    pub fn has_credential(&self) -> bool {
        !matches!(self.credential, Credential::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    #[test]
    fn test_api_key_headers() {
        let manager = AuthManager::new(Some(&AuthConfig::ApiKey("test_key".to_string())));
        let headers = manager.headers();

        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get("Api-Key").unwrap(), "test_key");
        assert!(headers.get(AUTHORIZATION).is_none());
        assert!(manager.token_expires_at().is_none());
    }

    #[test]
    fn test_signed_token_headers_carry_valid_jwt() {
        let manager = AuthManager::new(Some(&AuthConfig::SignedToken {
            secret: "test_secret".to_string(),
            issuer: "test_issuer".to_string(),
        }));
        let headers = manager.headers();

        let bearer = headers.get(AUTHORIZATION).unwrap().to_str().unwrap();
        let token = bearer.strip_prefix("Bearer ").unwrap();

        let mut validation = Validation::default();
        validation.set_issuer(&["test_issuer"]);
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret("test_secret".as_bytes()),
            &validation,
        )
        .unwrap()
        .claims;

        assert_eq!(claims.exp - claims.iat, TOKEN_TTL_SECS);
        assert_eq!(manager.token_expires_at().unwrap().timestamp(), claims.exp);
        assert!(headers.get(API_KEY_HEADER).is_none());
    }

    #[test]
    fn test_token_is_minted_once_per_manager() {
        let manager = AuthManager::new(Some(&AuthConfig::SignedToken {
            secret: "test_secret".to_string(),
            issuer: "test_issuer".to_string(),
        }));
        assert_eq!(
            manager.headers().get(AUTHORIZATION),
            manager.headers().get(AUTHORIZATION)
        );
    }

    #[test]
    fn test_missing_auth_still_constructs() {
        let manager = AuthManager::new(None);
        let headers = manager.headers();

        assert!(!manager.has_credential());
        assert_eq!(headers.len(), 1);
        assert!(headers.get(CONTENT_TYPE).is_some());
    }

    #[test]
    fn test_invalid_api_key_degrades_to_missing() {
        let manager = AuthManager::new(Some(&AuthConfig::ApiKey("bad\nkey".to_string())));
        assert!(!manager.has_credential());
    }

    #[test]
    fn test_mint_token_expiry() {
        let now = Utc::now();
        let (_, expires_at) = mint_token("s", "iss", now).unwrap();
        assert_eq!((expires_at - now).num_seconds(), TOKEN_TTL_SECS);
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let rendered = format!("{:?}", AuthConfig::ApiKey("super_secret".to_string()));
        assert!(!rendered.contains("super_secret"));
    }
}
