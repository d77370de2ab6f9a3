//! Bearer token authentication gate

use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::{GatewayError, Result};

/// Identity derived from a validated credential, valid for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub subject: String,
    pub roles: HashSet<String>,
    pub expires_at: DateTime<Utc>,
}

impl AuthContext {
    /// True when `required` is empty or shares at least one role with the context
    pub fn has_any_role(&self, required: &HashSet<String>) -> bool {
        required.is_empty() || !self.roles.is_disjoint(required)
    }
}

/// Validates JWT bearer credentials against the configured key and algorithm.
///
/// Only the configured algorithm is accepted. `exp` and `sub` are required;
/// `iss` and `aud` are enforced when configured.
pub struct AuthGate {
    algorithm: Algorithm,
    decoding_key: DecodingKey,
    validation: Validation,
    roles_claim: String,
}

impl AuthGate {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let algorithm = Algorithm::from_str(config.algorithm.trim()).map_err(|_| {
            GatewayError::config(format!("Unsupported JWT algorithm '{}'", config.algorithm))
        })?;

        let decoding_key = decoding_key(algorithm, config)?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = config.leeway_secs;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            algorithm,
            decoding_key,
            validation,
            roles_claim: config.roles_claim.clone(),
        })
    }

    /// Validate the request's bearer credential
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext> {
        let token = bearer_token(headers)?;

        let claims = decode::<HashMap<String, Value>>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                warn!(error = %e, "Token validation failed");
                GatewayError::Unauthenticated(format!("Invalid token: {}", e))
            })?
            .claims;

        let subject = match claims.get("sub") {
            Some(Value::String(sub)) if !sub.is_empty() => sub.clone(),
            _ => return Err(GatewayError::Unauthenticated("Token has no subject".to_string())),
        };

        let expires_at = claims
            .get("exp")
            .and_then(Value::as_i64)
            .and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0))
            .ok_or_else(|| GatewayError::Unauthenticated("Token has an invalid expiry".to_string()))?;

        let roles = match claims.get(&self.roles_claim) {
            Some(Value::String(role)) => std::iter::once(role.clone()).collect(),
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => HashSet::new(),
        };

        debug!(subject = %subject, roles = ?roles, "Authenticated request");

        Ok(AuthContext {
            subject,
            roles,
            expires_at,
        })
    }

    /// Check the context against a route's required roles
    pub fn authorize(&self, context: &AuthContext, required_roles: &HashSet<String>) -> Result<()> {
        if context.has_any_role(required_roles) {
            return Ok(());
        }

        warn!(subject = %context.subject, required = ?required_roles, "Caller lacks required role");
        Err(GatewayError::Forbidden(format!(
            "Requires one of the roles: {}",
            sorted(required_roles).join(", ")
        )))
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("algorithm", &self.algorithm)
            .field("roles_claim", &self.roles_claim)
            .finish()
    }
}

fn decoding_key(algorithm: Algorithm, config: &AuthConfig) -> Result<DecodingKey> {
    let public_key = || {
        config
            .public_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GatewayError::config(format!("auth.public_key is required for {:?}", algorithm)))
    };
    let invalid_key = |e: jsonwebtoken::errors::Error| GatewayError::config(format!("Invalid auth.public_key: {}", e));

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            let secret = config
                .secret
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| GatewayError::config(format!("auth.secret is required for {:?}", algorithm)))?;
            Ok(DecodingKey::from_secret(secret.as_bytes()))
        }
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => DecodingKey::from_rsa_pem(public_key()?.as_bytes()).map_err(invalid_key),
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(public_key()?.as_bytes()).map_err(invalid_key),
        Algorithm::EdDSA => DecodingKey::from_ed_pem(public_key()?.as_bytes()).map_err(invalid_key),
    }
}

/// Extract the token from `Authorization: Bearer <token>`
fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| GatewayError::Unauthenticated("Missing bearer token".to_string()))?
        .to_str()
        .map_err(|_| GatewayError::Unauthenticated("Malformed Authorization header".to_string()))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| GatewayError::Unauthenticated("Malformed Authorization header".to_string()))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(GatewayError::Unauthenticated(
            "Authorization scheme must be Bearer".to_string(),
        ));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(GatewayError::Unauthenticated("Missing bearer token".to_string()));
    }
    Ok(token)
}

fn sorted(roles: &HashSet<String>) -> Vec<&str> {
    let mut roles: Vec<_> = roles.iter().map(String::as_str).collect();
    roles.sort_unstable();
    roles
}
