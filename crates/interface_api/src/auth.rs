//! Authentication and authorization
//!
//! Bearer tokens are HS256 JWTs that carry the tenant the caller acts for.
//! Every tenant-scoped route takes the tenant from the token, never from the
//! request body.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::TenantId;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Tenant the caller acts for
    pub tenant_id: TenantId,
    pub roles: Vec<String>,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

/// Auth errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Missing permission: {0}")]
    MissingPermission(String),
}

/// Creates a new JWT token
///
/// # Arguments
///
/// * `user_id` - User identifier
/// * `tenant_id` - Tenant the token is scoped to
/// * `roles` - User's roles
/// * `secret` - JWT secret key
/// * `expiration_secs` - Token validity in seconds
pub fn create_token(
    user_id: &str,
    tenant_id: TenantId,
    roles: Vec<String>,
    secret: &str,
    expiration_secs: u64,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(expiration_secs as i64);

    let claims = Claims {
        sub: user_id.to_string(),
        tenant_id,
        roles,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::InvalidToken)
}

/// Validates a JWT token
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

/// Checks if user has required role
pub fn has_role(claims: &Claims, required_role: &str) -> bool {
    claims.roles.iter().any(|r| r == required_role || r == "admin")
}

/// Fails with `MissingPermission` unless the claims grant `permission`
pub fn require(claims: &Claims, permission: &str) -> Result<(), AuthError> {
    if has_role(claims, permission) {
        Ok(())
    } else {
        Err(AuthError::MissingPermission(permission.to_string()))
    }
}

/// Permission definitions
pub mod permissions {
    pub const PAYMENT_READ: &str = "payment:read";
    pub const PAYMENT_WRITE: &str = "payment:write";
    pub const REFUND_WRITE: &str = "refund:write";
    pub const SUBSCRIPTION_WRITE: &str = "subscription:write";
    pub const ACCOUNT_WRITE: &str = "account:write";
    pub const REPORT_READ: &str = "report:read";
    pub const RECONCILE: &str = "reconciliation:run";
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_round_trip_keeps_tenant() {
        let tenant = TenantId::new();
        let token = create_token("user-1", tenant, vec!["payment:read".into()], SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.tenant_id, tenant);
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = create_token("user-1", TenantId::new(), vec![], SECRET, 60).unwrap();
        assert!(matches!(validate_token(&token, "other"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_admin_has_every_permission() {
        let token = create_token("ops", TenantId::new(), vec!["admin".into()], SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert!(require(&claims, permissions::RECONCILE).is_ok());
    }

    #[test]
    fn test_missing_permission() {
        let token = create_token("viewer", TenantId::new(), vec![permissions::PAYMENT_READ.into()], SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert!(matches!(
            require(&claims, permissions::REFUND_WRITE),
            Err(AuthError::MissingPermission(_))
        ));
    }
}
