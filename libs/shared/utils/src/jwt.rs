use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use shared_models::auth::{JwtClaims, User};

type HmacSha256 = Hmac<Sha256>;

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }

    let (header_b64, claims_b64, signature_b64) = (parts[0], parts[1], parts[2]);

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|e| {
            debug!("Failed to decode signature: {}", e);
            "Invalid signature encoding".to_string()
        })?;

    let signing_input = format!("{}.{}", header_b64, claims_b64);

    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(signing_input.as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|_| "Invalid claims encoding".to_string())?;
    let claims_json =
        String::from_utf8(claims_bytes).map_err(|_| "Invalid claims encoding".to_string())?;

    let claims: JwtClaims = serde_json::from_str(&claims_json).map_err(|e| {
        debug!("Failed to parse claims: {}", e);
        "Invalid claims format".to_string()
    })?;

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err("Token expired".to_string());
        }
    }

    let created_at = claims
        .iat
        .and_then(|timestamp| Utc.timestamp_opt(timestamp as i64, 0).single());

    let user = User {
        id: claims.sub,
        email: claims.email,
        role: claims.role,
        metadata: claims.user_metadata,
        created_at,
    };

    debug!("Token validated successfully for user: {}", user.id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{JwtTestUtils, TestUser};

    const SECRET: &str = "test-secret-key-for-jwt-validation-must-be-long-enough";

    #[test]
    fn valid_token_yields_user() {
        let test_user = TestUser::provider("carla@example.com");
        let token = JwtTestUtils::create_test_token(&test_user, SECRET, None);

        let user = validate_token(&token, SECRET).unwrap();
        assert_eq!(user.id, test_user.id);
        assert_eq!(user.role.as_deref(), Some("provider"));
    }

    #[test]
    fn expired_token_is_rejected() {
        let test_user = TestUser::default();
        let token = JwtTestUtils::create_expired_token(&test_user, SECRET);

        assert!(validate_token(&token, SECRET).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let test_user = TestUser::default();
        let token = JwtTestUtils::create_test_token(&test_user, SECRET, None);

        assert!(validate_token(&token, "some-other-secret").is_err());
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert!(validate_token(&JwtTestUtils::create_malformed_token(), SECRET).is_err());
    }

    #[test]
    fn empty_secret_is_rejected() {
        let test_user = TestUser::default();
        let token = JwtTestUtils::create_test_token(&test_user, SECRET, None);

        assert!(validate_token(&token, "").is_err());
    }
}
