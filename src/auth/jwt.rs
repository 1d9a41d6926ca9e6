use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

/// Claims carried by bearer tokens. Tokens are minted by the external
/// identity provider; this service only verifies them against the shared
/// secret and never issues its own.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

#[cfg(test)]
pub(crate) fn mint_token(claims: &Claims, secret: &str) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn claims_expiring_in(secs: i64) -> Claims {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        Claims {
            user_id: 5,
            sub: "jdoe".to_string(),
            role: 3,
            exp: (now + secs) as usize,
            jti: "test-jti".to_string(),
            token_type: TokenType::Access,
            employee_id: Some(1000),
        }
    }

    #[test]
    fn verifies_tokens_signed_with_the_shared_secret() {
        let token = mint_token(&claims_expiring_in(600), "secret");
        let claims = verify_token(&token, "secret").unwrap();

        assert_eq!(claims.user_id, 5);
        assert_eq!(claims.sub, "jdoe");
        assert_eq!(claims.role, 3);
        assert_eq!(claims.employee_id, Some(1000));
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn rejects_a_foreign_secret() {
        let token = mint_token(&claims_expiring_in(600), "secret");
        assert!(verify_token(&token, "other-secret").is_err());
    }

    #[test]
    fn rejects_expired_tokens() {
        let token = mint_token(&claims_expiring_in(-600), "secret");
        assert!(verify_token(&token, "secret").is_err());
    }
}
