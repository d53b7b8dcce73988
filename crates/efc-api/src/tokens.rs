use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;

use efc_types::api::{Claims, TokenPurpose};

use crate::error::{ApiError, ApiResult};

/// Signs and checks every token the service hands out: bearer sessions and
/// the one-shot links sent by mail.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn lifetime(purpose: TokenPurpose) -> Duration {
        match purpose {
            TokenPurpose::Session => Duration::days(30),
            TokenPurpose::Confirm | TokenPurpose::ResetPassword | TokenPurpose::ChangeEmail => Duration::hours(1),
        }
    }

    pub fn generate(&self, user_id: i64, purpose: TokenPurpose) -> ApiResult<String> {
        self.sign(user_id, purpose, None)
    }

    /// Change-email link bound to the address it is mailed to.
    pub fn generate_email_change(&self, user_id: i64, email: &str) -> ApiResult<String> {
        self.sign(user_id, TokenPurpose::ChangeEmail, Some(email.to_owned()))
    }

    fn sign(&self, user_id: i64, purpose: TokenPurpose, email: Option<String>) -> ApiResult<String> {
        let claims = Claims {
            sub: user_id,
            purpose,
            exp: (Utc::now() + Self::lifetime(purpose)).timestamp() as usize,
            email,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
    }

    /// The user id the token was minted for, or `None` when it is forged,
    /// expired or meant for something else.
    pub fn verify(&self, token: &str, purpose: TokenPurpose) -> Option<i64> {
        self.claims(token, purpose).map(|claims| claims.sub)
    }

    /// User id and bound address of a change-email link.
    pub fn verify_email_change(&self, token: &str) -> Option<(i64, String)> {
        let claims = self.claims(token, TokenPurpose::ChangeEmail)?;
        Some((claims.sub, claims.email?))
    }

    fn claims(&self, token: &str, purpose: TokenPurpose) -> Option<Claims> {
        match decode::<Claims>(token, &self.decoding, &Validation::default()) {
            Ok(data) if data.claims.purpose == purpose => Some(data.claims),
            Ok(data) => {
                debug!("Token for user {} used as {:?}, minted as {:?}", data.claims.sub, purpose, data.claims.purpose);
                None
            }
            Err(e) => {
                debug!("Rejected token: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_matching_purpose() {
        let tokens = TokenService::new("test-secret");
        let token = tokens.generate(42, TokenPurpose::Confirm).unwrap();
        assert_eq!(tokens.verify(&token, TokenPurpose::Confirm), Some(42));
    }

    #[test]
    fn purpose_mismatch_is_rejected() {
        let tokens = TokenService::new("test-secret");
        let token = tokens.generate(42, TokenPurpose::ResetPassword).unwrap();
        assert_eq!(tokens.verify(&token, TokenPurpose::Session), None);
        assert_eq!(tokens.verify(&token, TokenPurpose::ChangeEmail), None);
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let ours = TokenService::new("test-secret");
        let theirs = TokenService::new("other-secret");
        let token = theirs.generate(1, TokenPurpose::Session).unwrap();
        assert_eq!(ours.verify(&token, TokenPurpose::Session), None);
        assert_eq!(ours.verify("not a token", TokenPurpose::Session), None);
    }

    #[test]
    fn email_change_carries_address() {
        let tokens = TokenService::new("test-secret");
        let token = tokens.generate_email_change(5, "new@example.com").unwrap();
        assert_eq!(tokens.verify_email_change(&token), Some((5, "new@example.com".to_owned())));

        let unbound = tokens.generate(5, TokenPurpose::ChangeEmail).unwrap();
        assert_eq!(tokens.verify_email_change(&unbound), None);
    }

    #[test]
    fn expired_is_rejected() {
        let tokens = TokenService::new("test-secret");
        let claims = Claims {
            sub: 7,
            purpose: TokenPurpose::Confirm,
            exp: (Utc::now() - Duration::hours(2)).timestamp() as usize,
            email: None,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test-secret")).unwrap();
        assert_eq!(tokens.verify(&token, TokenPurpose::Confirm), None);
    }
}
