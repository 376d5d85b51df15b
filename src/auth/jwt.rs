use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

use crate::models::{Claims, TokenType};

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

/// Identity baked into every token.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: u64,
    pub username: String,
    pub role: u8,
    pub employee_num: Option<String>,
}

impl From<&Claims> for TokenSubject {
    fn from(c: &Claims) -> Self {
        Self {
            user_id: c.user_id,
            username: c.sub.clone(),
            role: c.role,
            employee_num: c.employee_num.clone(),
        }
    }
}

fn issue(
    subject: &TokenSubject,
    token_type: TokenType,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    let claims = Claims {
        user_id: subject.user_id,
        sub: subject.username.clone(),
        role: subject.role,
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
        employee_num: subject.employee_num.clone(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok((token, claims))
}

pub fn generate_access_token(subject: &TokenSubject, secret: &str, ttl: usize) -> Result<String, Error> {
    issue(subject, TokenType::Access, secret, ttl).map(|(token, _)| token)
}

pub fn generate_refresh_token(
    subject: &TokenSubject,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    issue(subject, TokenType::Refresh, secret, ttl)
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
mod tests {
    use super::*;

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: 7,
            username: "sato".into(),
            role: 3,
            employee_num: Some("E7".into()),
        }
    }

    #[test]
    fn access_token_round_trips() {
        let token = generate_access_token(&subject(), "s3cret", 60).unwrap();
        let claims = verify_token(&token, "s3cret").unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.employee_num.as_deref(), Some("E7"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (token, _) = generate_refresh_token(&subject(), "s3cret", 60).unwrap();
        assert!(verify_token(&token, "other").is_err());
    }
}
