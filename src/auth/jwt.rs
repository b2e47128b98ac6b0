use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::permissions::Role;

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
}

/// Identity and company context embedded in an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSubject {
    pub user_id: Uuid,
    pub role: Role,
    pub company_id: Uuid,
    pub current_company_id: Uuid,
    pub god_mode: bool,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            expiry: Duration::minutes(config.jwt_expiry_minutes),
        })
    }

    pub fn generate_token(&self, subject: &SessionSubject, email: &str) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.expiry;
        let claims = Claims {
            sub: subject.user_id,
            email: email.to_owned(),
            role: subject.role,
            company_id: subject.company_id,
            current_company_id: subject.current_company_id,
            god_mode: subject.god_mode,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub company_id: Uuid,
    pub current_company_id: Uuid,
    #[serde(default)]
    pub god_mode: bool,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> JwtService {
        JwtService {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: "fieldbook".into(),
            audience: "fieldbook-clients".into(),
            expiry: Duration::minutes(5),
        }
    }

    #[test]
    fn token_carries_company_context() {
        let jwt = service("secret");
        let subject = SessionSubject {
            user_id: Uuid::new_v4(),
            role: Role::Superadmin,
            company_id: Uuid::new_v4(),
            current_company_id: Uuid::new_v4(),
            god_mode: true,
        };
        let token = jwt.generate_token(&subject, "root@example.com").unwrap();
        let claims = jwt.verify_token(&token).unwrap();
        assert_eq!(claims.sub, subject.user_id);
        assert_eq!(claims.role, Role::Superadmin);
        assert_eq!(claims.current_company_id, subject.current_company_id);
        assert!(claims.god_mode);
    }

    #[test]
    fn rejects_tokens_signed_with_another_secret() {
        let subject = SessionSubject {
            user_id: Uuid::new_v4(),
            role: Role::Staff,
            company_id: Uuid::new_v4(),
            current_company_id: Uuid::new_v4(),
            god_mode: false,
        };
        let token = service("one").generate_token(&subject, "a@b.co").unwrap();
        assert!(service("two").verify_token(&token).is_err());
    }
}
