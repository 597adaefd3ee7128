use std::time::Duration;

use anyhow::anyhow;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::config::JwtConfig;

/// Access-token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // user ID
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}

/// Signing material derived from `JwtConfig`, built once at startup.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs(
                u64::try_from(cfg.ttl_minutes).unwrap_or(1).max(1).saturating_mul(60),
            ),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn sign_access(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_at(user_id, OffsetDateTime::now_utc())
    }

    fn sign_at(&self, user_id: Uuid, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = i64::try_from(self.access_ttl.as_secs())
            .ok()
            .and_then(|secs| now.checked_add(TimeDuration::seconds(secs)))
            .ok_or_else(|| anyhow!("token expiry out of range"))?;
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "access token signed");
        Ok(token)
    }

    /// Checks signature, expiry, issuer and audience.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, "access token verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        keys_with_ttl(secret, issuer, audience, 5)
    }

    fn keys_with_ttl(secret: &str, issuer: &str, audience: &str, ttl_minutes: i64) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes,
        })
    }

    #[test]
    fn sign_and_verify_access_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let user_id = Uuid::new_v4();
        let token = keys.sign_access(user_id).expect("sign access");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 5 * 60);
    }

    #[test]
    fn verify_rejects_wrong_issuer_audience_or_secret() {
        let good = make_keys("same-secret", "good-iss", "good-aud");
        let token = good.sign_access(Uuid::new_v4()).unwrap();

        assert!(make_keys("same-secret", "bad-iss", "good-aud").verify(&token).is_err());
        assert!(make_keys("same-secret", "good-iss", "bad-aud").verify(&token).is_err());
        assert!(make_keys("other-secret", "good-iss", "good-aud").verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_expired_token() {
        let keys = make_keys("dev-secret", "iss", "aud");
        // Issued two hours ago with a five minute ttl; well past the default leeway.
        let token = keys
            .sign_at(Uuid::new_v4(), OffsetDateTime::now_utc() - TimeDuration::hours(2))
            .unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_garbage() {
        let keys = make_keys("dev-secret", "iss", "aud");
        assert!(keys.verify("not.a.jwt").is_err());
        assert!(keys.verify("").is_err());
    }

    #[test]
    fn oversized_ttl_is_an_error_not_a_panic() {
        let keys = keys_with_ttl("dev-secret", "iss", "aud", i64::MAX);
        assert_eq!(keys.access_ttl(), Duration::from_secs(u64::MAX));
        let err = keys.sign_access(Uuid::new_v4()).unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let keys = keys_with_ttl("dev-secret", "iss", "aud", 10_000_000_000_000);
        assert!(keys.sign_access(Uuid::new_v4()).is_err());
    }

    #[test]
    fn longest_allowed_ttl_signs() {
        let keys = keys_with_ttl("dev-secret", "iss", "aud", crate::config::MAX_TTL_MINUTES);
        let claims = keys.verify(&keys.sign_access(Uuid::new_v4()).unwrap()).unwrap();
        assert_eq!(claims.exp - claims.iat, 365 * 24 * 60 * 60);
    }
}
