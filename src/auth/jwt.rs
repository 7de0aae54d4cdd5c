use std::{sync::Arc, time::Duration};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::OffsetDateTime;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{claims::SessionClaims, revocation::RevocationList};
use crate::{
    config::{JwtConfig, MAX_TTL_MINUTES},
    users::UserId,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Bad signature, wrong issuer/audience, or not a JWT at all.
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token expired")]
    Expired,

    #[error("session revoked")]
    Revoked,

    #[error("revocation backend failure: {0}")]
    Backend(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// A freshly minted bearer session.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub session_id: String,
    pub expires_at: i64,
}

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.clamp(0, MAX_TTL_MINUTES) as u64) * 60),
        }
    }
}

/// Issues and checks bearer sessions.
///
/// Valid sessions are proven by signature and expiry alone; only logouts
/// touch the revocation list, so the hot path is one signature check plus
/// one lookup in the negative cache.
#[derive(Clone)]
pub struct SessionAuthority {
    keys: JwtKeys,
    revocations: Arc<dyn RevocationList>,
}

impl SessionAuthority {
    pub fn new(keys: JwtKeys, revocations: Arc<dyn RevocationList>) -> Self {
        Self { keys, revocations }
    }

    pub fn issue(&self, user_id: UserId) -> Result<IssuedSession, SessionError> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(
        &self,
        user_id: UserId,
        now: OffsetDateTime,
    ) -> Result<IssuedSession, SessionError> {
        let session_id = Uuid::new_v4().to_string();
        let exp = (now + self.keys.ttl).unix_timestamp();
        let claims = SessionClaims {
            sub: user_id,
            sid: session_id.clone(),
            iat: now.unix_timestamp(),
            exp,
            iss: self.keys.issuer.clone(),
            aud: self.keys.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)
            .map_err(|e| {
                error!(error = %e, "jwt encode failed");
                SessionError::Signing(e.to_string())
            })?;
        debug!(user_id, session_id = %session_id, "session issued");
        Ok(IssuedSession {
            token,
            session_id,
            expires_at: exp,
        })
    }

    pub async fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        self.verify_at(token, OffsetDateTime::now_utc()).await
    }

    /// Signature and claims first, then expiry (`now >= exp` is expired), then revocation.
    pub(crate) async fn verify_at(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<SessionClaims, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(std::slice::from_ref(&self.keys.audience));
        validation.set_issuer(std::slice::from_ref(&self.keys.issuer));
        // expiry is checked below without leeway
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<SessionClaims>(token, &self.keys.decoding, &validation)
            .map_err(|e| SessionError::Malformed(e.to_string()))?
            .claims;

        if now.unix_timestamp() >= claims.exp {
            return Err(SessionError::Expired);
        }

        let revoked = self
            .revocations
            .is_revoked(&claims.sid)
            .await
            .map_err(|e| {
                error!(error = %e, "revocation lookup failed");
                SessionError::Backend(e.to_string())
            })?;
        if revoked {
            return Err(SessionError::Revoked);
        }

        Ok(claims)
    }

    /// Blocks `session_id` for the rest of its token's lifetime. Sessions that
    /// already expired need no entry.
    pub async fn revoke(&self, session_id: &str, expires_at: i64) -> Result<(), SessionError> {
        let remaining = expires_at - OffsetDateTime::now_utc().unix_timestamp();
        if remaining <= 0 {
            debug!(session_id, "session already expired, nothing to revoke");
            return Ok(());
        }
        self.revocations
            .revoke(session_id, Duration::from_secs(remaining as u64))
            .await
            .map_err(|e| {
                error!(error = %e, "revocation insert failed");
                SessionError::Backend(e.to_string())
            })?;
        info!(session_id, "session revoked");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
    JwtKeys::from(&JwtConfig {
        secret: secret.into(),
        issuer: issuer.into(),
        audience: audience.into(),
        ttl_minutes: 5,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::revocation::MemoryRevocationList;

    fn make_authority(secret: &str, issuer: &str, audience: &str) -> SessionAuthority {
        SessionAuthority::new(
            test_keys(secret, issuer, audience),
            Arc::new(MemoryRevocationList::new()),
        )
    }

    #[tokio::test]
    async fn issue_and_verify() {
        let auth = make_authority("dev-secret", "test-issuer", "test-aud");
        let issued = auth.issue(42).expect("issue");
        let claims = auth.verify(&issued.token).await.expect("verify");
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.sid, issued.session_id);
        assert_eq!(claims.exp, issued.expires_at);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_ne!(claims.sid, "42");
    }

    #[tokio::test]
    async fn each_login_gets_its_own_session() {
        let auth = make_authority("dev-secret", "iss", "aud");
        let a = auth.issue(1).expect("issue a");
        let b = auth.issue(1).expect("issue b");
        assert_ne!(a.session_id, b.session_id);
    }

    #[tokio::test]
    async fn expires_exactly_at_exp() {
        let auth = make_authority("dev-secret", "iss", "aud");
        let now = OffsetDateTime::now_utc();
        let issued = auth.issue_at(7, now).expect("issue");
        let exp = OffsetDateTime::from_unix_timestamp(issued.expires_at).expect("valid ts");

        auth.verify_at(&issued.token, exp - Duration::from_secs(1))
            .await
            .expect("valid one second before expiry");
        let err = auth.verify_at(&issued.token, exp).await.unwrap_err();
        assert!(matches!(err, SessionError::Expired));
        let err = auth
            .verify_at(&issued.token, exp + Duration::from_secs(3600))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Expired));
    }

    #[tokio::test]
    async fn revoke_blocks_only_that_session() {
        let auth = make_authority("dev-secret", "iss", "aud");
        let first = auth.issue(9).expect("first");
        let second = auth.issue(9).expect("second");

        auth.revoke(&first.session_id, first.expires_at)
            .await
            .expect("revoke");

        let err = auth.verify(&first.token).await.unwrap_err();
        assert!(matches!(err, SessionError::Revoked));
        let claims = auth.verify(&second.token).await.expect("other session still valid");
        assert_eq!(claims.sub, 9);
    }

    #[tokio::test]
    async fn revoking_an_expired_session_stores_nothing() {
        let list = Arc::new(MemoryRevocationList::new());
        let auth = SessionAuthority::new(test_keys("s", "i", "a"), list.clone());
        let past = OffsetDateTime::now_utc().unix_timestamp() - 10;
        auth.revoke("old", past).await.expect("noop");
        assert_eq!(list.len(), 0);
    }

    #[tokio::test]
    async fn rejects_wrong_key_issuer_or_audience() {
        let good = make_authority("same-secret", "good-iss", "good-aud");
        let token = good.issue(1).expect("issue").token;

        for other in [
            make_authority("other-secret", "good-iss", "good-aud"),
            make_authority("same-secret", "bad-iss", "good-aud"),
            make_authority("same-secret", "good-iss", "bad-aud"),
        ] {
            let err = other.verify(&token).await.unwrap_err();
            assert!(matches!(err, SessionError::Malformed(_)));
        }
    }

    #[tokio::test]
    async fn rejects_garbage_and_tampering() {
        let auth = make_authority("dev-secret", "iss", "aud");
        assert!(matches!(
            auth.verify("not-a-jwt").await.unwrap_err(),
            SessionError::Malformed(_)
        ));

        let other = auth.issue(2).expect("issue").token;
        let forged_payload = other.split('.').nth(1).expect("payload");
        let token = auth.issue(1).expect("issue").token;
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = forged_payload;
        let forged = parts.join(".");
        assert!(matches!(
            auth.verify(&forged).await.unwrap_err(),
            SessionError::Malformed(_)
        ));
    }
}
