//! Email-address verification: signed links, resend cooldown, mail seam.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::config::VerificationConfig;
use crate::db::{Store, User};

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Please wait before requesting another verification email")]
    CooldownActive,

    #[error("Verification link is invalid or has expired")]
    InvalidLink,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Outbound mail seam. Transport is deployment-specific and out of scope;
/// the default implementation records the mail in the logs.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!(to, subject, "Outbound mail: {body}");
        Ok(())
    }
}

/// Sends and validates email-confirmation links. Links are
/// `/verify/email?id&expires&signature` where the signature is a keyed
/// SHA-256 over the user id, email and expiry.
pub struct EmailVerifier {
    store: Store,
    mailer: Arc<dyn Mailer>,
    base_url: String,
    secret: String,
    cooldown: Duration,
    link_ttl: Duration,
}

impl EmailVerifier {
    #[must_use]
    pub fn new(store: Store, mailer: Arc<dyn Mailer>, config: &VerificationConfig) -> Self {
        Self {
            store,
            mailer,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret: config.secret.clone(),
            cooldown: Duration::from_secs(config.resend_cooldown_seconds),
            link_ttl: Duration::from_secs(config.link_ttl_seconds),
        }
    }

    /// Record a request row and mail the signed link.
    pub async fn send_confirmation(&self, user: &User) -> Result<(), VerificationError> {
        self.store
            .create_verification_request(user.id)
            .await
            .map_err(VerificationError::Other)?;

        let expires = chrono::Utc::now().timestamp() + self.link_ttl.as_secs() as i64;
        let signature = sign(&self.secret, user.id, &user.email, expires);
        let url = format!(
            "{}/verify/email?id={}&expires={}&signature={}",
            self.base_url, user.id, expires, signature
        );

        self.mailer
            .send(
                &user.email,
                "Please confirm your email",
                &format!("Hi {}, confirm your email address: {url}", user.username),
            )
            .await
            .map_err(VerificationError::Other)?;

        Ok(())
    }

    /// Resend, gated by the cooldown on the most recent request.
    pub async fn resend(&self, user: &User) -> Result<(), VerificationError> {
        if let Some(latest) = self
            .store
            .latest_verification_request(user.id)
            .await
            .map_err(VerificationError::Other)?
        {
            let requested_at = chrono::DateTime::parse_from_rfc3339(&latest.requested_at)
                .map_err(|e| VerificationError::Other(e.into()))?;
            let elapsed = chrono::Utc::now().signed_duration_since(requested_at);

            if elapsed.num_seconds() >= 0 && (elapsed.num_seconds() as u64) < self.cooldown.as_secs()
            {
                return Err(VerificationError::CooldownActive);
            }
        }

        self.send_confirmation(user).await
    }

    /// Validate a signed link and mark the user verified.
    pub async fn confirm(
        &self,
        user_id: i32,
        expires: i64,
        signature: &str,
    ) -> Result<(), VerificationError> {
        let user = self
            .store
            .get_user(user_id)
            .await
            .map_err(VerificationError::Other)?
            .ok_or(VerificationError::InvalidLink)?;

        if expires < chrono::Utc::now().timestamp() {
            return Err(VerificationError::InvalidLink);
        }

        let expected = sign(&self.secret, user.id, &user.email, expires);
        if !constant_time_eq(signature, &expected) {
            return Err(VerificationError::InvalidLink);
        }

        self.store
            .mark_user_verified(user.id)
            .await
            .map_err(VerificationError::Other)?;
        self.store
            .invalidate_verification_requests(user.id)
            .await
            .map_err(VerificationError::Other)?;

        info!(user_id = user.id, "Email address verified");

        Ok(())
    }
}

/// Keyed SHA-256 over `user_id|email|expires`, hex-encoded.
#[must_use]
pub fn sign(secret: &str, user_id: i32, email: &str, expires: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(format!("{user_id}|{email}|{expires}").as_bytes());

    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(64), |mut acc, b| {
            use std::fmt::Write;
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

/// Byte-wise comparison without an early exit, for secrets like signatures
/// and CSRF tokens.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
