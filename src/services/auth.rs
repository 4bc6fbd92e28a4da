use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::info;

use crate::backends::SupabaseAuth;
use crate::events::EventBus;
use crate::models::Session;
use crate::utils::AppError;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));

const MAX_EMAIL_LEN: usize = 255;
const MIN_PASSWORD_LEN: usize = 6;
const MAX_PASSWORD_LEN: usize = 72;

/// Email and password that passed validation. The email is trimmed.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

pub fn validate_credentials(email: &str, password: &str) -> Result<Credentials, AppError> {
    let email = email.trim();
    if !EMAIL.is_match(email) {
        return Err(AppError::InvalidCredentials(
            "Please enter a valid email address".to_string(),
        ));
    }
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(AppError::InvalidCredentials(
            "Email must be less than 255 characters".to_string(),
        ));
    }

    let password_len = password.chars().count();
    if password_len < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidCredentials(
            "Password must be at least 6 characters".to_string(),
        ));
    }
    if password_len > MAX_PASSWORD_LEN {
        return Err(AppError::InvalidCredentials(
            "Password must be less than 72 characters".to_string(),
        ));
    }

    Ok(Credentials {
        email: email.to_string(),
        password: password.to_string(),
    })
}

/// Validated sign-in/sign-up that announces session changes on the bus.
#[derive(Debug, Clone)]
pub struct AuthService {
    provider: Arc<SupabaseAuth>,
    event_bus: Arc<EventBus>,
}

impl AuthService {
    pub fn new(provider: Arc<SupabaseAuth>, event_bus: Arc<EventBus>) -> Self {
        Self {
            provider,
            event_bus,
        }
    }

    pub fn provider(&self) -> Arc<SupabaseAuth> {
        self.provider.clone()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let credentials = validate_credentials(email, password)?;
        let session = self
            .provider
            .sign_in(&credentials.email, &credentials.password)
            .await?;
        let _ = self
            .event_bus
            .emit_session_changed(Some(session.user_id().to_string()))
            .await;
        Ok(session)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        let credentials = validate_credentials(email, password)?;
        let session = self
            .provider
            .sign_up(&credentials.email, &credentials.password, None)
            .await?;
        if let Some(session) = &session {
            let _ = self
                .event_bus
                .emit_session_changed(Some(session.user_id().to_string()))
                .await;
        }
        Ok(session)
    }

    pub async fn sign_out(&self) -> Result<()> {
        let result = self.provider.sign_out().await;
        info!("Signed out");
        let _ = self.event_bus.emit_session_changed(None).await;
        result
    }
}
