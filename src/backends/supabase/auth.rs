use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};

use super::api::SupabaseApi;
use crate::backends::traits::AuthProvider;
use crate::models::Session;

/// Email/password sessions from the hosted auth service.
#[derive(Debug)]
pub struct SupabaseAuth {
    api: SupabaseApi,
    session: watch::Sender<Option<Session>>,
}

impl SupabaseAuth {
    pub fn new(api: SupabaseApi) -> Self {
        let (session, _) = watch::channel(None);
        Self { api, session }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = self.api.sign_in_with_password(email, password).await?;
        info!("Signed in as {}", session.user_id());
        self.set_session(Some(session.clone())).await;
        Ok(session)
    }

    /// Returns the session when the account is usable right away.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: Option<&str>,
    ) -> Result<Option<Session>> {
        let session = self.api.sign_up(email, password, redirect_to).await?;
        match &session {
            Some(session) => {
                info!("Signed up as {}", session.user_id());
                self.set_session(Some(session.clone())).await;
            }
            None => info!("Sign-up for {} awaits email confirmation", email),
        }
        Ok(session)
    }

    /// The local session is dropped even when the server call fails.
    pub async fn sign_out(&self) -> Result<()> {
        let current = self.session.borrow().clone();
        self.set_session(None).await;

        if let Some(session) = current
            && let Err(e) = self.api.sign_out(&session.access_token).await
        {
            warn!("Server-side sign out failed: {}", e);
            return Err(e);
        }
        Ok(())
    }

    async fn set_session(&self, session: Option<Session>) {
        self.api
            .set_access_token(session.as_ref().map(|s| s.access_token.clone()))
            .await;
        self.session.send_replace(session);
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn current_session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }
}
