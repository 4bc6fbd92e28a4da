use anyhow::{Context, Result, anyhow};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};
use url::Url;

use crate::models::Session;
use crate::utils::AppError;

const REST_PATH: &str = "/rest/v1";
const AUTH_PATH: &str = "/auth/v1";

/// Thin client for the hosted backend: PostgREST tables plus the auth endpoints.
#[derive(Clone, Debug)]
pub struct SupabaseApi {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl SupabaseApi {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> Result<Self> {
        Url::parse(base_url).map_err(|e| {
            AppError::Configuration(format!("Invalid backend URL '{}': {}", base_url, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            access_token: Arc::new(RwLock::new(None)),
        })
    }

    /// Row-level security needs the user's token; without one the anon key is sent.
    pub async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }

    pub async fn has_access_token(&self) -> bool {
        self.access_token.read().await.is_some()
    }

    async fn request(&self, method: Method, url: String) -> RequestBuilder {
        let bearer = self
            .access_token
            .read()
            .await
            .clone()
            .unwrap_or_else(|| self.anon_key.clone());

        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}{}/{}", self.base_url, REST_PATH, table)
    }

    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        trace!("GET {} {:?}", table, query);
        let response = self
            .request(Method::GET, self.table_url(table))
            .await
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to query {}", table))?;

        let response = check_status(response, table).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} rows", table))
    }

    /// Insert one row and return what the table stored.
    pub async fn insert<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        table: &str,
        row: &T,
    ) -> Result<R> {
        debug!("Inserting into {}", table);
        let response = self
            .request(Method::POST, self.table_url(table))
            .await
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await
            .with_context(|| format!("Failed to insert into {}", table))?;

        let response = check_status(response, table).await?;
        let mut rows: Vec<R> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse inserted {} row", table))?;

        rows.pop()
            .ok_or_else(|| anyhow!("Insert into {} returned no row", table))
    }

    /// Patch every row matching `filters`.
    pub async fn update<T: Serialize + ?Sized>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        patch: &T,
    ) -> Result<()> {
        debug!("Updating {} {:?}", table, filters);
        let response = self
            .request(Method::PATCH, self.table_url(table))
            .await
            .query(filters)
            .json(patch)
            .send()
            .await
            .with_context(|| format!("Failed to update {}", table))?;

        check_status(response, table).await?;
        Ok(())
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let url = format!("{}{}/token", self.base_url, AUTH_PATH);
        let response = self
            .client
            .post(url)
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .context("Failed to reach auth service")?;

        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
        ) {
            let message = error_message(response).await;
            return Err(AppError::InvalidCredentials(message).into());
        }

        let response = check_status(response, "auth").await?;
        response.json().await.context("Failed to parse session")
    }

    /// `None` when the account still has to be confirmed by email.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: Option<&str>,
    ) -> Result<Option<Session>> {
        let url = format!("{}{}/signup", self.base_url, AUTH_PATH);
        let mut request = self.client.post(url).header("apikey", &self.anon_key);
        if let Some(redirect_to) = redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }

        let response = request
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .context("Failed to reach auth service")?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let message = error_message(response).await;
            return Err(AppError::Authentication(message).into());
        }

        let response = check_status(response, "auth").await?;
        let body: serde_json::Value = response.json().await.context("Failed to parse sign-up")?;

        if body.get("access_token").is_some() {
            Ok(Some(serde_json::from_value(body)?))
        } else {
            Ok(None)
        }
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<()> {
        let url = format!("{}{}/logout", self.base_url, AUTH_PATH);
        let response = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .context("Failed to reach auth service")?;

        check_status(response, "auth").await?;
        Ok(())
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = error_message(response).await;
    warn!("{} request failed with status {}: {}", what, status, message);

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        Err(AppError::Authentication(message).into())
    } else {
        Err(AppError::Backend(format!("{} request failed: {} - {}", what, status, message)).into())
    }
}

/// Both PostgREST and the auth service put a human readable message in the body.
async fn error_message(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| {
            ["msg", "message", "error_description", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .unwrap_or(body)
}
