use crate::shared::error::{AppError, Result};
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const DEFAULT_AUTH_SCOPE: &str = "https://www.googleapis.com/auth/drive.appdata";

/// Refresh when the access token has less than this long to live.
const ACCESS_TOKEN_MARGIN_MS: i64 = 10 * 60 * 1000;
/// Stricter margin used for the connectivity check, so a run started near
/// expiry cannot outlive its token.
const CONNECTED_MARGIN_MS: i64 = 40 * 60 * 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in_seconds: i64,
}

#[derive(Debug, Clone)]
struct Tokens {
    access_token: String,
    refresh_token: Option<String>,
    expiry: i64,
}

/// OAuth2 token lifecycle against the token exchange server. The exchange
/// server holds the client secret; this side only ever sees the resulting
/// access and refresh tokens.
pub struct DriveTokenManager {
    http: reqwest::Client,
    token_server_url: String,
    tokens: RwLock<Option<Tokens>>,
}

impl DriveTokenManager {
    pub fn new(token_server_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_server_url: token_server_url.into().trim_end_matches('/').to_string(),
            tokens: RwLock::new(None),
        }
    }

    pub fn token_server_url(&self) -> &str {
        &self.token_server_url
    }

    /// Exchange the `code` query parameter of the OAuth redirect for tokens.
    pub async fn handle_login_redirect(&self, redirect_url: &str) -> Result<()> {
        let url = reqwest::Url::parse(redirect_url)
            .map_err(|err| AppError::InvalidInput(format!("bad redirect URL: {err}")))?;
        let code = url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| AppError::Auth("redirect URL carries no code".to_string()))?;

        let response: TokenResponse = self
            .http
            .get(format!("{}/token", self.token_server_url))
            .query(&[("code", code.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.store(response).await;
        debug!("drive login completed");
        Ok(())
    }

    /// Valid access token, refreshing first when it expires within the
    /// ten-minute margin.
    pub async fn access_token(&self) -> Result<String> {
        let (token, needs_refresh) = {
            let tokens = self.tokens.read().await;
            match tokens.as_ref() {
                Some(t) => (
                    t.access_token.clone(),
                    t.expiry - Utc::now().timestamp_millis() < ACCESS_TOKEN_MARGIN_MS,
                ),
                None => return Err(AppError::Auth("not logged in".to_string())),
            }
        };
        if !needs_refresh {
            return Ok(token);
        }
        self.refresh().await?;
        let tokens = self.tokens.read().await;
        tokens
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or_else(|| AppError::Auth("not logged in".to_string()))
    }

    pub async fn is_authenticated(&self) -> bool {
        self.tokens.read().await.is_some()
    }

    /// Connected means a token that will outlive a long-running transfer,
    /// refreshing once if the current one is too close to expiry.
    pub async fn is_connected(&self) -> bool {
        let margin_ok = {
            let tokens = self.tokens.read().await;
            match tokens.as_ref() {
                Some(t) => t.expiry - Utc::now().timestamp_millis() >= CONNECTED_MARGIN_MS,
                None => return false,
            }
        };
        if margin_ok {
            return true;
        }
        match self.refresh().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "drive token refresh failed");
                false
            }
        }
    }

    async fn refresh(&self) -> Result<()> {
        let refresh_token = {
            let tokens = self.tokens.read().await;
            tokens
                .as_ref()
                .and_then(|t| t.refresh_token.clone())
                .ok_or_else(|| AppError::Auth("no refresh token".to_string()))?
        };

        let response: TokenResponse = self
            .http
            .get(format!("{}/refresh", self.token_server_url))
            .query(&[("refreshToken", refresh_token.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.store(response).await;
        Ok(())
    }

    async fn store(&self, response: TokenResponse) {
        let mut tokens = self.tokens.write().await;
        let refresh_token = response
            .refresh_token
            .or_else(|| tokens.as_ref().and_then(|t| t.refresh_token.clone()));
        *tokens = Some(Tokens {
            access_token: response.access_token,
            refresh_token,
            expiry: Utc::now().timestamp_millis() + response.expires_in_seconds * 1000,
        });
    }
}
