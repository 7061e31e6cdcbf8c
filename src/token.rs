use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::errors::TokenError;

/// Resource-owner-password token exchange against the realm token endpoint.
///
/// This path bypasses kcadm entirely and talks to the mapped HTTP port.
/// Tokens are fetched per call and never cached; expiry is the service's
/// business.
pub struct TokenExchange {
    client: Client,
    base_url: Url,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    username: &'a str,
    password: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: Option<String>,
    id_token: Option<String>,
}

/// Which token field a successful exchange must yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenField {
    Access,
    Id,
}

impl TokenExchange {
    /// `base_url` is the service root as seen from the host, e.g.
    /// `http://localhost:32768/auth`.
    pub fn new(base_url: &str) -> Result<Self, TokenError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TokenError::ServiceUnavailable(format!("invalid base url: {e}")))?;
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    fn token_endpoint(&self, realm: &str) -> String {
        format!(
            "{}/realms/{realm}/protocol/openid-connect/token",
            self.base_url.as_str().trim_end_matches('/')
        )
    }

    pub async fn get_access_token(
        &self,
        realm: &str,
        username: &str,
        password: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, TokenError> {
        self.request_token(
            realm,
            username,
            password,
            client_id,
            client_secret,
            TokenField::Access,
        )
        .await
    }

    /// Same grant with an additional `scope=openid`, extracting the id
    /// token instead of the access token.
    pub async fn get_id_token(
        &self,
        realm: &str,
        username: &str,
        password: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, TokenError> {
        self.request_token(
            realm,
            username,
            password,
            client_id,
            client_secret,
            TokenField::Id,
        )
        .await
    }

    async fn request_token(
        &self,
        realm: &str,
        username: &str,
        password: &str,
        client_id: &str,
        client_secret: &str,
        field: TokenField,
    ) -> Result<String, TokenError> {
        let endpoint = self.token_endpoint(realm);
        let grant = PasswordGrant {
            username,
            password,
            client_id,
            client_secret,
            grant_type: "password",
            scope: match field {
                TokenField::Access => None,
                TokenField::Id => Some("openid"),
            },
        };

        debug!(endpoint, realm, username, "requesting token");
        let response = self
            .client
            .post(&endpoint)
            .form(&grant)
            .send()
            .await
            .map_err(|e| TokenError::ServiceUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "token endpoint answered with a server error");
            return Err(TokenError::ServiceUnavailable(format!("{status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, "token endpoint rejected the grant");
            return Err(TokenError::InvalidCredentials(format!("{status}: {body}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TokenError::ServiceUnavailable(format!("reading response: {e}")))?;
        extract_token(&body, field)
    }
}

fn extract_token(body: &str, field: TokenField) -> Result<String, TokenError> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| TokenError::MalformedResponse(format!("{e}: {body}")))?;
    let token = match field {
        TokenField::Access => parsed.access_token,
        TokenField::Id => parsed.id_token,
    };
    match token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(TokenError::MalformedResponse(format!(
            "response carried no {} token: {body}",
            match field {
                TokenField::Access => "access",
                TokenField::Id => "id",
            }
        ))),
    }
}
