use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A realm record as kcadm returns it.
///
/// Only `realm` and `enabled` are ever written by this crate; the rest of
/// Keycloak's large policy bag (session lifetimes, security headers, auth
/// flow bindings, ...) is read-only passthrough. Fields the admin schema may
/// drop or rename between versions land in `attributes` instead of failing
/// deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Realm {
    pub id: String,
    pub realm: String,
    pub enabled: bool,
    pub ssl_required: Option<String>,
    pub access_token_lifespan: Option<i64>,
    pub sso_session_idle_timeout: Option<i64>,
    pub sso_session_max_lifespan: Option<i64>,
    pub browser_flow: Option<String>,
    pub direct_grant_flow: Option<String>,
    pub registration_allowed: Option<bool>,
    pub brute_force_protected: Option<bool>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// A user record, unique per (realm, username).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub enabled: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: Option<bool>,
    pub created_timestamp: Option<i64>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// An OIDC client registration. `id` is Keycloak's opaque internal id (the
/// "cid"), distinct from the caller-chosen `client_id`. The secret is a
/// separate sub-resource, never embedded here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub client_id: String,
    pub enabled: bool,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub web_origins: Vec<String>,
    pub direct_access_grants_enabled: Option<bool>,
    pub public_client: Option<bool>,
    pub protocol: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Everything needed to register a client. Flags default to enabled with
/// direct access grants on, matching what the password-grant tests need.
#[derive(Debug, Clone)]
pub struct ClientSpec {
    pub client_id: String,
    pub secret: String,
    pub redirect_uris: Vec<String>,
    pub web_origins: Vec<String>,
    pub direct_access_grants_enabled: bool,
    pub enabled: bool,
}

impl ClientSpec {
    pub fn new(client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            secret: secret.into(),
            redirect_uris: Vec::new(),
            web_origins: Vec::new(),
            direct_access_grants_enabled: true,
            enabled: true,
        }
    }

    pub fn redirect_uris(mut self, uris: Vec<String>) -> Self {
        self.redirect_uris = uris;
        self
    }

    pub fn web_origins(mut self, origins: Vec<String>) -> Self {
        self.web_origins = origins;
        self
    }
}

/// Projection used by the cid lookup (`get clients --fields id`).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientIdOnly {
    pub id: String,
}

/// A client's current secret, fetched by cid. Regenerable on the Keycloak
/// side; not versioned here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSecret {
    #[serde(rename = "type")]
    pub secret_type: String,
    pub value: String,
}
