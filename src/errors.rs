use thiserror::Error;

/// Error types for harness operations.
///
/// No variant is ever retried internally; every failure carries the raw
/// underlying output so a failing test can show what Keycloak actually said.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A kcadm invocation exited nonzero. The output is passed through
    /// verbatim, including Keycloak's own conflict and validation messages.
    #[error("admin command failed: {output}")]
    CommandFailed { output: String },

    /// kcadm stdout did not decode as the expected JSON shape.
    #[error("failed to parse admin command output: {0}")]
    Parse(#[from] serde_json::Error),

    /// A natural-key lookup (username, clientId) matched zero or more than
    /// one record. The caller gets the key and scope back, never a silently
    /// picked record.
    #[error("expected exactly one match for {key} in {scope}, found {count}")]
    AmbiguousOrMissing {
        key: String,
        scope: String,
        count: usize,
    },

    /// A direct-id lookup matched nothing.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Token exchange did not yield a usable token.
    #[error("token exchange failed: {0}")]
    Token(#[from] TokenError),

    /// The container engine failed to start the image or run a command.
    #[error("container error: {0}")]
    Container(#[from] testcontainers::TestcontainersError),
}

/// Why a token could not be obtained from the token endpoint.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The endpoint rejected the grant (4xx). Bad username, password,
    /// client id or client secret all land here.
    #[error("credentials rejected: {0}")]
    InvalidCredentials(String),

    /// The endpoint could not be reached, or answered with a server error.
    #[error("token endpoint unavailable: {0}")]
    ServiceUnavailable(String),

    /// A success response that did not contain the requested token field.
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
}
