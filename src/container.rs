use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use testcontainers::core::{ExecCommand, IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tracing::{debug, info};

use crate::admin::AdminSession;
use crate::command::{CommandRunner, ExecOutput, KcadmCli};
use crate::errors::HarnessError;
use crate::token::TokenExchange;

/// Everything the container needs, fixed before start. There is no mutable
/// configuration window: the struct is consumed once by
/// [`KeycloakContainer::start`] and the started handle is immutable.
#[derive(Debug, Clone)]
pub struct KeycloakConfig {
    pub image: String,
    pub tag: String,
    pub admin_username: String,
    pub admin_password: String,
    /// Container-side HTTP port.
    pub port: u16,
    pub startup_timeout: Duration,
    /// Log line that marks readiness.
    pub ready_log: String,
    /// In-container path to kcadm.sh.
    pub kcadm_path: String,
    /// Path prefix the server mounts under ("/auth" for the jboss images,
    /// "" for the quay.io ones).
    pub http_relative_path: String,
}

impl Default for KeycloakConfig {
    fn default() -> Self {
        Self {
            image: "jboss/keycloak".to_string(),
            tag: "16.1.1".to_string(),
            admin_username: "admin".to_string(),
            admin_password: "admin".to_string(),
            port: 8080,
            startup_timeout: Duration::from_secs(600),
            ready_log: "Admin console listening".to_string(),
            kcadm_path: "/opt/jboss/keycloak/bin/kcadm.sh".to_string(),
            http_relative_path: "/auth".to_string(),
        }
    }
}

/// Runs commands inside the started container and hands back exit status
/// plus combined output. kcadm reports errors on stderr, so both streams
/// are captured.
struct ContainerRunner {
    container: ContainerAsync<GenericImage>,
}

#[async_trait(?Send)]
impl CommandRunner for ContainerRunner {
    async fn run(&self, argv: &[String]) -> Result<ExecOutput, HarnessError> {
        debug!(argv0 = %argv.first().map(String::as_str).unwrap_or(""), "exec in container");
        let mut result = self
            .container
            .exec(ExecCommand::new(argv.iter().map(String::as_str)))
            .await?;
        let exit_code = result.exit_code().await?.unwrap_or(-1);
        let stdout = result.stdout_to_vec().await?;
        let stderr = result.stderr_to_vec().await?;
        let mut output = String::from_utf8_lossy(&stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&stderr));
        Ok(ExecOutput { exit_code, output })
    }
}

/// A started, ready Keycloak container.
///
/// Admin operations go through [`config_credentials`](Self::config_credentials)
/// → [`AdminSession`]; token exchange talks HTTP to the mapped port
/// directly. The container is stopped when this handle drops.
pub struct KeycloakContainer {
    runner: Arc<ContainerRunner>,
    config: KeycloakConfig,
    base_url: String,
    tokens: TokenExchange,
}

impl KeycloakContainer {
    /// Starts the image with the admin credentials in the environment and
    /// blocks until the readiness log line is observed.
    pub async fn start(config: KeycloakConfig) -> Result<Self, HarnessError> {
        info!(image = %config.image, tag = %config.tag, "starting keycloak container");
        let image = GenericImage::new(config.image.clone(), config.tag.clone())
            .with_exposed_port(config.port.tcp())
            .with_wait_for(WaitFor::message_on_stdout(config.ready_log.clone()));
        let container = image
            .with_env_var("KEYCLOAK_USER", config.admin_username.clone())
            .with_env_var("KEYCLOAK_PASSWORD", config.admin_password.clone())
            .with_startup_timeout(config.startup_timeout)
            .start()
            .await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(config.port.tcp()).await?;
        let base_url = format!("http://{host}:{port}{}", config.http_relative_path);
        info!(base_url, "keycloak is ready");

        let tokens = TokenExchange::new(&base_url)?;
        Ok(Self {
            runner: Arc::new(ContainerRunner { container }),
            config,
            base_url,
            tokens,
        })
    }

    pub fn admin_username(&self) -> &str {
        &self.config.admin_username
    }

    pub fn admin_password(&self) -> &str {
        &self.config.admin_password
    }

    /// Service root as seen from the host, e.g. `http://localhost:32768/auth`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Raw in-container command passthrough.
    pub async fn exec<I, S>(&self, argv: I) -> Result<ExecOutput, HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        self.runner.run(&argv).await
    }

    /// Logs kcadm into the server. Must succeed before any admin operation;
    /// on failure no session exists at all.
    pub async fn config_credentials(
        &self,
        realm: &str,
        username: &str,
        password: &str,
    ) -> Result<AdminSession, HarnessError> {
        // kcadm talks to the server from inside the container, so it uses
        // the container-side address, not the mapped one.
        let server_url = format!(
            "http://localhost:{}{}",
            self.config.port, self.config.http_relative_path
        );
        let cli = KcadmCli::new(self.config.kcadm_path.clone(), server_url);
        AdminSession::new(self.runner.clone(), cli, realm, username, password).await
    }

    pub async fn get_access_token(
        &self,
        realm: &str,
        username: &str,
        password: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, HarnessError> {
        Ok(self
            .tokens
            .get_access_token(realm, username, password, client_id, client_secret)
            .await?)
    }

    pub async fn get_id_token(
        &self,
        realm: &str,
        username: &str,
        password: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, HarnessError> {
        Ok(self
            .tokens
            .get_id_token(realm, username, password, client_id, client_secret)
            .await?)
    }
}
