use async_trait::async_trait;

use crate::errors::HarnessError;
use crate::model::ClientSpec;

/// Raw result of one in-container command: the exit status and the combined
/// output, untouched.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub output: String,
}

/// The seam between the admin façade and the container engine. The façade
/// only ever hands over a fully-formed argument vector; no shell is involved
/// anywhere, so values never need quoting.
#[async_trait(?Send)]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String]) -> Result<ExecOutput, HarnessError>;
}

/// Builds kcadm argument vectors. Every method returns the complete argv,
/// binary path included, ready to hand to a [`CommandRunner`].
#[derive(Debug, Clone)]
pub struct KcadmCli {
    bin: String,
    server_url: String,
}

impl KcadmCli {
    /// `bin` is the in-container path to `kcadm.sh`; `server_url` is the
    /// address the CLI talks to from inside the container, not the mapped
    /// host address.
    pub fn new(bin: impl Into<String>, server_url: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            server_url: server_url.into(),
        }
    }

    fn argv(&self, tokens: Vec<String>) -> Vec<String> {
        let mut argv = Vec::with_capacity(tokens.len() + 1);
        argv.push(self.bin.clone());
        argv.extend(tokens);
        argv
    }

    pub fn config_credentials(&self, realm: &str, user: &str, password: &str) -> Vec<String> {
        self.argv(vec![
            "config".into(),
            "credentials".into(),
            "--server".into(),
            self.server_url.clone(),
            "--realm".into(),
            realm.into(),
            "--user".into(),
            user.into(),
            "--password".into(),
            password.into(),
        ])
    }

    pub fn create_realm(&self, name: &str, enabled: bool) -> Vec<String> {
        self.argv(vec![
            "create".into(),
            "realms".into(),
            "-s".into(),
            format!("realm={name}"),
            "-s".into(),
            format!("enabled={enabled}"),
        ])
    }

    pub fn get_realm(&self, name: &str) -> Vec<String> {
        self.argv(vec!["get".into(), format!("realms/{name}")])
    }

    pub fn create_user(
        &self,
        realm: &str,
        username: &str,
        first_name: &str,
        last_name: &str,
        enabled: bool,
    ) -> Vec<String> {
        self.argv(vec![
            "create".into(),
            "users".into(),
            "-r".into(),
            realm.into(),
            "-s".into(),
            format!("username={username}"),
            "-s".into(),
            format!("firstName={first_name}"),
            "-s".into(),
            format!("lastName={last_name}"),
            "-s".into(),
            format!("enabled={enabled}"),
        ])
    }

    pub fn get_users_by_username(&self, realm: &str, username: &str) -> Vec<String> {
        self.argv(vec![
            "get".into(),
            "users".into(),
            "-r".into(),
            realm.into(),
            "-q".into(),
            format!("username={username}"),
        ])
    }

    pub fn get_user(&self, realm: &str, user_id: &str) -> Vec<String> {
        self.argv(vec![
            "get".into(),
            format!("users/{user_id}"),
            "-r".into(),
            realm.into(),
        ])
    }

    pub fn set_password(&self, realm: &str, username: &str, password: &str) -> Vec<String> {
        self.argv(vec![
            "set-password".into(),
            "-r".into(),
            realm.into(),
            "--username".into(),
            username.into(),
            "--new-password".into(),
            password.into(),
        ])
    }

    /// `redirectUris` and `webOrigins` are serialized as literal JSON
    /// arrays; an empty list stays `[]` rather than being omitted.
    pub fn create_client(&self, realm: &str, spec: &ClientSpec) -> Vec<String> {
        let redirect_uris = serde_json::to_string(&spec.redirect_uris)
            .unwrap_or_else(|_| "[]".into());
        let web_origins =
            serde_json::to_string(&spec.web_origins).unwrap_or_else(|_| "[]".into());
        self.argv(vec![
            "create".into(),
            "clients".into(),
            "-r".into(),
            realm.into(),
            "-s".into(),
            format!("clientId={}", spec.client_id),
            "-s".into(),
            format!("secret={}", spec.secret),
            "-s".into(),
            format!("redirectUris={redirect_uris}"),
            "-s".into(),
            format!("webOrigins={web_origins}"),
            "-s".into(),
            format!("directAccessGrantsEnabled={}", spec.direct_access_grants_enabled),
            "-s".into(),
            format!("enabled={}", spec.enabled),
        ])
    }

    /// The cid lookup only needs the id field, so everything else is
    /// filtered out server-side.
    pub fn get_client_ids(&self, realm: &str, client_id: &str) -> Vec<String> {
        self.argv(vec![
            "get".into(),
            "clients".into(),
            "-r".into(),
            realm.into(),
            "-q".into(),
            format!("clientId={client_id}"),
            "--fields".into(),
            "id".into(),
        ])
    }

    pub fn get_client(&self, realm: &str, cid: &str) -> Vec<String> {
        self.argv(vec![
            "get".into(),
            format!("clients/{cid}"),
            "-r".into(),
            realm.into(),
        ])
    }

    pub fn get_client_secret(&self, realm: &str, cid: &str) -> Vec<String> {
        self.argv(vec![
            "get".into(),
            format!("clients/{cid}/client-secret"),
            "-r".into(),
            realm.into(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> KcadmCli {
        KcadmCli::new(
            "/opt/jboss/keycloak/bin/kcadm.sh",
            "http://localhost:8080/auth",
        )
    }

    #[test]
    fn config_credentials_argv() {
        let argv = cli().config_credentials("master", "admin", "admin");
        assert_eq!(
            argv,
            vec![
                "/opt/jboss/keycloak/bin/kcadm.sh",
                "config",
                "credentials",
                "--server",
                "http://localhost:8080/auth",
                "--realm",
                "master",
                "--user",
                "admin",
                "--password",
                "admin",
            ]
        );
    }

    #[test]
    fn values_with_spaces_stay_single_tokens() {
        // The whole point of building argv directly: no joining, no
        // re-splitting, so a space in a value cannot break tokenization.
        let argv = cli().create_user("demo", "user01", "Yu Bin", "Hsu", true);
        assert!(argv.contains(&"firstName=Yu Bin".to_string()));
    }

    #[test]
    fn create_client_serializes_uri_lists_literally() {
        let spec = ClientSpec::new("client01", "client01Secret")
            .redirect_uris(vec![
                "http://localhost:8888".into(),
                "http://localhost:8888/callback".into(),
            ])
            .web_origins(vec!["http://localhost:8888/home".into()]);
        let argv = cli().create_client("demo", &spec);
        assert!(argv.contains(
            &r#"redirectUris=["http://localhost:8888","http://localhost:8888/callback"]"#
                .to_string()
        ));
        assert!(argv.contains(&r#"webOrigins=["http://localhost:8888/home"]"#.to_string()));
    }

    #[test]
    fn create_client_keeps_empty_lists_as_empty_arrays() {
        let spec = ClientSpec::new("client01", "s3cret");
        let argv = cli().create_client("demo", &spec);
        assert!(argv.contains(&"redirectUris=[]".to_string()));
        assert!(argv.contains(&"webOrigins=[]".to_string()));
        assert!(argv.contains(&"directAccessGrantsEnabled=true".to_string()));
        assert!(argv.contains(&"enabled=true".to_string()));
    }

    #[test]
    fn cid_lookup_is_filtered_to_id() {
        let argv = cli().get_client_ids("demo", "client01");
        assert_eq!(argv[argv.len() - 2..], ["--fields", "id"]);
        assert!(argv.contains(&"clientId=client01".to_string()));
    }
}
