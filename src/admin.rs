use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::command::{CommandRunner, ExecOutput, KcadmCli};
use crate::errors::HarnessError;
use crate::model::{Client, ClientIdOnly, ClientSecret, ClientSpec, Realm, User};
use crate::parse::parse;

/// kcadm prefixes its 404 output with this marker.
const NOT_FOUND_MARKER: &str = "Resource not found";

/// An authenticated kcadm session against one running container.
///
/// Construction runs `config credentials` and fails outright if the admin
/// login is rejected; there is no partially-authenticated state. The session
/// is immutable afterwards. Command dispatch is serialized through a mutex
/// so concurrent callers cannot interleave kcadm's shared CLI config.
pub struct AdminSession {
    runner: Arc<dyn CommandRunner>,
    cli: KcadmCli,
    dispatch: Mutex<()>,
    admin_realm: String,
    admin_username: String,
}

impl std::fmt::Debug for AdminSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSession")
            .field("admin_realm", &self.admin_realm)
            .field("admin_username", &self.admin_username)
            .finish_non_exhaustive()
    }
}

impl AdminSession {
    pub async fn new(
        runner: Arc<dyn CommandRunner>,
        cli: KcadmCli,
        realm: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, HarnessError> {
        let session = Self {
            runner,
            cli,
            dispatch: Mutex::new(()),
            admin_realm: realm.to_string(),
            admin_username: username.to_string(),
        };
        session
            .execute(session.cli.config_credentials(realm, username, password))
            .await?;
        info!(realm, username, "kcadm credentials configured");
        Ok(session)
    }

    /// The realm the admin principal authenticated against.
    pub fn admin_realm(&self) -> &str {
        &self.admin_realm
    }

    pub fn admin_username(&self) -> &str {
        &self.admin_username
    }

    /// Raw command passthrough. No exit-status classification; callers get
    /// the exit code and combined output as-is.
    pub async fn exec<I, S>(&self, argv: I) -> Result<ExecOutput, HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        let _guard = self.dispatch.lock().await;
        self.runner.run(&argv).await
    }

    /// Dispatches one kcadm invocation: exit 0 resolves to trimmed stdout,
    /// anything else fails with the raw output. Never retried.
    async fn execute(&self, argv: Vec<String>) -> Result<String, HarnessError> {
        let _guard = self.dispatch.lock().await;
        debug!(
            command = %argv.get(1).map(String::as_str).unwrap_or(""),
            resource = %argv.get(2).map(String::as_str).unwrap_or(""),
            "dispatching kcadm command"
        );
        let result = self.runner.run(&argv).await?;
        if result.exit_code != 0 {
            return Err(HarnessError::CommandFailed {
                output: result.output,
            });
        }
        Ok(result.output.trim().to_string())
    }

    pub async fn create_realm(&self, name: &str) -> Result<(), HarnessError> {
        self.create_realm_with(name, true).await
    }

    /// A realm that already exists makes Keycloak answer with a conflict,
    /// which surfaces verbatim as `CommandFailed`.
    pub async fn create_realm_with(&self, name: &str, enabled: bool) -> Result<(), HarnessError> {
        self.execute(self.cli.create_realm(name, enabled)).await?;
        info!(realm = name, "realm created");
        Ok(())
    }

    pub async fn get_realm(&self, name: &str) -> Result<Realm, HarnessError> {
        let output = self
            .execute(self.cli.get_realm(name))
            .await
            .map_err(|e| remap_not_found(e, format!("realm {name}")))?;
        parse(&output)
    }

    /// No local uniqueness pre-check: a duplicate username is rejected by
    /// the service itself.
    pub async fn create_user(
        &self,
        realm: &str,
        username: &str,
        first_name: &str,
        last_name: &str,
        enabled: bool,
    ) -> Result<(), HarnessError> {
        self.execute(
            self.cli
                .create_user(realm, username, first_name, last_name, enabled),
        )
        .await?;
        info!(realm, username, "user created");
        Ok(())
    }

    pub async fn get_user_by_id(&self, realm: &str, user_id: &str) -> Result<User, HarnessError> {
        let output = self
            .execute(self.cli.get_user(realm, user_id))
            .await
            .map_err(|e| remap_not_found(e, format!("user {user_id} in realm {realm}")))?;
        parse(&output)
    }

    /// Resolves a username to its opaque id. kcadm's `-q username=` filter
    /// matches substrings, so the result set is narrowed to exact matches
    /// before the exactly-one invariant is enforced; zero or several exact
    /// matches is an error, never a silently picked record.
    pub async fn get_user_id_by_username(
        &self,
        realm: &str,
        username: &str,
    ) -> Result<String, HarnessError> {
        let output = self
            .execute(self.cli.get_users_by_username(realm, username))
            .await?;
        let users: Vec<User> = parse(&output)?;
        let mut exact: Vec<User> = users.into_iter().filter(|u| u.username == username).collect();
        if exact.len() != 1 {
            return Err(HarnessError::AmbiguousOrMissing {
                key: username.to_string(),
                scope: format!("realm {realm}"),
                count: exact.len(),
            });
        }
        Ok(exact.remove(0).id)
    }

    /// Out-of-band credential mutation; no strength validation happens here.
    pub async fn set_user_password(
        &self,
        realm: &str,
        username: &str,
        password: &str,
    ) -> Result<(), HarnessError> {
        self.execute(self.cli.set_password(realm, username, password))
            .await?;
        info!(realm, username, "password set");
        Ok(())
    }

    pub async fn create_client(&self, realm: &str, spec: &ClientSpec) -> Result<(), HarnessError> {
        self.execute(self.cli.create_client(realm, spec)).await?;
        info!(realm, client_id = %spec.client_id, "client created");
        Ok(())
    }

    /// Resolves a caller-chosen clientId to Keycloak's opaque cid, fetching
    /// only the id field. Same exactly-one invariant as the user lookup.
    pub async fn get_cid_by_client_id(
        &self,
        realm: &str,
        client_id: &str,
    ) -> Result<String, HarnessError> {
        let output = self
            .execute(self.cli.get_client_ids(realm, client_id))
            .await?;
        let mut ids: Vec<ClientIdOnly> = parse(&output)?;
        if ids.len() != 1 {
            return Err(HarnessError::AmbiguousOrMissing {
                key: client_id.to_string(),
                scope: format!("realm {realm}"),
                count: ids.len(),
            });
        }
        Ok(ids.remove(0).id)
    }

    pub async fn get_client_by_cid(&self, realm: &str, cid: &str) -> Result<Client, HarnessError> {
        let output = self
            .execute(self.cli.get_client(realm, cid))
            .await
            .map_err(|e| remap_not_found(e, format!("client {cid} in realm {realm}")))?;
        parse(&output)
    }

    pub async fn get_client_secret_by_cid(
        &self,
        realm: &str,
        cid: &str,
    ) -> Result<ClientSecret, HarnessError> {
        let output = self
            .execute(self.cli.get_client_secret(realm, cid))
            .await
            .map_err(|e| remap_not_found(e, format!("secret of client {cid} in realm {realm}")))?;
        parse(&output)
    }
}

/// kcadm exits nonzero for both genuine command failures and missing
/// resources. Direct-id getters distinguish the two by kcadm's own 404
/// marker; the raw output is kept in the message either way.
fn remap_not_found(err: HarnessError, what: String) -> HarnessError {
    match err {
        HarnessError::CommandFailed { output } if output.contains(NOT_FOUND_MARKER) => {
            HarnessError::NotFound(format!("{what}: {output}"))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Replays canned exec results and records every argv it was handed.
    struct ScriptedRunner {
        responses: StdMutex<VecDeque<ExecOutput>>,
        calls: StdMutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn new(responses: Vec<ExecOutput>) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses.into()),
                calls: StdMutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait(?Send)]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, argv: &[String]) -> Result<ExecOutput, HarnessError> {
            self.calls.lock().unwrap().push(argv.to_vec());
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("more commands dispatched than scripted"))
        }
    }

    fn ok(output: &str) -> ExecOutput {
        ExecOutput {
            exit_code: 0,
            output: output.to_string(),
        }
    }

    fn failed(output: &str) -> ExecOutput {
        ExecOutput {
            exit_code: 1,
            output: output.to_string(),
        }
    }

    fn cli() -> KcadmCli {
        KcadmCli::new(
            "/opt/jboss/keycloak/bin/kcadm.sh",
            "http://localhost:8080/auth",
        )
    }

    async fn session(runner: Arc<ScriptedRunner>) -> AdminSession {
        AdminSession::new(runner, cli(), "master", "admin", "admin")
            .await
            .expect("credential configuration should succeed")
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn construction_runs_config_credentials_first() {
        let runner = ScriptedRunner::new(vec![ok("Logging into http://localhost:8080/auth")]);
        let s = session(runner.clone()).await;
        assert_eq!(s.admin_username(), "admin");
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][1], "config");
        assert_eq!(calls[0][2], "credentials");
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn rejected_credentials_abort_construction() {
        let runner = ScriptedRunner::new(vec![failed("Invalid user credentials [invalid_grant]")]);
        let result = AdminSession::new(runner, cli(), "master", "admin", "wrong").await;
        match result {
            Err(HarnessError::CommandFailed { output }) => {
                assert!(output.contains("invalid_grant"))
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn nonzero_exit_surfaces_raw_output() {
        let runner = ScriptedRunner::new(vec![
            ok(""),
            failed("Conflict detected. See logs for details"),
        ]);
        let s = session(runner).await;
        let err = s.create_realm("demo").await.unwrap_err();
        match err {
            HarnessError::CommandFailed { output } => assert!(output.contains("Conflict")),
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn user_lookup_enforces_exactly_one_exact_match() {
        // The substring query returns user01 and user010; only the exact
        // match counts.
        let runner = ScriptedRunner::new(vec![
            ok(""),
            ok(r#"[
                {"id": "u-1", "username": "user01", "enabled": true},
                {"id": "u-10", "username": "user010", "enabled": true}
            ]"#),
        ]);
        let s = session(runner).await;
        let id = s.get_user_id_by_username("demo", "user01").await.unwrap();
        assert_eq!(id, "u-1");
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn missing_user_is_ambiguous_or_missing_with_zero_count() {
        let runner = ScriptedRunner::new(vec![ok(""), ok("[]")]);
        let s = session(runner).await;
        let err = s
            .get_user_id_by_username("demo", "non-exist-user")
            .await
            .unwrap_err();
        match err {
            HarnessError::AmbiguousOrMissing { key, scope, count } => {
                assert_eq!(key, "non-exist-user");
                assert_eq!(scope, "realm demo");
                assert_eq!(count, 0);
            }
            other => panic!("expected AmbiguousOrMissing, got {other:?}"),
        }
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn duplicate_usernames_are_never_silently_picked() {
        let runner = ScriptedRunner::new(vec![
            ok(""),
            ok(r#"[
                {"id": "u-1", "username": "user01", "enabled": true},
                {"id": "u-2", "username": "user01", "enabled": false}
            ]"#),
        ]);
        let s = session(runner).await;
        let err = s.get_user_id_by_username("demo", "user01").await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::AmbiguousOrMissing { count: 2, .. }
        ));
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn cid_lookup_uses_id_projection() {
        let runner = ScriptedRunner::new(vec![ok(""), ok(r#"[{"id": "cid-1"}]"#)]);
        let s = session(runner.clone()).await;
        let cid = s.get_cid_by_client_id("demo", "client01").await.unwrap();
        assert_eq!(cid, "cid-1");
        let calls = runner.calls();
        let lookup = &calls[1];
        assert!(lookup.contains(&"--fields".to_string()));
        assert!(lookup.contains(&"id".to_string()));
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn missing_client_fails_the_lookup() {
        let runner = ScriptedRunner::new(vec![ok(""), ok("[]")]);
        let s = session(runner).await;
        let err = s
            .get_cid_by_client_id("demo", "non-exist-client-id")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::AmbiguousOrMissing { count: 0, .. }
        ));
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn direct_id_lookup_maps_kcadm_404_to_not_found() {
        let runner = ScriptedRunner::new(vec![
            ok(""),
            failed("Resource not found for url: http://localhost:8080/auth/admin/realms/nope"),
        ]);
        let s = session(runner).await;
        let err = s.get_realm("nope").await.unwrap_err();
        match err {
            HarnessError::NotFound(msg) => {
                assert!(msg.contains("realm nope"));
                assert!(msg.contains("Resource not found"));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn get_realm_parses_policy_bag() {
        let runner = ScriptedRunner::new(vec![
            ok(""),
            ok(r#"{
                "id": "r-1", "realm": "demo", "enabled": true,
                "sslRequired": "external", "bruteForceProtected": false,
                "oauth2DevicePollingInterval": 5
            }"#),
        ]);
        let s = session(runner).await;
        let realm = s.get_realm("demo").await.unwrap();
        assert_eq!(realm.realm, "demo");
        assert_eq!(realm.ssl_required.as_deref(), Some("external"));
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn get_client_preserves_uri_order() {
        let runner = ScriptedRunner::new(vec![
            ok(""),
            ok(r#"{
                "id": "cid-1", "clientId": "client01", "enabled": true,
                "redirectUris": ["http://localhost:8888", "http://localhost:8888/callback"],
                "webOrigins": ["http://localhost:8888/home"],
                "directAccessGrantsEnabled": true
            }"#),
        ]);
        let s = session(runner).await;
        let client = s.get_client_by_cid("demo", "cid-1").await.unwrap();
        assert_eq!(
            client.redirect_uris,
            vec![
                "http://localhost:8888".to_string(),
                "http://localhost:8888/callback".to_string()
            ]
        );
        assert_eq!(client.web_origins.len(), 1);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn client_secret_comes_back_unmodified() {
        let runner = ScriptedRunner::new(vec![
            ok(""),
            ok(r#"{"type": "secret", "value": "client01Secret"}"#),
        ]);
        let s = session(runner).await;
        let secret = s.get_client_secret_by_cid("demo", "cid-1").await.unwrap();
        assert_eq!(secret.value, "client01Secret");
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn raw_exec_returns_exit_code_and_output() {
        let runner = ScriptedRunner::new(vec![ok(""), ok("jboss\n")]);
        let s = session(runner).await;
        let result = s.exec(["whoami"]).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output.trim(), "jboss");
    }
}
