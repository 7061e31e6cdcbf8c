//! Drive a containerized Keycloak from integration tests: start the image,
//! wait for readiness, run kcadm admin operations inside the container and
//! exchange resource-owner-password credentials for tokens over HTTP.

pub mod admin;
pub mod command;
pub mod container;
pub mod errors;
pub mod model;
pub mod parse;
pub mod token;

pub use admin::AdminSession;
pub use command::{CommandRunner, ExecOutput, KcadmCli};
pub use container::{KeycloakConfig, KeycloakContainer};
pub use errors::{HarnessError, TokenError};
pub use model::{Client, ClientSecret, ClientSpec, Realm, User};
pub use token::TokenExchange;
