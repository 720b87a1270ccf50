pub mod cloud_to_mq;
pub mod hash_password;
pub mod mq_to_cloud;

use clap::{Args, ValueEnum};
use mqbridge_core::{ClientConnection, ConnectOptions, Credentials, TlsOptions};
use mqbridge_pipeline::FailurePolicy;
use std::path::PathBuf;

/// Client-binding connection settings; omit them for local bindings
#[derive(Args, Debug, Clone, Default)]
pub struct ClientArgs {
    /// Connection name, e.g. localhost(1414)
    #[arg(long, env = "MQBRIDGE_CONNECTION", requires = "channel")]
    pub connection: Option<String>,

    /// Server-connection channel
    #[arg(long, env = "MQBRIDGE_CHANNEL", requires = "connection")]
    pub channel: Option<String>,

    /// User id presented to the queue manager
    #[arg(long, env = "MQBRIDGE_USER", requires_all = ["password", "connection"])]
    pub user: Option<String>,

    /// Password for --user
    #[arg(
        long,
        env = "MQBRIDGE_PASSWORD",
        hide_env_values = true,
        requires_all = ["user", "connection"]
    )]
    pub password: Option<String>,

    /// TLS cipher spec for the channel
    #[arg(long, requires = "connection")]
    pub cipher_spec: Option<String>,

    /// Key repository stem (without .kdb)
    #[arg(long, requires = "cipher_spec")]
    pub key_repository: Option<PathBuf>,

    /// Run against an in-process queue manager that starts empty and is
    /// discarded on exit; required because no native MQ client is linked
    #[arg(long, env = "MQBRIDGE_EMULATE_MQ")]
    pub emulate_mq: bool,
}

impl ClientArgs {
    pub fn connect_options(&self) -> ConnectOptions {
        let (Some(connection), Some(channel)) = (&self.connection, &self.channel) else {
            return ConnectOptions::local();
        };

        let mut client = ClientConnection::new(connection, channel);
        if let (Some(user), Some(password)) = (&self.user, &self.password) {
            client = client.with_credentials(Credentials::new(user, password));
        }
        if let Some(cipher_spec) = &self.cipher_spec {
            client = client.with_tls(TlsOptions {
                cipher_spec: cipher_spec.clone(),
                key_repository: self.key_repository.clone(),
                certificate_label: None,
                client_auth: Default::default(),
            });
        }
        ConnectOptions::client(client)
    }
}

/// What to do with a message that could not be forwarded
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnFailure {
    /// Stop the bridge and exit with status 1
    #[default]
    Exit,
    /// Skip the message and keep going
    Drop,
}

impl From<OnFailure> for FailurePolicy {
    fn from(value: OnFailure) -> Self {
        match value {
            OnFailure::Exit => FailurePolicy::Exit,
            OnFailure::Drop => FailurePolicy::Drop,
        }
    }
}
