//! Queue-manager connection descriptors and MQI call options

use crate::message::MessageId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How to reach the queue manager
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectOptions {
    pub binding: Binding,
}

impl ConnectOptions {
    /// Local (server) bindings
    pub fn local() -> Self {
        Self {
            binding: Binding::Local,
        }
    }

    /// Client bindings over a channel
    pub fn client(connection: ClientConnection) -> Self {
        Self {
            binding: Binding::Client(connection),
        }
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        match &self.binding {
            Binding::Local => None,
            Binding::Client(client) => client.credentials.as_ref(),
        }
    }
}

/// MQCNO binding mode
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Binding {
    /// MQCNO_NONE: process is co-located with the queue manager
    #[default]
    Local,
    /// MQCNO_CLIENT_BINDING with an explicit MQCD
    Client(ClientConnection),
}

/// Client-mode channel definition (MQCD)
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConnection {
    /// `host(port)` list
    pub connection_name: String,
    /// SVRCONN channel name
    pub channel_name: String,
    pub credentials: Option<Credentials>,
    pub tls: Option<TlsOptions>,
}

impl ClientConnection {
    pub fn new(connection_name: impl Into<String>, channel_name: impl Into<String>) -> Self {
        Self {
            connection_name: connection_name.into(),
            channel_name: channel_name.into(),
            credentials: None,
            tls: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }
}

/// User id and password (MQCSP)
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// TLS settings for a client channel
#[derive(Debug, Clone, PartialEq)]
pub struct TlsOptions {
    /// e.g. `TLS_RSA_WITH_AES_128_CBC_SHA256`
    pub cipher_spec: String,
    /// Key repository stem (`.kdb`/`.sth` share this root)
    pub key_repository: Option<PathBuf>,
    pub certificate_label: Option<String>,
    pub client_auth: ClientAuth,
}

/// Whether this program must present a certificate (MQSCA_*)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClientAuth {
    #[default]
    Optional,
    Required,
}

/// Object a bridge reads from or writes to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    /// Queue object name (MQOT_Q)
    Queue(String),
    /// Topic string (MQOT_TOPIC, ObjectString)
    Topic(String),
}

impl Destination {
    pub fn name(&self) -> &str {
        match self {
            Destination::Queue(name) | Destination::Topic(name) => name,
        }
    }

    pub fn is_topic(&self) -> bool {
        matches!(self, Destination::Topic(_))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Queue(name) => write!(f, "queue {}", name),
            Destination::Topic(topic) => write!(f, "topic {}", topic),
        }
    }
}

/// MQOPEN intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOptions {
    /// MQOO_OUTPUT
    Output,
    /// MQOO_INPUT_AS_Q_DEF
    InputAsQueueDefault,
}

/// MQPMO options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub no_syncpoint: bool,
    pub new_msg_id: bool,
    pub new_correl_id: bool,
    /// Warn (MQRC_NO_SUBS_MATCHED) when a topic put reaches nobody
    pub warn_if_no_subs_matched: bool,
}

impl PutOptions {
    /// NO_SYNCPOINT | NEW_MSG_ID | NEW_CORREL_ID
    pub fn for_queue() -> Self {
        Self {
            no_syncpoint: true,
            new_msg_id: true,
            new_correl_id: true,
            warn_if_no_subs_matched: false,
        }
    }

    /// Queue options plus WARN_IF_NO_SUBS_MATCHED
    pub fn for_topic() -> Self {
        Self {
            warn_if_no_subs_matched: true,
            ..Self::for_queue()
        }
    }

    pub fn for_destination(destination: &Destination) -> Self {
        match destination {
            Destination::Queue(_) => Self::for_queue(),
            Destination::Topic(_) => Self::for_topic(),
        }
    }
}

/// MQGMO options
#[derive(Debug, Clone, PartialEq)]
pub struct GetOptions {
    /// How long a get blocks when nothing is available
    pub wait_interval: Duration,
    pub no_syncpoint: bool,
    pub convert: bool,
    pub fail_if_quiescing: bool,
    /// MQMO_MATCH_MSG_ID when set
    pub match_msg_id: Option<MessageId>,
}

impl GetOptions {
    /// NO_SYNCPOINT | WAIT | CONVERT | FAIL_IF_QUIESCING
    pub fn waiting(wait_interval: Duration) -> Self {
        Self {
            wait_interval,
            no_syncpoint: true,
            convert: true,
            fail_if_quiescing: true,
            match_msg_id: None,
        }
    }

    pub fn matching(mut self, msg_id: MessageId) -> Self {
        self.match_msg_id = Some(msg_id);
        self
    }
}

impl Default for GetOptions {
    fn default() -> Self {
        Self::waiting(Duration::from_secs(3))
    }
}

/// MQSD options for a topic subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub create: bool,
    pub durable: bool,
    /// Queue manager provides the destination queue
    pub managed: bool,
    pub fail_if_quiescing: bool,
}

impl Default for SubscriptionOptions {
    /// CREATE | NON_DURABLE | FAIL_IF_QUIESCING | MANAGED
    fn default() -> Self {
        Self {
            create: true,
            durable: false,
            managed: true,
            fail_if_quiescing: true,
        }
    }
}
