use serde::Deserialize;

use herald_core::error::{HeraldError, Result};
use herald_core::protocol::channel::{validate_namespace, validate_prefix};

use crate::policy::NamespaceAllowlist;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    pub version: u32,

    pub relay: RelaySection,

    #[serde(default)]
    pub auth: Option<AuthSection>,

    #[serde(default)]
    pub transport: TransportSection,

    #[serde(default)]
    pub ops: OpsSection,
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(HeraldError::UnsupportedVersion);
        }
        self.relay.validate()?;
        if let Some(auth) = &self.auth {
            auth.validate()?;
        }
        self.transport.validate()?;
        self.ops.validate()?;
        Ok(())
    }
}

/// How the relay learns which namespaces exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationMode {
    /// Discover namespaces from announcements on the control channel.
    #[default]
    Handshake,
    /// Subscribe to a fixed namespace list at startup.
    Static,
}

/// How handler invocations are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Await each handler in delivery order.
    #[default]
    Sequential,
    /// Run each handler on its own task; no ordering between deliveries.
    Spawned,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    pub prefix: String,

    #[serde(default)]
    pub mode: RegistrationMode,

    #[serde(default)]
    pub namespaces: Vec<String>,

    #[serde(default)]
    pub handshake_allowlist: Vec<String>,

    #[serde(default)]
    pub dispatch: DispatchMode,
}

impl RelaySection {
    /// Static-mode settings for the given namespaces.
    pub fn fixed(prefix: impl Into<String>, namespaces: &[&str]) -> Self {
        Self {
            prefix: prefix.into(),
            mode: RegistrationMode::Static,
            namespaces: namespaces.iter().map(|s| s.to_string()).collect(),
            handshake_allowlist: Vec::new(),
            dispatch: DispatchMode::Sequential,
        }
    }

    /// Handshake-mode settings.
    pub fn discover(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            mode: RegistrationMode::Handshake,
            namespaces: Vec::new(),
            handshake_allowlist: Vec::new(),
            dispatch: DispatchMode::Sequential,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_prefix(&self.prefix)?;
        match self.mode {
            RegistrationMode::Static => {
                if self.namespaces.is_empty() {
                    return Err(HeraldError::Config(
                        "relay.namespaces must not be empty in static mode".into(),
                    ));
                }
                for ns in &self.namespaces {
                    validate_namespace(ns)
                        .map_err(|e| HeraldError::Config(format!("relay.namespaces: {e}")))?;
                }
                if !self.handshake_allowlist.is_empty() {
                    return Err(HeraldError::Config(
                        "relay.handshake_allowlist only applies to handshake mode".into(),
                    ));
                }
            }
            RegistrationMode::Handshake => {
                if !self.namespaces.is_empty() {
                    return Err(HeraldError::Config(
                        "relay.namespaces only applies to static mode".into(),
                    ));
                }
                NamespaceAllowlist::compile(&self.handshake_allowlist)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    /// JWS algorithm name (`EdDSA`, `RS256`, `ES256`, `HS256`, ...).
    pub algorithm: String,

    #[serde(default)]
    pub public_key_pem: Option<String>,

    #[serde(default)]
    pub public_key_file: Option<String>,

    /// Shared secret, HS* algorithms only.
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default)]
    pub audience: Option<String>,

    #[serde(default)]
    pub issuer: Option<String>,

    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
}

impl AuthSection {
    pub fn validate(&self) -> Result<()> {
        let sources = [
            self.public_key_pem.is_some(),
            self.public_key_file.is_some(),
            self.secret.is_some(),
        ]
        .iter()
        .filter(|s| **s)
        .count();
        if sources != 1 {
            return Err(HeraldError::Config(
                "auth needs exactly one of public_key_pem, public_key_file, secret".into(),
            ));
        }

        let hmac = self.algorithm.starts_with("HS");
        if self.secret.is_some() != hmac {
            return Err(HeraldError::Config(format!(
                "auth.secret is only valid with HS* algorithms (got {})",
                self.algorithm
            )));
        }
        if self.leeway_secs > 300 {
            return Err(HeraldError::Config(
                "auth.leeway_secs must be at most 300".into(),
            ));
        }
        Ok(())
    }
}

fn default_leeway_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Memory,
    Redis,
    Nats,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Memory => "memory",
            TransportKind::Redis => "redis",
            TransportKind::Nats => "nats",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportSection {
    #[serde(default)]
    pub kind: TransportKind,

    /// Broker URL; defaults to the local broker of the selected kind.
    #[serde(default)]
    pub url: Option<String>,

    /// NATS auth token. Redis credentials belong in the URL.
    #[serde(default)]
    pub token: Option<String>,
}

impl TransportSection {
    pub fn validate(&self) -> Result<()> {
        if self.token.is_some() && self.kind != TransportKind::Nats {
            return Err(HeraldError::Config(
                "transport.token only applies to kind = nats".into(),
            ));
        }
        if self.url.is_some() && self.kind == TransportKind::Memory {
            return Err(HeraldError::Config(
                "transport.url does not apply to kind = memory".into(),
            ));
        }
        Ok(())
    }

    /// Configured URL or the default for `kind`.
    pub fn endpoint(&self) -> &str {
        match (&self.url, self.kind) {
            (Some(url), _) => url,
            (None, TransportKind::Redis) => "redis://127.0.0.1:6379",
            (None, TransportKind::Nats) => "nats://127.0.0.1:4222",
            (None, TransportKind::Memory) => "",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpsSection {
    #[serde(default = "default_ops_listen")]
    pub listen: String,
}

impl Default for OpsSection {
    fn default() -> Self {
        Self {
            listen: default_ops_listen(),
        }
    }
}

impl OpsSection {
    pub fn validate(&self) -> Result<()> {
        self.listen
            .parse::<std::net::SocketAddr>()
            .map_err(|e| HeraldError::Config(format!("ops.listen is not a socket address: {e}")))?;
        Ok(())
    }
}

fn default_ops_listen() -> String {
    "0.0.0.0:9090".into()
}

/// Publisher construction inputs.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublisherSettings {
    pub namespace: String,
    pub prefix: String,
    /// Announce the namespace on the control channel before the first publish.
    #[serde(default)]
    pub handshake: bool,
}

impl PublisherSettings {
    pub fn new(namespace: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            prefix: prefix.into(),
            handshake: false,
        }
    }

    pub fn with_handshake(mut self) -> Self {
        self.handshake = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_prefix(&self.prefix)?;
        validate_namespace(&self.namespace)
    }
}
