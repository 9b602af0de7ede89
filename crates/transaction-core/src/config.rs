//! Transaction layer configuration.

use serde::{Deserialize, Serialize};

use crate::message::{Method, SIP_VERSION};
use crate::timer::TimerSettings;

/// Settings shared by every transaction a [`TransactionRegistry`](crate::registry::TransactionRegistry) creates.
///
/// ```
/// use sipmesh_transaction_core::{Method, TransactionConfig};
///
/// let config = TransactionConfig::default()
///     .with_user_agent("edge-proxy/1.0")
///     .with_supported_method(Method::Subscribe);
/// assert!(config.supports_method(&Method::Subscribe));
/// assert!(config.supports_scheme("SIPS"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    pub timers: TimerSettings,
    /// Methods accepted on new requests; others are answered with 405.
    pub supported_methods: Vec<Method>,
    /// Request-URI schemes accepted; others are answered with 416.
    pub supported_schemes: Vec<String>,
    /// Accepted protocol version; others are answered with 505.
    pub sip_version: String,
    /// Value of the `Server` header on generated responses.
    pub user_agent: Option<String>,
    /// Capacity of the channel transactions report events on.
    pub event_channel_capacity: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timers: TimerSettings::default(),
            supported_methods: vec![
                Method::Invite,
                Method::Ack,
                Method::Bye,
                Method::Cancel,
                Method::Register,
                Method::Options,
                Method::Info,
                Method::Update,
                Method::Message,
                Method::Notify,
                Method::Refer,
            ],
            supported_schemes: vec!["sip".to_string(), "sips".to_string()],
            sip_version: SIP_VERSION.to_string(),
            user_agent: None,
            event_channel_capacity: 100,
        }
    }
}

impl TransactionConfig {
    pub fn with_timers(mut self, timers: TimerSettings) -> Self {
        self.timers = timers;
        self
    }

    pub fn with_supported_method(mut self, method: Method) -> Self {
        if !self.supported_methods.contains(&method) {
            self.supported_methods.push(method);
        }
        self
    }

    pub fn with_supported_methods(mut self, methods: Vec<Method>) -> Self {
        self.supported_methods = methods;
        self
    }

    pub fn with_supported_scheme(mut self, scheme: impl Into<String>) -> Self {
        let scheme = scheme.into().to_ascii_lowercase();
        if !self.supported_schemes.contains(&scheme) {
            self.supported_schemes.push(scheme);
        }
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    pub fn supports_method(&self, method: &Method) -> bool {
        self.supported_methods.contains(method)
    }

    pub fn supports_scheme(&self, scheme: &str) -> bool {
        self.supported_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme))
    }

    pub fn supports_version(&self, version: &str) -> bool {
        self.sip_version.eq_ignore_ascii_case(version)
    }
}
