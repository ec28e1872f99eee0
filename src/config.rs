//! Injected defaults for contracts and clients.
//!
//! Nothing here is global: a [`ServiceContract`](crate::ServiceContract)
//! built with [`ServiceContract::new`](crate::ServiceContract::new) takes
//! [`Defaults::default()`], and one built with
//! [`ServiceContract::with_defaults`](crate::ServiceContract::with_defaults)
//! takes whatever the application loaded. Both types deserialize with every
//! field optional, so they can sit inside an application's own config file.

use std::time::Duration;

use serde::Deserialize;

use crate::codec::DataType;
use crate::contract::Protocol;

/// Network identity and encoding defaults for service contracts.
///
/// | Field | Default |
/// |---|---|
/// | `host` | `"localhost"` |
/// | `port` | `8080` |
/// | `namespace` | `""` |
/// | `version` | `"v0"` |
/// | `protocol` | `Http` |
/// | `encoding` | `Binary` |
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Defaults {
    pub host: String,
    pub port: u16,
    pub namespace: String,
    pub version: String,
    pub protocol: Protocol,
    pub encoding: DataType,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 8080,
            namespace: String::new(),
            version: "v0".to_owned(),
            protocol: Protocol::Http,
            encoding: DataType::Binary,
        }
    }
}

/// Settings for the [`ServiceClient`](crate::ServiceClient)s a service builds
/// for its subscriptions.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Upper bound on one request, send to last body byte. `None` waits
    /// forever. A per-request timeout takes precedence.
    #[serde(with = "millis")]
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(de)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_defaults() {
        let d = Defaults::default();
        assert_eq!(d.host, "localhost");
        assert_eq!(d.port, 8080);
        assert_eq!(d.namespace, "");
        assert_eq!(d.version, "v0");
        assert_eq!(d.protocol, Protocol::Http);
        assert_eq!(d.encoding, DataType::Binary);
    }

    #[test]
    fn partial_config_keeps_remaining_defaults() {
        let d: Defaults =
            serde_json::from_str(r#"{ "host": "svc.internal", "encoding": "json" }"#).unwrap();
        assert_eq!(d.host, "svc.internal");
        assert_eq!(d.encoding, DataType::Json);
        assert_eq!(d.port, 8080);
    }

    #[test]
    fn client_timeout_is_read_in_millis() {
        let c: ClientConfig = serde_json::from_str(r#"{ "timeout": 1500 }"#).unwrap();
        assert_eq!(c.timeout, Some(Duration::from_millis(1500)));
        let none: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(none.timeout, None);
    }
}
