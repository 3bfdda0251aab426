//! Protocol identifiers (§3.3, §6.1).
//!
//! `/dep/sys/<name>/<ver>` is unauthenticated infra, `/dep/realm/<id>/<name>/<ver>`
//! and `/dep/app/<id>/<name>/<ver>` require realm membership. The scope is
//! carried as a typed enum rather than re-parsed on every check.

use std::fmt;

use crate::error::ProtocolError;
use crate::realm::RealmId;

/// Well-known system protocol: stream-level hole-punch coordination (§4.8.3).
pub const PROTO_HOLEPUNCH: &str = "/dep/sys/holepunch/1.0";
/// Well-known system protocol: AutoNAT dial-back (§4.7).
pub const PROTO_AUTONAT: &str = "/dep/sys/autonat/1.0";
/// Well-known system protocol: peer identify exchange.
pub const PROTO_IDENTIFY: &str = "/dep/sys/identify/1.0";
/// Relay hop protocol (client <-> relay, circuit setup).
pub const PROTO_RELAY_HOP: &str = "/dep/relay/1.0/hop";
/// Relay stop protocol (relay <-> destination).
pub const PROTO_RELAY_STOP: &str = "/dep/relay/1.0/stop";

/// A protocol identifier, scoped to system, realm, or application level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProtocolId {
    /// `/dep/sys/<name>/<ver>` — unauthenticated infrastructure protocol.
    System { name: String, version: String },
    /// `/dep/realm/<realm_id>/<name>/<ver>` — requires realm membership.
    Realm {
        realm_id: RealmId,
        name: String,
        version: String,
    },
    /// `/dep/app/<realm_id>/<name>/<ver>` — application protocol inside a realm.
    App {
        realm_id: RealmId,
        name: String,
        version: String,
    },
}

impl ProtocolId {
    /// Build a system-scoped protocol id.
    pub fn system(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::System {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Build a realm-scoped (system) protocol id, e.g. realm auth.
    pub fn realm(realm_id: RealmId, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::Realm {
            realm_id,
            name: name.into(),
            version: version.into(),
        }
    }

    /// Build an application-scoped protocol id.
    pub fn app(realm_id: RealmId, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::App {
            realm_id,
            name: name.into(),
            version: version.into(),
        }
    }

    /// Whether this protocol requires the caller to be a realm member (§4.12.2).
    pub fn requires_membership(&self) -> bool {
        !matches!(self, ProtocolId::System { .. })
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolId::System { name, version } => write!(f, "/dep/sys/{name}/{version}"),
            ProtocolId::Realm {
                realm_id,
                name,
                version,
            } => write!(f, "/dep/realm/{realm_id}/{name}/{version}"),
            ProtocolId::App {
                realm_id,
                name,
                version,
            } => write!(f, "/dep/app/{realm_id}/{name}/{version}"),
        }
    }
}

impl std::str::FromStr for ProtocolId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').filter(|p| !p.is_empty()).collect();
        match parts.as_slice() {
            ["dep", "sys", name, version] => Ok(ProtocolId::System {
                name: name.to_string(),
                version: version.to_string(),
            }),
            ["dep", "realm", realm_id, name, version] => Ok(ProtocolId::Realm {
                realm_id: realm_id
                    .parse()
                    .map_err(|_| ProtocolError::InvalidProtocolId(s.to_string()))?,
                name: name.to_string(),
                version: version.to_string(),
            }),
            ["dep", "app", realm_id, name, version] => Ok(ProtocolId::App {
                realm_id: realm_id
                    .parse()
                    .map_err(|_| ProtocolError::InvalidProtocolId(s.to_string()))?,
                name: name.to_string(),
                version: version.to_string(),
            }),
            _ => Err(ProtocolError::InvalidProtocolId(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::Psk;

    #[test]
    fn system_roundtrip() {
        let p = ProtocolId::system("identify", "1.0");
        assert_eq!(p.to_string(), "/dep/sys/identify/1.0");
        let parsed: ProtocolId = p.to_string().parse().unwrap();
        assert_eq!(p, parsed);
        assert!(!p.requires_membership());
    }

    #[test]
    fn realm_scoped_requires_membership() {
        let realm_id = RealmId::derive(&Psk::new([1u8; 32]));
        let p = ProtocolId::realm(realm_id, "auth", "1.0");
        assert!(p.requires_membership());
        let s = p.to_string();
        let parsed: ProtocolId = s.parse().unwrap();
        assert_eq!(p, parsed);
    }

    #[test]
    fn rejects_malformed() {
        assert!("/dep/sys/onlyname".parse::<ProtocolId>().is_err());
        assert!("/other/sys/name/1.0".parse::<ProtocolId>().is_err());
    }
}
