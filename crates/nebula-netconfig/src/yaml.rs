//! The emitted Nebula YAML document (spec §6's schema), as serde types.
//!
//! `serde_yaml` chooses the block-literal `|` style for multi-line strings
//! on its own, which is what makes this safe for whitespace-sensitive PEM
//! data; see `pki_round_trips_multiline_pem_verbatim` below.

use std::collections::BTreeMap;

use serde::Serialize;

/// `pki:` section: inline CA bundle and cert, key path, revocation list.
#[derive(Debug, Clone, Serialize)]
pub struct Pki {
    /// Concatenated CA PEMs, newline-joined.
    pub ca: String,
    /// The node's host certificate PEM (two concatenated PEMs for hybrid).
    pub cert: String,
    /// OS-specific path the agent has written the private key to.
    pub key: String,
    /// Fingerprints of certs to reject even if otherwise valid.
    pub blocklist: Vec<String>,
    /// Always `true`: a blocklisted peer must not connect.
    pub disconnect_invalid: bool,
}

/// `listen:` section.
#[derive(Debug, Clone, Serialize)]
pub struct Listen {
    /// Always `0.0.0.0`; Nebula doesn't bind config controls this finely.
    pub host: String,
    /// The server's configured lighthouse port.
    pub port: u16,
}

/// `lighthouse:` section.
#[derive(Debug, Clone, Serialize)]
pub struct Lighthouse {
    /// Whether the requesting node is itself a lighthouse.
    pub am_lighthouse: bool,
    /// Peer lighthouse overlay IPs; empty when `am_lighthouse`.
    pub hosts: Vec<String>,
    /// Handshake retry interval in seconds, fixed at 60.
    pub interval: u32,
}

/// `tun:` section. Every field is a fixed default; spec §6 names no
/// per-node override.
#[derive(Debug, Clone, Serialize)]
pub struct Tun {
    pub disabled: bool,
    pub drop_local_broadcast: bool,
    pub drop_multicast: bool,
    pub tx_queue: u32,
    pub mtu: u32,
}

impl Default for Tun {
    fn default() -> Self {
        Self { disabled: false, drop_local_broadcast: false, drop_multicast: false, tx_queue: 500, mtu: 1300 }
    }
}

/// One compiled firewall rule, a near-literal transcription of
/// [`nebula_core::FirewallRule`].
#[derive(Debug, Clone, Serialize)]
pub struct FirewallRuleYaml {
    pub port: String,
    pub proto: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_cidr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub groups: Vec<String>,
}

/// `firewall:` section, partitioned by direction.
#[derive(Debug, Clone, Serialize)]
pub struct Firewall {
    pub inbound: Vec<FirewallRuleYaml>,
    pub outbound: Vec<FirewallRuleYaml>,
}

/// `punchy:` section, only present when `GlobalSettings.punchy_enabled`.
#[derive(Debug, Clone, Serialize)]
pub struct Punchy {
    pub punch: bool,
    pub punch_back: bool,
    pub respond: bool,
    pub delay: String,
    pub respond_delay: String,
}

impl Default for Punchy {
    fn default() -> Self {
        Self {
            punch: true,
            punch_back: true,
            respond: true,
            delay: "1s".to_string(),
            respond_delay: "5s".to_string(),
        }
    }
}

/// `relay:` section.
#[derive(Debug, Clone, Serialize)]
pub struct Relay {
    pub am_relay: bool,
    pub use_relays: bool,
    pub relays: Vec<String>,
}

/// The full document handed to a node in `POST /v1/client/config`.
#[derive(Debug, Clone, Serialize)]
pub struct NebulaConfig {
    pub pki: Pki,
    pub static_host_map: BTreeMap<String, Vec<String>>,
    pub listen: Listen,
    pub lighthouse: Lighthouse,
    pub tun: Tun,
    pub firewall: Firewall,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub punchy: Option<Punchy>,
    pub relay: Relay,
}

impl NebulaConfig {
    /// Render to the YAML text a node agent writes to disk.
    ///
    /// # Errors
    /// Only if `serde_yaml` itself fails, which doesn't happen for this
    /// fixed, non-cyclic shape; kept fallible to match the crate's other
    /// serialization boundaries.
    pub fn to_yaml(&self) -> nebula_error::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NebulaConfig {
        NebulaConfig {
            pki: Pki {
                ca: "-----BEGIN CERT-----\nline one\nline two\n-----END CERT-----\n".to_string(),
                cert: "-----BEGIN CERT-----\nhost\n-----END CERT-----\n".to_string(),
                key: "/etc/nebula/host.key".to_string(),
                blocklist: vec!["abc123".to_string()],
                disconnect_invalid: true,
            },
            static_host_map: BTreeMap::new(),
            listen: Listen { host: "0.0.0.0".to_string(), port: 4242 },
            lighthouse: Lighthouse { am_lighthouse: false, hosts: vec!["10.0.0.1".to_string()], interval: 60 },
            tun: Tun::default(),
            firewall: Firewall {
                inbound: vec![FirewallRuleYaml {
                    port: "any".to_string(),
                    proto: "any".to_string(),
                    host: None,
                    cidr: None,
                    local_cidr: None,
                    ca_name: None,
                    ca_sha: None,
                    group: None,
                    groups: Vec::new(),
                }],
                outbound: Vec::new(),
            },
            punchy: None,
            relay: Relay { am_relay: false, use_relays: true, relays: vec!["10.0.0.1".to_string()] },
        }
    }

    #[test]
    fn pki_round_trips_multiline_pem_verbatim() {
        let config = sample();
        let text = config.to_yaml().unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
        let ca = parsed["pki"]["ca"].as_str().unwrap();
        assert_eq!(ca, config.pki.ca);
    }

    #[test]
    fn omitted_punchy_does_not_appear_in_the_document() {
        let text = sample().to_yaml().unwrap();
        assert!(!text.contains("punchy"));
    }

    #[test]
    fn empty_optional_firewall_fields_are_omitted() {
        let text = sample().to_yaml().unwrap();
        assert!(!text.contains("host: null"));
        assert!(!text.contains("groups: []"));
    }
}
