//! Pure assembly of a [`NebulaConfig`] from already-resolved inputs.
//!
//! Everything that needs a repository lookup (token validation, CA
//! selection, cert issuance, peer-lighthouse discovery) happens upstream in
//! the HTTP handler; this module only transcribes already-fetched data into
//! the wire shape, so it can be exhaustively unit tested without a running
//! store.

use std::net::Ipv4Addr;

use nebula_core::{Ca, FirewallDirection, FirewallRule, GlobalSettings, Node};

use crate::paths::paths_for;
use crate::yaml::{Firewall, FirewallRuleYaml, Lighthouse, Listen, NebulaConfig, Pki, Punchy, Relay, Tun};

/// One peer lighthouse's address, already resolved from its primary
/// `IpAssignment` and `Node.public_ip`.
#[derive(Debug, Clone, Copy)]
pub struct LighthouseEntry {
    /// Overlay (Nebula) address.
    pub overlay_ip: Ipv4Addr,
    /// Public address nodes dial to reach it.
    pub public_ip: Ipv4Addr,
}

/// Everything [`build_config`] needs, already resolved by the caller.
pub struct ConfigInputs<'a> {
    /// The requesting node.
    pub node: &'a Node,
    /// The node's negotiated overlay address.
    pub primary_ip: Ipv4Addr,
    /// CA bundle to inline, already filtered for client compatibility.
    pub ca_bundle: &'a [Ca],
    /// The freshly issued or reused host certificate PEM.
    pub cert_pem: &'a str,
    /// Fingerprints of active, revoked certs.
    pub blocklist: Vec<String>,
    /// Other lighthouses with a `public_ip` set, excluding the requester.
    pub peer_lighthouses: &'a [LighthouseEntry],
    /// Firewall rules from every ruleset attached to the node.
    pub firewall_rules: &'a [FirewallRule],
    pub global: &'a GlobalSettings,
}

/// Assembles the document returned by `/v1/client/config` (spec §4.3 steps
/// 7-11).
#[must_use]
pub fn build_config(inputs: &ConfigInputs<'_>) -> NebulaConfig {
    let paths = paths_for(inputs.node.os_type);

    let static_host_map = inputs
        .peer_lighthouses
        .iter()
        .map(|lh| (lh.overlay_ip.to_string(), vec![format!("{}:{}", lh.public_ip, inputs.global.lighthouse_port)]))
        .collect();

    let lighthouse_hosts: Vec<String> = if inputs.node.is_lighthouse {
        Vec::new()
    } else {
        inputs.peer_lighthouses.iter().map(|lh| lh.overlay_ip.to_string()).collect()
    };

    let firewall = emit_firewall(inputs.firewall_rules);

    let punchy = inputs.global.punchy_enabled.then(Punchy::default);

    NebulaConfig {
        pki: Pki {
            ca: inputs.ca_bundle.iter().map(|ca| ca.cert_pem.as_str()).collect::<Vec<_>>().join("\n"),
            cert: inputs.cert_pem.to_string(),
            key: paths.key.to_string(),
            blocklist: inputs.blocklist.clone(),
            disconnect_invalid: true,
        },
        static_host_map,
        listen: Listen { host: "0.0.0.0".to_string(), port: inputs.global.lighthouse_port },
        lighthouse: Lighthouse { am_lighthouse: inputs.node.is_lighthouse, hosts: lighthouse_hosts.clone(), interval: 60 },
        tun: Tun::default(),
        firewall,
        punchy,
        relay: Relay {
            am_relay: inputs.node.is_lighthouse,
            use_relays: !inputs.node.is_lighthouse,
            relays: lighthouse_hosts,
        },
    }
}

fn emit_firewall(rules: &[FirewallRule]) -> Firewall {
    if rules.is_empty() {
        let allow_any = FirewallRuleYaml {
            port: "any".to_string(),
            proto: "any".to_string(),
            host: None,
            cidr: None,
            local_cidr: None,
            ca_name: None,
            ca_sha: None,
            group: None,
            groups: Vec::new(),
        };
        return Firewall { inbound: vec![allow_any.clone()], outbound: vec![allow_any] };
    }

    let mut inbound = Vec::new();
    let mut outbound = Vec::new();
    for rule in rules {
        let yaml_rule = FirewallRuleYaml {
            port: rule.port.clone(),
            proto: proto_str(rule.proto).to_string(),
            host: rule.host.clone(),
            cidr: rule.cidr.map(|c| c.to_string()),
            local_cidr: rule.local_cidr.map(|c| c.to_string()),
            ca_name: rule.ca_name.clone(),
            ca_sha: rule.ca_sha.clone(),
            group: rule.group.clone(),
            groups: rule.groups.clone(),
        };
        match rule.direction {
            FirewallDirection::Inbound => inbound.push(yaml_rule),
            FirewallDirection::Outbound => outbound.push(yaml_rule),
        }
    }
    Firewall { inbound, outbound }
}

fn proto_str(proto: nebula_core::FirewallProto) -> &'static str {
    match proto {
        nebula_core::FirewallProto::Tcp => "tcp",
        nebula_core::FirewallProto::Udp => "udp",
        nebula_core::FirewallProto::Icmp => "icmp",
        nebula_core::FirewallProto::Any => "any",
    }
}
