//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use ipnetwork::Ipv4Network;
use romam_forwarding::selector::SelectorMode;
use romam_utils::ip::Ipv4NetworkExt;

// Typed configuration consumed by the daemon core, loaded from a
// line-oriented `key=value` text file. `#` comments and blank lines are
// ignored. Every parse failure is fatal at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    // Local router id.
    pub router_id: Ipv4Addr,
    // Loopback prefix advertised as local.
    pub loopback: Option<Ipv4Network>,
    // Participating interfaces.
    pub ifaces: IfaceSelection,
    // Per-interface cost overrides.
    pub iface_costs: BTreeMap<String, u32>,
    // Additional prefixes to advertise.
    pub prefixes: Vec<Ipv4Network>,
    // Control-plane multicast group.
    pub multicast: SocketAddrV4,
    // Hello emission period.
    pub hello_interval: Duration,
    // Neighbor eviction threshold.
    pub dead_interval: Duration,
    // Self-LSA re-origination period.
    pub lsa_interval: Duration,
    // Installer's table id.
    pub route_table: u8,
    // Added to the SPF cost when computing the install metric.
    pub route_metric_base: u32,
    // Forwarding-path selection mode.
    pub selector: SelectorMode,
    // Priority lane capacity in bytes.
    pub queue_priority_bytes: usize,
    // Best-effort lane capacity in bytes.
    pub queue_best_effort_bytes: usize,
    // Egress service rate in bits per second, used for queue delay
    // estimation.
    pub service_rate_bps: u64,
    // Fixed seed for the ECMP/bandit random stream.
    pub ecmp_seed: Option<u64>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IfaceSelection {
    // Enumerate all non-loopback interfaces.
    Auto,
    // Explicit interface names.
    Names(Vec<String>),
}

// Configuration errors, all fatal at startup.
#[derive(Debug)]
pub enum ConfigError {
    Read(std::io::Error),
    MissingKey(&'static str),
    UnknownKey(String),
    InvalidValue(String, String),
    MalformedLine(String),
}

// ===== impl CoreConfig =====

impl CoreConfig {
    pub const DFLT_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 0, 1);
    pub const DFLT_MULTICAST_PORT: u16 = 5000;
    pub const DFLT_HELLO_INTERVAL: Duration = Duration::from_millis(1000);
    pub const DFLT_DEAD_INTERVAL: Duration = Duration::from_millis(4000);
    pub const DFLT_LSA_INTERVAL: Duration = Duration::from_millis(10000);
    pub const DFLT_ROUTE_TABLE: u8 = 254;
    pub const DFLT_ROUTE_METRIC_BASE: u32 = 20;
    pub const DFLT_QUEUE_PRIORITY_BYTES: usize = 250 * 1024;
    pub const DFLT_QUEUE_BEST_EFFORT_BYTES: usize = 2500 * 1024;
    pub const DFLT_SERVICE_RATE_BPS: u64 = 100_000_000;

    pub fn load<P: AsRef<Path>>(path: P) -> Result<CoreConfig, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<CoreConfig, ConfigError> {
        let mut router_id = None;
        let mut loopback = None;
        let mut auto_ifaces = false;
        let mut iface_names = Vec::new();
        let mut iface_costs = BTreeMap::new();
        let mut prefixes = Vec::new();
        let mut multicast = SocketAddrV4::new(
            Self::DFLT_MULTICAST_ADDR,
            Self::DFLT_MULTICAST_PORT,
        );
        let mut hello_interval = Self::DFLT_HELLO_INTERVAL;
        let mut dead_interval = Self::DFLT_DEAD_INTERVAL;
        let mut lsa_interval = Self::DFLT_LSA_INTERVAL;
        let mut route_table = Self::DFLT_ROUTE_TABLE;
        let mut route_metric_base = Self::DFLT_ROUTE_METRIC_BASE;
        let mut selector = SelectorMode::Shortest;
        let mut queue_priority_bytes = Self::DFLT_QUEUE_PRIORITY_BYTES;
        let mut queue_best_effort_bytes = Self::DFLT_QUEUE_BEST_EFFORT_BYTES;
        let mut service_rate_bps = Self::DFLT_SERVICE_RATE_BPS;
        let mut ecmp_seed = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::MalformedLine(line.to_owned()));
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "router_id" => {
                    router_id = Some(parse_value(key, value)?);
                }
                "loopback" => {
                    loopback = Some(parse_prefix(key, value)?);
                }
                "iface" => {
                    if value == "auto" {
                        auto_ifaces = true;
                    } else {
                        iface_names.push(value.to_owned());
                    }
                }
                "iface_cost" => {
                    let Some((name, cost)) = value.split_once(':') else {
                        return Err(invalid(key, value));
                    };
                    let cost: u32 = parse_value(key, cost)?;
                    if cost < 1 {
                        return Err(invalid(key, value));
                    }
                    iface_costs.insert(name.to_owned(), cost);
                }
                "prefix" => {
                    prefixes.push(parse_prefix(key, value)?);
                }
                "multicast" => {
                    let addr: SocketAddrV4 = parse_value(key, value)?;
                    if !addr.ip().is_multicast() {
                        return Err(invalid(key, value));
                    }
                    multicast = addr;
                }
                "hello_interval_ms" => {
                    hello_interval =
                        Duration::from_millis(parse_value(key, value)?);
                }
                "dead_interval_ms" => {
                    dead_interval =
                        Duration::from_millis(parse_value(key, value)?);
                }
                "lsa_interval_ms" => {
                    lsa_interval =
                        Duration::from_millis(parse_value(key, value)?);
                }
                "route_table" => {
                    route_table = parse_value(key, value)?;
                }
                "route_metric_base" => {
                    route_metric_base = parse_value(key, value)?;
                }
                "selector" => {
                    selector = value
                        .parse()
                        .map_err(|_| invalid(key, value))?;
                }
                "queue_priority_kb" => {
                    let kb: usize = parse_value(key, value)?;
                    queue_priority_bytes = kb * 1024;
                }
                "queue_best_effort_kb" => {
                    let kb: usize = parse_value(key, value)?;
                    queue_best_effort_bytes = kb * 1024;
                }
                "service_rate_mbps" => {
                    let mbps: u64 = parse_value(key, value)?;
                    service_rate_bps = mbps * 1_000_000;
                }
                "ecmp_seed" => {
                    ecmp_seed = Some(parse_value(key, value)?);
                }
                _ => {
                    return Err(ConfigError::UnknownKey(key.to_owned()));
                }
            }
        }

        let router_id =
            router_id.ok_or(ConfigError::MissingKey("router_id"))?;
        let ifaces = if auto_ifaces {
            IfaceSelection::Auto
        } else {
            IfaceSelection::Names(iface_names)
        };

        Ok(CoreConfig {
            router_id,
            loopback,
            ifaces,
            iface_costs,
            prefixes,
            multicast,
            hello_interval,
            dead_interval,
            lsa_interval,
            route_table,
            route_metric_base,
            selector,
            queue_priority_bytes,
            queue_best_effort_bytes,
            service_rate_bps,
            ecmp_seed,
        })
    }
}

// ===== impl ConfigError =====

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read(error) => {
                write!(f, "failed to read configuration file: {error}")
            }
            ConfigError::MissingKey(key) => {
                write!(f, "missing required key: {key}")
            }
            ConfigError::UnknownKey(key) => {
                write!(f, "unknown key: {key}")
            }
            ConfigError::InvalidValue(key, value) => {
                write!(f, "invalid value for {key}: {value}")
            }
            ConfigError::MalformedLine(line) => {
                write!(f, "malformed line: {line}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read(error) => Some(error),
            _ => None,
        }
    }
}

// ===== helper functions =====

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue(key.to_owned(), value.to_owned())
}

fn parse_value<T: std::str::FromStr>(
    key: &str,
    value: &str,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value))
}

fn parse_prefix(key: &str, value: &str) -> Result<Ipv4Network, ConfigError> {
    let prefix: Ipv4Network = parse_value(key, value)?;
    if !prefix.is_canonical() {
        return Err(invalid(key, value));
    }
    Ok(prefix)
}
