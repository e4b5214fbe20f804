//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap};

use ipnetwork::Ipv4Network;
use nix::net::if_::InterfaceFlags;

use crate::config::{CoreConfig, IfaceSelection};
use crate::debug::Debug;

// Default administrative cost of an interface.
pub const COST_DFLT: u32 = 1;

// One participating interface.
#[derive(Debug)]
pub struct Interface {
    // Interface name.
    pub name: String,
    // System interface index.
    pub ifindex: u32,
    // Assigned address and mask.
    pub addr: Ipv4Network,
    // Administrative cost.
    pub cost: u32,
    // Administrative status.
    pub enabled: bool,
}

// Participating interfaces, addressable by name and by system index.
#[derive(Debug, Default)]
pub struct Interfaces {
    ifaces: Vec<Interface>,
    name_tree: BTreeMap<String, usize>,
    ifindex_tree: HashMap<u32, usize>,
}

// ===== impl Interfaces =====

impl Interfaces {
    pub fn insert(&mut self, iface: Interface) {
        Debug::InterfaceStart(&iface.name, iface.ifindex).log();

        let slot = self.ifaces.len();
        self.name_tree.insert(iface.name.clone(), slot);
        self.ifindex_tree.insert(iface.ifindex, slot);
        self.ifaces.push(iface);
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Interface> {
        self.name_tree.get(name).map(|slot| &self.ifaces[*slot])
    }

    pub fn get_by_ifindex(&self, ifindex: u32) -> Option<&Interface> {
        self.ifindex_tree
            .get(&ifindex)
            .map(|slot| &self.ifaces[*slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> + '_ {
        self.ifaces.iter()
    }

    pub fn len(&self) -> usize {
        self.ifaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ifaces.is_empty()
    }
}

// ===== global functions =====

// Resolves the configured interface selection against the system's interface
// table. Loopback interfaces are skipped under `auto`; interfaces without an
// IPv4 address are skipped always.
pub(crate) fn discover(
    config: &CoreConfig,
) -> Result<Interfaces, std::io::Error> {
    let mut interfaces = Interfaces::default();

    for ifaddr in nix::ifaddrs::getifaddrs()? {
        let name = ifaddr.interface_name.clone();

        match &config.ifaces {
            IfaceSelection::Auto => {
                if ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK) {
                    continue;
                }
            }
            IfaceSelection::Names(names) => {
                if !names.contains(&name) {
                    continue;
                }
            }
        }
        if interfaces.get_by_name(&name).is_some() {
            continue;
        }

        // Keep interfaces with an assigned IPv4 address only.
        let Some(addr) = ifaddr
            .address
            .as_ref()
            .and_then(|addr| addr.as_sockaddr_in())
            .map(|addr| addr.ip())
        else {
            continue;
        };
        let plen = ifaddr
            .netmask
            .as_ref()
            .and_then(|mask| mask.as_sockaddr_in())
            .map(|mask| u32::from(mask.ip()).count_ones() as u8)
            .unwrap_or(32);
        let addr = Ipv4Network::new(addr, plen)
            .expect("netmask always yields a valid prefix length");

        let ifindex = nix::net::if_::if_nametoindex(name.as_str())?;
        let cost = config
            .iface_costs
            .get(&name)
            .copied()
            .unwrap_or(COST_DFLT);
        let enabled = ifaddr.flags.contains(InterfaceFlags::IFF_UP);

        interfaces.insert(Interface {
            name,
            ifindex,
            addr,
            cost,
            enabled,
        });
    }

    Ok(interfaces)
}
