//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use derive_new::new;
use ipnetwork::Ipv4Network;
use romam_forwarding::selector::{Candidate, ForwardingSnapshot};

use crate::config::CoreConfig;
use crate::debug::Debug;
use crate::error::Error;
use crate::interface::Interfaces;
use crate::lsdb::Lsdb;
use crate::neighbor::Neighbors;
use crate::southbound::RouteInstaller;
use crate::spf::{ForestRoute, SpfRoute};

// Resolved route next hop.
#[derive(Clone, Copy, Debug, Eq, new, Ord, PartialEq, PartialOrd)]
pub struct Nexthop {
    pub addr: Ipv4Addr,
    pub ifindex: u32,
}

// Desired forwarding entry for one destination prefix.
#[derive(Clone, Debug, Eq, new, PartialEq)]
pub struct RouteEntry {
    pub prefix: Ipv4Network,
    pub nexthops: BTreeSet<Nexthop>,
    pub metric: u32,
    pub table: u8,
}

// Route information base: the desired forwarding state derived from the
// latest SPF run, and the snapshot of what was last accepted by the
// installer. The two are reconciled after every SPF run.
#[derive(Debug, Default)]
pub struct Rib {
    desired: BTreeMap<Ipv4Network, RouteEntry>,
    installed: BTreeMap<Ipv4Network, RouteEntry>,
}

// ===== impl Rib =====

impl Rib {
    pub fn set_desired(&mut self, desired: BTreeMap<Ipv4Network, RouteEntry>) {
        self.desired = desired;
    }

    pub fn desired(&self) -> &BTreeMap<Ipv4Network, RouteEntry> {
        &self.desired
    }

    pub fn installed(&self) -> &BTreeMap<Ipv4Network, RouteEntry> {
        &self.installed
    }

    // Reconciles the desired state against the installer. Replaces happen
    // before deletes so active flows migrate rather than blackhole. A failed
    // replace leaves the prefix out of the installed snapshot and a failed
    // delete leaves it in, so the next reconcile retries either way; other
    // routes are unaffected.
    pub async fn reconcile(&mut self, installer: &RouteInstaller) {
        for (prefix, entry) in &self.desired {
            if self.installed.get(prefix) == Some(entry) {
                continue;
            }
            match installer.replace(entry).await {
                Ok(()) => {
                    Debug::RouteReplace(entry).log();
                    self.installed.insert(*prefix, entry.clone());
                }
                Err(error) => Error::InstallError(*prefix, error).log(),
            }
        }

        let stale = self
            .installed
            .keys()
            .filter(|prefix| !self.desired.contains_key(*prefix))
            .copied()
            .collect::<Vec<_>>();
        for prefix in stale {
            let entry = &self.installed[&prefix];
            match installer.delete(entry).await {
                Ok(()) => {
                    Debug::RouteDelete(&prefix).log();
                    self.installed.remove(&prefix);
                }
                Err(error) => Error::InstallError(prefix, error).log(),
            }
        }
    }

    // Best-effort withdrawal of everything installed, used at shutdown.
    pub async fn withdraw_all(&mut self, installer: &RouteInstaller) {
        self.desired.clear();
        self.reconcile(installer).await;
    }
}

// ===== global functions =====

// Derives the desired forwarding state from the SPF output and the prefixes
// advertised by each reachable LSA. Only entries whose first hop resolves to
// a currently live neighbor are emitted; locally advertised prefixes are
// skipped.
pub fn desired_routes(
    config: &CoreConfig,
    spf_routes: &BTreeMap<Ipv4Addr, SpfRoute>,
    lsdb: &Lsdb,
    neighbors: &Neighbors,
    local_prefixes: &BTreeSet<Ipv4Network>,
    ecmp: bool,
) -> BTreeMap<Ipv4Network, RouteEntry> {
    let mut desired = BTreeMap::new();

    for (router_id, spf_route) in spf_routes {
        let Some(lsa) = lsdb.get(router_id) else {
            continue;
        };

        // Resolve the first hops to live neighbors.
        let mut nexthops: BTreeSet<_> = spf_route
            .first_hops
            .iter()
            .filter_map(|first_hop| neighbors.get(first_hop))
            .map(|nbr| Nexthop::new(nbr.addr, nbr.ifindex))
            .collect();
        if nexthops.is_empty() {
            continue;
        }
        if !ecmp {
            // Single-path: keep the numerically smallest next hop.
            let first = *nexthops.iter().next().unwrap();
            nexthops = BTreeSet::from([first]);
        }

        for prefix in &lsa.prefixes {
            if local_prefixes.contains(prefix) {
                continue;
            }

            let entry = RouteEntry::new(
                *prefix,
                nexthops.clone(),
                config.route_metric_base + spf_route.cost,
                config.route_table,
            );

            // With overlapping advertisements the lowest metric wins.
            match desired.get(prefix) {
                Some(RouteEntry { metric, .. }) if *metric <= entry.metric => {}
                _ => {
                    desired.insert(*prefix, entry);
                }
            }
        }
    }

    desired
}

// Builds the forwarding view published to the data path: for each remote
// prefix, the full equal-cost candidate set with resolved egress and
// administrative status.
pub fn forwarding_snapshot(
    spf_routes: &BTreeMap<Ipv4Addr, SpfRoute>,
    lsdb: &Lsdb,
    neighbors: &Neighbors,
    interfaces: &Interfaces,
    local_prefixes: &BTreeSet<Ipv4Network>,
) -> ForwardingSnapshot {
    let mut snapshot = ForwardingSnapshot::default();

    for (router_id, spf_route) in spf_routes {
        let Some(lsa) = lsdb.get(router_id) else {
            continue;
        };

        let candidates = spf_route
            .first_hops
            .iter()
            .filter_map(|first_hop| neighbors.get(first_hop))
            .filter_map(|nbr| {
                let iface = interfaces.get_by_ifindex(nbr.ifindex)?;
                Some(Candidate::new(
                    nbr.ifindex,
                    nbr.addr,
                    spf_route.cost,
                    None,
                    iface.enabled,
                ))
            })
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            continue;
        }

        for prefix in &lsa.prefixes {
            if local_prefixes.contains(prefix) {
                continue;
            }

            // With overlapping advertisements the lowest cost wins.
            match snapshot.routes.get(prefix) {
                Some(existing)
                    if existing
                        .iter()
                        .map(|candidate| candidate.cost)
                        .min()
                        <= Some(spf_route.cost) => {}
                _ => {
                    snapshot.routes.insert(*prefix, candidates.clone());
                }
            }
        }
    }

    snapshot
}

// Builds the forwarding view from the shortest-path forest instead of the
// SPF output: every live neighbor contributes its best path per
// destination, so candidates of different costs coexist and the
// deadline-aware selector has real alternatives to filter.
pub fn forwarding_snapshot_forest(
    forest: &BTreeMap<Ipv4Addr, Vec<ForestRoute>>,
    lsdb: &Lsdb,
    neighbors: &Neighbors,
    interfaces: &Interfaces,
    local_prefixes: &BTreeSet<Ipv4Network>,
) -> ForwardingSnapshot {
    let mut snapshot = ForwardingSnapshot::default();

    for (router_id, paths) in forest {
        let Some(lsa) = lsdb.get(router_id) else {
            continue;
        };

        let candidates = paths
            .iter()
            .filter_map(|path| {
                let nbr = neighbors.get(&path.first_hop)?;
                let iface = interfaces.get_by_ifindex(nbr.ifindex)?;
                Some(Candidate::new(
                    nbr.ifindex,
                    nbr.addr,
                    path.cost,
                    None,
                    iface.enabled,
                ))
            })
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            continue;
        }

        for prefix in &lsa.prefixes {
            if local_prefixes.contains(prefix) {
                continue;
            }
            snapshot.routes.entry(*prefix).or_insert_with(|| candidates.clone());
        }
    }

    snapshot
}
