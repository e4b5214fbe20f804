//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use derive_new::new;
use ipnetwork::Ipv4Network;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::arm::ArmDb;
use crate::queue::QueueDepths;
use crate::tags::PacketTags;

// Occupancy threshold above which an egress is considered congested and
// skipped by the selector. Tunable.
pub const CONGESTION_OCCUPANCY_MAX: f64 = 0.75;

// Remaining-budget slack below which a packet is promoted to the priority
// lane for its remaining hops. Tunable.
pub const PRIORITY_PROMOTION_SLACK_US: u32 = 20;

// Per-packet route selection mode. The control plane is identical across
// modes; only the per-hop decision differs.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SelectorMode {
    #[default]
    Shortest,
    KShortest,
    Ecmp,
    BudgetAware,
    Bandit,
}

// One next-hop candidate for a destination.
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
pub struct Candidate {
    // Egress interface index.
    pub ifindex: u32,
    // Next-hop address.
    pub gateway: Ipv4Addr,
    // Lower-bound cost from this router to the destination via this egress,
    // in microseconds.
    pub cost: u32,
    // Resolved ingress interface on the adjacent router, when known.
    pub next_iface: Option<u32>,
    // Administrative status of the egress interface.
    pub up: bool,
}

// The selector's verdict for one packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Choice {
    pub ifindex: u32,
    pub gateway: Ipv4Addr,
    pub cost: u32,
}

// Immutable forwarding view published by the control plane after each SPF
// run and read through snapshot handles on the forwarding path.
#[derive(Debug, Default)]
pub struct ForwardingSnapshot {
    pub routes: BTreeMap<Ipv4Network, Vec<Candidate>>,
}

// Per-packet route selector.
#[derive(Debug)]
pub struct Selector {
    mode: SelectorMode,
    rng: SmallRng,
    // Packets dropped for lack of a feasible route.
    no_route_drops: u64,
}

// ===== impl SelectorMode =====

impl std::str::FromStr for SelectorMode {
    type Err = ();

    fn from_str(s: &str) -> Result<SelectorMode, Self::Err> {
        match s {
            "shortest" => Ok(SelectorMode::Shortest),
            "kshort" => Ok(SelectorMode::KShortest),
            "ecmp" => Ok(SelectorMode::Ecmp),
            "budget_aware" => Ok(SelectorMode::BudgetAware),
            "bandit" => Ok(SelectorMode::Bandit),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for SelectorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectorMode::Shortest => write!(f, "shortest"),
            SelectorMode::KShortest => write!(f, "kshort"),
            SelectorMode::Ecmp => write!(f, "ecmp"),
            SelectorMode::BudgetAware => write!(f, "budget_aware"),
            SelectorMode::Bandit => write!(f, "bandit"),
        }
    }
}

// ===== impl ForwardingSnapshot =====

impl ForwardingSnapshot {
    // Returns the candidate set of the most specific prefix covering the
    // destination.
    pub fn candidates(&self, destination: Ipv4Addr) -> Option<&[Candidate]> {
        self.routes
            .iter()
            .filter(|(prefix, _)| prefix.contains(destination))
            .max_by_key(|(prefix, _)| prefix.prefix())
            .map(|(_, candidates)| candidates.as_slice())
    }
}

// ===== impl Selector =====

impl Selector {
    // Creates a selector. A fixed seed makes the random stream reproducible;
    // without one the stream is seeded from the OS.
    pub fn new(mode: SelectorMode, seed: Option<u64>) -> Selector {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        Selector {
            mode,
            rng,
            no_route_drops: 0,
        }
    }

    pub fn no_route_drops(&self) -> u64 {
        self.no_route_drops
    }

    // Picks the egress for one packet and updates its tags.
    //
    // `local_queues` maps each egress ifindex to its lane counters;
    // `remote_lanes` carries the latest one-hop telemetry keyed by
    // (egress ifindex, adjacent router's ingress ifindex). Returns `None`
    // when no feasible candidate survives; the caller drops the packet.
    pub fn select(
        &mut self,
        destination: Ipv4Addr,
        candidates: &[Candidate],
        tags: &mut PacketTags,
        now_us: u64,
        local_queues: &BTreeMap<u32, QueueDepths>,
        remote_lanes: &BTreeMap<(u32, u32), f64>,
        arms: &mut ArmDb,
    ) -> Option<Choice> {
        let remaining_budget = tags.remaining_budget(now_us);

        // 1. Filter by feasibility.
        let mut survivors = candidates
            .iter()
            .filter(|candidate| candidate.up)
            .filter(|candidate| match remaining_budget {
                Some(remaining) => candidate.cost <= remaining,
                None => true,
            })
            .filter(|candidate| match tags.distance {
                Some(distance) => candidate.cost <= distance,
                None => true,
            })
            .collect::<Vec<_>>();

        // 2. Filter by local congestion, unless no candidates would remain.
        let uncongested = survivors
            .iter()
            .filter(|candidate| {
                match local_queues.get(&candidate.ifindex) {
                    Some(depths) => {
                        depths.priority_occupancy()
                            < CONGESTION_OCCUPANCY_MAX
                    }
                    None => true,
                }
            })
            .copied()
            .collect::<Vec<_>>();
        if !uncongested.is_empty() {
            survivors = uncongested;
        }

        // 3. Filter by one-hop congestion when telemetry is known.
        let uncongested = survivors
            .iter()
            .filter(|candidate| {
                let Some(next_iface) = candidate.next_iface else {
                    return true;
                };
                match remote_lanes.get(&(candidate.ifindex, next_iface)) {
                    Some(occupancy) => {
                        *occupancy < CONGESTION_OCCUPANCY_MAX
                    }
                    None => true,
                }
            })
            .copied()
            .collect::<Vec<_>>();
        if !uncongested.is_empty() {
            survivors = uncongested;
        }

        // 4. Choose among the survivors.
        if survivors.is_empty() {
            self.no_route_drops += 1;
            debug!(%destination, "no feasible route");
            return None;
        }
        let chosen = if survivors.len() == 1 {
            survivors[0]
        } else {
            match self.mode {
                SelectorMode::Shortest => *survivors
                    .iter()
                    .min_by_key(|candidate| {
                        (candidate.cost, candidate.ifindex)
                    })
                    .unwrap(),
                SelectorMode::KShortest
                | SelectorMode::Ecmp
                | SelectorMode::BudgetAware => {
                    survivors[self.rng.random_range(0..survivors.len())]
                }
                SelectorMode::Bandit => {
                    let ifindexes = survivors
                        .iter()
                        .map(|candidate| candidate.ifindex)
                        .collect::<Vec<_>>();
                    let index =
                        arms.select(destination, &ifindexes, &mut self.rng);
                    survivors[index]
                }
            }
        };

        // 5. Update tags.
        tags.distance = Some(match tags.distance {
            Some(distance) => distance.max(chosen.cost),
            None => chosen.cost,
        });
        if let Some(remaining) = remaining_budget
            && remaining.saturating_sub(chosen.cost)
                <= PRIORITY_PROMOTION_SLACK_US
        {
            tags.priority = true;
        }

        Some(Choice {
            ifindex: chosen.ifindex,
            gateway: chosen.gateway,
            cost: chosen.cost,
        })
    }
}
