//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use romam_utils::Sender;
use romam_utils::task::TimeoutTask;

use crate::debug::Debug;
use crate::tasks;
use crate::tasks::messages::input::NbrTimeoutMsg;

// A neighbor is keyed by its router id rather than by address, so a remote
// router reachable over multiple interfaces is a single adjacency. The
// ingress ifindex and the source address double as the resolved next hop
// during route programming.
#[derive(Debug)]
pub struct Neighbor {
    // Neighbor's router id.
    pub router_id: Ipv4Addr,
    // Neighbor's source address.
    pub addr: Ipv4Addr,
    // Ingress interface index.
    pub ifindex: u32,
    // Time the most recent hello was received from this neighbor.
    pub last_seen: Instant,
    // Time the adjacency was first established.
    pub discovered_at: DateTime<Utc>,
    // Dead-interval timeout (refreshed whenever a hello is received).
    pub dead_timer: TimeoutTask,
}

// Neighbor table, keyed by router id.
pub type Neighbors = BTreeMap<Ipv4Addr, Neighbor>;

// Outcome of processing one hello.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HelloOutcome {
    Up,
    Refresh,
}

// ===== impl Neighbor =====

impl Neighbor {
    fn new(
        router_id: Ipv4Addr,
        addr: Ipv4Addr,
        ifindex: u32,
        dead_interval: Duration,
        nbr_timeoutp: &Sender<NbrTimeoutMsg>,
    ) -> Neighbor {
        Debug::NbrUp(&router_id).log();

        let dead_timer =
            tasks::nbr_dead_timeout(router_id, dead_interval, nbr_timeoutp);

        Neighbor {
            router_id,
            addr,
            ifindex,
            last_seen: Instant::now(),
            discovered_at: Utc::now(),
            dead_timer,
        }
    }
}

// ===== global functions =====

// Creates or refreshes a neighbor upon hello receipt. `last_seen` only ever
// moves forward.
pub fn on_hello(
    neighbors: &mut Neighbors,
    router_id: Ipv4Addr,
    addr: Ipv4Addr,
    ifindex: u32,
    dead_interval: Duration,
    nbr_timeoutp: &Sender<NbrTimeoutMsg>,
) -> HelloOutcome {
    match neighbors.entry(router_id) {
        btree_map::Entry::Occupied(o) => {
            let nbr = o.into_mut();
            nbr.addr = addr;
            nbr.ifindex = ifindex;
            nbr.last_seen = Instant::now();
            nbr.dead_timer.reset(Some(dead_interval));
            Debug::NbrRefresh(&router_id).log();
            HelloOutcome::Refresh
        }
        btree_map::Entry::Vacant(v) => {
            let nbr =
                Neighbor::new(router_id, addr, ifindex, dead_interval, nbr_timeoutp);
            v.insert(nbr);
            HelloOutcome::Up
        }
    }
}

// Evicts the neighbor whose dead timer fired, unless a hello refreshed it
// after the timer message was posted.
pub fn expire(
    neighbors: &mut Neighbors,
    router_id: Ipv4Addr,
    dead_interval: Duration,
) -> Option<Neighbor> {
    let nbr = neighbors.get(&router_id)?;
    if nbr.last_seen.elapsed() <= dead_interval {
        return None;
    }

    Debug::NbrDown(&router_id).log();
    neighbors.remove(&router_id)
}
