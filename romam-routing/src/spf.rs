//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use derive_new::new;

use crate::debug::Debug;
use crate::lsdb::Lsdb;
use crate::neighbor::Neighbors;

// SPF working vertex.
#[derive(Debug, new)]
pub struct Vertex {
    pub id: Ipv4Addr,
    pub distance: u32,
    pub hops: u16,
    #[new(default)]
    pub first_hops: BTreeSet<Ipv4Addr>,
}

// Per-destination SPF result: total cost plus the set of equal-cost first
// hops (the "all candidates" view consumed by ECMP and the forwarding-path
// selector). Single-path consumers pick the smallest first hop.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SpfRoute {
    pub cost: u32,
    pub first_hops: BTreeSet<Ipv4Addr>,
}

// One path of the shortest-path forest: the best path toward a destination
// whose first hop is a particular neighbor. Unlike the SPF output, the
// forest keeps one entry per live neighbor, so a destination can carry
// candidates of different costs for the deadline-aware selector to choose
// among.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ForestRoute {
    pub first_hop: Ipv4Addr,
    pub cost: u32,
}

// ===== global functions =====

// Runs Dijkstra's algorithm over the LSDB-derived graph rooted at the local
// router.
//
// Vertices are the router ids appearing in any LSA; the edges of a vertex
// are the link advertisements of that vertex's own LSA, so a router known
// only through someone else's links contributes no outgoing edges. Self
// links are ignored. Destinations whose first hop doesn't resolve to a
// currently live neighbor are omitted: the LSDB may be transiently
// asymmetric.
pub fn compute(
    root: Ipv4Addr,
    lsdb: &Lsdb,
    neighbors: &Neighbors,
) -> BTreeMap<Ipv4Addr, SpfRoute> {
    Debug::SpfStart.log();

    // Initialize SPT and candidate list.
    let mut spt: BTreeMap<Ipv4Addr, Vertex> = BTreeMap::new();
    let mut cand_list: BTreeMap<(u32, Ipv4Addr), Vertex> = BTreeMap::new();
    cand_list.insert((0, root), Vertex::new(root, 0, 0));

    // Main SPF loop.
    while let Some(((_, vertex_id), vertex)) = cand_list.pop_first() {
        // Add vertex to SPT.
        spt.insert(vertex.id, vertex);
        let vertex = &spt[&vertex_id];

        // A vertex with no LSA of its own has no outgoing edges.
        let Some(lsa) = lsdb.get(&vertex.id) else {
            continue;
        };

        // Iterate over all links described by the vertex's LSA.
        for link in &lsa.links {
            // Ignore self links.
            if link.neighbor == vertex.id {
                continue;
            }

            // Check if the link's vertex is already on the shortest-path tree.
            if spt.contains_key(&link.neighbor) {
                continue;
            }

            // Calculate distance to the link's vertex.
            let distance = vertex.distance.saturating_add(link.cost);
            let hops = vertex.hops.saturating_add(1);

            // A vertex relaxed directly from the root takes the link's
            // neighbor as its first hop; deeper vertices inherit the first
            // hops of their parent.
            let first_hops = if vertex.id == root {
                BTreeSet::from([link.neighbor])
            } else {
                vertex.first_hops.clone()
            };

            // Check if this vertex is already present on the candidate list.
            if let Some((cand_key, cand_v)) = cand_list
                .iter_mut()
                .find(|(_, cand_v)| cand_v.id == link.neighbor)
            {
                match distance.cmp(&cand_v.distance) {
                    Ordering::Less => {
                        // Remove vertex since its key has changed. It will be
                        // re-added with the correct key below.
                        let cand_key = *cand_key;
                        cand_list.remove(&cand_key);
                    }
                    Ordering::Equal => {
                        // Equal-cost path: merge the first-hop sets.
                        cand_v.first_hops.extend(first_hops);
                        continue;
                    }
                    Ordering::Greater => {
                        // Ignore higher cost path.
                        continue;
                    }
                }
            }
            let cand_v = cand_list
                .entry((distance, link.neighbor))
                .or_insert_with(|| Vertex::new(link.neighbor, distance, hops));
            cand_v.first_hops.extend(first_hops);
        }
    }

    // Build the routing output, dropping the root and every destination
    // without a live first hop.
    let routes: BTreeMap<_, _> = spt
        .into_values()
        .filter(|vertex| vertex.id != root)
        .filter_map(|vertex| {
            let first_hops: BTreeSet<_> = vertex
                .first_hops
                .into_iter()
                .filter(|first_hop| neighbors.contains_key(first_hop))
                .collect();
            if first_hops.is_empty() {
                return None;
            }
            Some((
                vertex.id,
                SpfRoute {
                    cost: vertex.distance,
                    first_hops,
                },
            ))
        })
        .collect();

    Debug::SpfDone(routes.len()).log();
    routes
}

// Computes the shortest-path forest: for every live neighbor, the best path
// to each destination whose first hop is that neighbor, with the root
// excluded as a transit vertex so a candidate can never double back through
// this router.
pub fn compute_forest(
    root: Ipv4Addr,
    lsdb: &Lsdb,
    neighbors: &Neighbors,
) -> BTreeMap<Ipv4Addr, Vec<ForestRoute>> {
    let mut forest: BTreeMap<Ipv4Addr, Vec<ForestRoute>> = BTreeMap::new();

    let Some(root_lsa) = lsdb.get(&root) else {
        return forest;
    };

    for first_hop in neighbors.keys() {
        // Cost of the root's own link toward this neighbor.
        let Some(edge_cost) = root_lsa
            .links
            .iter()
            .filter(|link| link.neighbor == *first_hop)
            .map(|link| link.cost)
            .min()
        else {
            continue;
        };

        for (dest, distance) in
            shortest_distances(*first_hop, lsdb, root)
        {
            if dest == root {
                continue;
            }
            forest.entry(dest).or_default().push(ForestRoute {
                first_hop: *first_hop,
                cost: edge_cost.saturating_add(distance),
            });
        }
    }

    forest
}

// Plain single-source shortest distances over the LSDB graph, with one
// vertex excluded from transit.
fn shortest_distances(
    source: Ipv4Addr,
    lsdb: &Lsdb,
    excluded: Ipv4Addr,
) -> BTreeMap<Ipv4Addr, u32> {
    let mut settled: BTreeMap<Ipv4Addr, u32> = BTreeMap::new();
    let mut cand_list: BTreeMap<(u32, Ipv4Addr), u32> = BTreeMap::new();
    cand_list.insert((0, source), 0);

    while let Some(((_, vertex_id), distance)) = cand_list.pop_first() {
        settled.insert(vertex_id, distance);

        let Some(lsa) = lsdb.get(&vertex_id) else {
            continue;
        };
        for link in &lsa.links {
            if link.neighbor == vertex_id || link.neighbor == excluded {
                continue;
            }
            if settled.contains_key(&link.neighbor) {
                continue;
            }

            let distance = distance.saturating_add(link.cost);
            if let Some((cand_key, cand_dist)) = cand_list
                .iter()
                .find(|((_, id), _)| *id == link.neighbor)
                .map(|(key, dist)| (*key, *dist))
            {
                if distance >= cand_dist {
                    continue;
                }
                cand_list.remove(&cand_key);
            }
            cand_list.insert((distance, link.neighbor), distance);
        }
    }

    settled
}
