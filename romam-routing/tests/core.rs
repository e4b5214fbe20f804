//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::time::Duration;

use const_addrs::{ip4, net4};
use romam_routing::config::{ConfigError, CoreConfig, IfaceSelection};
use romam_routing::lsdb::{Lsdb, LsaInstall};
use romam_routing::neighbor::{self, HelloOutcome, Neighbors};
use romam_routing::packet::{LinkAdvert, LsaAdvert};
use romam_routing::route;
use romam_routing::southbound::RouteInstaller;
use romam_routing::spf;
use tokio::sync::mpsc;

//
// Helper functions.
//

fn lsa(
    router_id: &str,
    seq: u32,
    links: &[(&str, u32)],
    prefixes: &[&str],
) -> LsaAdvert {
    LsaAdvert::new(
        router_id.parse().unwrap(),
        seq,
        links
            .iter()
            .map(|(neighbor, cost)| {
                LinkAdvert::new(neighbor.parse().unwrap(), *cost)
            })
            .collect(),
        prefixes.iter().map(|prefix| prefix.parse().unwrap()).collect(),
    )
}

// Builds the LSDB of a three-node line A-B-C with unit costs.
fn line_lsdb() -> Lsdb {
    let mut lsdb = Lsdb::default();
    lsdb.install(lsa(
        "1.1.1.1",
        1,
        &[("2.2.2.2", 1)],
        &["10.0.1.1/32"],
    ));
    lsdb.install(lsa(
        "2.2.2.2",
        1,
        &[("1.1.1.1", 1), ("3.3.3.3", 1)],
        &["10.0.2.1/32"],
    ));
    lsdb.install(lsa(
        "3.3.3.3",
        1,
        &[("2.2.2.2", 1)],
        &["10.0.3.1/32"],
    ));
    lsdb
}

async fn neighbors_with(entries: &[(&str, &str, u32)]) -> Neighbors {
    let (nbr_timeoutp, _nbr_timeoutc) = mpsc::channel(4);
    let mut neighbors = Neighbors::default();
    for (router_id, addr, ifindex) in entries {
        neighbor::on_hello(
            &mut neighbors,
            router_id.parse().unwrap(),
            addr.parse().unwrap(),
            *ifindex,
            Duration::from_secs(4),
            &nbr_timeoutp,
        );
    }
    neighbors
}

//
// LSDB tests.
//

#[test]
fn lsdb_sequence_monotonicity() {
    let mut lsdb = Lsdb::default();

    assert_eq!(
        lsdb.install(lsa("1.1.1.1", 7, &[], &[])),
        LsaInstall::InstalledNew
    );
    assert_eq!(
        lsdb.install(lsa("1.1.1.1", 5, &[], &[])),
        LsaInstall::RejectedOlderOrEqual
    );
    assert_eq!(lsdb.get(&ip4!("1.1.1.1")).unwrap().seq, 7);
}

#[test]
fn lsdb_equal_sequence_is_idempotent() {
    let mut lsdb = Lsdb::default();

    lsdb.install(lsa("1.1.1.1", 3, &[("2.2.2.2", 1)], &[]));
    assert_eq!(
        lsdb.install(lsa("1.1.1.1", 3, &[], &[])),
        LsaInstall::RejectedOlderOrEqual
    );
    // The stored copy is untouched by the rejected install.
    assert_eq!(lsdb.get(&ip4!("1.1.1.1")).unwrap().links.len(), 1);
}

#[test]
fn lsdb_accepts_newer() {
    let mut lsdb = Lsdb::default();

    lsdb.install(lsa("1.1.1.1", 3, &[], &[]));
    assert_eq!(
        lsdb.install(lsa("1.1.1.1", 4, &[], &[])),
        LsaInstall::InstalledNewer
    );
}

#[test]
fn lsdb_wraparound_prefers_larger() {
    let mut lsdb = Lsdb::default();

    lsdb.install(lsa("1.1.1.1", 10, &[], &[]));
    assert_eq!(
        lsdb.install(lsa("1.1.1.1", u32::MAX, &[], &[])),
        LsaInstall::InstalledNewer
    );
}

//
// SPF tests.
//

#[tokio::test]
async fn spf_line_topology() {
    let lsdb = line_lsdb();
    let neighbors = neighbors_with(&[("2.2.2.2", "10.0.12.2", 7)]).await;

    let routes = spf::compute(ip4!("1.1.1.1"), &lsdb, &neighbors);

    let b = &routes[&ip4!("2.2.2.2")];
    assert_eq!(b.cost, 1);
    assert_eq!(b.first_hops, BTreeSet::from([ip4!("2.2.2.2")]));
    let c = &routes[&ip4!("3.3.3.3")];
    assert_eq!(c.cost, 2);
    assert_eq!(c.first_hops, BTreeSet::from([ip4!("2.2.2.2")]));
}

#[tokio::test]
async fn spf_is_deterministic() {
    let lsdb = line_lsdb();
    let neighbors = neighbors_with(&[("2.2.2.2", "10.0.12.2", 7)]).await;

    let first = spf::compute(ip4!("1.1.1.1"), &lsdb, &neighbors);
    let second = spf::compute(ip4!("1.1.1.1"), &lsdb, &neighbors);
    assert_eq!(first, second);
}

#[tokio::test]
async fn spf_merges_equal_cost_first_hops() {
    // Diamond: A-B-D and A-C-D, unit costs everywhere.
    let mut lsdb = Lsdb::default();
    lsdb.install(lsa(
        "1.1.1.1",
        1,
        &[("2.2.2.2", 1), ("3.3.3.3", 1)],
        &[],
    ));
    lsdb.install(lsa(
        "2.2.2.2",
        1,
        &[("1.1.1.1", 1), ("4.4.4.4", 1)],
        &[],
    ));
    lsdb.install(lsa(
        "3.3.3.3",
        1,
        &[("1.1.1.1", 1), ("4.4.4.4", 1)],
        &[],
    ));
    lsdb.install(lsa(
        "4.4.4.4",
        1,
        &[("2.2.2.2", 1), ("3.3.3.3", 1)],
        &["10.0.4.1/32"],
    ));
    let neighbors = neighbors_with(&[
        ("2.2.2.2", "10.0.12.2", 7),
        ("3.3.3.3", "10.0.13.3", 8),
    ])
    .await;

    let routes = spf::compute(ip4!("1.1.1.1"), &lsdb, &neighbors);
    let d = &routes[&ip4!("4.4.4.4")];
    assert_eq!(d.cost, 2);
    assert_eq!(
        d.first_hops,
        BTreeSet::from([ip4!("2.2.2.2"), ip4!("3.3.3.3")])
    );
}

#[test]
fn spf_omits_unreachable_first_hops() {
    // No live neighbors: everything is omitted.
    let lsdb = line_lsdb();
    let neighbors = Neighbors::default();

    let routes = spf::compute(ip4!("1.1.1.1"), &lsdb, &neighbors);
    assert!(routes.is_empty());
}

#[test]
fn spf_ignores_self_links() {
    let mut lsdb = Lsdb::default();
    lsdb.install(lsa(
        "1.1.1.1",
        1,
        &[("1.1.1.1", 1)],
        &[],
    ));

    let routes =
        spf::compute(ip4!("1.1.1.1"), &lsdb, &Neighbors::default());
    assert!(routes.is_empty());
}

#[tokio::test]
async fn forest_keeps_one_path_per_neighbor() {
    // Diamond with unequal branches: A-B-D costs 1+2, A-C-D costs 1+4.
    let mut lsdb = Lsdb::default();
    lsdb.install(lsa(
        "1.1.1.1",
        1,
        &[("2.2.2.2", 1), ("3.3.3.3", 1)],
        &[],
    ));
    lsdb.install(lsa(
        "2.2.2.2",
        1,
        &[("1.1.1.1", 1), ("4.4.4.4", 2)],
        &[],
    ));
    lsdb.install(lsa(
        "3.3.3.3",
        1,
        &[("1.1.1.1", 1), ("4.4.4.4", 4)],
        &[],
    ));
    lsdb.install(lsa(
        "4.4.4.4",
        1,
        &[("2.2.2.2", 2), ("3.3.3.3", 4)],
        &["10.0.4.0/24"],
    ));
    let neighbors = neighbors_with(&[
        ("2.2.2.2", "10.0.12.2", 7),
        ("3.3.3.3", "10.0.13.3", 8),
    ])
    .await;

    let forest = spf::compute_forest(ip4!("1.1.1.1"), &lsdb, &neighbors);

    // Both branches survive toward D, with their distinct costs. The plain
    // SPF output would keep only the cost-3 path.
    let mut d_paths = forest[&ip4!("4.4.4.4")].clone();
    d_paths.sort_by_key(|path| path.cost);
    assert_eq!(d_paths.len(), 2);
    assert_eq!((d_paths[0].first_hop, d_paths[0].cost), (ip4!("2.2.2.2"), 3));
    assert_eq!((d_paths[1].first_hop, d_paths[1].cost), (ip4!("3.3.3.3"), 5));

    // The detour toward B through C never doubles back through A.
    let mut b_paths = forest[&ip4!("2.2.2.2")].clone();
    b_paths.sort_by_key(|path| path.cost);
    assert_eq!((b_paths[0].first_hop, b_paths[0].cost), (ip4!("2.2.2.2"), 1));
    assert_eq!((b_paths[1].first_hop, b_paths[1].cost), (ip4!("3.3.3.3"), 7));
}

//
// RIB tests.
//

#[tokio::test]
async fn rib_line_topology_routes() {
    let config = CoreConfig::parse("router_id=1.1.1.1").unwrap();
    let lsdb = line_lsdb();
    let neighbors = neighbors_with(&[("2.2.2.2", "10.0.12.2", 7)]).await;
    let local_prefixes = BTreeSet::from([net4!("10.0.1.1/32")]);

    let spf_routes = spf::compute(config.router_id, &lsdb, &neighbors);
    let desired = route::desired_routes(
        &config,
        &spf_routes,
        &lsdb,
        &neighbors,
        &local_prefixes,
        false,
    );

    // A's desired RIB contains C's loopback via B with cost 2.
    let c_loopback = &desired[&net4!("10.0.3.1/32")];
    assert_eq!(c_loopback.metric, config.route_metric_base + 2);
    let nexthop = c_loopback.nexthops.iter().next().unwrap();
    assert_eq!(nexthop.addr, ip4!("10.0.12.2"));
    assert_eq!(nexthop.ifindex, 7);

    // B's loopback with cost 1; our own loopback is not programmed.
    assert_eq!(
        desired[&net4!("10.0.2.1/32")].metric,
        config.route_metric_base + 1
    );
    assert!(!desired.contains_key(&net4!("10.0.1.1/32")));
}

#[tokio::test]
async fn rib_reconcile_and_withdraw() {
    let config = CoreConfig::parse("router_id=1.1.1.1").unwrap();
    let installer = RouteInstaller::dry_run();
    let lsdb = line_lsdb();
    let neighbors = neighbors_with(&[("2.2.2.2", "10.0.12.2", 7)]).await;
    let local_prefixes = BTreeSet::from([net4!("10.0.1.1/32")]);

    let spf_routes = spf::compute(config.router_id, &lsdb, &neighbors);
    let desired = route::desired_routes(
        &config,
        &spf_routes,
        &lsdb,
        &neighbors,
        &local_prefixes,
        false,
    );

    let mut rib = route::Rib::default();
    rib.set_desired(desired.clone());
    rib.reconcile(&installer).await;
    assert_eq!(*rib.installed(), desired);

    // Running the same reconcile again changes nothing.
    rib.set_desired(desired.clone());
    rib.reconcile(&installer).await;
    assert_eq!(*rib.installed(), desired);

    // Link failure: the neighbor is gone, every route is withdrawn.
    let neighbors = Neighbors::default();
    let spf_routes = spf::compute(config.router_id, &lsdb, &neighbors);
    let desired = route::desired_routes(
        &config,
        &spf_routes,
        &lsdb,
        &neighbors,
        &local_prefixes,
        false,
    );
    assert!(desired.is_empty());
    rib.set_desired(desired);
    rib.reconcile(&installer).await;
    assert!(rib.installed().is_empty());
}

//
// Neighbor tests.
//

#[tokio::test]
async fn neighbor_up_refresh_expire() {
    let (nbr_timeoutp, _nbr_timeoutc) = mpsc::channel(4);
    let mut neighbors = Neighbors::default();
    let dead_interval = Duration::from_millis(1);

    let outcome = neighbor::on_hello(
        &mut neighbors,
        ip4!("2.2.2.2"),
        ip4!("10.0.12.2"),
        7,
        dead_interval,
        &nbr_timeoutp,
    );
    assert_eq!(outcome, HelloOutcome::Up);
    let last_seen = neighbors[&ip4!("2.2.2.2")].last_seen;

    let outcome = neighbor::on_hello(
        &mut neighbors,
        ip4!("2.2.2.2"),
        ip4!("10.0.12.2"),
        7,
        dead_interval,
        &nbr_timeoutp,
    );
    assert_eq!(outcome, HelloOutcome::Refresh);
    assert!(neighbors[&ip4!("2.2.2.2")].last_seen >= last_seen);

    // A refreshed neighbor is not evicted by a stale timer message.
    assert!(
        neighbor::expire(
            &mut neighbors,
            ip4!("2.2.2.2"),
            Duration::from_secs(60)
        )
        .is_none()
    );

    // Past the dead interval the neighbor goes away.
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(
        neighbor::expire(&mut neighbors, ip4!("2.2.2.2"), dead_interval)
            .is_some()
    );
    assert!(neighbors.is_empty());
}

//
// Configuration tests.
//

#[test]
fn config_full_parse() {
    let config = CoreConfig::parse(
        "\
# control plane
router_id = 1.1.1.1
loopback = 10.0.1.1/32
iface = eth0
iface = eth1
iface_cost = eth1:5
prefix = 192.168.10.0/24
multicast = 239.255.0.2:5001
hello_interval_ms = 500
dead_interval_ms = 2000
lsa_interval_ms = 7500
route_table = 100
route_metric_base = 50
selector = budget_aware
queue_priority_kb = 100
queue_best_effort_kb = 1000
service_rate_mbps = 10
ecmp_seed = 42
",
    )
    .unwrap();

    assert_eq!(config.router_id, ip4!("1.1.1.1"));
    assert_eq!(config.loopback, Some(net4!("10.0.1.1/32")));
    assert_eq!(
        config.ifaces,
        IfaceSelection::Names(vec!["eth0".to_owned(), "eth1".to_owned()])
    );
    assert_eq!(config.iface_costs["eth1"], 5);
    assert_eq!(config.prefixes, vec![net4!("192.168.10.0/24")]);
    assert_eq!(*config.multicast.ip(), ip4!("239.255.0.2"));
    assert_eq!(config.multicast.port(), 5001);
    assert_eq!(config.hello_interval, Duration::from_millis(500));
    assert_eq!(config.dead_interval, Duration::from_millis(2000));
    assert_eq!(config.lsa_interval, Duration::from_millis(7500));
    assert_eq!(config.route_table, 100);
    assert_eq!(config.route_metric_base, 50);
    assert_eq!(config.queue_priority_bytes, 100 * 1024);
    assert_eq!(config.queue_best_effort_bytes, 1000 * 1024);
    assert_eq!(config.service_rate_bps, 10_000_000);
    assert_eq!(config.ecmp_seed, Some(42));
}

#[test]
fn config_defaults() {
    let config = CoreConfig::parse("router_id=1.1.1.1\niface=auto").unwrap();

    assert_eq!(config.ifaces, IfaceSelection::Auto);
    assert_eq!(*config.multicast.ip(), ip4!("239.255.0.1"));
    assert_eq!(config.multicast.port(), 5000);
    assert_eq!(config.hello_interval, Duration::from_millis(1000));
    assert_eq!(config.dead_interval, Duration::from_millis(4000));
    assert_eq!(config.route_table, 254);
}

#[test]
fn config_errors() {
    assert!(matches!(
        CoreConfig::parse("iface=auto"),
        Err(ConfigError::MissingKey("router_id"))
    ));
    assert!(matches!(
        CoreConfig::parse("router_id=not-an-address"),
        Err(ConfigError::InvalidValue(..))
    ));
    assert!(matches!(
        CoreConfig::parse("router_id=1.1.1.1\nloopback=10.0.1.1/24"),
        Err(ConfigError::InvalidValue(..))
    ));
    assert!(matches!(
        CoreConfig::parse("router_id=1.1.1.1\nmulticast=10.0.0.1:5000"),
        Err(ConfigError::InvalidValue(..))
    ));
    assert!(matches!(
        CoreConfig::parse("router_id=1.1.1.1\nbogus=1"),
        Err(ConfigError::UnknownKey(..))
    ));
    assert!(matches!(
        CoreConfig::parse("router_id=1.1.1.1\nno equals sign"),
        Err(ConfigError::MalformedLine(..))
    ));
}

//
// Sequence scenario from the wire: inject 7 then 5, the LSDB returns 7.
//

#[test]
fn sequence_injection_scenario() {
    let mut lsdb = Lsdb::default();
    lsdb.install(lsa("9.9.9.9", 7, &[], &["10.9.9.9/32"]));
    lsdb.install(lsa("9.9.9.9", 5, &[], &[]));

    let stored = lsdb.get(&ip4!("9.9.9.9")).unwrap();
    assert_eq!(stored.seq, 7);
    assert_eq!(stored.prefixes, vec![net4!("10.9.9.9/32")]);
}
