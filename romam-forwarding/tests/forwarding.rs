//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use bytes::Bytes;
use const_addrs::{ip4, net4};
use rand::SeedableRng;
use romam_forwarding::arm::ArmDb;
use romam_forwarding::path::DataPath;
use romam_forwarding::queue::{Lane, QueuedPacket, TwoLaneQueue};
use romam_forwarding::selector::{
    Candidate, ForwardingSnapshot, Selector, SelectorMode,
};
use romam_forwarding::tags::PacketTags;

//
// Helper functions.
//

fn candidates_3_and_5() -> Vec<Candidate> {
    vec![
        Candidate::new(1, ip4!("10.0.12.2"), 3, None, true),
        Candidate::new(2, ip4!("10.0.13.3"), 5, None, true),
    ]
}

fn tagged(budget_us: Option<u32>) -> PacketTags {
    PacketTags {
        origination_us: Some(0),
        budget_us,
        distance: None,
        priority: false,
    }
}

fn select_once(
    selector: &mut Selector,
    candidates: &[Candidate],
    tags: &mut PacketTags,
) -> Option<u32> {
    let mut arms = ArmDb::default();
    selector
        .select(
            ip4!("10.0.3.1"),
            candidates,
            tags,
            0,
            &BTreeMap::new(),
            &BTreeMap::new(),
            &mut arms,
        )
        .map(|choice| choice.ifindex)
}

//
// Selector tests.
//

#[test]
fn budget_filters_expensive_paths() {
    let mut selector = Selector::new(SelectorMode::BudgetAware, Some(1));

    // Remaining budget 4: only the cost-3 path is feasible.
    for _ in 0..10 {
        let mut tags = tagged(Some(4));
        let ifindex =
            select_once(&mut selector, &candidates_3_and_5(), &mut tags);
        assert_eq!(ifindex, Some(1));
        assert_eq!(tags.distance, Some(3));
    }

    // Remaining budget 2: nothing is feasible, the packet is dropped.
    let mut tags = tagged(Some(2));
    let ifindex =
        select_once(&mut selector, &candidates_3_and_5(), &mut tags);
    assert_eq!(ifindex, None);
    assert_eq!(selector.no_route_drops(), 1);
    // A drop leaves the tags alone.
    assert_eq!(tags, tagged(Some(2)));
}

#[test]
fn unlimited_budget_skips_deadline_filtering() {
    let mut selector = Selector::new(SelectorMode::Shortest, Some(1));

    let mut tags = tagged(None);
    let ifindex =
        select_once(&mut selector, &candidates_3_and_5(), &mut tags);
    assert_eq!(ifindex, Some(1));
    assert!(!tags.priority);
}

#[test]
fn low_slack_promotes_to_priority() {
    let mut selector = Selector::new(SelectorMode::Shortest, Some(1));
    let candidates = vec![Candidate::new(1, ip4!("10.0.12.2"), 20, None, true)];

    // remaining_budget - cost = 15us: promoted.
    let mut tags = tagged(Some(35));
    select_once(&mut selector, &candidates, &mut tags).unwrap();
    assert!(tags.priority);

    // The promoted packet lands in the priority lane on enqueue.
    let mut queue = TwoLaneQueue::new(1024, 1024);
    let lane = queue.enqueue(QueuedPacket {
        tags,
        data: Bytes::from_static(b"payload"),
    });
    assert_eq!(lane, Some(Lane::Priority));

    // Plenty of slack: not promoted.
    let mut tags = tagged(Some(100));
    select_once(&mut selector, &candidates, &mut tags).unwrap();
    assert!(!tags.priority);
}

#[test]
fn ecmp_is_deterministic_under_seed() {
    let candidates = vec![
        Candidate::new(1, ip4!("10.0.12.2"), 3, None, true),
        Candidate::new(2, ip4!("10.0.13.3"), 3, None, true),
    ];

    let picks = |seed| {
        let mut selector = Selector::new(SelectorMode::Ecmp, Some(seed));
        (0..32)
            .map(|_| {
                let mut tags = PacketTags::default();
                select_once(&mut selector, &candidates, &mut tags).unwrap()
            })
            .collect::<Vec<_>>()
    };

    assert_eq!(picks(42), picks(42));
    // Both egresses are actually exercised.
    assert!(picks(42).contains(&1) && picks(42).contains(&2));
}

#[test]
fn shortest_breaks_ties_by_lower_ifindex() {
    let mut selector = Selector::new(SelectorMode::Shortest, Some(1));
    let candidates = vec![
        Candidate::new(9, ip4!("10.0.13.3"), 3, None, true),
        Candidate::new(4, ip4!("10.0.12.2"), 3, None, true),
    ];

    let mut tags = PacketTags::default();
    let ifindex = select_once(&mut selector, &candidates, &mut tags);
    assert_eq!(ifindex, Some(4));
}

#[test]
fn congested_egress_is_skipped() {
    let mut selector = Selector::new(SelectorMode::Ecmp, Some(1));
    let candidates = vec![
        Candidate::new(1, ip4!("10.0.12.2"), 3, None, true),
        Candidate::new(2, ip4!("10.0.13.3"), 3, None, true),
    ];

    // Egress 1's priority lane sits at 80% occupancy.
    let queue1 = TwoLaneQueue::new(1000, 1000);
    let depths1 = queue1.depths();
    depths1.priority_bytes.store(800, Ordering::Relaxed);
    let queue2 = TwoLaneQueue::new(1000, 1000);
    let local_queues =
        BTreeMap::from([(1, depths1), (2, queue2.depths())]);

    let mut arms = ArmDb::default();
    for _ in 0..10 {
        let mut tags = PacketTags::default();
        let choice = selector
            .select(
                ip4!("10.0.3.1"),
                &candidates,
                &mut tags,
                0,
                &local_queues,
                &BTreeMap::new(),
                &mut arms,
            )
            .unwrap();
        assert_eq!(choice.ifindex, 2);
    }
}

#[test]
fn congestion_filter_never_empties_the_candidate_set() {
    let mut selector = Selector::new(SelectorMode::Ecmp, Some(1));
    let candidates = vec![Candidate::new(1, ip4!("10.0.12.2"), 3, None, true)];

    let queue = TwoLaneQueue::new(1000, 1000);
    let depths = queue.depths();
    depths.priority_bytes.store(1000, Ordering::Relaxed);
    let local_queues = BTreeMap::from([(1, depths)]);

    let mut tags = PacketTags::default();
    let mut arms = ArmDb::default();
    let choice = selector.select(
        ip4!("10.0.3.1"),
        &candidates,
        &mut tags,
        0,
        &local_queues,
        &BTreeMap::new(),
        &mut arms,
    );
    assert!(choice.is_some());
}

#[test]
fn remote_congestion_is_honored_when_known() {
    let mut selector = Selector::new(SelectorMode::Ecmp, Some(1));
    let candidates = vec![
        Candidate::new(1, ip4!("10.0.12.2"), 3, Some(11), true),
        Candidate::new(2, ip4!("10.0.13.3"), 3, Some(12), true),
    ];

    let remote = BTreeMap::from([((1, 11), 0.9), ((2, 12), 0.1)]);
    let mut arms = ArmDb::default();
    for _ in 0..10 {
        let mut tags = PacketTags::default();
        let choice = selector
            .select(
                ip4!("10.0.3.1"),
                &candidates,
                &mut tags,
                0,
                &BTreeMap::new(),
                &remote,
                &mut arms,
            )
            .unwrap();
        assert_eq!(choice.ifindex, 2);
    }
}

#[test]
fn down_interfaces_are_excluded() {
    let mut selector = Selector::new(SelectorMode::Shortest, Some(1));
    let candidates = vec![
        Candidate::new(1, ip4!("10.0.12.2"), 3, None, false),
        Candidate::new(2, ip4!("10.0.13.3"), 5, None, true),
    ];

    let mut tags = PacketTags::default();
    let ifindex = select_once(&mut selector, &candidates, &mut tags);
    assert_eq!(ifindex, Some(2));
}

//
// Queue discipline tests.
//

fn packet(priority: bool, size: usize) -> QueuedPacket {
    QueuedPacket {
        tags: PacketTags {
            priority,
            ..Default::default()
        },
        data: Bytes::from(vec![0; size]),
    }
}

#[test]
fn full_priority_lane_tail_drops() {
    let mut queue = TwoLaneQueue::new(10, 1000);

    assert_eq!(queue.enqueue(packet(true, 8)), Some(Lane::Priority));
    // The second packet doesn't fit and is dropped; the best-effort lane is
    // not used as overflow.
    assert_eq!(queue.enqueue(packet(true, 8)), None);
    assert_eq!(queue.drops(), (1, 0));

    let (lane, _) = queue.dequeue().unwrap();
    assert_eq!(lane, Lane::Priority);
    assert!(queue.dequeue().is_none());
}

#[test]
fn dequeue_is_strictly_priority_first() {
    let mut queue = TwoLaneQueue::new(1000, 1000);

    queue.enqueue(packet(false, 100));
    queue.enqueue(packet(true, 10));
    queue.enqueue(packet(false, 100));

    assert_eq!(queue.dequeue().unwrap().0, Lane::Priority);
    assert_eq!(queue.dequeue().unwrap().0, Lane::BestEffort);
    assert_eq!(queue.dequeue().unwrap().0, Lane::BestEffort);
    assert!(queue.dequeue().is_none());
}

#[test]
fn lane_byte_accounting() {
    let mut queue = TwoLaneQueue::new(1000, 1000);
    let depths = queue.depths();

    queue.enqueue(packet(true, 10));
    queue.enqueue(packet(false, 100));
    assert_eq!(depths.priority_bytes.load(Ordering::Relaxed), 10);
    assert_eq!(depths.best_effort_bytes.load(Ordering::Relaxed), 100);
    assert_eq!(depths.total_bytes(), 110);

    queue.dequeue();
    queue.dequeue();
    assert_eq!(depths.total_bytes(), 0);
}

//
// Arm value tests.
//

#[test]
fn arms_bootstrap_uniformly_and_track_pulls() {
    let mut arms = ArmDb::default();
    let mut rng = rand::rngs::SmallRng::seed_from_u64(7);

    let chosen = arms.select(ip4!("10.0.3.1"), &[1, 2], &mut rng);
    assert!(chosen < 2);

    let ifindex = [1, 2][chosen];
    let unit = arms.get(ip4!("10.0.3.1"), ifindex).unwrap();
    assert_eq!(unit.pulls, 1);
    assert!((unit.last_prob - 0.5).abs() < 1e-9);
}

#[test]
fn arm_update_applies_loss_formula() {
    let mut arms = ArmDb::default();
    let mut rng = rand::rngs::SmallRng::seed_from_u64(7);

    let chosen = arms.select(ip4!("10.0.3.1"), &[1, 2], &mut rng);
    let ifindex = [1, 2][chosen];

    let loss_input = 2.5_f64;
    arms.update(ip4!("10.0.3.1"), ifindex, loss_input);

    let unit = arms.get(ip4!("10.0.3.1"), ifindex).unwrap();
    let expected = (1.0 - (-loss_input).exp()) / 0.5;
    assert!((unit.cumulative_loss - expected).abs() < 1e-9);
}

//
// Data path tests.
//

#[test]
fn data_path_forwards_and_counts_drops() {
    let mut snapshot = ForwardingSnapshot::default();
    snapshot.routes.insert(
        net4!("10.0.3.0/24"),
        vec![Candidate::new(1, ip4!("10.0.12.2"), 3, None, true)],
    );
    let snapshot = Arc::new(ArcSwap::from_pointee(snapshot));
    let arms = Arc::new(Mutex::new(ArmDb::default()));

    let mut path = DataPath::new(
        SelectorMode::BudgetAware,
        Some(1),
        snapshot,
        arms,
        100_000_000,
    );
    path.add_egress(1, 1024, 4096);

    // A packet toward a covered destination is selected and enqueued.
    let mut tags = PacketTags::default();
    let choice = path
        .forward(ip4!("10.0.3.1"), &mut tags, Bytes::from_static(b"x"), 0)
        .unwrap();
    assert_eq!(choice.ifindex, 1);
    assert!(path.dequeue(1).is_some());

    // No covering prefix: dropped and counted.
    let mut tags = PacketTags::default();
    let choice = path.forward(
        ip4!("172.16.0.1"),
        &mut tags,
        Bytes::from_static(b"x"),
        0,
    );
    assert!(choice.is_none());
    assert_eq!(path.no_route_drops(), 1);
}
