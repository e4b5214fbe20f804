//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use bytes::Bytes;

use crate::arm::ArmDb;
use crate::feedback;
use crate::queue::{Lane, QueueDepths, QueuedPacket, TwoLaneQueue};
use crate::selector::{
    Choice, ForwardingSnapshot, Selector, SelectorMode,
};
use crate::tags::PacketTags;

// One router's forwarding path: the per-egress two-lane queues, the
// selector and the shared arm database, consulting the control plane's
// published snapshot per packet.
//
// The path may run in parallel with the control plane: snapshot reads hold
// an arc-swap handle for the duration of one packet, lane counters are
// relaxed atomics, and arm updates are serialized behind the mutex shared
// with the feedback receiver.
#[derive(Debug)]
pub struct DataPath {
    snapshot: Arc<ArcSwap<ForwardingSnapshot>>,
    selector: Selector,
    queues: BTreeMap<u32, TwoLaneQueue>,
    depths: BTreeMap<u32, QueueDepths>,
    arms: Arc<Mutex<ArmDb>>,
    // Latest one-hop telemetry, keyed by (egress ifindex, adjacent router's
    // ingress ifindex).
    remote_lanes: BTreeMap<(u32, u32), f64>,
    service_rate_bps: u64,
}

// ===== impl DataPath =====

impl DataPath {
    pub fn new(
        mode: SelectorMode,
        seed: Option<u64>,
        snapshot: Arc<ArcSwap<ForwardingSnapshot>>,
        arms: Arc<Mutex<ArmDb>>,
        service_rate_bps: u64,
    ) -> DataPath {
        DataPath {
            snapshot,
            selector: Selector::new(mode, seed),
            queues: Default::default(),
            depths: Default::default(),
            arms,
            remote_lanes: Default::default(),
            service_rate_bps,
        }
    }

    // Registers the two-lane queue of one egress interface.
    pub fn add_egress(
        &mut self,
        ifindex: u32,
        priority_capacity: usize,
        best_effort_capacity: usize,
    ) {
        let queue = TwoLaneQueue::new(priority_capacity, best_effort_capacity);
        self.depths.insert(ifindex, queue.depths());
        self.queues.insert(ifindex, queue);
    }

    // Records one-hop queue-depth telemetry for a remote lane.
    pub fn set_remote_occupancy(
        &mut self,
        ifindex: u32,
        next_iface: u32,
        occupancy: f64,
    ) {
        self.remote_lanes.insert((ifindex, next_iface), occupancy);
    }

    // Forwards one packet: selects the egress, updates the packet's tags
    // and enqueues it into the lane its Priority tag maps to. Returns the
    // selection, or `None` when no feasible route survives or the chosen
    // lane tail-drops.
    pub fn forward(
        &mut self,
        destination: Ipv4Addr,
        tags: &mut PacketTags,
        data: Bytes,
        now_us: u64,
    ) -> Option<Choice> {
        let snapshot = self.snapshot.load();
        let candidates = snapshot.candidates(destination).unwrap_or(&[]);

        let mut arms = self.arms.lock().unwrap();
        let choice = self.selector.select(
            destination,
            candidates,
            tags,
            now_us,
            &self.depths,
            &self.remote_lanes,
            &mut arms,
        )?;
        drop(arms);

        let queue = self.queues.get_mut(&choice.ifindex)?;
        let packet = QueuedPacket { tags: *tags, data };
        queue.enqueue(packet)?;

        Some(choice)
    }

    // Dequeues the next packet of the given egress, priority lane first.
    pub fn dequeue(&mut self, ifindex: u32) -> Option<(Lane, QueuedPacket)> {
        self.queues.get_mut(&ifindex)?.dequeue()
    }

    // Queue delay currently measured on the given egress, as advertised in
    // one-hop acknowledgements.
    pub fn queue_delay_us(&self, ifindex: u32) -> Option<u32> {
        let depths = self.depths.get(&ifindex)?;
        Some(feedback::queue_delay_us(
            depths.total_bytes(),
            self.service_rate_bps,
        ))
    }

    // Packets dropped for lack of a feasible route.
    pub fn no_route_drops(&self) -> u64 {
        self.selector.no_route_drops()
    }

    // Enqueue-drop counters of one egress, as (priority, best-effort).
    pub fn enqueue_drops(&self, ifindex: u32) -> Option<(u64, u64)> {
        self.queues.get(&ifindex).map(TwoLaneQueue::drops)
    }
}
