//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use tracing::debug;

use crate::tags::PacketTags;

// Default lane capacities in bytes.
pub const DFLT_PRIORITY_CAPACITY: usize = 250 * 1024;
pub const DFLT_BEST_EFFORT_CAPACITY: usize = 2500 * 1024;

// Lane identity within the two-lane discipline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lane {
    Priority,
    BestEffort,
}

// One packet held by a lane.
#[derive(Clone, Debug)]
pub struct QueuedPacket {
    pub tags: PacketTags,
    pub data: Bytes,
}

// Two byte-bounded FIFO lanes owned by one egress interface. Enqueue
// classifies purely on the Priority tag; a full lane tail-drops with no
// overflow into the other lane. Dequeue is strictly priority-first.
//
// Byte depths and drop counters live behind shared atomics so the control
// plane and the telemetry path can read them without taking the queue lock;
// relaxed ordering is sufficient for selection heuristics.
#[derive(Debug)]
pub struct TwoLaneQueue {
    priority: LaneFifo,
    best_effort: LaneFifo,
}

#[derive(Debug)]
struct LaneFifo {
    fifo: VecDeque<QueuedPacket>,
    capacity: usize,
    depth: Arc<AtomicUsize>,
    drops: Arc<AtomicU64>,
}

// Lock-free view of one queue's lane counters.
#[derive(Clone, Debug)]
pub struct QueueDepths {
    pub priority_bytes: Arc<AtomicUsize>,
    pub priority_capacity: usize,
    pub best_effort_bytes: Arc<AtomicUsize>,
    pub best_effort_capacity: usize,
}

// ===== impl LaneFifo =====

impl LaneFifo {
    fn new(capacity: usize) -> LaneFifo {
        LaneFifo {
            fifo: VecDeque::new(),
            capacity,
            depth: Arc::new(AtomicUsize::new(0)),
            drops: Arc::new(AtomicU64::new(0)),
        }
    }

    fn enqueue(&mut self, packet: QueuedPacket) -> bool {
        let size = packet.data.len();
        let depth = self.depth.load(Ordering::Relaxed);
        if depth + size > self.capacity {
            self.drops.fetch_add(1, Ordering::Relaxed);
            debug!(%depth, %size, "lane full, tail drop");
            return false;
        }
        self.depth.fetch_add(size, Ordering::Relaxed);
        self.fifo.push_back(packet);
        true
    }

    fn dequeue(&mut self) -> Option<QueuedPacket> {
        let packet = self.fifo.pop_front()?;
        self.depth.fetch_sub(packet.data.len(), Ordering::Relaxed);
        Some(packet)
    }
}

// ===== impl TwoLaneQueue =====

impl TwoLaneQueue {
    pub fn new(
        priority_capacity: usize,
        best_effort_capacity: usize,
    ) -> TwoLaneQueue {
        TwoLaneQueue {
            priority: LaneFifo::new(priority_capacity),
            best_effort: LaneFifo::new(best_effort_capacity),
        }
    }

    // Enqueues the packet into the lane selected by its Priority tag.
    // Returns the lane used, or `None` on tail drop.
    pub fn enqueue(&mut self, packet: QueuedPacket) -> Option<Lane> {
        let lane = match packet.tags.priority {
            true => Lane::Priority,
            false => Lane::BestEffort,
        };
        let fifo = match lane {
            Lane::Priority => &mut self.priority,
            Lane::BestEffort => &mut self.best_effort,
        };
        fifo.enqueue(packet).then_some(lane)
    }

    // Dequeues the next packet, priority lane first.
    pub fn dequeue(&mut self) -> Option<(Lane, QueuedPacket)> {
        if let Some(packet) = self.priority.dequeue() {
            return Some((Lane::Priority, packet));
        }
        self.best_effort
            .dequeue()
            .map(|packet| (Lane::BestEffort, packet))
    }

    // Returns a cloneable handle over the lane byte counters.
    pub fn depths(&self) -> QueueDepths {
        QueueDepths {
            priority_bytes: self.priority.depth.clone(),
            priority_capacity: self.priority.capacity,
            best_effort_bytes: self.best_effort.depth.clone(),
            best_effort_capacity: self.best_effort.capacity,
        }
    }

    // Returns the enqueue-drop counters as (priority, best-effort).
    pub fn drops(&self) -> (u64, u64) {
        (
            self.priority.drops.load(Ordering::Relaxed),
            self.best_effort.drops.load(Ordering::Relaxed),
        )
    }
}

// ===== impl QueueDepths =====

impl QueueDepths {
    // Priority-lane occupancy in [0, 1].
    pub fn priority_occupancy(&self) -> f64 {
        let depth = self.priority_bytes.load(Ordering::Relaxed);
        depth as f64 / self.priority_capacity as f64
    }

    // Total enqueued bytes across both lanes.
    pub fn total_bytes(&self) -> usize {
        self.priority_bytes.load(Ordering::Relaxed)
            + self.best_effort_bytes.load(Ordering::Relaxed)
    }
}
