//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::Mutex;

use crate::arm::ArmDb;

// One-hop feedback emitted by the downstream router for each forwarded
// packet: the destination it was forwarded toward and the queue delay the
// downstream router currently measures on that destination's egress.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Feedback {
    pub destination: Ipv4Addr,
    pub queue_delay_us: u32,
}

// ===== global functions =====

// Queue delay advertised in one-hop acknowledgements: the egress lane's
// current byte count divided by the configured service rate.
pub fn queue_delay_us(depth_bytes: usize, service_rate_bps: u64) -> u32 {
    let delay =
        depth_bytes as u64 * 8 * 1_000_000 / service_rate_bps.max(1);
    delay.min(u32::MAX as u64) as u32
}

// Applies received feedback to the corresponding arm. The arm database is
// shared between the forwarding path and the feedback receiver, so updates
// are serialized behind the mutex.
pub fn apply(
    arms: &Mutex<ArmDb>,
    feedback: Feedback,
    egress_ifindex: u32,
    distance: u32,
) {
    let mut arms = arms.lock().unwrap();
    let loss_input = distance as f64 + feedback.queue_delay_us as f64;
    arms.update(feedback.destination, egress_ifindex, loss_input);
}
