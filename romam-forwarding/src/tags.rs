//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

// In-band tags carried by a data packet, inspected and updated by the
// per-hop selector. Tags are attached by the originating application and
// are opaque everywhere else on the forwarding path.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PacketTags {
    // When the packet was first emitted, in microseconds on the shared
    // timebase.
    pub origination_us: Option<u64>,
    // Deadline measured from origination. `None` disables deadline-aware
    // selection.
    pub budget_us: Option<u32>,
    // Accumulated lower-bound cost along the path taken so far plus the
    // optimistic remaining cost from the next hop onward.
    pub distance: Option<u32>,
    // Set at origin, or promoted in flight when the remaining budget runs
    // low; honored by the lane mapping on subsequent hops.
    pub priority: bool,
}

// ===== impl PacketTags =====

impl PacketTags {
    // Returns the budget remaining at this hop, saturating at zero. `None`
    // means the packet carries no deadline.
    pub fn remaining_budget(&self, now_us: u64) -> Option<u32> {
        let budget = self.budget_us? as u64;
        let origination = self.origination_us.unwrap_or(0);
        let remaining = (budget + origination).saturating_sub(now_us);
        Some(remaining.min(u32::MAX as u64) as u32)
    }
}
