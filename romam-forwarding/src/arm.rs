//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use rand::Rng;
use rand::rngs::SmallRng;

// Value record for one (destination, egress-interface) arm.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValueUnit {
    // Number of times this arm has been selected.
    pub pulls: u64,
    // Cumulative loss accumulated from one-hop feedback.
    pub cumulative_loss: f64,
    // Selection probability computed at the most recent pull.
    pub last_prob: f64,
}

// Per-arm value database for the bandit selection mode.
//
// Selection follows exponential weights: each candidate arm is weighted
// `exp(-eta * cumulative_loss)` with
// `eta = sqrt(n_candidates * ln(n_candidates) / pulls)`, the weights are
// normalized into a distribution and one arm is sampled. Arms that were
// never pulled weigh 1 (uniform bootstrap). The loss update applied on
// feedback is `(1 - exp(-(distance + delay))) / p_selected`, matching the
// system this was lifted from rather than a textbook EXP3 round.
#[derive(Debug, Default)]
pub struct ArmDb {
    arms: BTreeMap<(Ipv4Addr, u32), ValueUnit>,
}

// ===== impl ArmDb =====

impl ArmDb {
    pub fn get(&self, destination: Ipv4Addr, ifindex: u32) -> Option<&ValueUnit> {
        self.arms.get(&(destination, ifindex))
    }

    // Samples one egress among the candidates and registers the pull.
    // Returns the index of the chosen candidate.
    pub fn select(
        &mut self,
        destination: Ipv4Addr,
        ifindexes: &[u32],
        rng: &mut SmallRng,
    ) -> usize {
        let n = ifindexes.len();
        let weights = ifindexes
            .iter()
            .map(|ifindex| {
                let unit = self
                    .arms
                    .entry((destination, *ifindex))
                    .or_default();
                if unit.pulls == 0 {
                    return 1.0;
                }
                let eta =
                    (n as f64 * (n as f64).ln() / unit.pulls as f64).sqrt();
                (-eta * unit.cumulative_loss).exp()
            })
            .collect::<Vec<_>>();

        // Normalize the weights into a probability distribution and sample.
        let total: f64 = weights.iter().sum();
        let mut point = rng.random::<f64>() * total;
        let mut chosen = n - 1;
        for (index, weight) in weights.iter().enumerate() {
            if point < *weight {
                chosen = index;
                break;
            }
            point -= weight;
        }

        // Register the pull.
        let unit = self
            .arms
            .entry((destination, ifindexes[chosen]))
            .or_default();
        unit.pulls += 1;
        unit.last_prob = weights[chosen] / total;

        chosen
    }

    // Applies one-hop feedback to the corresponding arm, using the selection
    // probability recorded at pull time.
    pub fn update(&mut self, destination: Ipv4Addr, ifindex: u32, loss_input: f64) {
        let unit = self.arms.entry((destination, ifindex)).or_default();
        if unit.last_prob <= 0.0 {
            return;
        }
        unit.cumulative_loss +=
            (1.0 - (-loss_input).exp()) / unit.last_prob;
    }
}
