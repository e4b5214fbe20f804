//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::net::Ipv4Addr;

use crate::debug::Debug;
use crate::error::Error;
use crate::packet::LsaAdvert;

// Sequence distance beyond which a wraparound is suspected.
pub const LSA_SEQ_WRAP_DIFF: u32 = 1 << 31;

// Link-state database: one authoritative LSA per originator, newest by
// sequence number.
#[derive(Debug, Default)]
pub struct Lsdb {
    entries: BTreeMap<Ipv4Addr, LsaAdvert>,
}

// Outcome of an LSA install attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LsaInstall {
    InstalledNew,
    InstalledNewer,
    RejectedOlderOrEqual,
}

// ===== impl Lsdb =====

impl Lsdb {
    // Installs the given LSA if it's newer than the stored copy for the same
    // originator. Rejection is silent and idempotent; equal sequence numbers
    // are rejected, which is what terminates floods.
    pub fn install(&mut self, lsa: LsaAdvert) -> LsaInstall {
        match self.entries.entry(lsa.router_id) {
            btree_map::Entry::Vacant(v) => {
                Debug::LsaInstall(&lsa.router_id, lsa.seq).log();
                v.insert(lsa);
                LsaInstall::InstalledNew
            }
            btree_map::Entry::Occupied(mut o) => {
                let stored = o.get().seq;
                if lsa.seq == stored {
                    return LsaInstall::RejectedOlderOrEqual;
                }

                // On an apparent wraparound the numerically larger value
                // still wins, but the event is worth a warning.
                if stored.abs_diff(lsa.seq) > LSA_SEQ_WRAP_DIFF {
                    Error::LsaSeqWraparound(lsa.router_id, stored, lsa.seq)
                        .log();
                }

                if lsa.seq > stored {
                    Debug::LsaInstall(&lsa.router_id, lsa.seq).log();
                    o.insert(lsa);
                    LsaInstall::InstalledNewer
                } else {
                    LsaInstall::RejectedOlderOrEqual
                }
            }
        }
    }

    pub fn get(&self, router_id: &Ipv4Addr) -> Option<&LsaAdvert> {
        self.entries.get(router_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LsaAdvert> + '_ {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
