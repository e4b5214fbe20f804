//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

// Extension methods for Ipv4Addr.
pub trait Ipv4AddrExt {
    // Returns whether the address is usable as a control-plane source or
    // neighbor address.
    fn is_usable(&self) -> bool;
}

// Extension methods for Ipv4Network.
pub trait Ipv4NetworkExt {
    // Returns whether all bits outside the prefix length are zero.
    fn is_canonical(&self) -> bool;

    // Returns the same prefix with the host bits cleared.
    fn canonicalize(&self) -> Ipv4Network;
}

// ===== impl Ipv4Addr =====

impl Ipv4AddrExt for Ipv4Addr {
    fn is_usable(&self) -> bool {
        !self.is_unspecified()
            && !self.is_loopback()
            && !self.is_broadcast()
            && !self.is_multicast()
    }
}

// ===== impl Ipv4Network =====

impl Ipv4NetworkExt for Ipv4Network {
    fn is_canonical(&self) -> bool {
        let addr = u32::from(self.ip());
        let mask = u32::from(self.mask());
        addr & !mask == 0
    }

    fn canonicalize(&self) -> Ipv4Network {
        let addr = u32::from(self.ip()) & u32::from(self.mask());
        Ipv4Network::new(Ipv4Addr::from(addr), self.prefix())
            .expect("prefix length was already validated")
    }
}
