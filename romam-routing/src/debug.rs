//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use tracing::{debug, debug_span};

use crate::packet::Frame;
use crate::route::RouteEntry;

// Romam debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    InstanceStart,
    InstanceShutdown,
    InterfaceStart(&'a str, u32),
    FrameRx(u32, &'a Ipv4Addr, &'a Frame),
    FrameTx(u32, &'a Frame),
    NbrUp(&'a Ipv4Addr),
    NbrRefresh(&'a Ipv4Addr),
    NbrDown(&'a Ipv4Addr),
    LsaInstall(&'a Ipv4Addr, u32),
    LsaOriginate(u32),
    LsaFlood(&'a Ipv4Addr, u32),
    SpfStart,
    SpfDone(usize),
    RouteReplace(&'a RouteEntry),
    RouteDelete(&'a Ipv4Network),
}

// ===== impl Debug =====

impl<'a> Debug<'a> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceStart | Debug::InstanceShutdown => {
                debug!("{}", self);
            }
            Debug::InterfaceStart(name, ifindex) => {
                debug_span!("interface", %name, %ifindex).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::FrameRx(ifindex, source, frame) => {
                debug_span!("network").in_scope(|| {
                    debug_span!("input", %ifindex, %source).in_scope(|| {
                        let data = serde_json::to_string(&frame).unwrap();
                        debug!(%data, "{}", self);
                    });
                });
            }
            Debug::FrameTx(ifindex, frame) => {
                debug_span!("network").in_scope(|| {
                    debug_span!("output", %ifindex).in_scope(|| {
                        let data = serde_json::to_string(&frame).unwrap();
                        debug!(%data, "{}", self);
                    });
                });
            }
            Debug::NbrUp(router_id)
            | Debug::NbrRefresh(router_id)
            | Debug::NbrDown(router_id) => {
                debug!(%router_id, "{}", self);
            }
            Debug::LsaInstall(router_id, seq) => {
                debug!(%router_id, %seq, "{}", self);
            }
            Debug::LsaOriginate(seq) => {
                debug!(%seq, "{}", self);
            }
            Debug::LsaFlood(router_id, seq) => {
                debug!(%router_id, %seq, "{}", self);
            }
            Debug::SpfStart => {
                debug!("{}", self);
            }
            Debug::SpfDone(destinations) => {
                debug!(%destinations, "{}", self);
            }
            Debug::RouteReplace(entry) => {
                debug!(prefix = %entry.prefix, metric = %entry.metric, "{}", self);
            }
            Debug::RouteDelete(prefix) => {
                debug!(%prefix, "{}", self);
            }
        }
    }
}

impl<'a> std::fmt::Display for Debug<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceStart => {
                write!(f, "starting instance")
            }
            Debug::InstanceShutdown => {
                write!(f, "shutting down")
            }
            Debug::InterfaceStart(..) => {
                write!(f, "starting interface")
            }
            Debug::FrameRx(..) | Debug::FrameTx(..) => {
                write!(f, "frame")
            }
            Debug::NbrUp(..) => {
                write!(f, "neighbor up")
            }
            Debug::NbrRefresh(..) => {
                write!(f, "neighbor refreshed")
            }
            Debug::NbrDown(..) => {
                write!(f, "neighbor down")
            }
            Debug::LsaInstall(..) => {
                write!(f, "LSA installed")
            }
            Debug::LsaOriginate(..) => {
                write!(f, "originating self LSA")
            }
            Debug::LsaFlood(..) => {
                write!(f, "flooding LSA")
            }
            Debug::SpfStart => {
                write!(f, "SPF computation started")
            }
            Debug::SpfDone(..) => {
                write!(f, "SPF computation done")
            }
            Debug::RouteReplace(..) => {
                write!(f, "route replaced")
            }
            Debug::RouteDelete(..) => {
                write!(f, "route deleted")
            }
        }
    }
}
