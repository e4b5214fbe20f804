//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::debug::Debug;
use crate::instance::Instance;
use crate::interface::COST_DFLT;
use crate::network;
use crate::packet::{Ack, Frame, Hello, LinkAdvert, LsaAdvert};

// ===== global functions =====

// Sends one hello out every enabled interface.
pub(crate) async fn send_hello_all(instance: &mut Instance) {
    let router_id = instance.config.router_id;
    let dst = instance.config.multicast;

    let ifaces = instance
        .interfaces
        .iter()
        .filter(|iface| iface.enabled)
        .map(|iface| (iface.ifindex, iface.addr.ip()))
        .collect::<Vec<_>>();
    for (ifindex, src) in ifaces {
        let hello = Hello::new(router_id, src);
        send(instance, ifindex, src, dst, &Frame::Hello(hello)).await;
    }
}

// Builds this router's LSA from the current adjacencies and the locally
// advertised prefixes.
pub(crate) fn build_self_lsa(instance: &Instance) -> LsaAdvert {
    let links = instance
        .state
        .neighbors
        .values()
        .map(|nbr| {
            let cost = instance
                .interfaces
                .get_by_ifindex(nbr.ifindex)
                .map(|iface| iface.cost)
                .unwrap_or(COST_DFLT);
            LinkAdvert::new(nbr.router_id, cost)
        })
        .collect();
    let prefixes = instance.state.local_prefixes.iter().copied().collect();

    LsaAdvert::new(
        instance.config.router_id,
        instance.state.seq_no,
        links,
        prefixes,
    )
}

// Re-originates the self LSA with an incremented sequence number, installs
// it, and floods it.
pub(crate) async fn originate_self_lsa(instance: &mut Instance) {
    instance.state.seq_no += 1;
    Debug::LsaOriginate(instance.state.seq_no).log();

    let lsa = build_self_lsa(instance);
    instance.state.lsdb.install(lsa.clone());
    instance.state.spf_pending = true;

    flood_lsa(instance, &lsa).await;
}

// Floods the encoded LSA out every enabled interface. There is no split
// horizon; the LSDB's sequence discipline terminates the flood.
pub(crate) async fn flood_lsa(instance: &mut Instance, lsa: &LsaAdvert) {
    Debug::LsaFlood(&lsa.router_id, lsa.seq).log();

    let dst = instance.config.multicast;
    let frame = Frame::Lsa(lsa.clone());
    let ifaces = instance
        .interfaces
        .iter()
        .filter(|iface| iface.enabled)
        .map(|iface| (iface.ifindex, iface.addr.ip()))
        .collect::<Vec<_>>();
    for (ifindex, src) in ifaces {
        send(instance, ifindex, src, dst, &frame).await;
    }
}

// Emits a one-hop acknowledgement back to the upstream router.
pub(crate) async fn send_ack(
    instance: &mut Instance,
    upstream: SocketAddrV4,
    ifindex: u32,
    ack: Ack,
) {
    let Some(iface) = instance.interfaces.get_by_ifindex(ifindex) else {
        return;
    };
    let src = iface.addr.ip();
    send(instance, ifindex, src, upstream, &Frame::Ack(ack)).await;
}

// Sends one frame; transport errors are logged and otherwise ignored so a
// failing interface can't stall the control plane.
async fn send(
    instance: &mut Instance,
    ifindex: u32,
    src: Ipv4Addr,
    dst: SocketAddrV4,
    frame: &Frame,
) {
    match network::send_frame(&instance.net.socket, ifindex, src, dst, frame)
        .await
    {
        Ok(_) => instance.state.statistics.frames_sent += 1,
        Err(error) => error.log(),
    }
}
