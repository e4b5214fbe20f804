//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, SocketAddrV4};

use romam_forwarding::feedback::{self, Feedback};

use crate::debug::Debug;
use crate::error::Error;
use crate::instance::Instance;
use crate::lsdb::LsaInstall;
use crate::neighbor::{self, HelloOutcome};
use crate::output;
use crate::packet::{Ack, DecodeResult, Frame, Hello, LsaAdvert};

// ===== frame receipt =====

pub(crate) async fn process_frame(
    instance: &mut Instance,
    src: SocketAddrV4,
    ifindex: u32,
    frame: DecodeResult<Frame>,
) {
    // Ignore frames received on unknown interfaces.
    if instance.interfaces.get_by_ifindex(ifindex).is_none() {
        Error::FrameUnknownInterface(ifindex).log();
        return;
    }

    let frame = match frame {
        Ok(frame) => frame,
        Err(error) => {
            // Malformed frames are discarded and counted; the receiver
            // carries on.
            instance.state.statistics.decode_errors += 1;
            Error::FrameDecodeError(error).log();
            return;
        }
    };

    instance.state.statistics.frames_rcvd += 1;
    Debug::FrameRx(ifindex, src.ip(), &frame).log();

    match frame {
        Frame::Hello(hello) => {
            process_hello(instance, src, ifindex, hello).await;
        }
        Frame::Lsa(lsa) => {
            process_lsa(instance, lsa).await;
        }
        Frame::Ack(ack) => {
            process_ack(instance, ifindex, ack);
        }
    }
}

async fn process_hello(
    instance: &mut Instance,
    src: SocketAddrV4,
    ifindex: u32,
    hello: Hello,
) {
    if hello.router_id == instance.config.router_id {
        Error::HelloOwnRouterId(hello.router_id).log();
        return;
    }

    // The transport-reported sender address is authoritative; the source
    // field inside the payload is advisory only.
    let outcome = neighbor::on_hello(
        &mut instance.state.neighbors,
        hello.router_id,
        *src.ip(),
        ifindex,
        instance.config.dead_interval,
        &instance.tx.nbr_timeout,
    );

    // A new adjacency changes our own links: re-originate right away.
    if outcome == HelloOutcome::Up {
        output::originate_self_lsa(instance).await;
    }
}

async fn process_lsa(instance: &mut Instance, lsa: LsaAdvert) {
    // An LSA claiming us as originator but carrying a sequence at or above
    // our own means the network still holds stale state from a previous
    // incarnation: jump past it and re-originate.
    if lsa.router_id == instance.config.router_id {
        if lsa.seq >= instance.state.seq_no {
            instance.state.seq_no = lsa.seq;
            output::originate_self_lsa(instance).await;
        }
        return;
    }

    match instance.state.lsdb.install(lsa.clone()) {
        LsaInstall::InstalledNew | LsaInstall::InstalledNewer => {
            // Accepting a newer LSA floods it everywhere; the LSDB's
            // rejection of equal-or-older sequences is what terminates the
            // flood.
            instance.state.spf_pending = true;
            output::flood_lsa(instance, &lsa).await;
        }
        LsaInstall::RejectedOlderOrEqual => (),
    }
}

fn process_ack(instance: &mut Instance, ifindex: u32, ack: Ack) {
    // Resolve the lower-bound cost toward the destination via the egress
    // the acknowledgement came back on.
    let snapshot = instance.state.snapshot.load();
    let distance = snapshot
        .candidates(ack.destination)
        .and_then(|candidates| {
            candidates
                .iter()
                .find(|candidate| candidate.ifindex == ifindex)
        })
        .map(|candidate| candidate.cost)
        .unwrap_or(0);

    let feedback = Feedback {
        destination: ack.destination,
        queue_delay_us: ack.queue_delay_us,
    };
    feedback::apply(&instance.state.arms, feedback, ifindex, distance);
}

// ===== hello interval =====

pub(crate) async fn process_hello_interval(instance: &mut Instance) {
    output::send_hello_all(instance).await;
}

// ===== self-LSA re-origination interval =====

pub(crate) async fn process_lsa_originate(instance: &mut Instance) {
    output::originate_self_lsa(instance).await;
}

// ===== neighbor dead-interval timeout =====

pub(crate) async fn process_nbr_timeout(
    instance: &mut Instance,
    router_id: Ipv4Addr,
) {
    let removed = neighbor::expire(
        &mut instance.state.neighbors,
        router_id,
        instance.config.dead_interval,
    );

    // A lost adjacency changes our own links: re-originate right away.
    if removed.is_some() {
        output::originate_self_lsa(instance).await;
    }
}
