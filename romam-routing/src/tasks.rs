//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use romam_utils::Sender;
use romam_utils::task::{IntervalTask, Task, TimeoutTask};
use socket2::Socket;
use tokio::io::unix::AsyncFd;
use tracing::{Instrument, debug_span};

use crate::network;

//
// Romam tasks diagram:
//
//                             +--------------+
//              net_rx (1x) -> |              |
//      hello_interval (1x) -> |              |
//       lsa_originate (1x) -> |   instance   | -> (sync) net tx
//         nbr_timeout (Nx) -> |              | -> (sync) installer
//                             +--------------+
//

// Romam inter-task message types.
pub mod messages {
    use std::net::{Ipv4Addr, SocketAddrV4};

    use serde::{Deserialize, Serialize};

    use crate::packet::{DecodeResult, Frame};

    // Type aliases.
    pub type ProtocolInputMsg = input::ProtocolMsg;

    // Input messages (child task -> main task).
    pub mod input {
        use super::*;

        #[derive(Debug, Deserialize, Serialize)]
        pub enum ProtocolMsg {
            NetRxFrame(NetRxFrameMsg),
            HelloInterval(HelloIntervalMsg),
            LsaOriginate(LsaOriginateMsg),
            NbrTimeout(NbrTimeoutMsg),
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NetRxFrameMsg {
            pub src: SocketAddrV4,
            pub ifindex: u32,
            pub frame: DecodeResult<Frame>,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct HelloIntervalMsg {}

        #[derive(Debug, Deserialize, Serialize)]
        pub struct LsaOriginateMsg {}

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NbrTimeoutMsg {
            pub router_id: Ipv4Addr,
        }
    }
}

// ===== Romam tasks =====

// Network Rx task.
pub(crate) fn net_rx(
    socket: &Arc<AsyncFd<Socket>>,
    net_frame_rxp: &Sender<messages::input::NetRxFrameMsg>,
) -> Task<()> {
    let span1 = debug_span!("network");
    let _span1_guard = span1.enter();
    let span2 = debug_span!("input");
    let _span2_guard = span2.enter();

    let socket = socket.clone();
    let net_frame_rxp = net_frame_rxp.clone();

    Task::spawn_supervised(move || {
        let socket = socket.clone();
        let net_frame_rxp = net_frame_rxp.clone();
        async move {
            let _ = network::read_loop(socket, net_frame_rxp).await;
        }
        .in_current_span()
    })
}

// Hello emission interval.
pub(crate) fn hello_interval(
    interval: Duration,
    hello_intervalp: &Sender<messages::input::HelloIntervalMsg>,
) -> IntervalTask {
    let hello_intervalp = hello_intervalp.clone();
    IntervalTask::new(interval, true, move || {
        let hello_intervalp = hello_intervalp.clone();
        async move {
            let msg = messages::input::HelloIntervalMsg {};
            let _ = hello_intervalp.send(msg).await;
        }
    })
}

// Self-LSA re-origination interval.
pub(crate) fn lsa_originate_interval(
    interval: Duration,
    lsa_originatep: &Sender<messages::input::LsaOriginateMsg>,
) -> IntervalTask {
    let lsa_originatep = lsa_originatep.clone();
    IntervalTask::new(interval, false, move || {
        let lsa_originatep = lsa_originatep.clone();
        async move {
            let msg = messages::input::LsaOriginateMsg {};
            let _ = lsa_originatep.send(msg).await;
        }
    })
}

// Neighbor dead-interval timeout task.
pub(crate) fn nbr_dead_timeout(
    router_id: Ipv4Addr,
    dead_interval: Duration,
    nbr_timeoutp: &Sender<messages::input::NbrTimeoutMsg>,
) -> TimeoutTask {
    let nbr_timeoutp = nbr_timeoutp.clone();
    TimeoutTask::new(dead_interval, move || async move {
        let msg = messages::input::NbrTimeoutMsg { router_id };
        let _ = nbr_timeoutp.send(msg).await;
    })
}
