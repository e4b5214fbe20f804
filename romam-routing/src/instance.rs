//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use ipnetwork::Ipv4Network;
use romam_forwarding::arm::ArmDb;
use romam_forwarding::selector::{ForwardingSnapshot, SelectorMode};
use romam_utils::ip::Ipv4NetworkExt;
use romam_utils::socket::UdpSocketExt;
use romam_utils::task::{IntervalTask, Task};
use romam_utils::{Receiver, Sender};
use socket2::Socket;
use tokio::io::unix::AsyncFd;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;

use crate::config::CoreConfig;
use crate::debug::Debug;
use crate::error::{Error, IoError};
use crate::interface::Interfaces;
use crate::lsdb::Lsdb;
use crate::neighbor::Neighbors;
use crate::packet::Ack;
use crate::route::Rib;
use crate::southbound::RouteInstaller;
use crate::tasks::messages::ProtocolInputMsg;
use crate::tasks::messages::input::{
    HelloIntervalMsg, LsaOriginateMsg, NbrTimeoutMsg, NetRxFrameMsg,
};
use crate::{events, interface, network, output, route, spf, tasks};

// The daemon core: one value owning the LSDB, the neighbor table, the RIB
// and the scheduler state, passed by reference to the components that need
// them. All state mutation happens in the instance task; sends and installs
// are awaited in-line and may fail without corrupting state.
#[derive(Debug)]
pub struct Instance {
    // Instance configuration.
    pub config: CoreConfig,
    // Participating interfaces.
    pub interfaces: Interfaces,
    // Instance state.
    pub state: InstanceState,
    // Network endpoint and Rx task.
    pub net: InstanceNet,
    // Input channel senders.
    pub tx: ProtocolInputChannelsTx,
    // Forwarding installer.
    pub installer: RouteInstaller,
}

#[derive(Debug)]
pub struct InstanceState {
    // Self-LSA sequence number.
    pub seq_no: u32,
    // Link-state database.
    pub lsdb: Lsdb,
    // Neighbor table.
    pub neighbors: Neighbors,
    // Route information base.
    pub rib: Rib,
    // Set when the LSDB or the adjacency set changed since the last SPF run.
    pub spf_pending: bool,
    // Prefixes advertised as local.
    pub local_prefixes: BTreeSet<Ipv4Network>,
    // Forwarding snapshot published to the data path.
    pub snapshot: Arc<ArcSwap<ForwardingSnapshot>>,
    // Arm database shared with the data path and the feedback receiver.
    pub arms: Arc<Mutex<ArmDb>>,
    // Message statistics.
    pub statistics: MessageStatistics,
    // Hello and re-origination clocks.
    _hello_interval_task: IntervalTask,
    _lsa_originate_task: IntervalTask,
}

// Inbound and outbound statistic counters.
#[derive(Debug, Default)]
pub struct MessageStatistics {
    pub frames_rcvd: u64,
    pub frames_sent: u64,
    pub decode_errors: u64,
}

#[derive(Debug)]
pub struct InstanceNet {
    // Control-plane UDP socket.
    pub socket: Arc<AsyncFd<Socket>>,
    // Network Rx task.
    _net_rx_task: Task<()>,
}

#[derive(Clone, Debug)]
pub struct ProtocolInputChannelsTx {
    // Frame Rx event.
    pub net_frame_rx: Sender<NetRxFrameMsg>,
    // Hello interval.
    pub hello_interval: Sender<HelloIntervalMsg>,
    // Self-LSA re-origination interval.
    pub lsa_originate: Sender<LsaOriginateMsg>,
    // Neighbor timeout event.
    pub nbr_timeout: Sender<NbrTimeoutMsg>,
}

#[derive(Debug)]
pub struct ProtocolInputChannelsRx {
    // Frame Rx event.
    pub net_frame_rx: Receiver<NetRxFrameMsg>,
    // Hello interval.
    pub hello_interval: Receiver<HelloIntervalMsg>,
    // Self-LSA re-origination interval.
    pub lsa_originate: Receiver<LsaOriginateMsg>,
    // Neighbor timeout event.
    pub nbr_timeout: Receiver<NbrTimeoutMsg>,
}

// ===== impl Instance =====

impl Instance {
    // Brings the instance up: interface discovery, socket setup, group
    // joins, the Rx task and the protocol clocks. Failure to create the
    // primary transport socket is the only fatal error past configuration.
    pub async fn new(
        config: CoreConfig,
        installer: RouteInstaller,
    ) -> Result<(Instance, ProtocolInputChannelsRx), Error> {
        Debug::InstanceStart.log();

        let interfaces = interface::discover(&config)
            .map_err(IoError::InterfaceQueryError)
            .map_err(Error::IoError)?;

        let (tx, rx) = Self::protocol_input_channels();

        // Create the control-plane endpoint and join the group on every
        // participating interface. A failing join disables one interface,
        // not the instance.
        let socket = network::socket(&config)
            .map_err(IoError::UdpSocketError)
            .map_err(Error::IoError)?;
        for iface in interfaces.iter() {
            if let Err(error) = socket
                .get_ref()
                .join_multicast_ifindex_v4(config.multicast.ip(), iface.ifindex)
            {
                Error::InterfaceStartError(
                    iface.name.clone(),
                    IoError::UdpMulticastJoinError(error),
                )
                .log();
            }
        }
        let socket = Arc::new(socket);
        let net_rx_task = tasks::net_rx(&socket, &tx.net_frame_rx);

        // Compute the locally advertised prefixes.
        let mut local_prefixes = BTreeSet::new();
        if let Some(loopback) = config.loopback {
            local_prefixes.insert(loopback);
        }
        local_prefixes.extend(config.prefixes.iter().copied());
        local_prefixes
            .extend(interfaces.iter().map(|iface| iface.addr.canonicalize()));

        let state = InstanceState {
            seq_no: 0,
            lsdb: Default::default(),
            neighbors: Default::default(),
            rib: Default::default(),
            spf_pending: false,
            local_prefixes,
            snapshot: Arc::new(ArcSwap::from_pointee(
                ForwardingSnapshot::default(),
            )),
            arms: Arc::new(Mutex::new(ArmDb::default())),
            statistics: Default::default(),
            _hello_interval_task: tasks::hello_interval(
                config.hello_interval,
                &tx.hello_interval,
            ),
            _lsa_originate_task: tasks::lsa_originate_interval(
                config.lsa_interval,
                &tx.lsa_originate,
            ),
        };

        let instance = Instance {
            config,
            interfaces,
            state,
            net: InstanceNet {
                socket,
                _net_rx_task: net_rx_task,
            },
            tx,
            installer,
        };

        Ok((instance, rx))
    }

    // Main loop: fire timers, drain ready frames, recompute SPF and
    // reconcile the RIB whenever the LSDB changed, repeat. Exits on
    // SIGINT/SIGTERM after best-effort route withdrawal.
    pub async fn run(mut self, mut rx: ProtocolInputChannelsRx) {
        let mut sigint =
            signal(SignalKind::interrupt()).expect("failed to register signal");
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register signal");

        // Originate the initial self LSA before the first hello round.
        output::originate_self_lsa(&mut self).await;
        self.sync().await;

        loop {
            tokio::select! {
                _ = sigint.recv() => break,
                _ = sigterm.recv() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => self.process_msg(msg).await,
                    None => break,
                }
            }

            if self.state.spf_pending {
                self.sync().await;
            }
        }

        Debug::InstanceShutdown.log();
        self.state.rib.withdraw_all(&self.installer).await;
    }

    async fn process_msg(&mut self, msg: ProtocolInputMsg) {
        match msg {
            ProtocolInputMsg::NetRxFrame(msg) => {
                events::process_frame(self, msg.src, msg.ifindex, msg.frame)
                    .await;
            }
            ProtocolInputMsg::HelloInterval(_) => {
                events::process_hello_interval(self).await;
            }
            ProtocolInputMsg::LsaOriginate(_) => {
                events::process_lsa_originate(self).await;
            }
            ProtocolInputMsg::NbrTimeout(msg) => {
                events::process_nbr_timeout(self, msg.router_id).await;
            }
        }
    }

    // Recomputes SPF, reconciles the RIB against the installer and
    // publishes a fresh forwarding snapshot. Installs happen only here,
    // between SPF runs.
    async fn sync(&mut self) {
        self.state.spf_pending = false;

        let spf_routes = spf::compute(
            self.config.router_id,
            &self.state.lsdb,
            &self.state.neighbors,
        );

        // Every mode except plain shortest-path keeps the full equal-cost
        // candidate set.
        let ecmp = self.config.selector != SelectorMode::Shortest;
        let desired = route::desired_routes(
            &self.config,
            &spf_routes,
            &self.state.lsdb,
            &self.state.neighbors,
            &self.state.local_prefixes,
            ecmp,
        );
        self.state.rib.set_desired(desired);
        self.state.rib.reconcile(&self.installer).await;

        // Shortest-path and ECMP forwarding read the equal-cost view; the
        // per-packet variants read the shortest-path forest, which keeps one
        // best path per neighbor and therefore candidates of unequal cost.
        let snapshot = match self.config.selector {
            SelectorMode::Shortest | SelectorMode::Ecmp => {
                route::forwarding_snapshot(
                    &spf_routes,
                    &self.state.lsdb,
                    &self.state.neighbors,
                    &self.interfaces,
                    &self.state.local_prefixes,
                )
            }
            SelectorMode::KShortest
            | SelectorMode::BudgetAware
            | SelectorMode::Bandit => {
                let forest = spf::compute_forest(
                    self.config.router_id,
                    &self.state.lsdb,
                    &self.state.neighbors,
                );
                route::forwarding_snapshot_forest(
                    &forest,
                    &self.state.lsdb,
                    &self.state.neighbors,
                    &self.interfaces,
                    &self.state.local_prefixes,
                )
            }
        };
        self.state.snapshot.store(Arc::new(snapshot));
    }

    // Emits a one-hop acknowledgement for a packet just forwarded toward
    // `destination`, reporting the queue delay measured on its egress.
    pub async fn send_feedback(
        &mut self,
        upstream: SocketAddrV4,
        ifindex: u32,
        destination: Ipv4Addr,
        queue_delay_us: u32,
    ) {
        let ack = Ack::new(destination, queue_delay_us);
        output::send_ack(self, upstream, ifindex, ack).await;
    }

    // Handle to the published forwarding snapshot, for data-path readers.
    pub fn snapshot(&self) -> Arc<ArcSwap<ForwardingSnapshot>> {
        self.state.snapshot.clone()
    }

    // Handle to the shared arm database.
    pub fn arms(&self) -> Arc<Mutex<ArmDb>> {
        self.state.arms.clone()
    }

    fn protocol_input_channels()
    -> (ProtocolInputChannelsTx, ProtocolInputChannelsRx) {
        let (net_frame_rxp, net_frame_rxc) = mpsc::channel(4);
        let (hello_intervalp, hello_intervalc) = mpsc::channel(4);
        let (lsa_originatep, lsa_originatec) = mpsc::channel(4);
        let (nbr_timeoutp, nbr_timeoutc) = mpsc::channel(4);

        let tx = ProtocolInputChannelsTx {
            net_frame_rx: net_frame_rxp,
            hello_interval: hello_intervalp,
            lsa_originate: lsa_originatep,
            nbr_timeout: nbr_timeoutp,
        };
        let rx = ProtocolInputChannelsRx {
            net_frame_rx: net_frame_rxc,
            hello_interval: hello_intervalc,
            lsa_originate: lsa_originatec,
            nbr_timeout: nbr_timeoutc,
        };

        (tx, rx)
    }
}

// ===== impl ProtocolInputChannelsRx =====

impl ProtocolInputChannelsRx {
    pub(crate) async fn recv(&mut self) -> Option<ProtocolInputMsg> {
        tokio::select! {
            msg = self.net_frame_rx.recv() => {
                msg.map(ProtocolInputMsg::NetRxFrame)
            }
            msg = self.hello_interval.recv() => {
                msg.map(ProtocolInputMsg::HelloInterval)
            }
            msg = self.lsa_originate.recv() => {
                msg.map(ProtocolInputMsg::LsaOriginate)
            }
            msg = self.nbr_timeout.recv() => {
                msg.map(ProtocolInputMsg::NbrTimeout)
            }
        }
    }
}
