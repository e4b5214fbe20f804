//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::io::{IoSlice, IoSliceMut};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::ops::Deref;
use std::os::fd::AsRawFd;
use std::sync::Arc;

use nix::sys::socket::{
    self, ControlMessage, ControlMessageOwned, MsgFlags, SockaddrIn,
};
use romam_utils::Sender;
use romam_utils::ip::Ipv4AddrExt;
use romam_utils::socket::UdpSocketExt;
use socket2::Socket;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc::error::SendError;

use crate::config::CoreConfig;
use crate::debug::Debug;
use crate::error::{Error, IoError};
use crate::packet::Frame;
use crate::tasks::messages::input::NetRxFrameMsg;

// Multicast TTL of the control plane (one hop only).
pub const TTL: u8 = 1;

// ===== global functions =====

// Creates the control-plane endpoint: one nonblocking UDP socket bound to
// the configured port, with ingress interface reporting enabled and
// multicast loopback disabled. Group joins happen per interface at instance
// startup.
pub(crate) fn socket(
    config: &CoreConfig,
) -> Result<AsyncFd<Socket>, std::io::Error> {
    let addr =
        SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.multicast.port());
    let socket = Socket::bind_reuseaddr(addr)?;
    socket.set_ipv4_pktinfo(true)?;
    socket.set_multicast_ttl_v4(TTL.into())?;
    socket.set_multicast_loop_v4(false)?;
    AsyncFd::new(socket)
}

// Sends one encoded frame out the given interface. The egress interface is
// forced through an IP_PKTINFO control message rather than left to the
// kernel's routing choice.
pub(crate) async fn send_frame(
    socket: &AsyncFd<Socket>,
    ifindex: u32,
    src: Ipv4Addr,
    dst: SocketAddrV4,
    frame: &Frame,
) -> Result<usize, IoError> {
    Debug::FrameTx(ifindex, frame).log();

    // Encode frame.
    let buf = frame.encode();

    // Send frame.
    let iov = [IoSlice::new(&buf)];
    let sockaddr = SockaddrIn::from(dst);
    let pktinfo = libc::in_pktinfo {
        ipi_ifindex: ifindex as i32,
        ipi_spec_dst: libc::in_addr {
            s_addr: u32::from(src).to_be(),
        },
        ipi_addr: libc::in_addr { s_addr: 0 },
    };
    let cmsg = [ControlMessage::Ipv4PacketInfo(&pktinfo)];
    socket
        .async_io(Interest::WRITABLE, |socket| {
            socket::sendmsg(
                socket.as_raw_fd(),
                &iov,
                &cmsg,
                MsgFlags::empty(),
                Some(&sockaddr),
            )
            .map_err(|errno| errno.into())
        })
        .await
        .map_err(IoError::UdpSendError)
}

// Receive loop: reports each datagram to the instance together with its
// source address and ingress interface index. Transient errors are logged
// and the endpoint remains usable.
pub(crate) async fn read_loop(
    socket: Arc<AsyncFd<Socket>>,
    net_frame_rxp: Sender<NetRxFrameMsg>,
) -> Result<(), SendError<NetRxFrameMsg>> {
    let mut buf = [0; 16384];
    let mut iov = [IoSliceMut::new(&mut buf)];
    let mut cmsgspace = nix::cmsg_space!(libc::in_pktinfo);

    loop {
        // Receive frame.
        match socket
            .async_io(Interest::READABLE, |socket| {
                match socket::recvmsg::<SockaddrIn>(
                    socket.as_raw_fd(),
                    &mut iov,
                    Some(&mut cmsgspace),
                    MsgFlags::empty(),
                ) {
                    Ok(msg) => {
                        // Retrieve source address and ingress ifindex.
                        let src = msg.address;
                        let ifindex =
                            msg.cmsgs().unwrap().find_map(|cmsg| match cmsg {
                                ControlMessageOwned::Ipv4PacketInfo(
                                    pktinfo,
                                ) => Some(pktinfo.ipi_ifindex as u32),
                                _ => None,
                            });
                        Ok((src, ifindex, msg.bytes))
                    }
                    Err(errno) => Err(errno.into()),
                }
            })
            .await
        {
            Ok((src, ifindex, bytes)) => {
                let Some(src) = src else {
                    IoError::RecvMissingSourceAddr.log();
                    continue;
                };
                let src = SocketAddrV4::new(src.ip(), src.port());
                if !src.ip().is_usable() {
                    Error::FrameInvalidSourceAddr(*src.ip()).log();
                    continue;
                }
                let Some(ifindex) = ifindex else {
                    IoError::RecvMissingAncillaryData.log();
                    continue;
                };

                // Decode frame.
                let frame = Frame::decode(&iov[0].deref()[0..bytes]);
                let msg = NetRxFrameMsg {
                    src,
                    ifindex,
                    frame,
                };
                net_frame_rxp.send(msg).await?;
            }
            Err(error) => {
                IoError::UdpRecvError(error).log();
            }
        }
    }
}
