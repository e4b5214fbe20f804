//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use tracing::{error, warn};

use crate::packet::DecodeError;

// Romam errors.
#[derive(Debug)]
pub enum Error {
    IoError(IoError),
    FrameDecodeError(DecodeError),
    FrameInvalidSourceAddr(Ipv4Addr),
    FrameUnknownInterface(u32),
    HelloOwnRouterId(Ipv4Addr),
    LsaSeqWraparound(Ipv4Addr, u32, u32),
    InterfaceStartError(String, IoError),
    InstallError(Ipv4Network, InstallError),
}

// Romam I/O errors.
#[derive(Debug)]
pub enum IoError {
    InterfaceQueryError(std::io::Error),
    UdpSocketError(std::io::Error),
    UdpMulticastJoinError(std::io::Error),
    UdpRecvError(std::io::Error),
    UdpSendError(std::io::Error),
    RecvMissingSourceAddr,
    RecvMissingAncillaryData,
}

// Route installer errors.
#[derive(Debug)]
pub enum InstallError {
    ReplaceFailed(String),
    DeleteFailed(String),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::IoError(error) => {
                error.log();
            }
            Error::FrameDecodeError(error) => {
                warn!(%error, "{}", self);
            }
            Error::FrameInvalidSourceAddr(addr) => {
                warn!(address = %addr, "{}", self);
            }
            Error::FrameUnknownInterface(ifindex) => {
                warn!(%ifindex, "{}", self);
            }
            Error::HelloOwnRouterId(router_id) => {
                warn!(%router_id, "{}", self);
            }
            Error::LsaSeqWraparound(router_id, stored, offered) => {
                warn!(%router_id, %stored, %offered, "{}", self);
            }
            Error::InterfaceStartError(name, error) => {
                error!(%name, error = %with_source(error), "{}", self);
            }
            Error::InstallError(prefix, error) => {
                warn!(%prefix, %error, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(error) => error.fmt(f),
            Error::FrameDecodeError(..) => {
                write!(f, "failed to decode frame")
            }
            Error::FrameInvalidSourceAddr(..) => {
                write!(f, "invalid source address")
            }
            Error::FrameUnknownInterface(..) => {
                write!(f, "frame received on unknown interface")
            }
            Error::HelloOwnRouterId(..) => {
                write!(f, "hello carrying our own router id")
            }
            Error::LsaSeqWraparound(..) => {
                write!(f, "sequence number wraparound suspected")
            }
            Error::InterfaceStartError(..) => {
                write!(f, "failed to start interface")
            }
            Error::InstallError(..) => {
                write!(f, "failed to program route")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(error) => Some(error),
            Error::FrameDecodeError(error) => Some(error),
            Error::InterfaceStartError(_, error) => Some(error),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

// ===== impl IoError =====

impl IoError {
    pub(crate) fn log(&self) {
        match self {
            IoError::InterfaceQueryError(error)
            | IoError::UdpSocketError(error)
            | IoError::UdpMulticastJoinError(error)
            | IoError::UdpRecvError(error)
            | IoError::UdpSendError(error) => {
                warn!(error = %with_source(error), "{}", self);
            }
            IoError::RecvMissingSourceAddr
            | IoError::RecvMissingAncillaryData => {
                warn!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::InterfaceQueryError(..) => {
                write!(f, "failed to query system interfaces")
            }
            IoError::UdpSocketError(..) => {
                write!(f, "failed to create UDP socket")
            }
            IoError::UdpMulticastJoinError(..) => {
                write!(f, "failed to join multicast group")
            }
            IoError::UdpRecvError(..) => {
                write!(f, "failed to receive UDP packet")
            }
            IoError::UdpSendError(..) => {
                write!(f, "failed to send UDP packet")
            }
            IoError::RecvMissingSourceAddr => {
                write!(f, "received packet without source address")
            }
            IoError::RecvMissingAncillaryData => {
                write!(f, "received packet without ancillary data")
            }
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::InterfaceQueryError(error)
            | IoError::UdpSocketError(error)
            | IoError::UdpMulticastJoinError(error)
            | IoError::UdpRecvError(error)
            | IoError::UdpSendError(error) => Some(error),
            _ => None,
        }
    }
}

// ===== impl InstallError =====

impl std::fmt::Display for InstallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallError::ReplaceFailed(reason) => {
                write!(f, "route replace failed: {reason}")
            }
            InstallError::DeleteFailed(reason) => {
                write!(f, "route delete failed: {reason}")
            }
        }
    }
}

impl std::error::Error for InstallError {}

// ===== global functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
