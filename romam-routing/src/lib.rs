//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

pub mod config;
pub mod debug;
pub mod error;
pub mod events;
pub mod instance;
pub mod interface;
pub mod lsdb;
pub mod neighbor;
pub mod network;
pub mod output;
pub mod packet;
pub mod route;
pub mod southbound;
pub mod spf;
pub mod tasks;
