//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

pub mod ip;
pub mod socket;
pub mod task;

// Channel type aliases.
pub type Sender<T> = tokio::sync::mpsc::Sender<T>;
pub type Receiver<T> = tokio::sync::mpsc::Receiver<T>;
pub type UnboundedSender<T> = tokio::sync::mpsc::UnboundedSender<T>;
pub type UnboundedReceiver<T> = tokio::sync::mpsc::UnboundedReceiver<T>;
