//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use rtnetlink::Handle;
use tracing::info;

use crate::error::InstallError;
use crate::route::RouteEntry;

// Route protocol type as defined in the rtnetlink.h kernel header
// (an unassigned value in the private range).
const NETLINK_PROTO_ROMAM: u8 = 187;

// Pluggable forwarding installer. The kernel variant programs the Linux
// forwarding table through a netlink routing socket; the dry-run variant
// only logs and is used by `--dry-run` and by tests.
#[derive(Debug)]
pub enum RouteInstaller {
    Kernel(Handle),
    DryRun,
}

// ===== impl RouteInstaller =====

impl RouteInstaller {
    // Creates the netlink-backed installer.
    pub fn kernel() -> Result<RouteInstaller, std::io::Error> {
        let (conn, handle, _) = rtnetlink::new_connection()?;

        // Serve requests initiated by the netlink handle.
        tokio::spawn(conn);

        Ok(RouteInstaller::Kernel(handle))
    }

    // Creates the log-only installer.
    pub fn dry_run() -> RouteInstaller {
        RouteInstaller::DryRun
    }

    // Idempotently installs the given route, replacing any previous entry
    // for the same prefix.
    pub async fn replace(
        &self,
        entry: &RouteEntry,
    ) -> Result<(), InstallError> {
        match self {
            RouteInstaller::Kernel(handle) => {
                // Create netlink request.
                let mut request = handle
                    .route()
                    .add()
                    .protocol(NETLINK_PROTO_ROMAM.into())
                    .table_id(entry.table as u32)
                    .v4()
                    .replace()
                    .destination_prefix(entry.prefix.ip(), entry.prefix.prefix())
                    .priority(entry.metric);

                // Add nexthops.
                for nexthop in &entry.nexthops {
                    request = request
                        .gateway(nexthop.addr)
                        .output_interface(nexthop.ifindex);
                }

                // Execute request.
                request
                    .execute()
                    .await
                    .map_err(|error| InstallError::ReplaceFailed(error.to_string()))
            }
            RouteInstaller::DryRun => {
                info!(prefix = %entry.prefix, metric = %entry.metric,
                    nexthops = ?entry.nexthops, "route replace (dry-run)");
                Ok(())
            }
        }
    }

    // Removes the given route.
    pub async fn delete(
        &self,
        entry: &RouteEntry,
    ) -> Result<(), InstallError> {
        match self {
            RouteInstaller::Kernel(handle) => {
                // Create netlink request.
                let mut request = handle
                    .route()
                    .add()
                    .protocol(NETLINK_PROTO_ROMAM.into())
                    .table_id(entry.table as u32)
                    .v4()
                    .destination_prefix(entry.prefix.ip(), entry.prefix.prefix());

                // Execute request.
                let request =
                    handle.route().del(request.message_mut().clone());
                request
                    .execute()
                    .await
                    .map_err(|error| InstallError::DeleteFailed(error.to_string()))
            }
            RouteInstaller::DryRun => {
                info!(prefix = %entry.prefix, "route delete (dry-run)");
                Ok(())
            }
        }
    }
}
