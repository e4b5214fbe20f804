//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

use clap::{App, Arg};
use romam_routing::config::CoreConfig;
use romam_routing::instance::Instance;
use romam_routing::southbound::RouteInstaller;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

// Process exit codes.
const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_CONFIG_ERROR: i32 = 2;

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("romam=debug".parse().unwrap())
        .from_env_lossy();
    let stdout = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout)
        .init();
}

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let matches = App::new("Romam routing daemon")
        .version(clap::crate_version!())
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .required(true)
                .help("Specify the configuration file."),
        )
        .arg(
            Arg::with_name("dry-run")
                .long("dry-run")
                .help("Install routes via the log-only installer."),
        )
        .get_matches();

    // Initialize tracing.
    init_tracing();

    // Read configuration file.
    let config_file = matches.value_of("config").unwrap();
    let config = match CoreConfig::load(config_file) {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid configuration");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    // Set panic handler to abort the process if any child task panics.
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(EXIT_FAILURE);
    }));

    // We're ready to go!
    info!("starting up");

    let dry_run = matches.is_present("dry-run");
    let main = || async move {
        // Create the forwarding installer.
        let installer = if dry_run {
            RouteInstaller::dry_run()
        } else {
            match RouteInstaller::kernel() {
                Ok(installer) => installer,
                Err(error) => {
                    error!(%error, "failed to open netlink socket");
                    return EXIT_FAILURE;
                }
            }
        };

        // Bring the instance up and run it until shutdown.
        match Instance::new(config, installer).await {
            Ok((instance, rx)) => {
                instance.run(rx).await;
                EXIT_SUCCESS
            }
            Err(error) => {
                error!(%error, "failed to start instance");
                EXIT_FAILURE
            }
        }
    };
    let exit_code = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(main());

    std::process::exit(exit_code);
}
