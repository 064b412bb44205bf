//! Run one command against a set of axes via socketcan and print the reply
use clap::Parser;

#[cfg(feature = "socketcan")]
use std::time::{Duration, Instant};

#[cfg(feature = "socketcan")]
use axisbus_cli::command::{Cli, Commands};
#[cfg(feature = "socketcan")]
use axisbus_controller::{common::open_socketcan, ControllerConfig, MotionCoordinator};

#[cfg(feature = "socketcan")]
const POLL_PERIOD: Duration = Duration::from_millis(10);

#[tokio::main]
async fn main() {
    env_logger::init();

    #[cfg(not(feature = "socketcan"))]
    {
        let _ = axisbus_cli::command::Cli::parse();
        panic!("This program is only supported with socketcan")
    }

    #[cfg(feature = "socketcan")]
    {
        let args = Cli::parse();
        let config = match &args.config {
            Some(path) => match ControllerConfig::load_from_file(path) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                }
            },
            None => ControllerConfig::default(),
        };

        let (tx, mut rx) = match open_socketcan(&args.socket) {
            Ok(pair) => pair,
            Err(e) => {
                eprintln!("Cannot open {}: {e}", args.socket);
                std::process::exit(1);
            }
        };

        let epoch = Instant::now();
        let now_ms = || epoch.elapsed().as_millis() as u64;

        let mut coordinator = match MotionCoordinator::start(tx, config, now_ms()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        };
        coordinator.process_rx(&mut rx, now_ms());

        let deadline = Duration::from_secs(args.timeout);
        let mut interval = tokio::time::interval(POLL_PERIOD);

        // Moves are planned from the drive positions, which must be read first
        if matches!(args.command, Commands::Move(_)) {
            if let Err(e) = coordinator.refresh_all_positions(now_ms()) {
                eprintln!("{e}");
                std::process::exit(1);
            }
            let mut next_100 = now_ms() + 100;
            while !coordinator.positions_known() {
                tokio::select! {
                    _ = interval.tick() => (),
                    _ = tokio::signal::ctrl_c() => {
                        eprintln!("Interrupted");
                        std::process::exit(130);
                    }
                }
                let now = now_ms();
                coordinator.process_rx(&mut rx, now);
                if now >= next_100 {
                    // Expires lost reads so they can be retried
                    coordinator.tick_100(now);
                    next_100 += 100;
                    if let Err(e) = coordinator.refresh_all_positions(now) {
                        log::warn!("{e}");
                    }
                }
                if epoch.elapsed() > deadline {
                    eprintln!("Positions not read after {} s", args.timeout);
                    std::process::exit(1);
                }
            }
            log::info!("All axis positions read");
        }

        let result = match &args.command {
            Commands::Zei(zei) => match zei.node {
                Some(node) => coordinator.start_zero_initialization_single_axis(node, now_ms()),
                None => coordinator.start_zero_initialization_all_axes(now_ms()),
            },
            Commands::Move(mv) => coordinator.move_axes(mv.to_command(), now_ms()),
            Commands::Status => {
                coordinator.request_status();
                Ok(())
            }
        };
        if let Err(e) = result {
            // Some rejections still produce a reply line
            if let Some(reply) = coordinator.pop_reply() {
                println!("{reply}");
            }
            eprintln!("{e}");
            std::process::exit(1);
        }

        let mut next_100 = now_ms() + 100;
        let mut next_500 = now_ms() + 500;
        loop {
            tokio::select! {
                _ = interval.tick() => (),
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("Interrupted");
                    std::process::exit(130);
                }
            }
            let now = now_ms();
            coordinator.process_rx(&mut rx, now);
            if now >= next_100 {
                coordinator.tick_100(now);
                next_100 += 100;
            }
            if now >= next_500 {
                coordinator.tick_500(now);
                next_500 += 500;
            }
            if let Some(reply) = coordinator.pop_reply() {
                println!("{reply}");
                break;
            }
            if epoch.elapsed() > deadline {
                eprintln!("No reply after {} s", args.timeout);
                std::process::exit(1);
            }
        }
    }
}
