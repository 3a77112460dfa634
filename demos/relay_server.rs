//! JPEG stream relay example
//!
//! Run with: cargo run --example relay_server [BIND_ADDR] [CAMERA_ADDR]
//!
//! Examples:
//!   cargo run --example relay_server                          # ws on 0.0.0.0:9998, camera on 127.0.0.1:9997
//!   cargo run --example relay_server 127.0.0.1:9000           # ws on 127.0.0.1:9000
//!   cargo run --example relay_server 0.0.0.0:9998 127.0.0.1:9997
//!
//! The camera side expects the external capture process to be serving raw
//! JPEG packets on its TCP port; the relay reconnects on its own if the
//! process is restarted. Point any number of `stream_viewer` instances (or
//! a browser client speaking the `jpeg-meta` subprotocol) at the bind
//! address.

use std::net::SocketAddr;

use camrelay::relay::{RelayConfig, RelayServer};

fn parse_addr(arg: &str, default_port: u16) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    Err(format!(
        "Invalid address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: relay_server [BIND_ADDR] [CAMERA_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR      WebSocket address to listen on (default: 0.0.0.0:9998)");
    eprintln!("  CAMERA_ADDR    Address of the capture process (default: 127.0.0.1:9997)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut config = RelayConfig::default();
    if let Some(arg) = args.get(1) {
        match parse_addr(arg, 9998) {
            Ok(addr) => config = config.bind(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                print_usage();
                std::process::exit(1);
            }
        }
    }
    if let Some(arg) = args.get(2) {
        match parse_addr(arg, 9997) {
            Ok(addr) => config = config.camera(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                print_usage();
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("camrelay=debug".parse()?),
        )
        .init();

    println!("Relaying camera {} on ws://{}/", config.camera_addr, config.bind_addr);

    let server = RelayServer::new(config);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Relay error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
            server.shutdown_camera();
        }
    }

    Ok(())
}
