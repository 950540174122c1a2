//! udp_send - send one control command to a running targetcamd

use anyhow::{Context, Result};
use clap::Parser;
use std::net::UdpSocket;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Host name or IP address of the camera daemon.
    #[arg(short = 's', long, default_value = "10.45.13.12")]
    server: String,
    /// Control port.
    #[arg(short = 'p', long, default_value_t = 5800)]
    port: u16,
    /// Message to send, e.g. "FRONT" or "BEARING 45".
    #[arg(short = 'm', long, default_value = "ping")]
    message: String,
    /// Seconds to wait for the reply.
    #[arg(long, default_value_t = 1.0)]
    timeout: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").context("bind udp socket")?;
    socket.set_read_timeout(Some(Duration::from_secs_f64(args.timeout.max(0.001))))?;
    let target = format!("{}:{}", args.server, args.port);
    socket
        .send_to(args.message.as_bytes(), &target)
        .with_context(|| format!("send to {target}"))?;
    log::info!("sent {:?} to {}", args.message, target);

    let mut buf = [0u8; 512];
    match socket.recv_from(&mut buf) {
        Ok((n, peer)) => println!("{}: {}", peer, String::from_utf8_lossy(&buf[..n])),
        Err(err) => log::warn!("no reply from {}: {}", target, err),
    }
    Ok(())
}
