use anyhow::{anyhow, Context, Result};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::detect::TargetReport;
use crate::CameraRole;

/// Telemetry line for one analyzed frame.
///
/// `0 <role> <ts>` when no pair was found, otherwise
/// `1 <center_x> <top_y> <heading> <gap_dist> <rocket_dist> <standard_dist> <role> <ts>`.
pub fn format_report(role: CameraRole, report: &TargetReport, timestamp: f64) -> String {
    match &report.pair {
        None => format!("0 {role} {timestamp:.3}"),
        Some(pair) => format!(
            "1 {} {} {:.3} {:.3} {:.3} {:.3} {role} {timestamp:.3}",
            pair.center_x,
            pair.top_y,
            pair.heading,
            pair.distance_from_gap,
            pair.distance_from_vertical_rocket,
            pair.distance_from_vertical_standard,
        ),
    }
}

pub struct TelemetrySender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl TelemetrySender {
    pub fn connect(target: &str) -> Result<Self> {
        let target = target
            .to_socket_addrs()
            .with_context(|| format!("resolve telemetry target {target}"))?
            .next()
            .ok_or_else(|| anyhow!("telemetry target {target} has no address"))?;
        let bind_addr = if target.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind_addr).context("bind telemetry socket")?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn send_report(&self, role: CameraRole, report: &TargetReport, timestamp: f64) -> Result<()> {
        self.send(&format_report(role, report, timestamp))
    }

    pub fn send(&self, message: &str) -> Result<()> {
        self.socket
            .send_to(message.as_bytes(), self.target)
            .with_context(|| format!("send telemetry to {}", self.target))?;
        Ok(())
    }
}
