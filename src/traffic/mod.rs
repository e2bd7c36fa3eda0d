//! Synthetic traffic model -- packets, protocols, and attack modes.

pub mod generator;

use crate::detect::{AttackCategory, DetectError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Transport/application protocol of a synthetic packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Https,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Https => write!(f, "HTTPS"),
        }
    }
}

/// The single TCP flag carried by a synthetic packet, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TcpFlag {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "SYN")]
    Syn,
    #[serde(rename = "ACK")]
    Ack,
    #[serde(rename = "PSH")]
    Psh,
    #[serde(rename = "FIN")]
    Fin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// A generated (never captured) packet record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub size: u32,
    pub protocol: Protocol,
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub flags: TcpFlag,
    pub payload_entropy: f64,
    pub direction: Direction,
    /// Generator-side ground truth. Feature extraction only reads it for the
    /// diagnostic `tagged_ratio`; the classifier never sees it.
    pub attack_signature: AttackMode,
}

/// Traffic profile currently driving the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackMode {
    #[default]
    Normal,
    DdosVolumetric,
    PortScan,
    DataExfiltration,
    BotnetC2,
    SynFlood,
    DnsAmplification,
}

impl AttackMode {
    pub const ALL: [AttackMode; 7] = [
        AttackMode::Normal,
        AttackMode::DdosVolumetric,
        AttackMode::PortScan,
        AttackMode::DataExfiltration,
        AttackMode::BotnetC2,
        AttackMode::SynFlood,
        AttackMode::DnsAmplification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttackMode::Normal => "normal",
            AttackMode::DdosVolumetric => "ddos_volumetric",
            AttackMode::PortScan => "port_scan",
            AttackMode::DataExfiltration => "data_exfiltration",
            AttackMode::BotnetC2 => "botnet_c2",
            AttackMode::SynFlood => "syn_flood",
            AttackMode::DnsAmplification => "dns_amplification",
        }
    }

    pub fn is_attack(&self) -> bool {
        !matches!(self, AttackMode::Normal)
    }

    /// Delay between generator ticks. Floods tick fast, beacons tick slow.
    pub fn tick_interval(&self) -> Duration {
        match self {
            AttackMode::DdosVolumetric => Duration::from_millis(1),
            AttackMode::DnsAmplification => Duration::from_millis(20),
            AttackMode::SynFlood => Duration::from_millis(50),
            AttackMode::PortScan => Duration::from_millis(100),
            AttackMode::DataExfiltration => Duration::from_millis(500),
            AttackMode::BotnetC2 => Duration::from_secs(2),
            AttackMode::Normal => Duration::from_millis(300),
        }
    }

    /// The classifier category this profile is meant to look like.
    pub fn category(&self) -> Option<AttackCategory> {
        match self {
            AttackMode::Normal => None,
            AttackMode::DdosVolumetric => Some(AttackCategory::DdosVolumetric),
            AttackMode::PortScan => Some(AttackCategory::PortScan),
            AttackMode::DataExfiltration => Some(AttackCategory::DataExfiltration),
            AttackMode::BotnetC2 => Some(AttackCategory::BotnetC2),
            AttackMode::SynFlood => Some(AttackCategory::SynFlood),
            AttackMode::DnsAmplification => Some(AttackCategory::DnsAmplification),
        }
    }
}

impl std::fmt::Display for AttackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttackMode {
    type Err = DetectError;

    /// Accepts canonical names plus the short aliases used by the control routes
    /// (`dos`, `flooding`, `congestion`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mode = match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "none" | "stop" => AttackMode::Normal,
            "ddos_volumetric" | "ddos" | "dos" => AttackMode::DdosVolumetric,
            "port_scan" | "portscan" | "flooding" => AttackMode::PortScan,
            "data_exfiltration" | "exfiltration" | "congestion" => AttackMode::DataExfiltration,
            "botnet_c2" | "botnet" => AttackMode::BotnetC2,
            "syn_flood" | "synflood" => AttackMode::SynFlood,
            "dns_amplification" | "dns" => AttackMode::DnsAmplification,
            other => return Err(DetectError::UnknownMode(other.to_string())),
        };
        Ok(mode)
    }
}

/// Holds the process-wide attack mode. Writers call [`SimulationControl::set_mode`];
/// the generator loop reads it through a [`tokio::sync::watch::Receiver`].
#[derive(Clone)]
pub struct SimulationControl {
    tx: std::sync::Arc<tokio::sync::watch::Sender<AttackMode>>,
}

impl SimulationControl {
    pub fn new(initial: AttackMode) -> Self {
        let (tx, _rx) = tokio::sync::watch::channel(initial);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    pub fn mode(&self) -> AttackMode {
        *self.tx.borrow()
    }

    /// Set the mode. Returns `true` if the value actually changed.
    pub fn set_mode(&self, mode: AttackMode) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == mode {
                false
            } else {
                *current = mode;
                true
            }
        })
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<AttackMode> {
        self.tx.subscribe()
    }
}

impl Default for SimulationControl {
    fn default() -> Self {
        Self::new(AttackMode::Normal)
    }
}
