//! Mode-shaped synthetic packet generator and its background tick loop.

use super::{AttackMode, Direction, Packet, Protocol, TcpFlag};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const MONITORED_HOST: &str = "192.168.1.100";

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn pick<T: Copy>(rng: &mut StdRng, items: &[T]) -> T {
    items[rng.gen_range(0..items.len())]
}

fn random_octet(rng: &mut StdRng) -> u8 {
    rng.gen_range(1..=255)
}

/// Produces one batch of packets per call, shaped by the attack mode.
pub struct PacketGenerator {
    rng: StdRng,
}

impl PacketGenerator {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    /// Deterministic generator for tests and offline runs.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Generate one batch stamped with `now`. Never fails; batch size depends on `mode`.
    pub fn next_batch(&mut self, mode: AttackMode, now: f64) -> Vec<Packet> {
        match mode {
            AttackMode::Normal => self.normal(now),
            AttackMode::DdosVolumetric => self.ddos_volumetric(now),
            AttackMode::PortScan => self.port_scan(now),
            AttackMode::DataExfiltration => self.data_exfiltration(now),
            AttackMode::BotnetC2 => self.botnet_c2(now),
            AttackMode::SynFlood => self.syn_flood(now),
            AttackMode::DnsAmplification => self.dns_amplification(now),
        }
    }

    fn normal(&mut self, now: f64) -> Vec<Packet> {
        let rng = &mut self.rng;
        let count = rng.gen_range(3..=8);
        (0..count)
            .map(|_| Packet {
                timestamp: now,
                size: rng.gen_range(200..=1200),
                protocol: pick(rng, &[Protocol::Tcp, Protocol::Tcp, Protocol::Udp, Protocol::Https]),
                src_ip: format!("192.168.1.{}", rng.gen_range(10..=50)),
                dst_ip: format!("192.168.1.{}", rng.gen_range(10..=50)),
                src_port: rng.gen_range(1024..=65535),
                dst_port: pick(rng, &[80, 443, 22, 25, 53]),
                flags: pick(rng, &[TcpFlag::Ack, TcpFlag::Psh, TcpFlag::Fin]),
                payload_entropy: rng.gen_range(0.4..0.7),
                direction: pick(rng, &[Direction::Inbound, Direction::Outbound]),
                attack_signature: AttackMode::Normal,
            })
            .collect()
    }

    fn ddos_volumetric(&mut self, now: f64) -> Vec<Packet> {
        let rng = &mut self.rng;
        let count = rng.gen_range(100..=200);
        (0..count)
            .map(|_| Packet {
                timestamp: now,
                size: pick(rng, &[64, 64, 64, 128, 1500]),
                protocol: pick(rng, &[Protocol::Udp, Protocol::Udp, Protocol::Udp, Protocol::Icmp]),
                src_ip: format!(
                    "10.{}.{}.{}",
                    random_octet(rng),
                    random_octet(rng),
                    random_octet(rng)
                ),
                dst_ip: MONITORED_HOST.to_string(),
                src_port: rng.gen_range(1024..=65535),
                dst_port: pick(rng, &[80, 443, 53]),
                flags: pick(rng, &[TcpFlag::None, TcpFlag::Syn, TcpFlag::Ack]),
                payload_entropy: rng.gen_range(0.1..0.3),
                direction: Direction::Inbound,
                attack_signature: AttackMode::DdosVolumetric,
            })
            .collect()
    }

    fn port_scan(&mut self, now: f64) -> Vec<Packet> {
        let rng = &mut self.rng;
        let count: u16 = rng.gen_range(20..=40);
        let base_port: u16 = rng.gen_range(1..=65_400);
        let scanner_ip = format!(
            "172.16.{}.{}",
            rng.gen_range(1..=10),
            rng.gen_range(1..=50)
        );
        (0..count)
            .map(|i| Packet {
                timestamp: now,
                size: rng.gen_range(60..=80),
                protocol: Protocol::Tcp,
                src_ip: scanner_ip.clone(),
                dst_ip: MONITORED_HOST.to_string(),
                src_port: rng.gen_range(1024..=65535),
                dst_port: base_port + i,
                flags: TcpFlag::Syn,
                payload_entropy: 0.0,
                direction: Direction::Inbound,
                attack_signature: AttackMode::PortScan,
            })
            .collect()
    }

    fn data_exfiltration(&mut self, now: f64) -> Vec<Packet> {
        let rng = &mut self.rng;
        let count = rng.gen_range(5..=15);
        (0..count)
            .map(|_| Packet {
                timestamp: now,
                size: rng.gen_range(1200..=1500),
                protocol: pick(rng, &[Protocol::Tcp, Protocol::Https]),
                src_ip: MONITORED_HOST.to_string(),
                dst_ip: format!("8.8.{}.{}", random_octet(rng), random_octet(rng)),
                src_port: rng.gen_range(1024..=65535),
                dst_port: pick(rng, &[443, 80, 53]),
                flags: TcpFlag::Psh,
                payload_entropy: rng.gen_range(0.8..1.0),
                direction: Direction::Outbound,
                attack_signature: AttackMode::DataExfiltration,
            })
            .collect()
    }

    fn botnet_c2(&mut self, now: f64) -> Vec<Packet> {
        let rng = &mut self.rng;
        let count = rng.gen_range(3..=8);
        let c2_server = format!("203.0.113.{}", rng.gen_range(1..=50));
        (0..count)
            .map(|_| Packet {
                timestamp: now,
                size: rng.gen_range(200..=400),
                protocol: pick(rng, &[Protocol::Tcp, Protocol::Https]),
                src_ip: MONITORED_HOST.to_string(),
                dst_ip: c2_server.clone(),
                src_port: rng.gen_range(1024..=65535),
                dst_port: pick(rng, &[443, 8080, 8443]),
                flags: TcpFlag::Ack,
                payload_entropy: rng.gen_range(0.6..0.8),
                direction: Direction::Outbound,
                attack_signature: AttackMode::BotnetC2,
            })
            .collect()
    }

    fn syn_flood(&mut self, now: f64) -> Vec<Packet> {
        let rng = &mut self.rng;
        let count = rng.gen_range(50..=100);
        (0..count)
            .map(|_| Packet {
                timestamp: now,
                size: rng.gen_range(60..=74),
                protocol: Protocol::Tcp,
                src_ip: format!(
                    "10.{}.{}.{}",
                    random_octet(rng),
                    random_octet(rng),
                    random_octet(rng)
                ),
                dst_ip: MONITORED_HOST.to_string(),
                src_port: rng.gen_range(1024..=65535),
                dst_port: 80,
                flags: TcpFlag::Syn,
                payload_entropy: 0.0,
                direction: Direction::Inbound,
                attack_signature: AttackMode::SynFlood,
            })
            .collect()
    }

    // Spoofed-source responses from a small set of open resolvers.
    fn dns_amplification(&mut self, now: f64) -> Vec<Packet> {
        let rng = &mut self.rng;
        let count = rng.gen_range(80..=150);
        (0..count)
            .map(|_| Packet {
                timestamp: now,
                size: rng.gen_range(512..=1400),
                protocol: Protocol::Udp,
                src_ip: format!("198.51.100.{}", rng.gen_range(1..=20)),
                dst_ip: MONITORED_HOST.to_string(),
                src_port: 53,
                dst_port: 53,
                flags: TcpFlag::None,
                payload_entropy: rng.gen_range(0.2..0.5),
                direction: Direction::Inbound,
                attack_signature: AttackMode::DnsAmplification,
            })
            .collect()
    }
}

/// Handle to a running generator task.
pub struct GeneratorHandle {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl GeneratorHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Request a cooperative stop. The loop notices within one tick interval.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop and wait for the task to exit.
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.task.await;
    }
}

/// Spawn [`run_generator_loop`] on the current runtime.
pub fn spawn_generator(
    generator: PacketGenerator,
    mode_rx: watch::Receiver<AttackMode>,
    sender: mpsc::Sender<Vec<Packet>>,
) -> GeneratorHandle {
    let running = Arc::new(AtomicBool::new(true));
    let task = tokio::spawn(run_generator_loop(
        generator,
        mode_rx,
        sender,
        running.clone(),
    ));
    GeneratorHandle { running, task }
}

/// Generate one batch per tick and push it into the bounded channel.
///
/// Exits when `running` is cleared or the receiving side hangs up. Backpressure
/// from a full channel slows the loop down instead of dropping batches.
pub async fn run_generator_loop(
    mut generator: PacketGenerator,
    mode_rx: watch::Receiver<AttackMode>,
    sender: mpsc::Sender<Vec<Packet>>,
    running: Arc<AtomicBool>,
) {
    info!(mode = %*mode_rx.borrow(), "Packet generator started");
    let mut last_mode = *mode_rx.borrow();

    while running.load(Ordering::SeqCst) {
        let mode = *mode_rx.borrow();
        if mode != last_mode {
            info!(from = %last_mode, to = %mode, "Generator switched attack mode");
            last_mode = mode;
        }

        let batch = generator.next_batch(mode, unix_now());
        debug!(mode = %mode, packets = batch.len(), "Generated batch");
        if sender.send(batch).await.is_err() {
            debug!("Packet channel closed");
            break;
        }

        tokio::time::sleep(mode.tick_interval()).await;
    }

    info!("Packet generator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_batch_sizes_follow_mode() {
        let mut gen = PacketGenerator::seeded(7);
        for _ in 0..20 {
            let n = gen.next_batch(AttackMode::Normal, 0.0).len();
            assert!((3..=8).contains(&n));
            let n = gen.next_batch(AttackMode::DdosVolumetric, 0.0).len();
            assert!((100..=200).contains(&n));
            let n = gen.next_batch(AttackMode::BotnetC2, 0.0).len();
            assert!((3..=8).contains(&n));
        }
    }

    #[test]
    fn test_seeded_generator_is_reproducible() {
        let a = PacketGenerator::seeded(42).next_batch(AttackMode::PortScan, 1.0);
        let b = PacketGenerator::seeded(42).next_batch(AttackMode::PortScan, 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_port_scan_batch_shape() {
        let batch = PacketGenerator::seeded(3).next_batch(AttackMode::PortScan, 5.0);
        let sources: HashSet<_> = batch.iter().map(|p| p.src_ip.as_str()).collect();
        let ports: HashSet<_> = batch.iter().map(|p| p.dst_port).collect();
        assert_eq!(sources.len(), 1);
        assert_eq!(ports.len(), batch.len());
        assert!(batch.iter().all(|p| p.flags == TcpFlag::Syn));
        assert!(batch.iter().all(|p| p.timestamp == 5.0));
    }

    #[test]
    fn test_signature_tags_match_mode() {
        let mut gen = PacketGenerator::seeded(11);
        for mode in AttackMode::ALL {
            let batch = gen.next_batch(mode, 0.0);
            assert!(!batch.is_empty());
            assert!(batch.iter().all(|p| p.attack_signature == mode));
            assert!(batch
                .iter()
                .all(|p| (0.0..=1.0).contains(&p.payload_entropy)));
        }
    }

    #[tokio::test]
    async fn test_loop_pushes_batches_and_stops() {
        let control = crate::traffic::SimulationControl::new(AttackMode::SynFlood);
        let (tx, mut rx) = mpsc::channel(4);
        let handle = spawn_generator(PacketGenerator::seeded(1), control.subscribe(), tx);

        let batch = rx.recv().await.expect("first batch");
        assert!(batch.iter().all(|p| p.attack_signature == AttackMode::SynFlood));
        assert!(handle.is_running());

        handle.stop();
        assert!(!handle.is_running());
        // Drain until the loop drops its sender.
        while rx.recv().await.is_some() {}
    }
}
