//! Running traffic counters.

use crate::traffic::{Packet, Protocol};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Timestamps older than this (relative to the newest packet) are pruned
/// from the rate deque.
const RATE_RETENTION_SECS: f64 = 5.0;

/// Distinct source addresses tracked before the count saturates. Flood modes
/// draw random sources from a /8, so an uncapped set grows without bound.
pub const MAX_TRACKED_IPS: usize = 10_000;

/// Cumulative counters since the last reset.
#[derive(Debug, Default, Clone)]
pub struct RunningStats {
    total_packets: u64,
    mean_size: f64,
    unique_src_ips: HashSet<String>,
    unique_dst_ports: HashSet<u16>,
    protocol_counts: BTreeMap<Protocol, u64>,
    recent_timestamps: VecDeque<f64>,
}

/// Serializable view of [`RunningStats`] at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_packets: u64,
    pub packets_per_second: u64,
    pub mean_size: f64,
    pub unique_src_ips: usize,
    /// Set once [`MAX_TRACKED_IPS`] is reached; `unique_src_ips` is then a floor.
    pub unique_src_ips_saturated: bool,
    pub unique_dst_ports: usize,
    pub protocol_counts: BTreeMap<String, u64>,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, packet: &Packet) {
        self.total_packets += 1;
        // Incremental mean: avoids keeping every size around.
        self.mean_size += (packet.size as f64 - self.mean_size) / self.total_packets as f64;
        if self.unique_src_ips.len() < MAX_TRACKED_IPS {
            self.unique_src_ips.insert(packet.src_ip.clone());
        }
        self.unique_dst_ports.insert(packet.dst_port);
        *self.protocol_counts.entry(packet.protocol).or_default() += 1;

        self.recent_timestamps.push_back(packet.timestamp);
        let horizon = packet.timestamp - RATE_RETENTION_SECS;
        while self
            .recent_timestamps
            .front()
            .is_some_and(|&t| t < horizon)
        {
            self.recent_timestamps.pop_front();
        }
    }

    pub fn total_packets(&self) -> u64 {
        self.total_packets
    }

    /// Packets whose timestamp `t` satisfies `now - 1.0 < t <= now`.
    pub fn packets_per_second(&self, now: f64) -> u64 {
        self.recent_timestamps
            .iter()
            .filter(|&&t| t > now - 1.0 && t <= now)
            .count() as u64
    }

    pub fn snapshot(&self, now: f64) -> StatsSnapshot {
        StatsSnapshot {
            total_packets: self.total_packets,
            packets_per_second: self.packets_per_second(now),
            mean_size: self.mean_size,
            unique_src_ips: self.unique_src_ips.len(),
            unique_src_ips_saturated: self.unique_src_ips.len() >= MAX_TRACKED_IPS,
            unique_dst_ports: self.unique_dst_ports.len(),
            protocol_counts: self
                .protocol_counts
                .iter()
                .map(|(p, n)| (p.to_string(), *n))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::generator::PacketGenerator;
    use crate::traffic::AttackMode;

    #[test]
    fn test_packets_per_second_matches_manual_count() {
        let mut gen = PacketGenerator::seeded(3);
        let mut stats = RunningStats::new();
        let mut all = Vec::new();
        for tick in 0..20 {
            let batch = gen.next_batch(AttackMode::Normal, 100.0 + tick as f64 * 0.3);
            for p in &batch {
                stats.record(p);
            }
            all.extend(batch);
        }

        let now = 100.0 + 19.0 * 0.3;
        let manual = all
            .iter()
            .filter(|p| p.timestamp > now - 1.0 && p.timestamp <= now)
            .count() as u64;
        assert!(manual > 0);
        assert_eq!(stats.packets_per_second(now), manual);
        assert_eq!(stats.total_packets(), all.len() as u64);
    }

    #[test]
    fn test_incremental_mean_and_uniques() {
        let mut gen = PacketGenerator::seeded(11);
        let batch = gen.next_batch(AttackMode::PortScan, 50.0);
        let mut stats = RunningStats::new();
        for p in &batch {
            stats.record(p);
        }

        let expected = batch.iter().map(|p| p.size as f64).sum::<f64>() / batch.len() as f64;
        let snap = stats.snapshot(50.0);
        assert!((snap.mean_size - expected).abs() < 1e-9);
        assert_eq!(snap.unique_src_ips, 1);
        assert!(!snap.unique_src_ips_saturated);
        assert_eq!(snap.unique_dst_ports, batch.len());
        assert_eq!(snap.protocol_counts.get("TCP"), Some(&(batch.len() as u64)));
        assert_eq!(snap.packets_per_second, batch.len() as u64);
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = RunningStats::new().snapshot(0.0);
        assert_eq!(snap.total_packets, 0);
        assert_eq!(snap.packets_per_second, 0);
        assert_eq!(snap.mean_size, 0.0);
        assert!(snap.protocol_counts.is_empty());
    }

    #[test]
    fn test_flood_source_set_is_capped() {
        let mut gen = PacketGenerator::seeded(21);
        let mut stats = RunningStats::new();
        let mut recorded = 0u64;
        for tick in 0..400 {
            for p in gen.next_batch(AttackMode::DdosVolumetric, 200.0 + tick as f64 * 0.001) {
                stats.record(&p);
                recorded += 1;
            }
        }

        let snap = stats.snapshot(200.4);
        assert!(recorded > MAX_TRACKED_IPS as u64 * 2);
        assert_eq!(snap.total_packets, recorded);
        assert_eq!(snap.unique_src_ips, MAX_TRACKED_IPS);
        assert!(snap.unique_src_ips_saturated);
    }
}
