use crate::traffic::{Direction, Packet, Protocol, TcpFlag};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Added to the observed time span so a single-instant window has a finite rate.
pub const TIME_SPAN_EPSILON: f64 = 0.1;

/// Packets above this size count toward the large-packet ratio.
pub const LARGE_PACKET_BYTES: u32 = 1000;

const RATE_DIVISOR: f64 = 100.0;
const SIZE_DIVISOR: f64 = 1500.0;
const VARIANCE_DIVISOR: f64 = 100_000.0;

/// Raw (unnormalized) metrics of a packet window.
///
/// The rule engine reads these directly; [`FeatureVector`] is the normalized
/// projection the nonlinear scorer sees.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct WindowStats {
    pub packet_count: usize,
    pub time_span: f64,
    /// Packets per second over the window.
    pub packet_rate: f64,
    pub mean_size: f64,
    pub size_variance: f64,
    pub ip_diversity: f64,
    pub port_diversity: f64,
    pub tcp_ratio: f64,
    pub udp_ratio: f64,
    pub icmp_ratio: f64,
    /// TCP / (TCP + UDP + 1).
    pub tcp_concentration: f64,
    pub mean_entropy: f64,
    pub syn_ratio: f64,
    pub large_packet_ratio: f64,
    pub outbound_ratio: f64,
    pub same_dst_ratio: f64,
    pub dns_port_ratio: f64,
    /// Fraction of packets the generator tagged as non-normal. Diagnostic only:
    /// it leaks ground truth and never reaches the classifier.
    pub tagged_ratio: f64,
}

impl WindowStats {
    /// Compute the window metrics. Pure: same packets in the same order give
    /// bit-identical output. An empty window yields all zeros.
    pub fn from_window(packets: &[Packet]) -> Self {
        if packets.is_empty() {
            return Self::default();
        }

        let n = packets.len() as f64;

        let (min_ts, max_ts) = packets.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), p| (lo.min(p.timestamp), hi.max(p.timestamp)),
        );
        let time_span = (max_ts - min_ts) + TIME_SPAN_EPSILON;

        let mean_size = packets.iter().map(|p| p.size as f64).sum::<f64>() / n;
        let size_variance = packets
            .iter()
            .map(|p| (p.size as f64 - mean_size).powi(2))
            .sum::<f64>()
            / n;

        let unique_ips: HashSet<&str> = packets.iter().map(|p| p.src_ip.as_str()).collect();

        let mut port_counts: HashMap<u16, usize> = HashMap::new();
        for p in packets {
            *port_counts.entry(p.dst_port).or_default() += 1;
        }
        let max_port_count = port_counts.values().copied().max().unwrap_or(0);

        let tcp = count_where(packets, |p| p.protocol == Protocol::Tcp);
        let udp = count_where(packets, |p| p.protocol == Protocol::Udp);
        let icmp = count_where(packets, |p| p.protocol == Protocol::Icmp);
        let syn = count_where(packets, |p| p.flags == TcpFlag::Syn);
        let large = count_where(packets, |p| p.size > LARGE_PACKET_BYTES);
        let outbound = count_where(packets, |p| p.direction == Direction::Outbound);
        let dns = count_where(packets, |p| p.dst_port == 53);
        let tagged = count_where(packets, |p| p.attack_signature.is_attack());

        Self {
            packet_count: packets.len(),
            time_span,
            packet_rate: n / time_span,
            mean_size,
            size_variance,
            ip_diversity: unique_ips.len() as f64 / n,
            port_diversity: port_counts.len() as f64 / n,
            tcp_ratio: tcp as f64 / n,
            udp_ratio: udp as f64 / n,
            icmp_ratio: icmp as f64 / n,
            tcp_concentration: tcp as f64 / (tcp + udp + 1) as f64,
            mean_entropy: packets.iter().map(|p| p.payload_entropy).sum::<f64>() / n,
            syn_ratio: syn as f64 / n,
            large_packet_ratio: large as f64 / n,
            outbound_ratio: outbound as f64 / n,
            same_dst_ratio: max_port_count as f64 / n,
            dns_port_ratio: dns as f64 / n,
            tagged_ratio: tagged as f64 / n,
        }
    }
}

fn count_where(packets: &[Packet], pred: impl Fn(&Packet) -> bool) -> usize {
    packets.iter().filter(|p| pred(p)).count()
}

/// Normalized feature vector fed to the nonlinear scorer. Every element is in [0, 1].
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub packet_rate: f64,
    pub mean_size: f64,
    pub ip_diversity: f64,
    pub port_diversity: f64,
    pub tcp_concentration: f64,
    pub mean_entropy: f64,
    pub size_variance: f64,
    pub syn_ratio: f64,
    pub large_packet_ratio: f64,
    pub outbound_ratio: f64,
    pub same_dst_ratio: f64,
}

impl FeatureVector {
    pub const LEN: usize = 11;

    /// All-zero vector; signals "insufficient data".
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn names() -> [&'static str; Self::LEN] {
        [
            "packet_rate",
            "mean_size",
            "ip_diversity",
            "port_diversity",
            "tcp_concentration",
            "mean_entropy",
            "size_variance",
            "syn_ratio",
            "large_packet_ratio",
            "outbound_ratio",
            "same_dst_ratio",
        ]
    }

    pub fn from_stats(stats: &WindowStats) -> Self {
        let unit = |v: f64| v.clamp(0.0, 1.0);
        Self {
            packet_rate: unit(stats.packet_rate / RATE_DIVISOR),
            mean_size: unit(stats.mean_size / SIZE_DIVISOR),
            ip_diversity: unit(stats.ip_diversity),
            port_diversity: unit(stats.port_diversity),
            tcp_concentration: unit(stats.tcp_concentration),
            mean_entropy: unit(stats.mean_entropy),
            size_variance: unit(stats.size_variance / VARIANCE_DIVISOR),
            syn_ratio: unit(stats.syn_ratio),
            large_packet_ratio: unit(stats.large_packet_ratio),
            outbound_ratio: unit(stats.outbound_ratio),
            same_dst_ratio: unit(stats.same_dst_ratio),
        }
    }

    /// Feature vector of a window, or the zero vector when the window holds
    /// fewer than `min_packets` packets.
    pub fn from_window(packets: &[Packet], min_packets: usize) -> Self {
        if packets.is_empty() || packets.len() < min_packets {
            return Self::zero();
        }
        Self::from_stats(&WindowStats::from_window(packets))
    }

    pub fn to_vector(&self) -> [f64; Self::LEN] {
        [
            self.packet_rate,
            self.mean_size,
            self.ip_diversity,
            self.port_diversity,
            self.tcp_concentration,
            self.mean_entropy,
            self.size_variance,
            self.syn_ratio,
            self.large_packet_ratio,
            self.outbound_ratio,
            self.same_dst_ratio,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.to_vector().iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::generator::PacketGenerator;
    use crate::traffic::AttackMode;

    fn packet(ts: f64, size: u32, src: &str, port: u16, flags: TcpFlag) -> Packet {
        Packet {
            timestamp: ts,
            size,
            protocol: Protocol::Tcp,
            src_ip: src.to_string(),
            dst_ip: "192.168.1.100".to_string(),
            src_port: 40000,
            dst_port: port,
            flags,
            payload_entropy: 0.5,
            direction: Direction::Inbound,
            attack_signature: AttackMode::Normal,
        }
    }

    #[test]
    fn test_empty_window_is_zero() {
        assert_eq!(WindowStats::from_window(&[]), WindowStats::default());
        assert_eq!(FeatureVector::from_window(&[], 1), FeatureVector::zero());
    }

    #[test]
    fn test_below_minimum_is_zero_vector() {
        let window: Vec<_> = (0..9)
            .map(|i| packet(i as f64, 100, "10.0.0.1", 80, TcpFlag::Ack))
            .collect();
        assert_eq!(FeatureVector::from_window(&window, 10), FeatureVector::zero());
        assert_ne!(FeatureVector::from_window(&window, 9), FeatureVector::zero());
    }

    #[test]
    fn test_ratios_on_handmade_window() {
        // 4 packets in the same instant: 2 sources, 3 ports, 2 SYN, 1 large.
        let window = vec![
            packet(10.0, 60, "10.0.0.1", 22, TcpFlag::Syn),
            packet(10.0, 60, "10.0.0.1", 22, TcpFlag::Syn),
            packet(10.0, 1400, "10.0.0.2", 80, TcpFlag::Ack),
            packet(10.0, 80, "10.0.0.2", 443, TcpFlag::Ack),
        ];
        let s = WindowStats::from_window(&window);
        assert_eq!(s.packet_count, 4);
        assert!((s.time_span - TIME_SPAN_EPSILON).abs() < 1e-12);
        assert!((s.packet_rate - 40.0).abs() < 1e-9);
        assert_eq!(s.ip_diversity, 0.5);
        assert_eq!(s.port_diversity, 0.75);
        assert_eq!(s.syn_ratio, 0.5);
        assert_eq!(s.large_packet_ratio, 0.25);
        assert_eq!(s.same_dst_ratio, 0.5);
        assert_eq!(s.mean_size, 400.0);
        // 4 TCP, 0 UDP -> 4 / 5
        assert!((s.tcp_concentration - 0.8).abs() < 1e-12);
        assert_eq!(s.tagged_ratio, 0.0);
    }

    #[test]
    fn test_features_are_normalized() {
        let mut gen = PacketGenerator::seeded(5);
        for mode in AttackMode::ALL {
            let window = gen.next_batch(mode, 100.0);
            let fv = FeatureVector::from_window(&window, 1);
            assert!(fv.is_finite());
            assert!(fv.to_vector().iter().all(|v| (0.0..=1.0).contains(v)), "{mode}: {fv:?}");
        }
    }

    #[test]
    fn test_extraction_is_pure() {
        let mut gen = PacketGenerator::seeded(9);
        let mut window = gen.next_batch(AttackMode::Normal, 1.0);
        window.extend(gen.next_batch(AttackMode::BotnetC2, 1.5));
        window.extend(gen.next_batch(AttackMode::Normal, 2.0));

        let a = FeatureVector::from_window(&window, 5);
        let b = FeatureVector::from_window(&window.clone(), 5);
        assert_eq!(a.to_vector().map(f64::to_bits), b.to_vector().map(f64::to_bits));
    }

    #[test]
    fn test_names_match_vector_length() {
        assert_eq!(FeatureVector::names().len(), FeatureVector::zero().to_vector().len());
    }
}
