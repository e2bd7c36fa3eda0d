//! Hand-coded rule engine.
//!
//! Each category accumulates fixed weights as window metrics cross fixed
//! thresholds. Scores are clipped to [0, 1]; `normal_traffic` is the
//! complement of the strongest attack score.

use super::features::WindowStats;
use super::AttackCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Thresholds consulted by [`RuleEngine`]. Rates are packets/second, sizes bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    pub flood_rate_min: f64,
    pub ddos_ip_diversity_min: f64,
    pub ddos_mean_size_max: f64,
    pub ddos_udp_ratio_min: f64,
    pub ddos_icmp_ratio_min: f64,

    pub scan_port_diversity_min: f64,
    pub scan_syn_ratio_min: f64,
    pub scan_ip_diversity_max: f64,
    pub scan_size_range: (f64, f64),

    pub exfil_large_ratio_min: f64,
    pub exfil_entropy_min: f64,
    pub exfil_outbound_min: f64,

    pub beacon_rate_max: f64,
    pub beacon_entropy_range: (f64, f64),
    pub beacon_outbound_min: f64,
    pub beacon_size_range: (f64, f64),

    pub syn_flood_syn_ratio_min: f64,
    pub syn_flood_rate_min: f64,
    pub syn_flood_tcp_ratio_min: f64,
    pub syn_flood_same_dst_min: f64,

    pub amp_udp_ratio_min: f64,
    pub amp_dns_port_ratio_min: f64,
    pub amp_mean_size_min: f64,
    pub amp_rate_min: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            flood_rate_min: 100.0,
            ddos_ip_diversity_min: 0.5,
            ddos_mean_size_max: 500.0,
            ddos_udp_ratio_min: 0.4,
            ddos_icmp_ratio_min: 0.2,

            scan_port_diversity_min: 0.4,
            scan_syn_ratio_min: 0.5,
            scan_ip_diversity_max: 0.3,
            scan_size_range: (60.0, 200.0),

            exfil_large_ratio_min: 0.4,
            exfil_entropy_min: 0.6,
            exfil_outbound_min: 0.6,

            beacon_rate_max: 50.0,
            beacon_entropy_range: (0.5, 0.9),
            beacon_outbound_min: 0.8,
            beacon_size_range: (200.0, 500.0),

            syn_flood_syn_ratio_min: 0.6,
            syn_flood_rate_min: 50.0,
            syn_flood_tcp_ratio_min: 0.7,
            syn_flood_same_dst_min: 0.6,

            amp_udp_ratio_min: 0.6,
            amp_dns_port_ratio_min: 0.5,
            amp_mean_size_min: 300.0,
            amp_rate_min: 50.0,
        }
    }
}

/// Per-category rule scores, each in [0, 1].
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub ddos_volumetric: f64,
    pub port_scan: f64,
    pub data_exfiltration: f64,
    pub botnet_c2: f64,
    pub syn_flood: f64,
    pub dns_amplification: f64,
    pub normal_traffic: f64,
}

impl CategoryScores {
    pub fn get(&self, category: AttackCategory) -> f64 {
        match category {
            AttackCategory::DdosVolumetric => self.ddos_volumetric,
            AttackCategory::PortScan => self.port_scan,
            AttackCategory::DataExfiltration => self.data_exfiltration,
            AttackCategory::BotnetC2 => self.botnet_c2,
            AttackCategory::SynFlood => self.syn_flood,
            AttackCategory::DnsAmplification => self.dns_amplification,
        }
    }

    /// Highest-scoring attack category. Ties go to the category declared first.
    pub fn strongest(&self) -> (AttackCategory, f64) {
        let mut best = (AttackCategory::ALL[0], self.get(AttackCategory::ALL[0]));
        for category in AttackCategory::ALL.into_iter().skip(1) {
            let score = self.get(category);
            if score > best.1 {
                best = (category, score);
            }
        }
        best
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map: BTreeMap<String, f64> = AttackCategory::ALL
            .into_iter()
            .map(|c| (c.as_str().to_string(), self.get(c)))
            .collect();
        map.insert("normal_traffic".to_string(), self.normal_traffic);
        map
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    thresholds: RuleThresholds,
}

fn add_if(score: &mut f64, condition: bool, weight: f64) {
    if condition {
        *score += weight;
    }
}

fn in_range(value: f64, (lo, hi): (f64, f64)) -> bool {
    value >= lo && value <= hi
}

impl RuleEngine {
    pub fn new(thresholds: RuleThresholds) -> Self {
        Self { thresholds }
    }

    pub fn score(&self, s: &WindowStats) -> CategoryScores {
        let t = &self.thresholds;

        let mut ddos = 0.0;
        add_if(&mut ddos, s.packet_rate > t.flood_rate_min, 0.4);
        add_if(&mut ddos, s.ip_diversity > t.ddos_ip_diversity_min, 0.3);
        add_if(&mut ddos, s.mean_size < t.ddos_mean_size_max, 0.2);
        add_if(
            &mut ddos,
            s.udp_ratio > t.ddos_udp_ratio_min || s.icmp_ratio > t.ddos_icmp_ratio_min,
            0.1,
        );

        let mut scan = 0.0;
        add_if(&mut scan, s.port_diversity > t.scan_port_diversity_min, 0.4);
        add_if(&mut scan, s.syn_ratio > t.scan_syn_ratio_min, 0.3);
        add_if(&mut scan, s.ip_diversity < t.scan_ip_diversity_max, 0.2);
        add_if(&mut scan, in_range(s.mean_size, t.scan_size_range), 0.1);

        let mut exfil = 0.0;
        add_if(&mut exfil, s.large_packet_ratio > t.exfil_large_ratio_min, 0.3);
        add_if(&mut exfil, s.mean_entropy > t.exfil_entropy_min, 0.3);
        add_if(&mut exfil, s.outbound_ratio > t.exfil_outbound_min, 0.2);
        add_if(&mut exfil, s.packet_rate < t.flood_rate_min, 0.2);

        let mut beacon = 0.0;
        add_if(&mut beacon, s.packet_rate < t.beacon_rate_max, 0.2);
        add_if(&mut beacon, in_range(s.mean_entropy, t.beacon_entropy_range), 0.2);
        add_if(&mut beacon, s.outbound_ratio > t.beacon_outbound_min, 0.3);
        add_if(&mut beacon, in_range(s.mean_size, t.beacon_size_range), 0.3);

        let mut syn_flood = 0.0;
        add_if(&mut syn_flood, s.syn_ratio > t.syn_flood_syn_ratio_min, 0.4);
        add_if(&mut syn_flood, s.packet_rate > t.syn_flood_rate_min, 0.3);
        add_if(&mut syn_flood, s.tcp_ratio > t.syn_flood_tcp_ratio_min, 0.2);
        add_if(&mut syn_flood, s.same_dst_ratio > t.syn_flood_same_dst_min, 0.1);

        let mut amp = 0.0;
        add_if(&mut amp, s.udp_ratio > t.amp_udp_ratio_min, 0.3);
        add_if(&mut amp, s.dns_port_ratio > t.amp_dns_port_ratio_min, 0.3);
        add_if(&mut amp, s.mean_size >= t.amp_mean_size_min, 0.2);
        add_if(&mut amp, s.packet_rate > t.amp_rate_min, 0.2);

        let clip = |v: f64| v.clamp(0.0, 1.0);
        let mut scores = CategoryScores {
            ddos_volumetric: clip(ddos),
            port_scan: clip(scan),
            data_exfiltration: clip(exfil),
            botnet_c2: clip(beacon),
            syn_flood: clip(syn_flood),
            dns_amplification: clip(amp),
            normal_traffic: 0.0,
        };
        scores.normal_traffic = clip(1.0 - scores.strongest().1);
        scores
    }
}
