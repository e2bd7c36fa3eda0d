//! Blended classifier: rule engine + nonlinear scorer -> [`AnalysisRecord`].

use super::features::{FeatureVector, WindowStats};
use super::rules::{RuleEngine, RuleThresholds};
use super::scorer::NeuralScorer;
use super::{AnalysisRecord, DetectError, Verdict};
use crate::traffic::Packet;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Classifier knobs. Also the `[detector]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Number of trailing packets analyzed per cycle.
    pub window_size: usize,
    /// Below this many packets the classifier returns the insufficient-data sentinel.
    pub min_packets: usize,
    /// A category is predicted only when its rule score exceeds this.
    pub confidence_threshold: f64,
    /// `attack_detected` is set when the combined score exceeds this.
    pub attack_threshold: f64,
    pub scorer_weight: f64,
    pub rule_weight: f64,
    /// Optional scorer model JSON; the embedded model is used when unset or unreadable.
    pub model_path: Option<PathBuf>,
    pub rules: RuleThresholds,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            min_packets: 10,
            confidence_threshold: 0.5,
            attack_threshold: 0.6,
            scorer_weight: 0.6,
            rule_weight: 0.4,
            model_path: None,
            rules: RuleThresholds::default(),
        }
    }
}

pub struct Classifier {
    config: ClassifierConfig,
    rules: RuleEngine,
    scorer: NeuralScorer,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, DetectError> {
        let scorer = NeuralScorer::load_or_embedded(config.model_path.as_deref())?;
        Ok(Self::with_scorer(config, scorer))
    }

    pub fn with_scorer(config: ClassifierConfig, scorer: NeuralScorer) -> Self {
        let rules = RuleEngine::new(config.rules.clone());
        Self {
            config,
            rules,
            scorer,
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn scorer(&self) -> &NeuralScorer {
        &self.scorer
    }

    /// Weighted average of the scorer output and the strongest rule score, in [0, 1].
    pub fn blend(&self, scorer_score: f64, rule_score: f64) -> f64 {
        let (ws, wr) = (
            self.config.scorer_weight.max(0.0),
            self.config.rule_weight.max(0.0),
        );
        let total = ws + wr;
        let combined = if total > 0.0 {
            (ws * scorer_score + wr * rule_score) / total
        } else {
            (scorer_score + rule_score) / 2.0
        };
        combined.clamp(0.0, 1.0)
    }

    /// Classify a packet window. Always returns a record:
    /// the insufficient-data sentinel for short windows, and a low-confidence
    /// `normal_traffic` record if any intermediate value is not finite.
    pub fn classify(&self, window: &[Packet]) -> AnalysisRecord {
        if window.is_empty() || window.len() < self.config.min_packets {
            return AnalysisRecord::insufficient_data(window.len());
        }

        let stats = WindowStats::from_window(window);
        let features = FeatureVector::from_stats(&stats);
        if !features.is_finite() {
            warn!(packets = window.len(), "Non-finite features, defaulting to normal");
            return AnalysisRecord::new(Verdict::NormalTraffic, window.len(), FeatureVector::zero());
        }

        let category_scores = self.rules.score(&stats);
        let (strongest, rule_score) = category_scores.strongest();
        let scorer_score = self.scorer.score(&features);
        let combined_score = self.blend(scorer_score, rule_score);

        if ![rule_score, scorer_score, combined_score, category_scores.normal_traffic]
            .iter()
            .all(|v| v.is_finite())
        {
            warn!(packets = window.len(), "Non-finite scores, defaulting to normal");
            return AnalysisRecord::new(Verdict::NormalTraffic, window.len(), features);
        }

        let (label, confidence) = if rule_score > self.config.confidence_threshold {
            (Verdict::Attack(strongest), rule_score)
        } else {
            (Verdict::NormalTraffic, category_scores.normal_traffic)
        };

        debug!(
            label = %label,
            rule = rule_score,
            scorer = scorer_score,
            combined = combined_score,
            "Window classified"
        );

        let mut record = AnalysisRecord::new(label, window.len(), features);
        record.category_scores = category_scores.to_map();
        record.rule_score = rule_score;
        record.scorer_score = scorer_score;
        record.combined_score = combined_score;
        record.confidence = confidence;
        record.attack_detected = combined_score > self.config.attack_threshold;
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::AttackCategory;
    use crate::traffic::generator::PacketGenerator;
    use crate::traffic::{AttackMode, Direction, Protocol, TcpFlag};

    fn classifier() -> Classifier {
        Classifier::new(ClassifierConfig::default()).unwrap()
    }

    fn base_packet(i: usize) -> Packet {
        Packet {
            timestamp: 1_700_000_000.0,
            size: 100,
            protocol: Protocol::Udp,
            src_ip: format!("10.0.{}.{}", i / 250, i % 250 + 1),
            dst_ip: "192.168.1.100".to_string(),
            src_port: 40000,
            dst_port: 80,
            flags: TcpFlag::None,
            payload_entropy: 0.2,
            direction: Direction::Inbound,
            attack_signature: AttackMode::Normal,
        }
    }

    /// 50 packets over a 0.1 s spread (rate 250/s), every source distinct, 100-byte packets.
    fn ddos_window() -> Vec<Packet> {
        (0..50)
            .map(|i| Packet {
                timestamp: 1_700_000_000.0 + (i % 3) as f64 * 0.05,
                dst_port: [80, 443, 53][i % 3],
                ..base_packet(i)
            })
            .collect()
    }

    /// One scanner, distinct ports, SYN only.
    fn port_scan_window() -> Vec<Packet> {
        (0..50)
            .map(|i| Packet {
                size: 64,
                protocol: Protocol::Tcp,
                src_ip: if i < 45 { "172.16.4.20".to_string() } else { format!("172.16.9.{i}") },
                dst_port: 1000 + i as u16,
                flags: if i < 40 { TcpFlag::Syn } else { TcpFlag::Ack },
                payload_entropy: 0.0,
                ..base_packet(i)
            })
            .collect()
    }

    #[test]
    fn test_short_window_returns_sentinel() {
        let c = classifier();
        let window: Vec<_> = (0..9).map(base_packet).collect();
        let rec = c.classify(&window);
        assert_eq!(rec.label, Verdict::InsufficientData);
        assert_eq!(rec.combined_score, 0.0);
        assert_eq!(rec.confidence, 0.0);
        assert!(!rec.attack_detected);
        assert_eq!(rec.packet_count, 9);

        let again = c.classify(&window);
        assert!(rec.same_outcome(&again));
        assert_eq!(c.classify(&[]).label, Verdict::InsufficientData);
    }

    #[test]
    fn test_ddos_profile_is_ddos() {
        let window = ddos_window();
        let stats = WindowStats::from_window(&window);
        assert!(stats.packet_rate > 150.0);
        assert!(stats.ip_diversity > 0.8);
        assert!(stats.mean_size < 200.0);

        let rec = classifier().classify(&window);
        assert_eq!(rec.label, Verdict::Attack(AttackCategory::DdosVolumetric));
        assert!(rec.confidence > 0.5);
        assert_eq!(rec.severity, crate::detect::Severity::Critical);
    }

    #[test]
    fn test_port_scan_profile_is_port_scan() {
        let window = port_scan_window();
        let stats = WindowStats::from_window(&window);
        assert!(stats.port_diversity > 0.6);
        assert!(stats.syn_ratio > 0.7);
        assert!(stats.ip_diversity < 0.2);

        let rec = classifier().classify(&window);
        assert_eq!(rec.label, Verdict::Attack(AttackCategory::PortScan));
        assert_eq!(
            rec.recommendation,
            "Block source IP, implement port scan detection rules"
        );
    }

    #[test]
    fn test_combined_score_bounds_and_detection_threshold() {
        let c = classifier();
        let mut gen = PacketGenerator::seeded(99);
        for mode in AttackMode::ALL {
            let mut window = Vec::new();
            for tick in 0..30 {
                let ts = 2000.0 + tick as f64 * mode.tick_interval().as_secs_f64();
                window.extend(gen.next_batch(mode, ts));
            }
            let start = window.len().saturating_sub(c.config().window_size);
            let rec = c.classify(&window[start..]);
            assert!((0.0..=1.0).contains(&rec.combined_score), "{mode}");
            assert_eq!(rec.attack_detected, rec.combined_score > 0.6, "{mode}");
        }
    }

    #[test]
    fn test_generated_profiles_match_their_category() {
        let c = classifier();
        let mut gen = PacketGenerator::seeded(1234);
        for mode in AttackMode::ALL {
            let mut window = Vec::new();
            for tick in 0..40 {
                let ts = 5000.0 + tick as f64 * mode.tick_interval().as_secs_f64();
                window.extend(gen.next_batch(mode, ts));
            }
            let start = window.len().saturating_sub(50);
            let rec = c.classify(&window[start..]);
            match mode.category() {
                Some(category) => {
                    assert_eq!(rec.label, Verdict::Attack(category), "{mode}: {rec:?}");
                    assert!(rec.attack_detected, "{mode}: {rec:?}");
                }
                None => {
                    assert_eq!(rec.label, Verdict::NormalTraffic, "{rec:?}");
                    assert!(!rec.attack_detected, "{rec:?}");
                }
            }
        }
    }

    #[test]
    fn test_reclassifying_same_window_is_idempotent() {
        let c = classifier();
        let window = ddos_window();
        let a = c.classify(&window);
        let b = c.classify(&window);
        assert!(a.same_outcome(&b));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_blend_uses_configured_weights() {
        let c = Classifier::with_scorer(
            ClassifierConfig {
                scorer_weight: 0.7,
                rule_weight: 0.3,
                ..Default::default()
            },
            NeuralScorer::embedded().unwrap(),
        );
        assert!((c.blend(1.0, 0.0) - 0.7).abs() < 1e-12);
        assert!((c.blend(0.0, 1.0) - 0.3).abs() < 1e-12);
        assert_eq!(c.blend(1.0, 1.0), 1.0);
    }

    fn assert_normal_fallback(rec: &AnalysisRecord) {
        assert_eq!(rec.label, Verdict::NormalTraffic);
        assert_eq!(rec.confidence, 0.0);
        assert_eq!(rec.combined_score, 0.0);
        assert!(!rec.attack_detected);
        assert_eq!(rec.severity, crate::detect::Severity::Low);
        assert_eq!(rec.packet_count, 50);
    }

    #[test]
    fn test_nan_entropy_falls_back_to_normal() {
        let mut window = ddos_window();
        window[0].payload_entropy = f64::NAN;
        assert_normal_fallback(&classifier().classify(&window));
    }

    #[test]
    fn test_infinite_timestamps_fall_back_to_normal() {
        let window: Vec<Packet> = ddos_window()
            .into_iter()
            .map(|p| Packet {
                timestamp: f64::INFINITY,
                ..p
            })
            .collect();
        let rec = classifier().classify(&window);
        assert_normal_fallback(&rec);
        assert!(rec.category_scores.is_empty());
    }
}
