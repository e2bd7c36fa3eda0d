//! Attack detection -- feature extraction, rule scoring, nonlinear scoring,
//! and the blended classifier that produces [`AnalysisRecord`]s.

pub mod classifier;
pub mod features;
pub mod rules;
pub mod scorer;

pub use classifier::{Classifier, ClassifierConfig};
pub use features::{FeatureVector, WindowStats};
pub use rules::{CategoryScores, RuleEngine, RuleThresholds};
pub use scorer::NeuralScorer;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("unknown attack mode: {0}")]
    UnknownMode(String),

    #[error("unknown verdict label: {0}")]
    UnknownVerdict(String),

    #[error("scorer model shape mismatch: {0}")]
    ModelShape(String),

    #[error("failed to parse scorer model: {0}")]
    ModelParse(#[from] serde_json::Error),
}

/// Severity of a verdict, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Attack categories the rule engine scores. Declaration order is the
/// tie-break order for the argmax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackCategory {
    DdosVolumetric,
    PortScan,
    DataExfiltration,
    BotnetC2,
    SynFlood,
    DnsAmplification,
}

impl AttackCategory {
    pub const ALL: [AttackCategory; 6] = [
        AttackCategory::DdosVolumetric,
        AttackCategory::PortScan,
        AttackCategory::DataExfiltration,
        AttackCategory::BotnetC2,
        AttackCategory::SynFlood,
        AttackCategory::DnsAmplification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttackCategory::DdosVolumetric => "ddos_volumetric",
            AttackCategory::PortScan => "port_scan",
            AttackCategory::DataExfiltration => "data_exfiltration",
            AttackCategory::BotnetC2 => "botnet_c2",
            AttackCategory::SynFlood => "syn_flood",
            AttackCategory::DnsAmplification => "dns_amplification",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AttackCategory::DdosVolumetric
            | AttackCategory::DataExfiltration
            | AttackCategory::DnsAmplification => Severity::Critical,
            AttackCategory::PortScan | AttackCategory::BotnetC2 | AttackCategory::SynFlood => {
                Severity::High
            }
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AttackCategory::DdosVolumetric => "Distributed Denial of Service - Volumetric Flood",
            AttackCategory::PortScan => "Network Reconnaissance - Port Scanning",
            AttackCategory::DataExfiltration => "Data Theft - Large File Exfiltration",
            AttackCategory::BotnetC2 => "Malware Communication - Botnet Command & Control",
            AttackCategory::SynFlood => "Denial of Service - SYN Flood Attack",
            AttackCategory::DnsAmplification => "Amplification Attack - DNS Reflection",
        }
    }

    pub fn mitigation(&self) -> &'static str {
        match self {
            AttackCategory::DdosVolumetric => {
                "Deploy DDoS protection, rate limiting, and traffic scrubbing"
            }
            AttackCategory::PortScan => "Block source IP, implement port scan detection rules",
            AttackCategory::DataExfiltration => {
                "Block outbound connections, quarantine source, investigate data access"
            }
            AttackCategory::BotnetC2 => {
                "Quarantine infected host, block C&C servers, run malware scan"
            }
            AttackCategory::SynFlood => "Enable SYN cookies, implement connection rate limiting",
            AttackCategory::DnsAmplification => {
                "Block DNS traffic from suspicious sources, implement BCP38"
            }
        }
    }
}

impl std::fmt::Display for AttackCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicted label of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Verdict {
    InsufficientData,
    NormalTraffic,
    Attack(AttackCategory),
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::InsufficientData => "insufficient_data",
            Verdict::NormalTraffic => "normal_traffic",
            Verdict::Attack(category) => category.as_str(),
        }
    }

    pub fn is_attack(&self) -> bool {
        matches!(self, Verdict::Attack(_))
    }

    pub fn severity(&self) -> Severity {
        match self {
            Verdict::InsufficientData | Verdict::NormalTraffic => Severity::Low,
            Verdict::Attack(category) => category.severity(),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Verdict::InsufficientData => "Insufficient packet data for analysis",
            Verdict::NormalTraffic => "Normal Business Traffic - No Threats Detected",
            Verdict::Attack(category) => category.description(),
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Verdict::InsufficientData => "Collecting packet baseline...",
            Verdict::NormalTraffic => "Continue normal monitoring operations",
            Verdict::Attack(category) => category.mitigation(),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Verdict> for String {
    fn from(v: Verdict) -> Self {
        v.as_str().to_string()
    }
}

impl TryFrom<String> for Verdict {
    type Error = DetectError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl std::str::FromStr for Verdict {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insufficient_data" => Ok(Verdict::InsufficientData),
            "normal_traffic" => Ok(Verdict::NormalTraffic),
            other => AttackCategory::ALL
                .into_iter()
                .find(|c| c.as_str() == other)
                .map(Verdict::Attack)
                .ok_or_else(|| DetectError::UnknownVerdict(other.to_string())),
        }
    }
}

/// One classification result. Created once per analysis trigger, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub label: Verdict,
    /// Rule-engine score per label, including `normal_traffic`.
    pub category_scores: BTreeMap<String, f64>,
    pub rule_score: f64,
    pub scorer_score: f64,
    pub combined_score: f64,
    pub confidence: f64,
    pub attack_detected: bool,
    pub severity: Severity,
    pub description: String,
    pub recommendation: String,
    pub packet_count: usize,
    pub features: FeatureVector,
}

impl AnalysisRecord {
    pub(crate) fn new(label: Verdict, packet_count: usize, features: FeatureVector) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            label,
            category_scores: BTreeMap::new(),
            rule_score: 0.0,
            scorer_score: 0.0,
            combined_score: 0.0,
            confidence: 0.0,
            attack_detected: false,
            severity: label.severity(),
            description: label.description().to_string(),
            recommendation: label.recommendation().to_string(),
            packet_count,
            features,
        }
    }

    /// The sentinel returned while the window is still too small.
    pub fn insufficient_data(packet_count: usize) -> Self {
        Self::new(Verdict::InsufficientData, packet_count, FeatureVector::zero())
    }

    /// True when both records carry the same verdict and scores, ignoring
    /// identity and creation time.
    pub fn same_outcome(&self, other: &AnalysisRecord) -> bool {
        self.label == other.label
            && self.category_scores == other.category_scores
            && self.rule_score == other.rule_score
            && self.scorer_score == other.scorer_score
            && self.combined_score == other.combined_score
            && self.confidence == other.confidence
            && self.attack_detected == other.attack_detected
            && self.features == other.features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_string_roundtrip() {
        let v = Verdict::Attack(AttackCategory::BotnetC2);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"botnet_c2\"");
        let back: Verdict = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert!("quantum_teleport".parse::<Verdict>().is_err());
    }

    #[test]
    fn test_severity_table() {
        assert_eq!(Verdict::NormalTraffic.severity(), Severity::Low);
        assert_eq!(
            Verdict::Attack(AttackCategory::DdosVolumetric).severity(),
            Severity::Critical
        );
        assert_eq!(Verdict::Attack(AttackCategory::PortScan).severity(), Severity::High);
        assert!(Severity::Critical > Severity::High);
    }

    #[test]
    fn test_insufficient_data_sentinel() {
        let rec = AnalysisRecord::insufficient_data(3);
        assert_eq!(rec.label, Verdict::InsufficientData);
        assert_eq!(rec.combined_score, 0.0);
        assert!(!rec.attack_detected);
        assert!(rec.category_scores.is_empty());
        assert_eq!(rec.features, FeatureVector::zero());
    }
}
