use super::features::FeatureVector;
use super::DetectError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

// Embed default model for fallback
const DEFAULT_MODEL_JSON: &str = include_str!("scorer_default.json");

/// Small feed-forward scorer: features -> sigmoid hidden layer -> sigmoid output.
///
/// Parameters are plain JSON so a different model can be dropped in without
/// rebuilding. There is no training step; the embedded model is hand-set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralScorer {
    #[serde(default)]
    pub version: String,
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub hidden_units: Vec<String>,
    pub hidden_weights: Vec<Vec<f64>>, // [n_hidden][n_features]
    pub hidden_bias: Vec<f64>,         // [n_hidden]
    pub output_weights: Vec<f64>,      // [n_hidden]
    pub output_bias: f64,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl NeuralScorer {
    /// The model compiled into the binary.
    pub fn embedded() -> Result<Self, DetectError> {
        Self::from_json(DEFAULT_MODEL_JSON)
    }

    pub fn from_json(json: &str) -> Result<Self, DetectError> {
        let model: Self = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    /// Load a model from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scorer model: {}", path.display()))?;
        let model = Self::from_json(&content)
            .with_context(|| format!("invalid scorer model: {}", path.display()))?;
        info!(path = %path.display(), version = %model.version, "Loaded scorer model");
        Ok(model)
    }

    /// Load from `path` if given, falling back to the embedded model when the
    /// file is missing or invalid.
    pub fn load_or_embedded(path: Option<&Path>) -> Result<Self, DetectError> {
        if let Some(path) = path {
            match Self::load(path) {
                Ok(model) => return Ok(model),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Using embedded scorer model");
                }
            }
        }
        Self::embedded()
    }

    fn validate(&self) -> Result<(), DetectError> {
        let n_features = FeatureVector::LEN;
        let n_hidden = self.hidden_weights.len();

        if self.feature_names.len() != n_features {
            return Err(DetectError::ModelShape(format!(
                "expected {} feature names, got {}",
                n_features,
                self.feature_names.len()
            )));
        }
        if n_hidden == 0 {
            return Err(DetectError::ModelShape("no hidden units".to_string()));
        }
        if let Some((i, row)) = self
            .hidden_weights
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != n_features)
        {
            return Err(DetectError::ModelShape(format!(
                "hidden unit {} has {} weights, expected {}",
                i,
                row.len(),
                n_features
            )));
        }
        if self.hidden_bias.len() != n_hidden || self.output_weights.len() != n_hidden {
            return Err(DetectError::ModelShape(format!(
                "{} hidden units but {} biases and {} output weights",
                n_hidden,
                self.hidden_bias.len(),
                self.output_weights.len()
            )));
        }
        Ok(())
    }

    pub fn n_hidden(&self) -> usize {
        self.hidden_weights.len()
    }

    /// Threat score in [0, 1]. A non-finite intermediate scores as 0.
    pub fn score(&self, features: &FeatureVector) -> f64 {
        let x = features.to_vector();

        let mut out = self.output_bias;
        for ((row, bias), w_out) in self
            .hidden_weights
            .iter()
            .zip(&self.hidden_bias)
            .zip(&self.output_weights)
        {
            let z: f64 = row.iter().zip(x.iter()).map(|(w, v)| w * v).sum::<f64>() + bias;
            out += w_out * sigmoid(z);
        }

        let p = sigmoid(out);
        if p.is_finite() {
            p.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::generator::PacketGenerator;
    use crate::traffic::AttackMode;

    fn window(mode: AttackMode, ticks: usize) -> Vec<crate::traffic::Packet> {
        let mut gen = PacketGenerator::seeded(21);
        let step = mode.tick_interval().as_secs_f64();
        let mut packets = Vec::new();
        for i in 0..ticks {
            packets.extend(gen.next_batch(mode, 1000.0 + i as f64 * step));
        }
        let start = packets.len().saturating_sub(50);
        packets.split_off(start)
    }

    #[test]
    fn test_embedded_model_sanity() {
        let model = NeuralScorer::embedded().unwrap();
        assert_eq!(model.feature_names.len(), FeatureVector::LEN);
        assert_eq!(model.n_hidden(), model.hidden_units.len());
        for (name, expected) in model.feature_names.iter().zip(FeatureVector::names()) {
            assert_eq!(name, expected);
        }
    }

    #[test]
    fn test_zero_vector_scores_low() {
        let model = NeuralScorer::embedded().unwrap();
        let s = model.score(&FeatureVector::zero());
        assert!((0.0..0.2).contains(&s), "score {s}");
    }

    #[test]
    fn test_attacks_outscore_normal_traffic() {
        let model = NeuralScorer::embedded().unwrap();
        let normal = model.score(&FeatureVector::from_window(&window(AttackMode::Normal, 20), 10));
        for mode in [
            AttackMode::DdosVolumetric,
            AttackMode::PortScan,
            AttackMode::DataExfiltration,
            AttackMode::SynFlood,
        ] {
            let s = model.score(&FeatureVector::from_window(&window(mode, 20), 10));
            assert!((0.0..=1.0).contains(&s));
            assert!(s > normal, "{mode}: {s} <= normal {normal}");
        }
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let mut model = NeuralScorer::embedded().unwrap();
        model.hidden_bias.pop();
        let json = serde_json::to_string(&model).unwrap();
        assert!(matches!(
            NeuralScorer::from_json(&json),
            Err(DetectError::ModelShape(_))
        ));
        assert!(matches!(
            NeuralScorer::from_json("{not json"),
            Err(DetectError::ModelParse(_))
        ));
    }

    #[test]
    fn test_missing_file_falls_back_to_embedded() {
        let model =
            NeuralScorer::load_or_embedded(Some(Path::new("/nonexistent/scorer.json"))).unwrap();
        assert_eq!(model.version, NeuralScorer::embedded().unwrap().version);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let mut model = NeuralScorer::embedded().unwrap();
        model.version = "custom".to_string();
        std::fs::write(&path, serde_json::to_string(&model).unwrap()).unwrap();

        let loaded = NeuralScorer::load(&path).unwrap();
        assert_eq!(loaded.version, "custom");
    }
}
