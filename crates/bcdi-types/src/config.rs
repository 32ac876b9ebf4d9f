// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::constants::{
    ARMIJO_C, DEFAULT_BETA, DEFAULT_HIO_OPT_ALPHA, DEFAULT_SHRINK_SIGMA,
    DEFAULT_SHRINK_THRESHOLD, DEFAULT_TV_EPSILON, DEFAULT_TV_LAMBDA, PROJECTION_STEP,
};
use crate::error::{BcdiError, BcdiResult};

/// Top-level reconstruction configuration.
///
/// Every section is optional in JSON; missing sections fall back to the
/// defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    /// Operator recipe, e.g. `"(ER * HIO^20)^10 * SHRINK"`.
    #[serde(default = "default_recipe")]
    pub recipe: String,
    /// Seed for the random initial phases.
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub hio: HioConfig,
    #[serde(default)]
    pub hio_opt: HioOptConfig,
    #[serde(default)]
    pub shrink: ShrinkConfig,
    #[serde(default)]
    pub regularizer: RegularizerConfig,
    #[serde(default)]
    pub line_search: LineSearchConfig,
}

fn default_recipe() -> String {
    "(ER * HIO^20)^5".to_string()
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        ReconstructionConfig {
            recipe: default_recipe(),
            seed: 0,
            hio: HioConfig::default(),
            hio_opt: HioOptConfig::default(),
            shrink: ShrinkConfig::default(),
            regularizer: RegularizerConfig::default(),
            line_search: LineSearchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HioConfig {
    #[serde(default = "default_beta")]
    pub beta: f64,
}

fn default_beta() -> f64 {
    DEFAULT_BETA
}

impl Default for HioConfig {
    fn default() -> Self {
        HioConfig {
            beta: default_beta(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HioOptConfig {
    /// Weight of the density penalty outside the support.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

fn default_alpha() -> f64 {
    DEFAULT_HIO_OPT_ALPHA
}

impl Default for HioOptConfig {
    fn default() -> Self {
        HioOptConfig {
            alpha: default_alpha(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShrinkConfig {
    /// Relative threshold in (0, 1) against the smoothed maximum.
    #[serde(default = "default_shrink_threshold")]
    pub threshold: f64,
    /// Gaussian width in voxels.
    #[serde(default = "default_shrink_sigma")]
    pub sigma: f64,
}

fn default_shrink_threshold() -> f64 {
    DEFAULT_SHRINK_THRESHOLD
}
fn default_shrink_sigma() -> f64 {
    DEFAULT_SHRINK_SIGMA
}

impl Default for ShrinkConfig {
    fn default() -> Self {
        ShrinkConfig {
            threshold: default_shrink_threshold(),
            sigma: default_shrink_sigma(),
        }
    }
}

/// Regularizer used by EROpt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegularizerConfig {
    /// No regularization: EROpt minimizes the bare magnitude loss.
    None,
    /// Smoothed total variation `λ Σ sqrt(|∇ρ|² + ε)`.
    TotalVariation {
        #[serde(default = "default_tv_lambda")]
        lambda: f64,
        #[serde(default = "default_tv_epsilon")]
        epsilon: f64,
    },
}

fn default_tv_lambda() -> f64 {
    DEFAULT_TV_LAMBDA
}
fn default_tv_epsilon() -> f64 {
    DEFAULT_TV_EPSILON
}

impl Default for RegularizerConfig {
    fn default() -> Self {
        RegularizerConfig::TotalVariation {
            lambda: default_tv_lambda(),
            epsilon: default_tv_epsilon(),
        }
    }
}

/// Backtracking line-search parameters for the optimization-driven operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LineSearchConfig {
    /// First trial step. 0.5 is the exact projection step of the bare loss.
    #[serde(default = "default_initial_step")]
    pub initial_step: f64,
    /// Armijo sufficient-decrease constant.
    #[serde(default = "default_armijo")]
    pub armijo: f64,
    #[serde(default = "default_max_backtracks")]
    pub max_backtracks: usize,
}

fn default_initial_step() -> f64 {
    PROJECTION_STEP
}
fn default_armijo() -> f64 {
    ARMIJO_C
}
fn default_max_backtracks() -> usize {
    30
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        LineSearchConfig {
            initial_step: default_initial_step(),
            armijo: default_armijo(),
            max_backtracks: default_max_backtracks(),
        }
    }
}

impl LineSearchConfig {
    pub fn validate(&self) -> BcdiResult<()> {
        if !self.initial_step.is_finite() || self.initial_step <= 0.0 {
            return Err(BcdiError::InvalidArgument(format!(
                "line search initial_step must be finite and > 0, got {}",
                self.initial_step
            )));
        }
        if !(self.armijo > 0.0 && self.armijo < 1.0) {
            return Err(BcdiError::InvalidArgument(format!(
                "line search armijo constant must lie in (0, 1), got {}",
                self.armijo
            )));
        }
        Ok(())
    }
}

impl ReconstructionConfig {
    /// Load from a JSON file.
    pub fn from_file(path: &str) -> BcdiResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> BcdiResult<Self> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameters no operator can be built from.
    pub fn validate(&self) -> BcdiResult<()> {
        if !self.shrink.sigma.is_finite() || self.shrink.sigma <= 0.0 {
            return Err(BcdiError::InvalidArgument(format!(
                "shrink sigma must be finite and > 0, got {}",
                self.shrink.sigma
            )));
        }
        if !self.hio.beta.is_finite() {
            return Err(BcdiError::InvalidArgument(
                "hio beta must be finite".to_string(),
            ));
        }
        if !self.hio_opt.alpha.is_finite() || self.hio_opt.alpha < 0.0 {
            return Err(BcdiError::InvalidArgument(format!(
                "hio_opt alpha must be finite and >= 0, got {}",
                self.hio_opt.alpha
            )));
        }
        if let RegularizerConfig::TotalVariation { lambda, epsilon } = self.regularizer {
            if !lambda.is_finite() || lambda < 0.0 || !epsilon.is_finite() || epsilon <= 0.0 {
                return Err(BcdiError::InvalidArgument(format!(
                    "total variation needs lambda >= 0 and epsilon > 0, got {lambda}, {epsilon}"
                )));
            }
        }
        self.line_search.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let cfg = ReconstructionConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg.recipe, "(ER * HIO^20)^5");
        assert_eq!(cfg.seed, 0);
        assert!((cfg.hio.beta - DEFAULT_BETA).abs() < 1e-15);
        assert!((cfg.shrink.sigma - DEFAULT_SHRINK_SIGMA).abs() < 1e-15);
        assert!((cfg.line_search.initial_step - 0.5).abs() < 1e-15);
        assert_eq!(cfg.line_search.max_backtracks, 30);
    }

    #[test]
    fn test_load_full_json() {
        let json = r#"{
            "recipe": "(ER * HIO^10)^3 * SHRINK * CENTER",
            "seed": 42,
            "hio": { "beta": 0.7 },
            "shrink": { "threshold": 0.2, "sigma": 2.0 },
            "regularizer": { "kind": "total_variation", "lambda": 0.01 },
            "line_search": { "initial_step": 0.25 }
        }"#;
        let cfg = ReconstructionConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.seed, 42);
        assert!((cfg.hio.beta - 0.7).abs() < 1e-15);
        assert!((cfg.shrink.threshold - 0.2).abs() < 1e-15);
        assert_eq!(
            cfg.regularizer,
            RegularizerConfig::TotalVariation {
                lambda: 0.01,
                epsilon: DEFAULT_TV_EPSILON
            }
        );
        assert!((cfg.line_search.initial_step - 0.25).abs() < 1e-15);
        assert!((cfg.line_search.armijo - ARMIJO_C).abs() < 1e-15);
    }

    #[test]
    fn test_regularizer_none() {
        let cfg =
            ReconstructionConfig::from_json_str(r#"{ "regularizer": { "kind": "none" } }"#)
                .unwrap();
        assert_eq!(cfg.regularizer, RegularizerConfig::None);
    }

    #[test]
    fn test_rejects_non_positive_sigma() {
        let err = ReconstructionConfig::from_json_str(r#"{ "shrink": { "sigma": 0.0 } }"#)
            .unwrap_err();
        assert!(matches!(err, BcdiError::InvalidArgument(_)), "{err}");
    }

    #[test]
    fn test_rejects_bad_line_search() {
        let err =
            ReconstructionConfig::from_json_str(r#"{ "line_search": { "armijo": 1.5 } }"#)
                .unwrap_err();
        assert!(matches!(err, BcdiError::InvalidArgument(_)), "{err}");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ReconstructionConfig::from_file("/nonexistent/bcdi_config.json").unwrap_err();
        assert!(matches!(err, BcdiError::Io(_)), "{err}");
    }

    #[test]
    fn test_roundtrip_serialization() {
        let cfg = ReconstructionConfig::default();
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let cfg2 = ReconstructionConfig::from_json_str(&json).unwrap();
        assert_eq!(cfg.recipe, cfg2.recipe);
        assert_eq!(cfg.regularizer, cfg2.regularizer);
        assert_eq!(cfg.line_search.max_backtracks, cfg2.line_search.max_backtracks);
    }
}
