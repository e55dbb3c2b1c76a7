//! Optional JSON configuration shared by every experiment.

use crate::integrator::IntegratorSettings;
use crate::lattice::LatticeSettings;
use crate::model::{InitialConditions, RateConstants};
use crate::search::SearchSettings;
use crate::sweep::SweepSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Every field falls back to its default when absent from the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    pub rates: RateConstants,
    pub initial: InitialConditions,
    pub integrator: IntegratorSettings,
    pub sweep: SweepSettings,
    pub search: SearchSettings,
    pub lattice: LatticeSettings,
}

impl ExperimentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.rates.validate()?;
        self.initial.validate()?;
        self.integrator.validate()?;
        self.sweep.time.validate().context("sweep.time")?;
        self.search.time.validate().context("search.time")?;
        self.sweep.f1.validate().context("sweep.f1")?;
        self.sweep.f2.validate().context("sweep.f2")?;
        self.lattice.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::Method;
    use crate::search::DrawPolicy;

    #[test]
    fn empty_document_gives_defaults() {
        let config = ExperimentConfig::from_json("{}").unwrap();
        assert_eq!(config, ExperimentConfig::default());
        assert_eq!(config.rates.adsorption, 20.0);
        assert_eq!(config.sweep.time.samples, 51000);
        assert_eq!(config.search.time.end, 100.0);
        assert_eq!(config.lattice.size, 40);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ExperimentConfig::from_json(
            r#"{
                "rates": { "burst_size": 50 },
                "integrator": { "method": "rosenbrock23", "rtol": 1e-6 },
                "search": { "draw_policy": "mutate-both", "seed": 17 },
                "sweep": { "f1": { "start": 10, "stop": 20 } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.rates.burst_size, 50.0);
        assert_eq!(config.rates.adsorption, 20.0);
        assert_eq!(config.integrator.method, Method::Rosenbrock23);
        assert_eq!(config.integrator.atol, 1e-12);
        assert_eq!(config.search.draw_policy, DrawPolicy::MutateBoth);
        assert_eq!(config.search.seed, Some(17));
        assert_eq!(config.sweep.f1.len(), 11);
        assert_eq!(config.sweep.f2.len(), 99);
    }

    #[test]
    fn rejects_unknown_sections_and_bad_values() {
        assert!(ExperimentConfig::from_json(r#"{ "ratez": {} }"#).is_err());
        let err = ExperimentConfig::from_json(r#"{ "rates": { "adsorption": -1 } }"#).unwrap_err();
        assert!(err.to_string().contains("adsorption"));
        let err = ExperimentConfig::from_json(
            r#"{ "search": { "time": { "start": 0, "end": 100, "samples": 1 } } }"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("at least 2 samples"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = ExperimentConfig::load("/nonexistent/lysis.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/lysis.json"));
    }
}
