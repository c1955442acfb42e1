//! TOML deployment plans.
//!
//! ```toml
//! [[step]]
//! name = "Operator"
//! contract = "Operator"
//! args = ["0xa36085F69e2889c224210F603D836748e7dC0088", "0xED0262718A77e09C3C8F48696791747E878a5551"]
//!
//! [[step]]
//! name = "MapOfCrypto"
//! contract = "MapOfCrypto"
//! args = ["0x6A020c9A35D1022bC55450E9D6c847bc0deA9c73", "{{Operator}}", "...", "..."]
//! ```
//!
//! An argument written `{{Name}}` is replaced by the confirmed address of
//! the earlier step `Name`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::abi;
use crate::binding::Overrides;
use crate::builtin::{MAP_OF_CRYPTO, OPERATOR};
use crate::registry::DescriptorRegistry;
use crate::sequencer::{DeploymentStep, Deployments};

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Failed to read plan {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Invalid plan: {0}")]
    Parse(String),

    #[error("Step `{0}` appears more than once")]
    DuplicateStep(String),

    #[error("Step `{step}` refers to `{reference}`, which is not an earlier step")]
    UnknownReference { step: String, reference: String },

    #[error("Step `{step}` uses unknown contract kind `{contract}`")]
    UnknownContract { step: String, contract: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub name: String,
    pub contract: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    #[serde(default, rename = "step")]
    pub steps: Vec<PlanStep>,
}

/// `{{Name}}` → `Some("Name")`.
fn placeholder(arg: &str) -> Option<&str> {
    arg.trim()
        .strip_prefix("{{")?
        .strip_suffix("}}")
        .map(str::trim)
}

impl DeploymentPlan {
    pub fn from_toml(content: &str) -> Result<Self, PlanError> {
        let plan: Self = toml::from_str(content).map_err(|e| PlanError::Parse(e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path).map_err(|e| PlanError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, PlanError> {
        toml::to_string_pretty(self).map_err(|e| PlanError::Parse(e.to_string()))
    }

    /// The storefront scaffold: the oracle operator, then the storefront
    /// wired to it.
    pub fn default_plan() -> Self {
        Self {
            steps: vec![
                PlanStep {
                    name: OPERATOR.into(),
                    contract: OPERATOR.into(),
                    args: vec![
                        "0xa36085F69e2889c224210F603D836748e7dC0088".into(),
                        "0xED0262718A77e09C3C8F48696791747E878a5551".into(),
                    ],
                    gas_limit: None,
                },
                PlanStep {
                    name: MAP_OF_CRYPTO.into(),
                    contract: MAP_OF_CRYPTO.into(),
                    args: vec![
                        "0x6A020c9A35D1022bC55450E9D6c847bc0deA9c73".into(),
                        format!("{{{{{OPERATOR}}}}}"),
                        "84ec9e2147734b22b4f371b74fda66ef".into(),
                        "66853ba406694258ab477e707675f0fa".into(),
                    ],
                    gas_limit: None,
                },
            ],
        }
    }

    /// Step names must be unique and placeholders must name earlier steps.
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            for arg in &step.args {
                if let Some(reference) = placeholder(arg) {
                    if !seen.contains(reference) {
                        return Err(PlanError::UnknownReference {
                            step: step.name.clone(),
                            reference: reference.to_string(),
                        });
                    }
                }
            }
            if !seen.insert(step.name.as_str()) {
                return Err(PlanError::DuplicateStep(step.name.clone()));
            }
        }
        Ok(())
    }

    /// Turn the plan into sequencer steps, looking contract kinds up in
    /// `registry`. Arguments are coerced against the constructor's types
    /// when the step runs.
    pub fn into_steps(self, registry: &DescriptorRegistry) -> Result<Vec<DeploymentStep>, PlanError> {
        self.validate()?;
        self.steps
            .into_iter()
            .map(|step| {
                let descriptor =
                    registry
                        .get(&step.contract)
                        .ok_or_else(|| PlanError::UnknownContract {
                            step: step.name.clone(),
                            contract: step.contract.clone(),
                        })?;
                let types = descriptor.interface.constructor_inputs().to_vec();
                let raw = step.args;
                let resolver = move |deployed: &Deployments| {
                    let resolved = raw
                        .iter()
                        .map(|arg| match placeholder(arg) {
                            Some(reference) => deployed
                                .require_address(reference)
                                .map(|address| address.to_string()),
                            None => Ok(arg.clone()),
                        })
                        .collect::<Result<Vec<String>, String>>()?;
                    let refs: Vec<&str> = resolved.iter().map(String::as_str).collect();
                    abi::coerce_args(&types, &refs).map_err(|e| e.to_string())
                };
                let overrides = Overrides {
                    gas_limit: step.gas_limit,
                    ..Overrides::default()
                };
                Ok(DeploymentStep::new(step.name, Arc::clone(&descriptor), resolver)
                    .overrides(overrides))
            })
            .collect()
    }
}
