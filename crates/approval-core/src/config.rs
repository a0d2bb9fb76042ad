//! Configuration management for the approval engine

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between auto-escalation sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Actor recorded on auto-approved steps
    #[serde(default = "default_system_actor")]
    pub system_actor: String,

    /// Activity types the host process registers handlers for
    #[serde(default)]
    pub activity_types: Vec<String>,

    /// Org directory used by the static directory implementation
    #[serde(default)]
    pub directory: Vec<CompanyConfig>,
}

/// One company's slice of the org directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyConfig {
    pub id: String,
    #[serde(default)]
    pub people: Vec<PersonConfig>,
}

/// One person in the org directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonConfig {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Manager's person id within the same company
    #[serde(default)]
    pub manager: Option<String>,

    #[serde(default)]
    pub roles: Vec<String>,
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_system_actor() -> String {
    "system".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            system_actor: default_system_actor(),
            activity_types: Vec::new(),
            directory: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_json_str(&content)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.system_actor.is_empty() {
            return Err(EngineError::Config("System actor id is required".to_string()));
        }

        if self.sweep_interval_secs == 0 {
            return Err(EngineError::Config(
                "Sweep interval must be at least one second".to_string(),
            ));
        }

        for company in &self.directory {
            if company.id.is_empty() {
                return Err(EngineError::Config("Company id must not be empty".to_string()));
            }

            for person in &company.people {
                if person.id.is_empty() {
                    return Err(EngineError::Config(format!(
                        "Person id must not be empty (company {})",
                        company.id
                    )));
                }

                if let Some(manager) = &person.manager {
                    if !company.people.iter().any(|p| &p.id == manager) {
                        return Err(EngineError::Config(format!(
                            "Person {} references unknown manager {} (company {})",
                            person.id, manager, company.id
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
