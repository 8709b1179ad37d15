use std::fs;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub make: String,
    pub model: String,
    pub year: i32,
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub service_time_hours: f64,
}

impl VehicleRecord {
    pub fn description(&self) -> String {
        format!("{} {} {}", self.year, self.make, self.model)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub vehicles: Vec<VehicleRecord>,
}

impl Catalog {
    pub fn from_yaml(s: &str) -> anyhow::Result<Self> {
        let catalog: Catalog = serde_yaml::from_str(s).context("failed to parse catalog YAML")?;
        anyhow::ensure!(!catalog.vehicles.is_empty(), "catalog contains no vehicles");
        Ok(catalog)
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog file: {path}"))?;
        Self::from_yaml(&raw)
    }
}
