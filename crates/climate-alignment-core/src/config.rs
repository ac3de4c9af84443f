use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AlignmentError;
use crate::AlignmentResult;

// ---------------------------------------------------------------------------
// Types — sectoral approach
// ---------------------------------------------------------------------------

/// Target-derivation algorithm for a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApproachKind {
    /// Target Market Share: production-share-based targets.
    Tms,
    /// Sectoral Decarbonisation Approach: emission-intensity-based targets.
    Sda,
}

/// How one sector is treated during target calculation and scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorApproach {
    pub approach: ApproachKind,
    /// Technologies whose target follows the sector-wide production share.
    #[serde(default)]
    pub sector: Vec<String>,
    /// Technologies whose target is a straight ratio of their own initial
    /// production.
    #[serde(default)]
    pub technology: Vec<String>,
    #[serde(default)]
    pub build_out: Vec<String>,
    #[serde(default)]
    pub phase_out: Vec<String>,
    #[serde(default)]
    pub other: Vec<String>,
    /// Whether the scenario's per-region pathway breakdown applies.
    #[serde(default)]
    pub regional: bool,
    /// Inactive sectors are ignored when reading data.
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Minimum production materiality ratios for one sector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProductionThreshold {
    /// production / total_assets floor.
    pub asset_ratio: Decimal,
    /// production / turnover floor.
    pub turnover_ratio: Decimal,
}

// ---------------------------------------------------------------------------
// Types — file locations (consumed by external loaders only)
// ---------------------------------------------------------------------------

/// Scenario file locations for one (start year, scenario set) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioFileEntry {
    pub scenario_file_tms: String,
    pub scenario_file_sda: String,
}

/// Climate data files for one vintage year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimateFileEntry {
    pub company_indicators: String,
    pub company_ownership: String,
}

/// Where the external loaders find their inputs. The core never touches
/// these paths itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataLocations {
    /// start_year -> scenario_set -> file pair.
    #[serde(default)]
    pub scenario_files: BTreeMap<i32, BTreeMap<String, ScenarioFileEntry>>,
    /// scenario_set -> region file.
    #[serde(default)]
    pub region_files: BTreeMap<String, String>,
    /// vintage year -> climate data files.
    #[serde(default)]
    pub main_climate_files: BTreeMap<i32, ClimateFileEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_information_file: Option<String>,
}

// ---------------------------------------------------------------------------
// Types — settings
// ---------------------------------------------------------------------------

/// Full configuration of the alignment calculation. Deserialised from the
/// YAML-backed settings store and validated once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentSettings {
    pub sectoral_approach: BTreeMap<String, SectorApproach>,
    #[serde(default)]
    pub economic_weights: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub production_thresholds: BTreeMap<String, ProductionThreshold>,
    #[serde(default)]
    pub data_locations: DataLocations,
}

/// Partial settings change merged over the current settings by
/// `AlignmentSettings::update`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sectoral_approach: Option<BTreeMap<String, SectorApproach>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economic_weights: Option<BTreeMap<String, Decimal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_thresholds: Option<BTreeMap<String, ProductionThreshold>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_locations: Option<DataLocations>,
}

impl AlignmentSettings {
    /// Validate the settings once, up front. Configuration problems are
    /// fatal; nothing here is retried or patched over at computation time.
    pub fn validate(&self) -> AlignmentResult<()> {
        for (sector, approach) in &self.sectoral_approach {
            approach.validate(sector)?;
        }
        for (sector, weight) in &self.economic_weights {
            if *weight <= Decimal::ZERO {
                return Err(AlignmentError::InvalidInput {
                    field: format!("economic_weights[{sector}]"),
                    reason: "Economic weights must be positive.".into(),
                });
            }
        }
        for (sector, threshold) in &self.production_thresholds {
            if threshold.asset_ratio < Decimal::ZERO || threshold.turnover_ratio < Decimal::ZERO {
                return Err(AlignmentError::InvalidInput {
                    field: format!("production_thresholds[{sector}]"),
                    reason: "Production thresholds cannot be negative.".into(),
                });
            }
        }
        Ok(())
    }

    /// Merge a partial change over these settings and re-validate. Returns
    /// the merged settings without mutating `self`.
    pub fn update(&self, change: SettingsChange) -> AlignmentResult<AlignmentSettings> {
        let merged = AlignmentSettings {
            sectoral_approach: change
                .sectoral_approach
                .unwrap_or_else(|| self.sectoral_approach.clone()),
            economic_weights: change
                .economic_weights
                .unwrap_or_else(|| self.economic_weights.clone()),
            production_thresholds: change
                .production_thresholds
                .unwrap_or_else(|| self.production_thresholds.clone()),
            data_locations: change
                .data_locations
                .unwrap_or_else(|| self.data_locations.clone()),
        };
        merged.validate()?;
        Ok(merged)
    }

    /// The sectoral approach for a sector present in the data. A sector the
    /// configuration does not know is a configuration error, surfaced the
    /// first time such a row is processed.
    pub fn approach_for(&self, sector: &str) -> AlignmentResult<&SectorApproach> {
        self.sectoral_approach
            .get(sector)
            .ok_or_else(|| AlignmentError::InvalidInput {
                field: format!("sectoral_approach[{sector}]"),
                reason: "Sector present in the data has no sectoral approach configured.".into(),
            })
    }

    /// Union of every sector's `sector`-level technology list.
    pub fn sector_approach_technologies(&self) -> Vec<String> {
        let mut technologies = Vec::new();
        for approach in self.sectoral_approach.values() {
            for tech in &approach.sector {
                technologies.push(tech.clone());
            }
        }
        technologies
    }
}

impl SectorApproach {
    fn validate(&self, sector: &str) -> AlignmentResult<()> {
        // build_out / phase_out / other must partition disjointly; a
        // technology in two classes would flip signs ambiguously.
        for (a_name, a_list) in [
            ("build_out", &self.build_out),
            ("phase_out", &self.phase_out),
        ] {
            for (b_name, b_list) in [("phase_out", &self.phase_out), ("other", &self.other)] {
                if a_name == b_name {
                    continue;
                }
                if let Some(tech) = a_list.iter().find(|t| b_list.contains(t)) {
                    return Err(AlignmentError::InvalidInput {
                        field: format!("sectoral_approach[{sector}]"),
                        reason: format!(
                            "Technology '{tech}' appears in both {a_name} and {b_name}."
                        ),
                    });
                }
            }
        }
        if self.approach == ApproachKind::Sda && !(self.sector.is_empty() && self.technology.is_empty())
        {
            return Err(AlignmentError::InvalidInput {
                field: format!("sectoral_approach[{sector}]"),
                reason: "SDA sectors do not take sector/technology target lists.".into(),
            });
        }
        Ok(())
    }

    /// Scoring direction of a technology within this sector.
    pub fn direction_of(&self, technology: &str) -> crate::types::Direction {
        if self.phase_out.iter().any(|t| t == technology) {
            crate::types::Direction::PhaseOut
        } else if self.build_out.iter().any(|t| t == technology) {
            crate::types::Direction::BuildOut
        } else {
            crate::types::Direction::NoChange
        }
    }

    /// Whether the raw deviation sign must be inverted for this technology
    /// (phase-out and other technologies score in the opposite direction).
    pub fn flips_deviation(&self, technology: &str) -> bool {
        self.phase_out.iter().any(|t| t == technology)
            || self.other.iter().any(|t| t == technology)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
