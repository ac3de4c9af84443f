use std::collections::BTreeMap;

use crate::config::AlignmentSettings;
use crate::error::AlignmentError;
use crate::ownership::{parent_map, ParentMap};
use crate::targets::{self, RegionMapping};
use crate::types::{
    ClimateRow, CompanyIndicator, OwnershipRecord, RegionEntry, ScenarioEntry, ScenarioTarget,
};
use crate::AlignmentResult;

/// scenario start year -> scenario set -> pathway -> pathway table.
pub type ScenarioData = BTreeMap<i32, BTreeMap<String, BTreeMap<String, Vec<ScenarioTarget>>>>;

/// scenario set -> region/country rows.
pub type RegionData = BTreeMap<String, Vec<RegionEntry>>;

/// Everything the loaders hand to the calculator: scenario pathways, region
/// mappings and the per-vintage company tables.
#[derive(Debug, Clone, Default)]
pub struct ClimateDataBundle {
    pub scenario_data: ScenarioData,
    pub region_data: RegionData,
    /// vintage year -> company production indicators.
    pub company_indicators: BTreeMap<i32, Vec<CompanyIndicator>>,
    /// vintage year -> ownership hierarchy.
    pub company_ownership: BTreeMap<i32, Vec<OwnershipRecord>>,
}

impl ClimateDataBundle {
    /// Detect duplicate (sector, technology, year, region) keys in every
    /// pathway table. Duplicates are a data-quality error, not something
    /// the join handles defensively.
    pub fn validate(&self) -> AlignmentResult<()> {
        for (_, sets) in &self.scenario_data {
            for (scenario_set, pathways) in sets {
                for (pathway, rows) in pathways {
                    targets::build_scenario_index(rows, scenario_set, pathway)?;
                }
            }
        }
        Ok(())
    }

    /// Every (scenario_set, pathway, start year) combination present.
    pub fn available_scenarios(&self) -> Vec<ScenarioEntry> {
        let mut entries = Vec::new();
        for (year, sets) in &self.scenario_data {
            for (scenario_set, pathways) in sets {
                for pathway in pathways.keys() {
                    entries.push(ScenarioEntry {
                        scenario_set: scenario_set.clone(),
                        pathway: pathway.clone(),
                        year: *year,
                    });
                }
            }
        }
        entries
    }

    /// The pathway table for one (start year, set, pathway), if loaded.
    pub fn pathway(
        &self,
        scenario_year: i32,
        scenario_set: &str,
        pathway: &str,
    ) -> Option<&Vec<ScenarioTarget>> {
        self.scenario_data
            .get(&scenario_year)?
            .get(scenario_set)?
            .get(pathway)
    }
}

/// Per-call bundle of derived tables: scenario indexes, the reconciled
/// region mapping, parent-resolution maps and the climate/target tables for
/// every (data year, scenario year) pair the call needs. Built eagerly by
/// `prepare`, then only read; downstream stages are pure functions over it.
pub struct ComputationContext<'a> {
    pub settings: &'a AlignmentSettings,
    pub bundle: &'a ClimateDataBundle,
    pub region_mapping: Option<RegionMapping>,
    /// (data year, scenario year) -> climate/target table.
    climate: BTreeMap<(i32, i32), Vec<ClimateRow>>,
    /// vintage year -> parent map including weak parents (consolidation).
    parents_weak: BTreeMap<i32, ParentMap>,
    /// vintage year -> parent map restricted to ultimate parents
    /// (splitting and normalisation denominators).
    parents_strong: BTreeMap<i32, ParentMap>,
}

impl<'a> ComputationContext<'a> {
    /// Build the context for a set of (data year, scenario year) pairs.
    /// Pairs whose vintage or pathway table is missing are a caller bug and
    /// reported as insufficient data.
    pub fn prepare(
        bundle: &'a ClimateDataBundle,
        settings: &'a AlignmentSettings,
        scenario_set: &str,
        pathway: &str,
        pairs: &[(i32, i32)],
        use_region_file: bool,
    ) -> AlignmentResult<Self> {
        let region_mapping = if use_region_file {
            reconciled_mapping(bundle, settings, scenario_set, pathway)
        } else {
            None
        };

        let mut climate = BTreeMap::new();
        let mut parents_weak = BTreeMap::new();
        let mut parents_strong = BTreeMap::new();

        for &(year, scenario_year) in pairs {
            let indicators = bundle.company_indicators.get(&year).ok_or_else(|| {
                AlignmentError::InsufficientData(format!(
                    "No company indicators loaded for vintage year {year}"
                ))
            })?;
            let pathway_rows =
                bundle
                    .pathway(scenario_year, scenario_set, pathway)
                    .ok_or_else(|| AlignmentError::UnknownScenario {
                        scenario_set: scenario_set.to_string(),
                        pathway: pathway.to_string(),
                    })?;
            let index = targets::build_scenario_index(pathway_rows, scenario_set, pathway)?;
            let rows = targets::compute_climate(
                indicators,
                &index,
                settings,
                region_mapping.as_ref(),
                scenario_year,
            )?;
            climate.insert((year, scenario_year), rows);

            let ownership = bundle.company_ownership.get(&year).ok_or_else(|| {
                AlignmentError::InsufficientData(format!(
                    "No ownership data loaded for vintage year {year}"
                ))
            })?;
            parents_weak
                .entry(year)
                .or_insert_with(|| parent_map(ownership, true));
            parents_strong
                .entry(year)
                .or_insert_with(|| parent_map(ownership, false));
        }

        Ok(ComputationContext {
            settings,
            bundle,
            region_mapping,
            climate,
            parents_weak,
            parents_strong,
        })
    }

    pub fn climate(&self, year: i32, scenario_year: i32) -> &[ClimateRow] {
        self.climate
            .get(&(year, scenario_year))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn parents(&self, year: i32, stop_at_weak_parents: bool) -> &ParentMap {
        let maps = if stop_at_weak_parents {
            &self.parents_weak
        } else {
            &self.parents_strong
        };
        maps.get(&year).expect("context prepared for this vintage")
    }

    pub fn indicators(&self, year: i32) -> &[CompanyIndicator] {
        self.bundle
            .company_indicators
            .get(&year)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Reconcile the per-sector region mapping from the first loaded pathway
/// table of the active scenario, if region data exists for the set.
fn reconciled_mapping(
    bundle: &ClimateDataBundle,
    settings: &AlignmentSettings,
    scenario_set: &str,
    pathway: &str,
) -> Option<RegionMapping> {
    let regions = bundle.region_data.get(scenario_set)?;
    let scenario_rows = bundle
        .scenario_data
        .keys()
        .find_map(|year| bundle.pathway(*year, scenario_set, pathway))?;
    Some(targets::reconcile_regions(scenario_rows, regions, settings))
}
