use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use crate::config::{AlignmentSettings, ApproachKind};
use crate::error::AlignmentError;
use crate::types::{ClimateRow, CompanyIndicator, ProductionRow, RegionEntry, ScenarioTarget};
use crate::AlignmentResult;

/// sector -> ordered (region, country list) assignments. Regions claim
/// countries smallest-first; countries no region claims stay "global".
pub type RegionMapping = BTreeMap<String, Vec<(String, Vec<String>)>>;

/// Region label used when no mapping applies.
pub const GLOBAL_REGION: &str = "global";

/// Scenario technology label on SDA pathway rows.
pub const SDA_TECHNOLOGY: &str = "none";

// ---------------------------------------------------------------------------
// Scenario index
// ---------------------------------------------------------------------------

type ScenarioKey = (String, String, i32, String);

/// Pathway table indexed by (sector, technology, year, region).
#[derive(Debug)]
pub struct ScenarioIndex {
    map: HashMap<ScenarioKey, ScenarioTarget>,
}

impl ScenarioIndex {
    pub fn get(&self, sector: &str, technology: &str, year: i32, region: &str) -> Option<&ScenarioTarget> {
        self.map.get(&(
            sector.to_string(),
            technology.to_string(),
            year,
            region.to_string(),
        ))
    }
}

/// Index one pathway table, failing on duplicate keys: two pathway rows for
/// the same (sector, technology, year, region) cannot be resolved to a
/// single target and indicate broken scenario data.
pub fn build_scenario_index(
    rows: &[ScenarioTarget],
    scenario_set: &str,
    pathway: &str,
) -> AlignmentResult<ScenarioIndex> {
    let mut map = HashMap::with_capacity(rows.len());
    for row in rows {
        let key = (
            row.sector.clone(),
            row.technology.clone(),
            row.year,
            row.region.clone(),
        );
        if map.insert(key, row.clone()).is_some() {
            return Err(AlignmentError::DuplicateScenarioRow {
                scenario_set: scenario_set.to_string(),
                pathway: pathway.to_string(),
                sector: row.sector.clone(),
                technology: row.technology.clone(),
                year: row.year,
                region: row.region.clone(),
            });
        }
    }
    Ok(ScenarioIndex { map })
}

// ---------------------------------------------------------------------------
// Region reconciliation
// ---------------------------------------------------------------------------

/// Work out which countries each named region claims, per sector. Only
/// sectors flagged `regional` get a mapping; the rest keep every row in the
/// "global" bucket. Regions are processed smallest-first and a country is
/// claimed at most once per sector, so regional breakdowns never double
/// count production.
pub fn reconcile_regions(
    scenario_rows: &[ScenarioTarget],
    regions: &[RegionEntry],
    settings: &AlignmentSettings,
) -> RegionMapping {
    let mut isos_by_region: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for entry in regions {
        isos_by_region
            .entry(entry.region.as_str())
            .or_default()
            .push(entry.iso.to_uppercase());
    }

    // (sector, region) pairs present in the pathway, weighted by how many
    // scenario rows x countries they cover; smaller regions claim first.
    let mut row_counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for row in scenario_rows {
        if isos_by_region.contains_key(row.region.as_str()) {
            *row_counts
                .entry((row.sector.as_str(), row.region.as_str()))
                .or_default() += 1;
        }
    }
    let mut options: Vec<(&str, &str, usize)> = row_counts
        .into_iter()
        .map(|((sector, region), count)| {
            (sector, region, count * isos_by_region[region].len())
        })
        .collect();
    options.sort_by(|a, b| a.2.cmp(&b.2).then_with(|| (a.0, a.1).cmp(&(b.0, b.1))));

    let mut mapping: RegionMapping = BTreeMap::new();
    for (sector, region, _) in options {
        let regional = settings
            .sectoral_approach
            .get(sector)
            .map(|approach| approach.regional)
            .unwrap_or(false);
        if !regional {
            continue;
        }
        let assigned = mapping.entry(sector.to_string()).or_default();
        let taken: Vec<&String> = assigned.iter().flat_map(|(_, isos)| isos).collect();
        let countries: Vec<String> = isos_by_region[region]
            .iter()
            .filter(|iso| !taken.contains(iso))
            .cloned()
            .collect();
        assigned.push((region.to_string(), countries));
    }

    mapping
}

// ---------------------------------------------------------------------------
// Target calculation
// ---------------------------------------------------------------------------

/// A company indicator with its region label resolved.
#[derive(Debug, Clone)]
struct SituatedIndicator {
    company_id: String,
    company_name: String,
    sector: String,
    technology: String,
    plant_location: String,
    year: i32,
    region: String,
    production: Decimal,
    emission_factor: Decimal,
}

fn assign_regions(
    indicators: &[CompanyIndicator],
    mapping: Option<&RegionMapping>,
) -> Vec<SituatedIndicator> {
    indicators
        .iter()
        .map(|row| {
            let mut region = GLOBAL_REGION.to_string();
            if let Some(mapping) = mapping {
                if let Some(sector_regions) = mapping.get(&row.sector) {
                    for (candidate, countries) in sector_regions {
                        if countries.iter().any(|iso| *iso == row.plant_location) {
                            region = candidate.clone();
                        }
                    }
                }
            }
            SituatedIndicator {
                company_id: row.company_id.clone(),
                company_name: row.company_name.clone(),
                sector: row.sector.clone(),
                technology: row.technology.clone(),
                plant_location: row.plant_location.clone(),
                year: row.year,
                region,
                production: row.production,
                emission_factor: row.emission_factor,
            }
        })
        .collect()
}

/// Production sums at the scenario year, at the three granularities the
/// TMS formulas need.
struct InitialProduction {
    /// (company, sector, region) -> total sector production.
    sector: HashMap<(String, String, String), Decimal>,
    /// (company, sector, region, technology) -> technology production.
    technology: HashMap<(String, String, String, String), Decimal>,
    /// (company, plant_location, sector, technology, region) -> production.
    asset: HashMap<(String, String, String, String, String), Decimal>,
}

fn initial_production(rows: &[SituatedIndicator], scenario_year: i32) -> InitialProduction {
    let mut sector = HashMap::new();
    let mut technology = HashMap::new();
    let mut asset = HashMap::new();
    for row in rows.iter().filter(|r| r.year == scenario_year) {
        *sector
            .entry((row.company_id.clone(), row.sector.clone(), row.region.clone()))
            .or_insert(Decimal::ZERO) += row.production;
        *technology
            .entry((
                row.company_id.clone(),
                row.sector.clone(),
                row.region.clone(),
                row.technology.clone(),
            ))
            .or_insert(Decimal::ZERO) += row.production;
        *asset
            .entry((
                row.company_id.clone(),
                row.plant_location.clone(),
                row.sector.clone(),
                row.technology.clone(),
                row.region.clone(),
            ))
            .or_insert(Decimal::ZERO) += row.production;
    }
    InitialProduction {
        sector,
        technology,
        asset,
    }
}

/// Compute the climate/target table for one (vintage, scenario year) pair.
///
/// Every indicator row is joined to the scenario pathway on
/// (sector, technology-or-"none", year, region) and assigned a target under
/// its sector's approach. Rows that end up without a target are dropped.
/// Intensity rows (emission_factor > 0) are rescaled to absolute emission
/// terms as the final step, regardless of the declared approach.
pub fn compute_climate(
    indicators: &[CompanyIndicator],
    scenario: &ScenarioIndex,
    settings: &AlignmentSettings,
    mapping: Option<&RegionMapping>,
    scenario_year: i32,
) -> AlignmentResult<Vec<ClimateRow>> {
    let situated = assign_regions(indicators, mapping);
    let initial = initial_production(&situated, scenario_year);

    let mut out = Vec::with_capacity(situated.len());
    for row in &situated {
        let approach = settings.approach_for(&row.sector)?;
        if !approach.active {
            continue;
        }

        let join_technology = match approach.approach {
            ApproachKind::Sda => SDA_TECHNOLOGY,
            ApproachKind::Tms => row.technology.as_str(),
        };
        let matched = scenario.get(&row.sector, join_technology, row.year, &row.region);

        let target = match approach.approach {
            ApproachKind::Sda => matched.and_then(|m| m.emission_factor),
            ApproachKind::Tms => {
                if approach.technology.iter().any(|t| *t == row.technology) {
                    // Straight multiplicative trajectory per existing asset
                    // location; no initial production means no trajectory.
                    let initial_asset = initial.asset.get(&(
                        row.company_id.clone(),
                        row.plant_location.clone(),
                        row.sector.clone(),
                        row.technology.clone(),
                        row.region.clone(),
                    ));
                    match (initial_asset, matched.and_then(|m| m.tmsr)) {
                        (Some(production), Some(tmsr)) => Some(production * tmsr),
                        _ => None,
                    }
                } else if approach.sector.iter().any(|t| *t == row.technology) {
                    // Allowed share of the company's sector-wide initial
                    // production, plus what it already produces in this
                    // technology. Missing sums count as zero.
                    matched.and_then(|m| m.smsp).map(|smsp| {
                        let sector_total = initial
                            .sector
                            .get(&(
                                row.company_id.clone(),
                                row.sector.clone(),
                                row.region.clone(),
                            ))
                            .copied()
                            .unwrap_or(Decimal::ZERO);
                        let technology_initial = initial
                            .technology
                            .get(&(
                                row.company_id.clone(),
                                row.sector.clone(),
                                row.region.clone(),
                                row.technology.clone(),
                            ))
                            .copied()
                            .unwrap_or(Decimal::ZERO);
                        sector_total * smsp + technology_initial
                    })
                } else {
                    None
                }
            }
        };

        let Some(mut target) = target else { continue };

        // Intensity rows: intensity target -> absolute emissions target,
        // physical production -> emission-equivalent production. Must run
        // after every approach so the later ratio math stays consistent.
        let mut production = row.production;
        if row.emission_factor > Decimal::ZERO {
            target *= row.production;
            production = row.emission_factor * row.production;
        }

        out.push(ClimateRow {
            company_id: row.company_id.clone(),
            company_name: row.company_name.clone(),
            sector: row.sector.clone(),
            technology: row.technology.clone(),
            year: row.year,
            region: row.region.clone(),
            production,
            emission_factor: row.emission_factor,
            target,
        });
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Asset-location consolidation
// ---------------------------------------------------------------------------

/// Fold plant locations into one row per company-sector-technology-year-
/// region. Intensity rows are relabelled with their sector as technology.
/// Production always sums; targets sum, except for sector-approach
/// technologies whose per-asset targets share the sector total and average
/// instead.
pub fn combine_asset_locations(
    climate: &[ClimateRow],
    settings: &AlignmentSettings,
) -> Vec<ProductionRow> {
    let sector_approach_techs = settings.sector_approach_technologies();

    #[derive(Default)]
    struct Group {
        production: Decimal,
        target_sum: Decimal,
        count: u32,
    }

    let mut groups: BTreeMap<(String, String, String, String, i32, String), Group> =
        BTreeMap::new();
    for row in climate {
        let technology = if row.emission_factor > Decimal::ZERO {
            row.sector.clone()
        } else {
            row.technology.clone()
        };
        let group = groups
            .entry((
                row.company_id.clone(),
                row.company_name.clone(),
                row.sector.clone(),
                technology,
                row.year,
                row.region.clone(),
            ))
            .or_default();
        group.production += row.production;
        group.target_sum += row.target;
        group.count += 1;
    }

    groups
        .into_iter()
        .map(|((company_id, company_name, sector, technology, year, region), group)| {
            let target = if sector_approach_techs.iter().any(|t| *t == technology) {
                group.target_sum / Decimal::from(group.count)
            } else {
                group.target_sum
            };
            ProductionRow {
                company_id,
                company_name,
                sector,
                technology,
                year,
                region,
                production: group.production,
                target,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
