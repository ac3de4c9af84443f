use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use climate_alignment_core::{
    AlignmentSettings, ClimateDataBundle, CompanyIndicator, LoanRecord, OwnershipRecord,
    RegionEntry, ScenarioTarget,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Read and validate the YAML settings file.
pub fn read_settings(path: &str) -> CliResult<AlignmentSettings> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    let settings: AlignmentSettings = serde_yaml::from_str(&contents)
        .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
    settings.validate()?;
    Ok(settings)
}

/// Load every table the settings point at into one bundle. Rows of inactive
/// sectors are dropped at load time.
pub fn load_bundle(settings: &AlignmentSettings) -> CliResult<ClimateDataBundle> {
    let mut bundle = ClimateDataBundle::default();

    for (year, files) in &settings.data_locations.main_climate_files {
        let indicators: Vec<CompanyIndicator> = read_csv(&files.company_indicators)?
            .into_iter()
            .filter(|row: &CompanyIndicator| {
                settings
                    .sectoral_approach
                    .get(&row.sector)
                    .map(|approach| approach.active)
                    .unwrap_or(true)
            })
            .collect();
        bundle.company_indicators.insert(*year, indicators);
        bundle
            .company_ownership
            .insert(*year, read_csv(&files.company_ownership)?);
    }

    for (year, sets) in &settings.data_locations.scenario_files {
        for (scenario_set, entry) in sets {
            let pathways =
                load_scenario_pathways(&entry.scenario_file_tms, &entry.scenario_file_sda)?;
            bundle
                .scenario_data
                .entry(*year)
                .or_default()
                .insert(scenario_set.clone(), pathways);
        }
    }

    for (scenario_set, path) in &settings.data_locations.region_files {
        let regions: Vec<RegionEntry> = read_csv(path)?;
        bundle.region_data.insert(scenario_set.clone(), regions);
    }

    bundle.validate()?;
    Ok(bundle)
}

/// Read the loan book CSV.
pub fn load_loans(path: &str) -> CliResult<Vec<LoanRecord>> {
    read_csv(path)
}

// ---------------------------------------------------------------------------
// Scenario files
// ---------------------------------------------------------------------------

/// One raw row of a scenario file; TMS and SDA files share the layout with
/// different value columns populated.
#[derive(Debug, Clone, Deserialize)]
struct ScenarioFileRow {
    #[serde(default)]
    scenario: Option<String>,
    sector: String,
    #[serde(default)]
    technology: Option<String>,
    year: i32,
    region: String,
    #[serde(default)]
    smsp: Option<Decimal>,
    #[serde(default)]
    tmsr: Option<Decimal>,
    #[serde(default)]
    emission_factor: Option<Decimal>,
}

impl ScenarioFileRow {
    fn pathway(&self) -> &str {
        self.scenario.as_deref().unwrap_or("default")
    }

    fn into_target(self) -> ScenarioTarget {
        ScenarioTarget {
            sector: self.sector,
            technology: self
                .technology
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "none".to_string()),
            year: self.year,
            region: self.region,
            smsp: self.smsp,
            tmsr: self.tmsr,
            emission_factor: self.emission_factor,
        }
    }
}

/// Combine the TMS and SDA scenario files into one table per pathway.
///
/// When one file carries a single pathway and the other several, the single
/// one is broadcast over the others (mismatched pathway labels are common
/// when a provider updates only one file); otherwise only pathways present
/// in both files survive.
fn load_scenario_pathways(
    tms_path: &str,
    sda_path: &str,
) -> CliResult<std::collections::BTreeMap<String, Vec<ScenarioTarget>>> {
    let tms_rows: Vec<ScenarioFileRow> = read_csv(tms_path)?;
    let sda_rows: Vec<ScenarioFileRow> = read_csv(sda_path)?;

    let tms_names: BTreeSet<String> =
        tms_rows.iter().map(|row| row.pathway().to_string()).collect();
    let sda_names: BTreeSet<String> =
        sda_rows.iter().map(|row| row.pathway().to_string()).collect();

    let pathways: BTreeSet<String> = if tms_names.len() == 1 && sda_names.len() > 1 {
        sda_names.clone()
    } else if sda_names.len() == 1 && tms_names.len() > 1 {
        tms_names.clone()
    } else {
        tms_names.intersection(&sda_names).cloned().collect()
    };

    let mut out = std::collections::BTreeMap::new();
    for pathway in pathways {
        let mut rows: Vec<ScenarioTarget> = Vec::new();
        for row in &tms_rows {
            if tms_names.len() == 1 || row.pathway() == pathway {
                rows.push(row.clone().into_target());
            }
        }
        for row in &sda_rows {
            if sda_names.len() == 1 || row.pathway() == pathway {
                rows.push(row.clone().into_target());
            }
        }
        out.insert(pathway, rows);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// CSV plumbing
// ---------------------------------------------------------------------------

/// Read a CSV file into typed records, with headers harmonised to
/// lowercase snake_case so provider exports with spaced or capitalised
/// column names load unchanged.
fn read_csv<T: DeserializeOwned>(path: &str) -> CliResult<Vec<T>> {
    let canonical = resolve_path(path)?;
    let mut reader = csv::Reader::from_path(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;

    let headers = reader
        .headers()
        .map_err(|e| format!("Failed to read headers of '{}': {}", canonical.display(), e))?;
    let harmonised: csv::StringRecord = headers
        .iter()
        .map(|header| header.trim().to_lowercase().replace(' ', "_"))
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
        let row: T = record
            .deserialize(Some(&harmonised))
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Resolve and validate the path, preventing directory traversal.
fn resolve_path(path: &str) -> CliResult<std::path::PathBuf> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if !canonical.exists() {
        return Err(format!("File not found: {}", canonical.display()).into());
    }

    if !canonical.is_file() {
        return Err(format!("Not a file: {}", canonical.display()).into());
    }

    Ok(canonical)
}
