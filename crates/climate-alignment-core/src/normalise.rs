use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::ownership::ParentMap;
use crate::types::{CompanyIndicator, ExposureRow, NormalisationMethod};

/// Attach a normalisation divisor to every combined row and rescale both
/// production and target by it. Dividing both sides by the same divisor
/// changes absolute scale without disturbing the deviation/target ratio the
/// score is built from. Sectors without a computable divisor fall back to 1
/// so nothing poisons the downstream sums.
pub fn apply_normalisation(
    method: NormalisationMethod,
    mut rows: Vec<ExposureRow>,
    year: i32,
    indicators: &[CompanyIndicator],
    strong_parents: &ParentMap,
    economic_weights: &BTreeMap<String, Decimal>,
) -> Vec<ExposureRow> {
    match method {
        NormalisationMethod::Global => {
            let totals = universe_sector_totals(indicators, strong_parents);
            for row in &mut rows {
                row.norm = divisor(totals.get(row.sector.as_str()).copied());
            }
        }
        NormalisationMethod::Economic => {
            let mut totals = universe_sector_totals(indicators, strong_parents);
            for (sector, total) in totals.iter_mut() {
                if let Some(weight) = economic_weights.get(*sector) {
                    *total *= *weight;
                }
            }
            for row in &mut rows {
                row.norm = divisor(totals.get(row.sector.as_str()).copied());
            }
        }
        NormalisationMethod::Total => {
            let mut totals: HashMap<String, Decimal> = HashMap::new();
            for row in rows.iter().filter(|r| r.year == year && r.amount > Decimal::ZERO) {
                *totals.entry(row.sector.clone()).or_insert(Decimal::ZERO) += row.production;
            }
            for row in &mut rows {
                row.norm = divisor(totals.get(&row.sector).copied());
            }
        }
        NormalisationMethod::Portfolio => {
            let mut totals: HashMap<(String, String), Decimal> = HashMap::new();
            for row in rows.iter().filter(|r| r.year == year && r.amount > Decimal::ZERO) {
                *totals
                    .entry((row.sector.clone(), row.portfolio_id.clone()))
                    .or_insert(Decimal::ZERO) += row.production;
            }
            for row in &mut rows {
                row.norm =
                    divisor(totals.get(&(row.sector.clone(), row.portfolio_id.clone())).copied());
            }
        }
        NormalisationMethod::Company => {
            let mut totals: HashMap<(String, String), Decimal> = HashMap::new();
            for row in rows.iter() {
                *totals
                    .entry((row.sector.clone(), row.company_id.clone()))
                    .or_insert(Decimal::ZERO) += row.production;
            }
            for row in &mut rows {
                row.norm =
                    divisor(totals.get(&(row.sector.clone(), row.company_id.clone())).copied());
            }
        }
        NormalisationMethod::None => {
            for row in &mut rows {
                row.norm = Decimal::ONE;
            }
        }
    }

    for row in &mut rows {
        row.production /= row.norm;
        row.target /= row.norm;
    }
    rows
}

/// Sector production totals over the full climate universe, restricted to
/// companies that are themselves resolved parents.
fn universe_sector_totals<'a>(
    indicators: &'a [CompanyIndicator],
    strong_parents: &ParentMap,
) -> HashMap<&'a str, Decimal> {
    let parents: HashSet<&str> = strong_parents.values().map(String::as_str).collect();
    let mut totals: HashMap<&str, Decimal> = HashMap::new();
    for indicator in indicators {
        if parents.contains(indicator.company_id.as_str()) {
            *totals.entry(indicator.sector.as_str()).or_insert(Decimal::ZERO) +=
                indicator.production;
        }
    }
    totals
}

fn divisor(total: Option<Decimal>) -> Decimal {
    match total {
        Some(total) if !total.is_zero() => total,
        _ => Decimal::ONE,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
