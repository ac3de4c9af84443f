use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::AlignmentSettings;
use crate::types::ExposureRow;

/// Drop companies whose production is immaterial next to their balance
/// sheet. Per (company, sector): mean total assets, mean turnover and
/// summed production (deduplicated per technology/region/year cell first,
/// so split exposure rows do not double count). A company stays eligible
/// when either production ratio clears its sector's threshold, or when both
/// ratios are undefined: missing denominators cannot disqualify. The
/// filter is a no-op when the loan book carries no balance-sheet columns.
pub fn apply_production_thresholds(
    rows: Vec<ExposureRow>,
    settings: &AlignmentSettings,
) -> Vec<ExposureRow> {
    let has_balance_sheet = rows
        .iter()
        .any(|row| row.total_assets.is_some() || row.turnover.is_some());
    if !has_balance_sheet || settings.production_thresholds.is_empty() {
        return rows;
    }

    let companies = company_ratios(&rows);

    let mut eligible: BTreeSet<String> = BTreeSet::new();
    for company in &companies {
        if company.asset_ratio.is_none() && company.turnover_ratio.is_none() {
            eligible.insert(company.company_id.clone());
        }
    }
    for (sector, threshold) in &settings.production_thresholds {
        for company in companies.iter().filter(|c| c.sector == *sector) {
            let passes_assets = company
                .asset_ratio
                .map(|ratio| ratio_exceeds(ratio, threshold.asset_ratio))
                .unwrap_or(false);
            let passes_turnover = company
                .turnover_ratio
                .map(|ratio| ratio_exceeds(ratio, threshold.turnover_ratio))
                .unwrap_or(false);
            if passes_assets || passes_turnover {
                eligible.insert(company.company_id.clone());
            }
        }
    }

    rows.into_iter()
        .filter(|row| eligible.contains(&row.company_id))
        .collect()
}

/// A production ratio; `Unbounded` models production against a zero
/// denominator, which clears any threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Ratio {
    Finite(Decimal),
    Unbounded,
}

fn ratio_exceeds(ratio: Ratio, threshold: Decimal) -> bool {
    match ratio {
        Ratio::Finite(value) => value > threshold,
        Ratio::Unbounded => true,
    }
}

#[derive(Debug)]
struct CompanySectorRatios {
    company_id: String,
    sector: String,
    asset_ratio: Option<Ratio>,
    turnover_ratio: Option<Ratio>,
}

fn company_ratios(rows: &[ExposureRow]) -> Vec<CompanySectorRatios> {
    // One representative row per production cell, then company-sector
    // aggregates over those representatives.
    let mut cells: BTreeMap<(String, String, i32, String, String), &ExposureRow> = BTreeMap::new();
    for row in rows {
        cells
            .entry((
                row.technology.clone(),
                row.region.clone(),
                row.year,
                row.company_id.clone(),
                row.sector.clone(),
            ))
            .or_insert(row);
    }

    #[derive(Default)]
    struct Aggregate {
        production: Decimal,
        assets_sum: Decimal,
        assets_count: u32,
        turnover_sum: Decimal,
        turnover_count: u32,
    }

    let mut aggregates: BTreeMap<(String, String), Aggregate> = BTreeMap::new();
    for row in cells.values() {
        let aggregate = aggregates
            .entry((row.company_id.clone(), row.sector.clone()))
            .or_default();
        aggregate.production += row.production;
        if let Some(assets) = row.total_assets {
            aggregate.assets_sum += assets;
            aggregate.assets_count += 1;
        }
        if let Some(turnover) = row.turnover {
            aggregate.turnover_sum += turnover;
            aggregate.turnover_count += 1;
        }
    }

    aggregates
        .into_iter()
        .map(|((company_id, sector), aggregate)| {
            let assets = mean(aggregate.assets_sum, aggregate.assets_count);
            let turnover = mean(aggregate.turnover_sum, aggregate.turnover_count);
            CompanySectorRatios {
                company_id,
                sector,
                asset_ratio: ratio(aggregate.production, assets),
                turnover_ratio: ratio(aggregate.production, turnover),
            }
        })
        .collect()
}

fn mean(sum: Decimal, count: u32) -> Option<Decimal> {
    (count > 0).then(|| sum / Decimal::from(count))
}

fn ratio(production: Decimal, denominator: Option<Decimal>) -> Option<Ratio> {
    match denominator {
        None => None,
        Some(denominator) if denominator.is_zero() => {
            if production.is_zero() {
                None
            } else {
                Some(Ratio::Unbounded)
            }
        }
        Some(denominator) => Some(Ratio::Finite(production / denominator)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProductionThreshold;
    use crate::types::PortfolioDate;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn row(
        company: &str,
        sector: &str,
        technology: &str,
        production: Decimal,
        total_assets: Option<Decimal>,
        turnover: Option<Decimal>,
    ) -> ExposureRow {
        ExposureRow {
            loan_id: format!("L-{company}"),
            company_id: company.to_string(),
            company_name: format!("{company} Corp"),
            portfolio_id: "pf".to_string(),
            portfolio_date: PortfolioDate(202312),
            sector: sector.to_string(),
            technology: technology.to_string(),
            year: 2023,
            region: "global".to_string(),
            production,
            target: production,
            amount: dec!(1000),
            total_assets,
            turnover,
            norm: Decimal::ONE,
        }
    }

    fn settings_with_threshold(asset_ratio: Decimal, turnover_ratio: Decimal) -> AlignmentSettings {
        let mut production_thresholds = BTreeMap::new();
        production_thresholds.insert(
            "power".to_string(),
            ProductionThreshold {
                asset_ratio,
                turnover_ratio,
            },
        );
        AlignmentSettings {
            sectoral_approach: BTreeMap::new(),
            economic_weights: BTreeMap::new(),
            production_thresholds,
            data_locations: Default::default(),
        }
    }

    #[test]
    fn test_noop_without_balance_sheet_columns() {
        let rows = vec![row("C1", "power", "coalcap", dec!(1), None, None)];
        let settings = settings_with_threshold(dec!(100), dec!(100));
        let filtered = apply_production_thresholds(rows.clone(), &settings);
        assert_eq!(filtered.len(), rows.len());
    }

    #[test]
    fn test_company_below_both_thresholds_dropped() {
        let rows = vec![
            row("C1", "power", "coalcap", dec!(1), Some(dec!(100_000)), Some(dec!(50_000))),
            row("C2", "power", "coalcap", dec!(500), Some(dec!(100_000)), Some(dec!(50_000))),
        ];
        let settings = settings_with_threshold(dec!(0.001), dec!(0.001));
        let filtered = apply_production_thresholds(rows, &settings);
        assert!(filtered.iter().all(|r| r.company_id == "C2"));
        assert!(!filtered.is_empty());
    }

    #[test]
    fn test_either_ratio_suffices() {
        // asset ratio fails, turnover ratio clears the bar
        let rows = vec![row(
            "C1",
            "power",
            "coalcap",
            dec!(10),
            Some(dec!(1_000_000)),
            Some(dec!(100)),
        )];
        let settings = settings_with_threshold(dec!(0.01), dec!(0.01));
        let filtered = apply_production_thresholds(rows, &settings);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_missing_denominators_cannot_disqualify() {
        let rows = vec![
            row("C1", "power", "coalcap", dec!(1), None, None),
            // C2 provides balance sheet data so the filter engages
            row("C2", "power", "coalcap", dec!(1), Some(dec!(1_000_000)), None),
        ];
        let settings = settings_with_threshold(dec!(0.01), dec!(0.01));
        let filtered = apply_production_thresholds(rows, &settings);
        assert!(filtered.iter().any(|r| r.company_id == "C1"));
        assert!(!filtered.iter().any(|r| r.company_id == "C2"));
    }

    #[test]
    fn test_split_rows_do_not_double_count_production() {
        // The same production cell appears on two loans; production must
        // count once, keeping the ratio below the threshold.
        let mut first = row("C1", "power", "coalcap", dec!(6), Some(dec!(1000)), None);
        first.loan_id = "L-a".into();
        let mut second = first.clone();
        second.loan_id = "L-b".into();
        let settings = settings_with_threshold(dec!(0.01), dec!(0.01));
        let filtered = apply_production_thresholds(vec![first, second], &settings);
        // 6 / 1000 = 0.006 < 0.01
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_threshold_monotonicity() {
        let rows = vec![
            row("C1", "power", "coalcap", dec!(10), Some(dec!(1_000)), Some(dec!(400))),
            row("C2", "power", "coalcap", dec!(40), Some(dec!(1_000)), Some(dec!(400))),
            row("C3", "power", "coalcap", dec!(90), Some(dec!(1_000)), Some(dec!(400))),
        ];
        let mut previous_len = usize::MAX;
        for threshold in [dec!(0.001), dec!(0.02), dec!(0.05), dec!(0.5)] {
            let settings = settings_with_threshold(threshold, threshold);
            let filtered = apply_production_thresholds(rows.clone(), &settings);
            assert!(
                filtered.len() <= previous_len,
                "raising the threshold must never grow the eligible set"
            );
            previous_len = filtered.len();
        }
    }
}
