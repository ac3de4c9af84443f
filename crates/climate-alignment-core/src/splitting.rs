use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

use crate::types::{CompanyIndicator, ExposureRow, PortfolioDate};

/// Guard against zero-production, zero-target technology groups.
const TECHNOLOGY_SPLIT_EPSILON: Decimal = dec!(0.0001);

/// Distribute each loan's exposure over the sectors its company produces
/// in, proportionally to the company's production share per sector in the
/// vintage indicator table. Rows whose company has no production recorded
/// (or a zero company total) drop out.
pub fn split_loans_over_sectors(
    rows: Vec<ExposureRow>,
    indicators: &[CompanyIndicator],
) -> Vec<ExposureRow> {
    let mut sector_production: HashMap<(&str, &str), Decimal> = HashMap::new();
    let mut company_production: HashMap<&str, Decimal> = HashMap::new();
    for indicator in indicators {
        *sector_production
            .entry((indicator.company_id.as_str(), indicator.sector.as_str()))
            .or_insert(Decimal::ZERO) += indicator.production;
        *company_production
            .entry(indicator.company_id.as_str())
            .or_insert(Decimal::ZERO) += indicator.production;
    }

    rows.into_iter()
        .filter_map(|mut row| {
            let in_sector = sector_production
                .get(&(row.company_id.as_str(), row.sector.as_str()))
                .copied()?;
            let total = company_production.get(row.company_id.as_str()).copied()?;
            if total.is_zero() {
                return None;
            }
            row.amount *= in_sector / total;
            Some(row)
        })
        .collect()
}

/// Distribute each loan's per-sector exposure over the technologies in that
/// sector, weighted by target + production so a technology with a target
/// but no production still attracts exposure. The epsilon keeps fully-zero
/// groups splittable (equal shares) instead of dividing by zero.
pub fn split_over_technologies(mut rows: Vec<ExposureRow>) -> Vec<ExposureRow> {
    type Key = (String, i32, String, String, String, PortfolioDate);

    let mut group_sums: HashMap<Key, Decimal> = HashMap::new();
    for row in &rows {
        *group_sums.entry(group_key(row)).or_insert(Decimal::ZERO) += split_weight(row);
    }

    for row in &mut rows {
        let total = group_sums[&group_key(row)];
        row.amount *= split_weight(row) / total;
    }
    rows
}

fn group_key(row: &ExposureRow) -> (String, i32, String, String, String, PortfolioDate) {
    (
        row.sector.clone(),
        row.year,
        row.portfolio_id.clone(),
        row.company_id.clone(),
        row.loan_id.clone(),
        row.portfolio_date,
    )
}

fn split_weight(row: &ExposureRow) -> Decimal {
    row.target + row.production + TECHNOLOGY_SPLIT_EPSILON
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
