use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use crate::config::AlignmentSettings;
use crate::types::{AlignmentKey, AlignmentScoreRow, Direction, ExposureRow, Facet, PortfolioDate};

/// Years between the latest portfolio date and the scoring horizon. The
/// over-time decomposer anchors on the same constant, so the two must never
/// diverge.
pub const DEFAULT_HORIZON: i32 = 5;

/// Key identifying the rows that share one target trajectory; the end-year
/// target is looked up per key, never per calendar year of the row itself.
type TargetKey = (
    String,
    String,
    String,
    String,
    String,
    String,
    PortfolioDate,
);

fn target_key(row: &ExposureRow) -> TargetKey {
    (
        row.sector.clone(),
        row.technology.clone(),
        row.region.clone(),
        row.portfolio_id.clone(),
        row.company_id.clone(),
        row.loan_id.clone(),
        row.portfolio_date,
    )
}

/// Score one preprocessed table for a single horizon.
///
/// Deviations are taken at each row's own year and sign-flipped for
/// phase-out and other technologies, so a positive aggregate always means
/// aligned. The scoring denominator is anchored to the target at
/// `end_year`, regardless of which year's deviation is being scored. Rows
/// are restricted to `end_year` unless `Year` itself is a requested facet.
pub fn calculate_alignment_instance(
    rows: &[ExposureRow],
    facets: &[Facet],
    bopo_split: bool,
    limit: Decimal,
    settings: &AlignmentSettings,
    horizon: i32,
) -> Vec<AlignmentScoreRow> {
    let Some(latest) = rows.iter().map(|row| row.portfolio_date.year()).max() else {
        return Vec::new();
    };
    let end_year = latest + horizon;

    let mut end_targets: HashMap<TargetKey, Decimal> = HashMap::new();
    for row in rows.iter().filter(|row| row.year == end_year) {
        end_targets.entry(target_key(row)).or_insert(row.target);
    }

    let keep_all_years = facets.contains(&Facet::Year);

    struct Sums {
        amount: Decimal,
        weighted_deviation: Decimal,
        weighted_target: Decimal,
    }

    let mut groups: BTreeMap<AlignmentKey, Sums> = BTreeMap::new();
    for row in rows {
        if !keep_all_years && row.year != end_year {
            continue;
        }

        let mut deviation = row.production - row.target;
        if let Some(approach) = settings.sectoral_approach.get(&row.sector) {
            if approach.flips_deviation(&row.technology) {
                deviation = -deviation;
            }
        }
        let weighted_deviation = deviation * row.amount;
        let target_end = end_targets
            .get(&target_key(row))
            .copied()
            .unwrap_or(Decimal::ZERO);
        let weighted_target = target_end * row.amount;

        let direction = bopo_split.then(|| {
            settings
                .sectoral_approach
                .get(&row.sector)
                .map(|approach| approach.direction_of(&row.technology))
                .unwrap_or(Direction::NoChange)
        });

        let key = AlignmentKey {
            portfolio_id: row.portfolio_id.clone(),
            portfolio_date: row.portfolio_date,
            end_year,
            direction,
            facet_values: facets.iter().map(|facet| facet.value(row)).collect(),
        };
        let sums = groups.entry(key).or_insert(Sums {
            amount: Decimal::ZERO,
            weighted_deviation: Decimal::ZERO,
            weighted_target: Decimal::ZERO,
        });
        sums.amount += row.amount;
        sums.weighted_deviation += weighted_deviation;
        sums.weighted_target += weighted_target;
    }

    groups
        .into_iter()
        .map(|(key, sums)| AlignmentScoreRow {
            key,
            loan_indicator: sums.amount,
            weighted_deviation: sums.weighted_deviation,
            weighted_target: sums.weighted_target,
            score: score(sums.weighted_deviation, sums.weighted_target, limit),
        })
        .collect()
}

/// The clipped alignment score; undefined (not zero, not clipped) when the
/// weighted target vanishes.
pub fn score(
    weighted_deviation: Decimal,
    weighted_target: Decimal,
    limit: Decimal,
) -> Option<Decimal> {
    if weighted_target.is_zero() {
        return None;
    }
    let raw = weighted_deviation / weighted_target;
    Some(raw.max(-limit).min(limit))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
