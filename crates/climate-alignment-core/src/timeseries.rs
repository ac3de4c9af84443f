use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::types::{ExposureRow, LoanRecord, PortfolioDate, ShiftRow};

/// One scored cell of the (scenario year, data year, portfolio date) grid.
#[derive(Debug, Clone)]
pub struct OverTimeRow {
    pub portfolio_id: String,
    pub scenario_year: i32,
    pub data_year: i32,
    pub portfolio_date: PortfolioDate,
    pub end_year: i32,
    pub amount: Decimal,
    pub weighted_deviation: Decimal,
    pub weighted_target: Decimal,
    pub score: Option<Decimal>,
}

/// The year-end snapshots the over-time analysis runs on.
pub fn december_portfolio_dates(loans: &[LoanRecord]) -> Vec<PortfolioDate> {
    let mut dates: Vec<PortfolioDate> = loans
        .iter()
        .map(|loan| loan.portfolio_date)
        .filter(|date| date.month() == 12)
        .collect();
    dates.sort();
    dates.dedup();
    dates
}

/// Re-align one grid cell before scoring. Cells where the data vintage runs
/// ahead of the portfolio date shift their year labels back one year; cells
/// pairing the newer portfolio date with the older scenario vintage
/// additionally back-date the portfolio period so the cell sorts between
/// the two anchors. `restore_portfolio_date` undoes the second adjustment
/// after scoring.
pub fn shift_cell(
    rows: &mut [ExposureRow],
    portfolio_year: i32,
    data_year: i32,
    scenario_year: i32,
) {
    if portfolio_year - data_year == -1 {
        for row in rows.iter_mut() {
            row.year -= 1;
        }
    }
    if portfolio_year - data_year == 0 && portfolio_year - scenario_year == 1 {
        for row in rows.iter_mut() {
            row.year -= 1;
            row.portfolio_date = PortfolioDate(row.portfolio_date.0 - 50);
        }
    }
}

pub fn restore_portfolio_date(date: PortfolioDate) -> PortfolioDate {
    if date.month() >= 50 {
        PortfolioDate(date.0 + 50)
    } else {
        date
    }
}

/// Decompose score changes along the grid into decarbonisation, portfolio
/// and counterparty shifts.
///
/// Within each portfolio, rows are ordered by (scenario year, data year,
/// portfolio date) and successive score differences are attributed at the
/// anchor rows, the fully-current cells where scenario year, data year and
/// portfolio year coincide at `end_year - horizon`. The difference at the
/// anchor is the decarbonisation shift (scenario vintage advanced); the
/// difference one row earlier is the portfolio shift (portfolio date
/// advanced); two rows earlier, the counterparty shift (data vintage
/// advanced). Portfolios qualify only with a one-step scenario cadence,
/// positive total exposure, and at least one occurrence of each shift kind;
/// everything else is silently excluded.
pub fn decompose(
    mut rows: Vec<OverTimeRow>,
    add_total: bool,
    horizon: i32,
) -> Vec<ShiftRow> {
    if add_total {
        rows.extend(total_portfolio(&rows));
    }

    let mut by_portfolio: BTreeMap<String, Vec<OverTimeRow>> = BTreeMap::new();
    for row in rows {
        by_portfolio.entry(row.portfolio_id.clone()).or_default().push(row);
    }

    let mut out = Vec::new();
    for (portfolio_id, mut rows) in by_portfolio {
        rows.sort_by(|a, b| {
            (a.scenario_year, a.data_year, a.portfolio_date)
                .cmp(&(b.scenario_year, b.data_year, b.portfolio_date))
        });

        if !one_step_cadence(&rows) {
            continue;
        }
        let exposure: Decimal = rows.iter().map(|row| row.amount).sum();
        if exposure <= Decimal::ZERO {
            continue;
        }

        let differences: Vec<Option<Decimal>> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                if i == 0 {
                    return None;
                }
                match (rows[i - 1].score, row.score) {
                    (Some(previous), Some(current)) => Some(current - previous),
                    _ => None,
                }
            })
            .collect();

        struct Anchor {
            index: usize,
            decarbonisation: Option<Decimal>,
            portfolio: Option<Decimal>,
            counterparty: Option<Decimal>,
        }

        let anchors: Vec<Anchor> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                row.scenario_year == row.end_year - horizon
                    && row.scenario_year == row.data_year
                    && row.scenario_year == row.portfolio_date.year()
            })
            .map(|(index, _)| Anchor {
                index,
                decarbonisation: differences[index],
                portfolio: (index >= 1).then(|| differences[index - 1]).flatten(),
                counterparty: (index >= 2).then(|| differences[index - 2]).flatten(),
            })
            .collect();

        let complete = anchors.iter().any(|a| a.decarbonisation.is_some())
            && anchors.iter().any(|a| a.portfolio.is_some())
            && anchors.iter().any(|a| a.counterparty.is_some());
        if !complete {
            continue;
        }

        for anchor in anchors {
            let row = &rows[anchor.index];
            let total_shift = match (
                anchor.decarbonisation,
                anchor.portfolio,
                anchor.counterparty,
            ) {
                (Some(d), Some(p), Some(c)) => Some(d + p + c),
                _ => None,
            };
            out.push(ShiftRow {
                portfolio_id: portfolio_id.clone(),
                portfolio_date: row.portfolio_date,
                score: row.score,
                decarbonisation_shift: anchor.decarbonisation,
                portfolio_shift: anchor.portfolio,
                counterparty_shift: anchor.counterparty,
                total_shift,
            });
        }
    }
    out
}

/// Scenario vintages must advance exactly one step over the grid (three
/// rows per vintage): 3 x mean(successive scenario-year difference) == 1.
fn one_step_cadence(rows: &[OverTimeRow]) -> bool {
    if rows.len() < 2 {
        return false;
    }
    let first = rows.first().map(|row| row.scenario_year).unwrap_or_default();
    let last = rows.last().map(|row| row.scenario_year).unwrap_or_default();
    3 * (last - first) == (rows.len() as i32 - 1)
}

/// A synthetic fleet-wide portfolio: grid cells summed across portfolios,
/// score re-derived from the summed weighted columns (unclipped).
fn total_portfolio(rows: &[OverTimeRow]) -> Vec<OverTimeRow> {
    #[derive(Default)]
    struct Sums {
        amount: Decimal,
        weighted_deviation: Decimal,
        weighted_target: Decimal,
    }

    let mut groups: BTreeMap<(i32, i32, PortfolioDate, i32), Sums> = BTreeMap::new();
    for row in rows {
        let sums = groups
            .entry((
                row.scenario_year,
                row.data_year,
                row.portfolio_date,
                row.end_year,
            ))
            .or_default();
        sums.amount += row.amount;
        sums.weighted_deviation += row.weighted_deviation;
        sums.weighted_target += row.weighted_target;
    }

    groups
        .into_iter()
        .map(|((scenario_year, data_year, portfolio_date, end_year), sums)| OverTimeRow {
            portfolio_id: "total".to_string(),
            scenario_year,
            data_year,
            portfolio_date,
            end_year,
            amount: sums.amount,
            weighted_deviation: sums.weighted_deviation,
            weighted_target: sums.weighted_target,
            score: if sums.weighted_target.is_zero() {
                None
            } else {
                Some(sums.weighted_deviation / sums.weighted_target)
            },
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DEFAULT_HORIZON;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn cell(
        portfolio: &str,
        scenario_year: i32,
        data_year: i32,
        date: i32,
        end_year: i32,
        score: Decimal,
    ) -> OverTimeRow {
        OverTimeRow {
            portfolio_id: portfolio.to_string(),
            scenario_year,
            data_year,
            portfolio_date: PortfolioDate(date),
            end_year,
            amount: dec!(1000),
            weighted_deviation: score * dec!(100),
            weighted_target: dec!(100),
            score: Some(score),
        }
    }

    fn two_vintage_grid(portfolio: &str) -> Vec<OverTimeRow> {
        vec![
            cell(portfolio, 2022, 2022, 202212, 2027, dec!(0.10)),
            cell(portfolio, 2022, 2023, 202212, 2027, dec!(0.16)),
            cell(portfolio, 2022, 2023, 202312, 2027, dec!(0.19)),
            cell(portfolio, 2023, 2023, 202312, 2028, dec!(0.25)),
        ]
    }

    #[test]
    fn test_shift_attribution_chain() {
        let shifts = decompose(two_vintage_grid("pf"), false, DEFAULT_HORIZON);
        assert_eq!(shifts.len(), 2);

        let first = &shifts[0];
        assert_eq!(first.portfolio_date, PortfolioDate(202212));
        assert_eq!(first.score, Some(dec!(0.10)));
        assert_eq!(first.decarbonisation_shift, None);
        assert_eq!(first.total_shift, None);

        let second = &shifts[1];
        assert_eq!(second.portfolio_date, PortfolioDate(202312));
        assert_eq!(second.score, Some(dec!(0.25)));
        // data vintage advance 0.10 -> 0.16
        assert_eq!(second.counterparty_shift, Some(dec!(0.06)));
        // portfolio date advance 0.16 -> 0.19
        assert_eq!(second.portfolio_shift, Some(dec!(0.03)));
        // scenario vintage advance 0.19 -> 0.25
        assert_eq!(second.decarbonisation_shift, Some(dec!(0.06)));
        assert_eq!(second.total_shift, Some(dec!(0.15)));
    }

    #[test]
    fn test_zero_exposure_portfolio_excluded() {
        let mut rows = two_vintage_grid("pf");
        for row in &mut rows {
            row.amount = Decimal::ZERO;
        }
        assert!(decompose(rows, false, DEFAULT_HORIZON).is_empty());
    }

    #[test]
    fn test_broken_cadence_excluded() {
        // scenario years jump by two: the grid is not one-step
        let rows = vec![
            cell("pf", 2022, 2022, 202212, 2027, dec!(0.10)),
            cell("pf", 2022, 2023, 202212, 2027, dec!(0.16)),
            cell("pf", 2022, 2023, 202312, 2027, dec!(0.19)),
            cell("pf", 2024, 2024, 202412, 2029, dec!(0.25)),
        ];
        assert!(decompose(rows, false, DEFAULT_HORIZON).is_empty());
    }

    #[test]
    fn test_total_portfolio_added() {
        let mut rows = two_vintage_grid("pf_a");
        rows.extend(two_vintage_grid("pf_b"));
        let shifts = decompose(rows, true, DEFAULT_HORIZON);
        let totals: Vec<&ShiftRow> =
            shifts.iter().filter(|s| s.portfolio_id == "total").collect();
        assert_eq!(totals.len(), 2);
        // identical grids: the combined score equals the per-portfolio one
        assert_eq!(totals[1].score, Some(dec!(0.25)));
        assert_eq!(totals[1].total_shift, Some(dec!(0.15)));
    }

    #[test]
    fn test_december_dates_only() {
        let loans = vec![
            loan_at(202212),
            loan_at(202306),
            loan_at(202312),
            loan_at(202312),
        ];
        let dates = december_portfolio_dates(&loans);
        assert_eq!(dates, vec![PortfolioDate(202212), PortfolioDate(202312)]);
    }

    #[test]
    fn test_shift_cell_backdates_cross_vintage_cells() {
        let mut rows = vec![exposure_at(202412, 2029)];
        // portfolio year 2024, data vintage 2024, scenario vintage 2023
        shift_cell(&mut rows, 2024, 2024, 2023);
        assert_eq!(rows[0].year, 2028);
        assert_eq!(rows[0].portfolio_date, PortfolioDate(202362));
        assert_eq!(
            restore_portfolio_date(rows[0].portfolio_date),
            PortfolioDate(202412)
        );
    }

    #[test]
    fn test_shift_cell_data_ahead_of_portfolio() {
        let mut rows = vec![exposure_at(202312, 2029)];
        // portfolio year 2023, data vintage 2024: year labels move back
        shift_cell(&mut rows, 2023, 2024, 2023);
        assert_eq!(rows[0].year, 2028);
        assert_eq!(rows[0].portfolio_date, PortfolioDate(202312));
    }

    fn loan_at(date: i32) -> LoanRecord {
        LoanRecord {
            loan_id: "L1".into(),
            company_id: "C1".into(),
            portfolio_id: "pf".into(),
            portfolio_date: PortfolioDate(date),
            outstanding_amount: dec!(100),
            credit_limit: None,
            sector: None,
            total_assets: None,
            turnover: None,
        }
    }

    fn exposure_at(date: i32, year: i32) -> ExposureRow {
        ExposureRow {
            loan_id: "L1".into(),
            company_id: "C1".into(),
            company_name: "C1 Corp".into(),
            portfolio_id: "pf".into(),
            portfolio_date: PortfolioDate(date),
            sector: "power".into(),
            technology: "coalcap".into(),
            year,
            region: "global".into(),
            production: dec!(10),
            target: dec!(8),
            amount: dec!(100),
            total_assets: None,
            turnover: None,
            norm: Decimal::ONE,
        }
    }
}
