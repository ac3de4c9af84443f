use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AlignmentError;
use crate::types::{AlignmentScoreRow, Facet, FacetValue};
use crate::AlignmentResult;

/// The scored rows of one `compute_alignment` call, together with the facet
/// order they were aggregated under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentResultSet {
    rows: Vec<AlignmentScoreRow>,
    facets: Vec<Facet>,
}

/// A post-hoc regrouping of result rows. Scores re-derive from the summed
/// weighted columns and are not clipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupedScore {
    pub facet_values: Vec<FacetValue>,
    pub loan_indicator: Decimal,
    pub weighted_deviation: Decimal,
    pub weighted_target: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<Decimal>,
}

impl AlignmentResultSet {
    pub fn new(rows: Vec<AlignmentScoreRow>, facets: Vec<Facet>) -> Self {
        AlignmentResultSet { rows, facets }
    }

    pub fn rows(&self) -> &[AlignmentScoreRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<AlignmentScoreRow> {
        self.rows
    }

    pub fn facets(&self) -> &[Facet] {
        &self.facets
    }

    /// Collapse the rows onto a subset of the requested facets, summing the
    /// weighted columns and re-deriving the score. An empty grouper yields
    /// one overall row.
    pub fn group_scores(&self, grouper: &[Facet]) -> AlignmentResult<Vec<GroupedScore>> {
        let positions: Vec<usize> = grouper
            .iter()
            .map(|facet| {
                self.facets.iter().position(|f| f == facet).ok_or_else(|| {
                    AlignmentError::InvalidInput {
                        field: "grouper".into(),
                        reason: format!(
                            "Facet {facet:?} was not part of the computed result facets."
                        ),
                    }
                })
            })
            .collect::<AlignmentResult<_>>()?;

        #[derive(Default)]
        struct Sums {
            loan_indicator: Decimal,
            weighted_deviation: Decimal,
            weighted_target: Decimal,
        }

        let mut groups: BTreeMap<Vec<FacetValue>, Sums> = BTreeMap::new();
        for row in &self.rows {
            let key: Vec<FacetValue> = positions
                .iter()
                .map(|&i| row.key.facet_values[i].clone())
                .collect();
            let sums = groups.entry(key).or_default();
            sums.loan_indicator += row.loan_indicator;
            sums.weighted_deviation += row.weighted_deviation;
            sums.weighted_target += row.weighted_target;
        }

        Ok(groups
            .into_iter()
            .map(|(facet_values, sums)| GroupedScore {
                facet_values,
                loan_indicator: sums.loan_indicator,
                weighted_deviation: sums.weighted_deviation,
                weighted_target: sums.weighted_target,
                score: if sums.weighted_target.is_zero() {
                    None
                } else {
                    Some(sums.weighted_deviation / sums.weighted_target)
                },
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlignmentKey, PortfolioDate};
    use rust_decimal_macros::dec;

    fn score_row(
        portfolio: &str,
        sector: &str,
        deviation: Decimal,
        target: Decimal,
    ) -> AlignmentScoreRow {
        AlignmentScoreRow {
            key: AlignmentKey {
                portfolio_id: portfolio.to_string(),
                portfolio_date: PortfolioDate(202312),
                end_year: 2028,
                direction: None,
                facet_values: vec![FacetValue::Text(sector.to_string())],
            },
            loan_indicator: dec!(1000),
            weighted_deviation: deviation,
            weighted_target: target,
            score: if target.is_zero() {
                None
            } else {
                Some(deviation / target)
            },
        }
    }

    #[test]
    fn test_group_scores_by_facet() {
        let set = AlignmentResultSet::new(
            vec![
                score_row("pf_a", "power", dec!(10), dec!(100)),
                score_row("pf_b", "power", dec!(20), dec!(100)),
                score_row("pf_a", "steel", dec!(40), dec!(200)),
            ],
            vec![Facet::Sector],
        );
        let grouped = set.group_scores(&[Facet::Sector]).unwrap();
        assert_eq!(grouped.len(), 2);
        let power = grouped
            .iter()
            .find(|g| g.facet_values == vec![FacetValue::Text("power".into())])
            .unwrap();
        assert_eq!(power.weighted_deviation, dec!(30));
        assert_eq!(power.score, Some(dec!(0.15)));
    }

    #[test]
    fn test_group_scores_empty_grouper_sums_everything() {
        let set = AlignmentResultSet::new(
            vec![
                score_row("pf_a", "power", dec!(10), dec!(100)),
                score_row("pf_b", "steel", dec!(30), dec!(100)),
            ],
            vec![Facet::Sector],
        );
        let grouped = set.group_scores(&[]).unwrap();
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].score, Some(dec!(0.2)));
    }

    #[test]
    fn test_group_scores_rejects_unknown_facet() {
        let set = AlignmentResultSet::new(vec![], vec![Facet::Sector]);
        assert!(set.group_scores(&[Facet::Region]).is_err());
    }
}
