use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use crate::aggregate::{calculate_alignment_instance, DEFAULT_HORIZON};
use crate::config::AlignmentSettings;
use crate::context::{ClimateDataBundle, ComputationContext};
use crate::eligibility::apply_production_thresholds;
use crate::error::AlignmentError;
use crate::normalise::apply_normalisation;
use crate::ownership::{
    aggregate_loans, consolidate_to_parents, merge_loan_climate, synthetic_loans, working_loans,
    WorkingLoan,
};
use crate::results::AlignmentResultSet;
use crate::splitting::{split_loans_over_sectors, split_over_technologies};
use crate::targets::combine_asset_locations;
use crate::timeseries::{
    december_portfolio_dates, decompose, restore_portfolio_date, shift_cell, OverTimeRow,
};
use crate::types::{
    with_metadata, ComputationOutput, ExposureRow, Facet, LoanIndicator, LoanRecord,
    NormalisationMethod, ScenarioEntry, ShiftRow,
};
use crate::AlignmentResult;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Parameters of a single-horizon alignment computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentRequest {
    pub loan_indicator: LoanIndicator,
    /// Facet columns the scores are aggregated by, in order.
    pub facets: Vec<Facet>,
    /// Split results into build-out/phase-out/no-change directions.
    pub bopo_split: bool,
    /// Keep individual loans instead of aggregating per company.
    pub individual_loans: bool,
    /// Score the loaded loan book; without it an equal-weight synthetic
    /// book over the climate universe is used.
    pub use_loan_file: bool,
    /// Consolidate exposure onto resolved parent companies.
    pub only_parents: bool,
    /// Apply the scenario's regional pathway breakdown where configured.
    pub use_region_file: bool,
    /// Clip bound for scores.
    pub limit: Decimal,
    pub normalise_method: NormalisationMethod,
}

impl Default for AlignmentRequest {
    fn default() -> Self {
        AlignmentRequest {
            loan_indicator: LoanIndicator::default(),
            facets: Vec::new(),
            bopo_split: false,
            individual_loans: false,
            use_loan_file: true,
            only_parents: true,
            use_region_file: true,
            limit: dec!(3),
            normalise_method: NormalisationMethod::default(),
        }
    }
}

/// Parameters of the over-time shift decomposition. The decomposition is
/// defined at the portfolio level, so facet and BoPo splits do not apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverTimeRequest {
    pub loan_indicator: LoanIndicator,
    pub only_parents: bool,
    pub use_region_file: bool,
    pub limit: Decimal,
    pub normalise_method: NormalisationMethod,
    /// Add a synthetic "total" portfolio summed over all portfolios.
    pub add_total: bool,
}

impl Default for OverTimeRequest {
    fn default() -> Self {
        OverTimeRequest {
            loan_indicator: LoanIndicator::default(),
            only_parents: true,
            use_region_file: true,
            limit: dec!(3),
            normalise_method: NormalisationMethod::default(),
            add_total: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Computes portfolio climate-alignment scores from loaded climate, loan
/// and scenario tables.
///
/// All inputs are taken once at construction and never mutated; every
/// computation builds its own `ComputationContext` and returns fresh
/// values, so results never alias internal state.
#[derive(Debug)]
pub struct AlignmentCalculator {
    settings: AlignmentSettings,
    bundle: ClimateDataBundle,
    loans: Option<Vec<LoanRecord>>,
    scenario_set: String,
    pathway: String,
}

impl AlignmentCalculator {
    pub fn new(
        settings: AlignmentSettings,
        bundle: ClimateDataBundle,
        loans: Option<Vec<LoanRecord>>,
        scenario_set: &str,
        pathway: &str,
    ) -> AlignmentResult<Self> {
        settings.validate()?;
        bundle.validate()?;
        let calculator = AlignmentCalculator {
            settings,
            bundle,
            loans,
            scenario_set: scenario_set.to_string(),
            pathway: pathway.to_string(),
        };
        calculator.require_known_scenario(scenario_set, pathway)?;
        Ok(calculator)
    }

    /// Every (scenario_set, pathway, start year) combination loaded.
    pub fn available_scenarios(&self) -> Vec<ScenarioEntry> {
        self.bundle.available_scenarios()
    }

    /// Switch the scenario used by subsequent computations.
    pub fn set_scenario(&mut self, scenario_set: &str, pathway: &str) -> AlignmentResult<()> {
        self.require_known_scenario(scenario_set, pathway)?;
        self.scenario_set = scenario_set.to_string();
        self.pathway = pathway.to_string();
        Ok(())
    }

    /// Replace the held loan book.
    pub fn update_loanbook(&mut self, loans: Vec<LoanRecord>) {
        self.loans = Some(loans);
    }

    pub fn settings(&self) -> &AlignmentSettings {
        &self.settings
    }

    /// Apply a partial settings change for subsequent computations.
    pub fn update_settings(
        &mut self,
        change: crate::config::SettingsChange,
    ) -> AlignmentResult<()> {
        self.settings = self.settings.update(change)?;
        Ok(())
    }

    fn require_known_scenario(&self, scenario_set: &str, pathway: &str) -> AlignmentResult<()> {
        let known = self
            .bundle
            .scenario_data
            .keys()
            .any(|year| self.bundle.pathway(*year, scenario_set, pathway).is_some());
        if known {
            Ok(())
        } else {
            Err(AlignmentError::UnknownScenario {
                scenario_set: scenario_set.to_string(),
                pathway: pathway.to_string(),
            })
        }
    }

    // -----------------------------------------------------------------------
    // Public API — net alignment
    // -----------------------------------------------------------------------

    /// Single-horizon net alignment across all loaded vintages.
    ///
    /// Portfolio dates whose implied year has no climate vintage are
    /// skipped with a diagnostic warning in the envelope; they never fail
    /// the computation.
    pub fn compute_alignment(
        &self,
        request: &AlignmentRequest,
    ) -> AlignmentResult<ComputationOutput<AlignmentResultSet>> {
        let start = Instant::now();
        let mut warnings: Vec<String> = Vec::new();

        let pairs: Vec<(i32, i32)> = self
            .bundle
            .company_indicators
            .keys()
            .filter(|year| {
                self.bundle
                    .pathway(**year, &self.scenario_set, &self.pathway)
                    .is_some()
            })
            .map(|year| (*year, *year))
            .collect();

        let context = ComputationContext::prepare(
            &self.bundle,
            &self.settings,
            &self.scenario_set,
            &self.pathway,
            &pairs,
            request.use_region_file,
        )?;

        let mut master: BTreeMap<i32, Vec<ExposureRow>> = BTreeMap::new();
        for &(year, scenario_year) in &pairs {
            let rows = self.preprocess(
                &context,
                year,
                scenario_year,
                request.loan_indicator,
                request.use_loan_file,
                request.individual_loans,
                request.only_parents,
                request.normalise_method,
            )?;
            master.insert(year, rows);
        }

        let portfolio_dates: BTreeSet<_> = master
            .values()
            .flatten()
            .map(|row| row.portfolio_date)
            .collect();

        let mut scored = Vec::new();
        for date in portfolio_dates {
            let Some(rows) = master.get(&date.year()) else {
                warnings.push(format!(
                    "{date} was not matched to climate data in {}",
                    date.year()
                ));
                continue;
            };
            let at_date: Vec<ExposureRow> = rows
                .iter()
                .filter(|row| row.portfolio_date == date)
                .cloned()
                .collect();
            scored.extend(calculate_alignment_instance(
                &at_date,
                &request.facets,
                request.bopo_split,
                request.limit,
                &self.settings,
                DEFAULT_HORIZON,
            ));
        }

        let result = AlignmentResultSet::new(scored, request.facets.clone());
        let elapsed = start.elapsed().as_micros() as u64;
        let assumptions = serde_json::json!({
            "scenario_set": self.scenario_set,
            "pathway": self.pathway,
            "normalise_method": request.normalise_method,
            "loan_indicator": request.loan_indicator,
            "horizon_years": DEFAULT_HORIZON,
            "score_limit": request.limit,
            "only_parents": request.only_parents,
        });
        Ok(with_metadata(
            "Net alignment (TMS/SDA scenario targets, exposure-weighted deviation)",
            &assumptions,
            warnings,
            elapsed,
            result,
        ))
    }

    // -----------------------------------------------------------------------
    // Public API — alignment change over time
    // -----------------------------------------------------------------------

    /// Alignment change over time with the decarbonisation / portfolio /
    /// counterparty shift decomposition. Requires a loan book.
    pub fn compute_alignment_over_time(
        &self,
        request: &OverTimeRequest,
    ) -> AlignmentResult<ComputationOutput<Vec<ShiftRow>>> {
        let start = Instant::now();

        let loans = self
            .loans
            .as_ref()
            .ok_or_else(|| AlignmentError::InsufficientData("No loan data provided".into()))?;
        let portfolio_dates = december_portfolio_dates(loans);

        // The grid pairs each scenario vintage with the data vintage of the
        // same year and the next one.
        let mut pairs: Vec<(i32, i32)> = Vec::new();
        for scenario_year in self.bundle.scenario_data.keys() {
            if self
                .bundle
                .pathway(*scenario_year, &self.scenario_set, &self.pathway)
                .is_none()
            {
                continue;
            }
            for data_year in self.bundle.company_indicators.keys() {
                if self
                    .bundle
                    .pathway(*data_year, &self.scenario_set, &self.pathway)
                    .is_none()
                {
                    continue;
                }
                if (0..=1).contains(&(data_year - scenario_year)) {
                    pairs.push((*data_year, *scenario_year));
                }
            }
        }

        let context = ComputationContext::prepare(
            &self.bundle,
            &self.settings,
            &self.scenario_set,
            &self.pathway,
            &pairs,
            request.use_region_file,
        )?;

        let mut master: BTreeMap<(i32, i32), Vec<ExposureRow>> = BTreeMap::new();
        for &(data_year, scenario_year) in &pairs {
            let rows = self.preprocess(
                &context,
                data_year,
                scenario_year,
                request.loan_indicator,
                true,
                false,
                request.only_parents,
                request.normalise_method,
            )?;
            master.insert((data_year, scenario_year), rows);
        }

        let mut cells: Vec<OverTimeRow> = Vec::new();
        for &date in &portfolio_dates {
            let portfolio_year = date.year();
            for (&(data_year, scenario_year), rows) in &master {
                if !(0..=1).contains(&(portfolio_year - scenario_year)) {
                    continue;
                }
                if !(-1..=0).contains(&(portfolio_year - data_year)) {
                    continue;
                }
                let mut at_date: Vec<ExposureRow> = rows
                    .iter()
                    .filter(|row| row.portfolio_date == date)
                    .cloned()
                    .collect();
                if at_date.is_empty() {
                    continue;
                }
                shift_cell(&mut at_date, portfolio_year, data_year, scenario_year);
                for scored in calculate_alignment_instance(
                    &at_date,
                    &[],
                    false,
                    request.limit,
                    &self.settings,
                    DEFAULT_HORIZON,
                ) {
                    cells.push(OverTimeRow {
                        portfolio_id: scored.key.portfolio_id,
                        scenario_year,
                        data_year,
                        portfolio_date: restore_portfolio_date(scored.key.portfolio_date),
                        end_year: scored.key.end_year,
                        amount: scored.loan_indicator,
                        weighted_deviation: scored.weighted_deviation,
                        weighted_target: scored.weighted_target,
                        score: scored.score,
                    });
                }
            }
        }

        let shifts = decompose(cells, request.add_total, DEFAULT_HORIZON);
        let elapsed = start.elapsed().as_micros() as u64;
        let assumptions = serde_json::json!({
            "scenario_set": self.scenario_set,
            "pathway": self.pathway,
            "normalise_method": request.normalise_method,
            "loan_indicator": request.loan_indicator,
            "horizon_years": DEFAULT_HORIZON,
            "score_limit": request.limit,
            "grid": "scenario_year x data_year x portfolio_date, +/- 1 year window",
        });
        Ok(with_metadata(
            "Alignment change over time (decarbonisation/portfolio/counterparty shifts)",
            &assumptions,
            elapsed_warnings(&shifts),
            elapsed,
            shifts,
        ))
    }

    // -----------------------------------------------------------------------
    // Internal pipeline
    // -----------------------------------------------------------------------

    /// Run the full preprocessing pipeline for one (data year, scenario
    /// year) pair: target combine, loan consolidation, eligibility filter,
    /// sector/technology splits and normalisation.
    #[allow(clippy::too_many_arguments)]
    fn preprocess(
        &self,
        context: &ComputationContext<'_>,
        year: i32,
        scenario_year: i32,
        loan_indicator: LoanIndicator,
        use_loan_file: bool,
        individual_loans: bool,
        only_parents: bool,
        normalise_method: NormalisationMethod,
    ) -> AlignmentResult<Vec<ExposureRow>> {
        let climate = context.climate(year, scenario_year);
        let production = combine_asset_locations(climate, &self.settings);

        let loans: Vec<WorkingLoan> = if use_loan_file {
            let loans = self.loans.as_ref().ok_or_else(|| {
                AlignmentError::InsufficientData("No loan data has been supplied".into())
            })?;
            let mut working = working_loans(loans, loan_indicator);
            if only_parents {
                working = consolidate_to_parents(working, context.parents(year, true));
            }
            if !individual_loans {
                working = aggregate_loans(working);
            }
            working
        } else {
            let mut working = synthetic_loans(&production, year);
            if only_parents {
                working = consolidate_to_parents(working, context.parents(year, true));
                // consolidation sums subsidiary placeholders; equal weight
                // means every resolved company counts once
                for loan in &mut working {
                    loan.amount = Decimal::ONE;
                }
            }
            working
        };

        let rows = merge_loan_climate(&loans, &production);
        let rows = apply_production_thresholds(rows, &self.settings);
        let rows = split_loans_over_sectors(rows, context.indicators(year));
        let rows = split_over_technologies(rows);
        Ok(apply_normalisation(
            normalise_method,
            rows,
            year,
            context.indicators(year),
            context.parents(year, false),
            &self.settings.economic_weights,
        ))
    }
}

fn elapsed_warnings(shifts: &[ShiftRow]) -> Vec<String> {
    if shifts.is_empty() {
        vec![
            "No portfolio qualified for the shift decomposition (cadence, exposure or \
             completeness requirements not met)."
                .to_string(),
        ]
    } else {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApproachKind, SectorApproach};
    use crate::types::{
        CompanyIndicator, FacetValue, OwnershipRecord, PortfolioDate, ScenarioTarget,
    };
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn settings() -> AlignmentSettings {
        let mut sectoral_approach = BTreeMap::new();
        sectoral_approach.insert(
            "power".to_string(),
            SectorApproach {
                approach: ApproachKind::Tms,
                sector: vec![],
                technology: vec!["coal".into(), "renewables".into()],
                build_out: vec!["renewables".into()],
                phase_out: vec!["coal".into()],
                other: vec![],
                regional: false,
                active: true,
            },
        );
        sectoral_approach.insert(
            "steel".to_string(),
            SectorApproach {
                approach: ApproachKind::Sda,
                sector: vec![],
                technology: vec![],
                build_out: vec![],
                phase_out: vec![],
                other: vec!["steel".into()],
                regional: false,
                active: true,
            },
        );
        AlignmentSettings {
            sectoral_approach,
            economic_weights: BTreeMap::new(),
            production_thresholds: BTreeMap::new(),
            data_locations: Default::default(),
        }
    }

    fn indicator(
        company: &str,
        sector: &str,
        technology: &str,
        year: i32,
        production: Decimal,
        emission_factor: Decimal,
    ) -> CompanyIndicator {
        CompanyIndicator {
            company_id: company.to_string(),
            company_name: format!("{company} Corp"),
            sector: sector.to_string(),
            technology: technology.to_string(),
            plant_location: "US".to_string(),
            year,
            production,
            emission_factor,
        }
    }

    fn self_owned(company: &str) -> OwnershipRecord {
        OwnershipRecord {
            company_id: company.to_string(),
            parent_company_id: company.to_string(),
            is_parent: true,
            is_ultimate_listed_parent: true,
            is_ultimate_parent: true,
            ownership_level: 1,
        }
    }

    fn tms_row(technology: &str, year: i32, tmsr: Decimal) -> ScenarioTarget {
        ScenarioTarget {
            sector: "power".to_string(),
            technology: technology.to_string(),
            year,
            region: "global".to_string(),
            smsp: None,
            tmsr: Some(tmsr),
            emission_factor: None,
        }
    }

    fn sda_row(year: i32, emission_factor: Decimal) -> ScenarioTarget {
        ScenarioTarget {
            sector: "steel".to_string(),
            technology: "none".to_string(),
            year,
            region: "global".to_string(),
            smsp: None,
            tmsr: None,
            emission_factor: Some(emission_factor),
        }
    }

    fn loan(id: &str, company: &str, date: i32, amount: Decimal) -> LoanRecord {
        LoanRecord {
            loan_id: id.to_string(),
            company_id: company.to_string(),
            portfolio_id: "pf".to_string(),
            portfolio_date: PortfolioDate(date),
            outstanding_amount: amount,
            credit_limit: None,
            sector: None,
            total_assets: None,
            turnover: None,
        }
    }

    /// Two companies, one TMS and one SDA, scored for the 2028 horizon.
    fn snapshot_bundle() -> ClimateDataBundle {
        let mut bundle = ClimateDataBundle::default();
        bundle.company_indicators.insert(
            2023,
            vec![
                indicator("A", "power", "coal", 2023, dec!(100), Decimal::ZERO),
                indicator("A", "power", "coal", 2028, dec!(120), Decimal::ZERO),
                indicator("B", "steel", "steel", 2023, dec!(50), dec!(0.02)),
                indicator("B", "steel", "steel", 2028, dec!(60), dec!(0.02)),
            ],
        );
        bundle
            .company_ownership
            .insert(2023, vec![self_owned("A"), self_owned("B")]);
        let pathway = vec![
            tms_row("coal", 2023, dec!(1.0)),
            tms_row("coal", 2028, dec!(0.5)),
            sda_row(2023, dec!(1.5)),
            sda_row(2028, dec!(1.2)),
        ];
        bundle
            .scenario_data
            .entry(2023)
            .or_default()
            .entry("weo".to_string())
            .or_default()
            .insert("nze_2050".to_string(), pathway);
        bundle
    }

    fn snapshot_calculator() -> AlignmentCalculator {
        AlignmentCalculator::new(
            settings(),
            snapshot_bundle(),
            Some(vec![
                loan("L-A", "A", 202312, dec!(1000)),
                loan("L-B", "B", 202312, dec!(1000)),
            ]),
            "weo",
            "nze_2050",
        )
        .unwrap()
    }

    #[test]
    fn test_end_to_end_two_company_snapshot() {
        let calculator = snapshot_calculator();
        let request = AlignmentRequest {
            facets: vec![Facet::Sector],
            normalise_method: NormalisationMethod::None,
            ..AlignmentRequest::default()
        };
        let output = calculator.compute_alignment(&request).unwrap();
        assert!(output.warnings.is_empty());

        let rows = output.result.rows();
        assert_eq!(rows.len(), 2);

        // Company A: target at 2028 is 100 * 0.5 = 50, production 120.
        // Coal is phase-out, so the deviation of +70 flips to -70.
        let power = rows
            .iter()
            .find(|r| r.key.facet_values == vec![FacetValue::Text("power".into())])
            .unwrap();
        assert_eq!(power.weighted_deviation, dec!(-70) * dec!(1000));
        assert_eq!(power.weighted_target, dec!(50) * dec!(1000));
        assert_eq!(power.score, Some(dec!(-1.4)));
        assert_eq!(power.key.end_year, 2028);

        // Company B: intensity target 1.2 scales with production 60 to 72;
        // production rescales to 0.02 * 60 = 1.2. Steel is "other", so the
        // deviation of 1.2 - 72 flips to +70.8.
        let steel = rows
            .iter()
            .find(|r| r.key.facet_values == vec![FacetValue::Text("steel".into())])
            .unwrap();
        assert_eq!(steel.weighted_deviation, dec!(70.8) * dec!(1000));
        assert_eq!(steel.weighted_target, dec!(72) * dec!(1000));
        assert_eq!(steel.score, Some(dec!(70.8) / dec!(72)));

        for row in rows {
            if let Some(score) = row.score {
                assert!(score >= dec!(-3) && score <= dec!(3));
            }
        }
    }

    #[test]
    fn test_unmatched_portfolio_date_warns_and_continues() {
        let mut calculator = snapshot_calculator();
        calculator.update_loanbook(vec![
            loan("L-A", "A", 202312, dec!(1000)),
            loan("L-X", "A", 202512, dec!(500)),
        ]);
        let request = AlignmentRequest {
            normalise_method: NormalisationMethod::None,
            ..AlignmentRequest::default()
        };
        let output = calculator.compute_alignment(&request).unwrap();
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].contains("202512"));
        assert!(!output.result.rows().is_empty());
    }

    #[test]
    fn test_missing_loanbook_is_fatal() {
        let calculator = AlignmentCalculator::new(
            settings(),
            snapshot_bundle(),
            None,
            "weo",
            "nze_2050",
        )
        .unwrap();
        let err = calculator
            .compute_alignment(&AlignmentRequest::default())
            .unwrap_err();
        match err {
            AlignmentError::InsufficientData(_) => {}
            other => panic!("Expected InsufficientData, got: {other:?}"),
        }
    }

    #[test]
    fn test_synthetic_loanbook_scores_without_loan_data() {
        let calculator = AlignmentCalculator::new(
            settings(),
            snapshot_bundle(),
            None,
            "weo",
            "nze_2050",
        )
        .unwrap();
        let request = AlignmentRequest {
            use_loan_file: false,
            facets: vec![Facet::CompanyId],
            normalise_method: NormalisationMethod::None,
            ..AlignmentRequest::default()
        };
        let output = calculator.compute_alignment(&request).unwrap();
        let rows = output.result.rows();
        assert_eq!(rows.len(), 2);
        // equal weighting: each company's indicator sums to 1
        assert!(rows.iter().all(|r| r.loan_indicator == Decimal::ONE));
        assert!(rows.iter().all(|r| r.key.portfolio_id == "all"));
    }

    #[test]
    fn test_unknown_scenario_rejected() {
        let err = AlignmentCalculator::new(
            settings(),
            snapshot_bundle(),
            None,
            "weo",
            "unknown_pathway",
        )
        .unwrap_err();
        match err {
            AlignmentError::UnknownScenario { pathway, .. } => {
                assert_eq!(pathway, "unknown_pathway");
            }
            other => panic!("Expected UnknownScenario, got: {other:?}"),
        }
    }

    #[test]
    fn test_available_scenarios_listing() {
        let calculator = snapshot_calculator();
        let scenarios = calculator.available_scenarios();
        assert_eq!(
            scenarios,
            vec![ScenarioEntry {
                scenario_set: "weo".into(),
                pathway: "nze_2050".into(),
                year: 2023,
            }]
        );
    }

    #[test]
    fn test_set_scenario_switches_and_validates() {
        let mut calculator = snapshot_calculator();
        assert!(calculator.set_scenario("weo", "missing").is_err());
        assert!(calculator.set_scenario("weo", "nze_2050").is_ok());
    }

    // -----------------------------------------------------------------------
    // Over-time
    // -----------------------------------------------------------------------

    /// Two scenario vintages and two data vintages for one coal company,
    /// with loan snapshots at both year ends.
    fn over_time_calculator() -> AlignmentCalculator {
        let mut bundle = ClimateDataBundle::default();
        bundle.company_indicators.insert(
            2022,
            vec![
                indicator("A", "power", "coal", 2022, dec!(100), Decimal::ZERO),
                indicator("A", "power", "coal", 2027, dec!(110), Decimal::ZERO),
                indicator("A", "power", "coal", 2028, dec!(115), Decimal::ZERO),
            ],
        );
        bundle.company_indicators.insert(
            2023,
            vec![
                indicator("A", "power", "coal", 2022, dec!(100), Decimal::ZERO),
                indicator("A", "power", "coal", 2023, dec!(105), Decimal::ZERO),
                indicator("A", "power", "coal", 2028, dec!(130), Decimal::ZERO),
            ],
        );
        bundle
            .company_ownership
            .insert(2022, vec![self_owned("A")]);
        bundle
            .company_ownership
            .insert(2023, vec![self_owned("A")]);

        let pathway_2022 = vec![
            tms_row("coal", 2022, dec!(1.0)),
            tms_row("coal", 2027, dec!(0.6)),
            tms_row("coal", 2028, dec!(0.5)),
        ];
        let pathway_2023 = vec![
            tms_row("coal", 2022, dec!(1.0)),
            tms_row("coal", 2023, dec!(1.0)),
            tms_row("coal", 2028, dec!(0.5)),
        ];
        for (year, pathway) in [(2022, pathway_2022), (2023, pathway_2023)] {
            bundle
                .scenario_data
                .entry(year)
                .or_default()
                .entry("weo".to_string())
                .or_default()
                .insert("nze_2050".to_string(), pathway);
        }

        AlignmentCalculator::new(
            settings(),
            bundle,
            Some(vec![
                loan("L-A", "A", 202212, dec!(1000)),
                loan("L-A", "A", 202312, dec!(1100)),
            ]),
            "weo",
            "nze_2050",
        )
        .unwrap()
    }

    #[test]
    fn test_over_time_shift_decomposition() {
        let calculator = over_time_calculator();
        let request = OverTimeRequest {
            normalise_method: NormalisationMethod::None,
            add_total: false,
            ..OverTimeRequest::default()
        };
        let output = calculator.compute_alignment_over_time(&request).unwrap();
        let shifts = output.result;

        // one anchor per scenario vintage
        assert_eq!(shifts.len(), 2);
        assert_eq!(shifts[0].portfolio_date, PortfolioDate(202212));
        assert_eq!(shifts[1].portfolio_date, PortfolioDate(202312));

        // the first anchor has no predecessor cells
        assert_eq!(shifts[0].decarbonisation_shift, None);
        assert_eq!(shifts[0].total_shift, None);

        // successive differences telescope: the total shift equals the
        // score change between the two anchors
        let first_score = shifts[0].score.unwrap();
        let second_score = shifts[1].score.unwrap();
        assert_eq!(shifts[1].total_shift, Some(second_score - first_score));
        assert!(shifts[1].decarbonisation_shift.is_some());
        assert!(shifts[1].portfolio_shift.is_some());
        assert!(shifts[1].counterparty_shift.is_some());
    }

    #[test]
    fn test_over_time_adds_total_portfolio() {
        let calculator = over_time_calculator();
        let request = OverTimeRequest {
            normalise_method: NormalisationMethod::None,
            add_total: true,
            ..OverTimeRequest::default()
        };
        let output = calculator.compute_alignment_over_time(&request).unwrap();
        assert!(output
            .result
            .iter()
            .any(|shift| shift.portfolio_id == "total"));
    }

    #[test]
    fn test_over_time_requires_loanbook() {
        let calculator = AlignmentCalculator::new(
            settings(),
            snapshot_bundle(),
            None,
            "weo",
            "nze_2050",
        )
        .unwrap();
        assert!(calculator
            .compute_alignment_over_time(&OverTimeRequest::default())
            .is_err());
    }
}
