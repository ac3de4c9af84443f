use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::Value;

use climate_alignment_core::{
    AlignmentCalculator, AlignmentRequest, Facet, LoanIndicator, NormalisationMethod,
    OverTimeRequest,
};

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum IndicatorArg {
    OutstandingAmount,
    CreditLimit,
}

impl From<IndicatorArg> for LoanIndicator {
    fn from(arg: IndicatorArg) -> Self {
        match arg {
            IndicatorArg::OutstandingAmount => LoanIndicator::OutstandingAmount,
            IndicatorArg::CreditLimit => LoanIndicator::CreditLimit,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FacetArg {
    Sector,
    Technology,
    Region,
    CompanyId,
    Year,
}

impl From<FacetArg> for Facet {
    fn from(arg: FacetArg) -> Self {
        match arg {
            FacetArg::Sector => Facet::Sector,
            FacetArg::Technology => Facet::Technology,
            FacetArg::Region => Facet::Region,
            FacetArg::CompanyId => Facet::CompanyId,
            FacetArg::Year => Facet::Year,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum NormaliseArg {
    Global,
    Economic,
    Total,
    Portfolio,
    Company,
    None,
}

impl From<NormaliseArg> for NormalisationMethod {
    fn from(arg: NormaliseArg) -> Self {
        match arg {
            NormaliseArg::Global => NormalisationMethod::Global,
            NormaliseArg::Economic => NormalisationMethod::Economic,
            NormaliseArg::Total => NormalisationMethod::Total,
            NormaliseArg::Portfolio => NormalisationMethod::Portfolio,
            NormaliseArg::Company => NormalisationMethod::Company,
            NormaliseArg::None => NormalisationMethod::None,
        }
    }
}

/// Arguments for net alignment scoring
#[derive(Args)]
pub struct ScoreArgs {
    /// Path to the YAML settings file
    #[arg(long)]
    pub settings: String,

    /// Path to the loan book CSV; omit to score the climate universe with
    /// equal weights
    #[arg(long)]
    pub loans: Option<String>,

    /// Scenario set to score against
    #[arg(long, default_value = "weo")]
    pub scenario_set: String,

    /// Decarbonisation pathway within the scenario set
    #[arg(long, default_value = "nze_2050")]
    pub pathway: String,

    /// Loan amount column driving the weighting
    #[arg(long, default_value = "outstanding-amount")]
    pub loan_indicator: IndicatorArg,

    /// Facet columns to aggregate by (repeatable)
    #[arg(long = "facet")]
    pub facets: Vec<FacetArg>,

    /// Split results into build-out/phase-out directions
    #[arg(long)]
    pub bopo_split: bool,

    /// Keep individual loans instead of aggregating per company
    #[arg(long)]
    pub individual_loans: bool,

    /// Score at company level instead of consolidating onto parents
    #[arg(long)]
    pub company_level: bool,

    /// Ignore the scenario's regional pathway breakdown
    #[arg(long)]
    pub no_region_file: bool,

    /// Clip bound for scores
    #[arg(long, default_value = "3")]
    pub limit: Decimal,

    /// Normalisation method
    #[arg(long, default_value = "total")]
    pub normalise: NormaliseArg,
}

/// Arguments for the over-time shift decomposition
#[derive(Args)]
pub struct OverTimeArgs {
    /// Path to the YAML settings file
    #[arg(long)]
    pub settings: String,

    /// Path to the loan book CSV (required: the decomposition needs real
    /// portfolio snapshots)
    #[arg(long)]
    pub loans: String,

    /// Scenario set to score against
    #[arg(long, default_value = "weo")]
    pub scenario_set: String,

    /// Decarbonisation pathway within the scenario set
    #[arg(long, default_value = "nze_2050")]
    pub pathway: String,

    /// Loan amount column driving the weighting
    #[arg(long, default_value = "outstanding-amount")]
    pub loan_indicator: IndicatorArg,

    /// Score at company level instead of consolidating onto parents
    #[arg(long)]
    pub company_level: bool,

    /// Ignore the scenario's regional pathway breakdown
    #[arg(long)]
    pub no_region_file: bool,

    /// Clip bound for scores
    #[arg(long, default_value = "3")]
    pub limit: Decimal,

    /// Normalisation method
    #[arg(long, default_value = "total")]
    pub normalise: NormaliseArg,

    /// Skip the synthetic fleet-wide "total" portfolio
    #[arg(long)]
    pub no_total: bool,
}

pub fn run_score(args: ScoreArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let settings = input::read_settings(&args.settings)?;
    let bundle = input::load_bundle(&settings)?;
    let loans = args.loans.as_deref().map(input::load_loans).transpose()?;
    let use_loan_file = loans.is_some();

    let calculator = AlignmentCalculator::new(
        settings,
        bundle,
        loans,
        &args.scenario_set,
        &args.pathway,
    )?;

    let request = AlignmentRequest {
        loan_indicator: args.loan_indicator.into(),
        facets: args.facets.into_iter().map(Facet::from).collect(),
        bopo_split: args.bopo_split,
        individual_loans: args.individual_loans,
        use_loan_file,
        only_parents: !args.company_level,
        use_region_file: !args.no_region_file,
        limit: args.limit,
        normalise_method: args.normalise.into(),
    };

    let output = calculator.compute_alignment(&request)?;
    Ok(serde_json::to_value(output)?)
}

pub fn run_over_time(args: OverTimeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let settings = input::read_settings(&args.settings)?;
    let bundle = input::load_bundle(&settings)?;
    let loans = input::load_loans(&args.loans)?;

    let calculator = AlignmentCalculator::new(
        settings,
        bundle,
        Some(loans),
        &args.scenario_set,
        &args.pathway,
    )?;

    let request = OverTimeRequest {
        loan_indicator: args.loan_indicator.into(),
        only_parents: !args.company_level,
        use_region_file: !args.no_region_file,
        limit: args.limit,
        normalise_method: args.normalise.into(),
        add_total: !args.no_total,
    };

    let output = calculator.compute_alignment_over_time(&request)?;
    Ok(serde_json::to_value(output)?)
}
