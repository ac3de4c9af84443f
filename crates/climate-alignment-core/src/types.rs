use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// All monetary values (loan amounts, balance-sheet figures). Wraps Decimal
/// to prevent accidental f64 usage.
pub type Money = Decimal;

/// Physical production volumes and emission quantities.
pub type Quantity = Decimal;

// ---------------------------------------------------------------------------
// Periods
// ---------------------------------------------------------------------------

/// A loan-book reference period encoded as YYYYMM (e.g. 202312).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PortfolioDate(pub i32);

impl PortfolioDate {
    pub fn from_year_month(year: i32, month: u32) -> Self {
        PortfolioDate(year * 100 + month as i32)
    }

    /// Calendar year implied by the period.
    pub fn year(self) -> i32 {
        self.0 / 100
    }

    pub fn month(self) -> i32 {
        self.0 % 100
    }
}

impl From<NaiveDate> for PortfolioDate {
    fn from(date: NaiveDate) -> Self {
        PortfolioDate::from_year_month(date.year(), date.month())
    }
}

impl std::fmt::Display for PortfolioDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

/// One production observation from a climate data vintage: a company's
/// physical output in a (sector, technology, plant location) for one year.
/// A positive `emission_factor` marks an intensity-based row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyIndicator {
    pub company_id: String,
    #[serde(alias = "name_company")]
    pub company_name: String,
    pub sector: String,
    pub technology: String,
    /// ISO country code of the producing asset.
    pub plant_location: String,
    pub year: i32,
    pub production: Quantity,
    pub emission_factor: Decimal,
}

/// One edge of the company ownership hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub company_id: String,
    pub parent_company_id: String,
    pub is_parent: bool,
    pub is_ultimate_listed_parent: bool,
    pub is_ultimate_parent: bool,
    /// Distance from the ultimate parent; smaller is closer.
    pub ownership_level: i32,
}

/// One scenario pathway row. TMS rows carry `smsp`/`tmsr`; SDA rows carry
/// `emission_factor` and use `"none"` as their technology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioTarget {
    pub sector: String,
    pub technology: String,
    pub year: i32,
    pub region: String,
    /// Sector market share parameter (sector-level TMS technologies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smsp: Option<Decimal>,
    /// Technology market share ratio (technology-level TMS rows).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmsr: Option<Decimal>,
    /// Scenario emission intensity (SDA rows).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emission_factor: Option<Decimal>,
}

/// Region-to-country mapping entry for one scenario set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionEntry {
    pub region: String,
    /// ISO country code belonging to the region.
    #[serde(alias = "isos")]
    pub iso: String,
}

/// One raw loan-book record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanRecord {
    pub loan_id: String,
    pub company_id: String,
    pub portfolio_id: String,
    pub portfolio_date: PortfolioDate,
    pub outstanding_amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_limit: Option<Money>,
    /// Sector reported on the loan itself, when the book carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_assets: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turnover: Option<Money>,
}

/// Which loan-book amount column drives the exposure weighting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanIndicator {
    #[default]
    OutstandingAmount,
    CreditLimit,
}

impl LoanIndicator {
    pub fn amount(self, loan: &LoanRecord) -> Money {
        match self {
            LoanIndicator::OutstandingAmount => loan.outstanding_amount,
            LoanIndicator::CreditLimit => loan.credit_limit.unwrap_or(Decimal::ZERO),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline stage records
// ---------------------------------------------------------------------------

/// One row of the per-vintage climate/target table produced by the target
/// calculator. Intensity rows (emission_factor > 0) have production and
/// target already rescaled to absolute emission terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimateRow {
    pub company_id: String,
    pub company_name: String,
    pub sector: String,
    pub technology: String,
    pub year: i32,
    pub region: String,
    pub production: Quantity,
    pub emission_factor: Decimal,
    pub target: Quantity,
}

/// Climate row after asset-location consolidation (plant locations folded
/// into one row per company-sector-technology-year-region).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionRow {
    pub company_id: String,
    pub company_name: String,
    pub sector: String,
    pub technology: String,
    pub year: i32,
    pub region: String,
    pub production: Quantity,
    pub target: Quantity,
}

/// One row of the combined loan-climate table: a loan's exposure attributed
/// to one company-sector-technology-region-year cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureRow {
    pub loan_id: String,
    pub company_id: String,
    pub company_name: String,
    pub portfolio_id: String,
    pub portfolio_date: PortfolioDate,
    pub sector: String,
    pub technology: String,
    pub year: i32,
    pub region: String,
    pub production: Quantity,
    pub target: Quantity,
    /// The selected loan-indicator amount, after any splitting.
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_assets: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turnover: Option<Money>,
    /// Normalisation divisor applied to production and target.
    pub norm: Decimal,
}

// ---------------------------------------------------------------------------
// Facets and score keys
// ---------------------------------------------------------------------------

/// Columns that alignment results may be aggregated by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    Sector,
    Technology,
    Region,
    CompanyId,
    Year,
}

/// A concrete facet value carried on an aggregated result row, in the order
/// the facets were requested.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FacetValue {
    Text(String),
    Year(i32),
}

impl Facet {
    pub fn value(self, row: &ExposureRow) -> FacetValue {
        match self {
            Facet::Sector => FacetValue::Text(row.sector.clone()),
            Facet::Technology => FacetValue::Text(row.technology.clone()),
            Facet::Region => FacetValue::Text(row.region.clone()),
            Facet::CompanyId => FacetValue::Text(row.company_id.clone()),
            Facet::Year => FacetValue::Year(row.year),
        }
    }
}

impl std::fmt::Display for FacetValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FacetValue::Text(s) => write!(f, "{}", s),
            FacetValue::Year(y) => write!(f, "{}", y),
        }
    }
}

/// Build-out/phase-out direction of a technology under the sectoral approach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    BuildOut,
    PhaseOut,
    NoChange,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::BuildOut => "build_out",
            Direction::PhaseOut => "phase_out",
            Direction::NoChange => "no_change",
        }
    }
}

/// Normalisation strategy for the production/target columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalisationMethod {
    /// Sector totals over the full climate universe.
    Global,
    /// Global totals scaled by configured economic weights.
    Economic,
    /// Sector totals over the observed exposure universe (all portfolios).
    #[default]
    Total,
    /// Sector totals per portfolio.
    Portfolio,
    /// Each company's own sector total.
    Company,
    /// No normalisation; divisor 1.
    None,
}

/// Grouping key of one aggregated alignment result row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlignmentKey {
    pub portfolio_id: String,
    pub portfolio_date: PortfolioDate,
    pub end_year: i32,
    /// Present only when the BoPo split was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Facet values in request order.
    pub facet_values: Vec<FacetValue>,
}

/// One aggregated alignment result row. `score` is `None` when the
/// exposure-weighted target sums to zero; clipping does not rescue that
/// case and callers must treat it as a data-quality signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentScoreRow {
    #[serde(flatten)]
    pub key: AlignmentKey,
    pub loan_indicator: Money,
    pub weighted_deviation: Decimal,
    pub weighted_target: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Decimal>,
}

/// One row of the over-time shift decomposition. Shift components are
/// `None` when the grid lacks the neighbouring cell needed for that
/// difference; `total_shift` is present only when all three are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftRow {
    pub portfolio_id: String,
    pub portfolio_date: PortfolioDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decarbonisation_shift: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_shift: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_shift: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_shift: Option<Decimal>,
}

/// One loaded scenario pathway, as listed by `available_scenarios`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioEntry {
    pub scenario_set: String,
    pub pathway: String,
    pub year: i32,
}

// ---------------------------------------------------------------------------
// Computation envelope
// ---------------------------------------------------------------------------

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
