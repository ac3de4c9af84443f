pub mod error;
pub mod types;

pub mod config;
pub mod context;

pub mod targets;

pub mod ownership;

pub mod eligibility;
pub mod splitting;

pub mod normalise;

pub mod aggregate;
pub mod timeseries;

pub mod results;

pub mod calculator;

pub use calculator::{AlignmentCalculator, AlignmentRequest, OverTimeRequest};
pub use config::{
    AlignmentSettings, ApproachKind, ClimateFileEntry, DataLocations, ProductionThreshold,
    ScenarioFileEntry, SectorApproach, SettingsChange,
};
pub use context::ClimateDataBundle;
pub use error::AlignmentError;
pub use results::{AlignmentResultSet, GroupedScore};
pub use types::*;

/// Standard result type for all alignment operations
pub type AlignmentResult<T> = Result<T, AlignmentError>;
