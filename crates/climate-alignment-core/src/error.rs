use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error(
        "Duplicate scenario row: ({sector}, {technology}, {year}, {region}) appears more than once \
         in the {scenario_set}/{pathway} pathway table"
    )]
    DuplicateScenarioRow {
        scenario_set: String,
        pathway: String,
        sector: String,
        technology: String,
        year: i32,
        region: String,
    },

    #[error("Unknown scenario: {scenario_set}/{pathway} is not present in the loaded scenario data")]
    UnknownScenario {
        scenario_set: String,
        pathway: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for AlignmentError {
    fn from(e: serde_json::Error) -> Self {
        AlignmentError::SerializationError(e.to_string())
    }
}
