use thiserror::Error;

/// Errors surfaced by data sources across the framework boundary.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The supplied configuration was rejected; the source stays unconfigured.
    #[error("{0}")]
    Configuration(String),

    /// An acquisition run aborted before its natural end.
    #[error("{0}")]
    Acquisition(String),

    /// The source cannot run in the current environment.
    #[error("source cannot run: {0}")]
    NotAvailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SourceError::Configuration("Loki query is mandatory".to_string());
        assert_eq!(error.to_string(), "Loki query is mandatory");

        let error = SourceError::NotAvailable("no network".to_string());
        assert_eq!(error.to_string(), "source cannot run: no network");
    }
}
