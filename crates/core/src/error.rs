use thiserror::Error;

pub type AdsResult<T> = Result<T, AdsError>;

#[derive(Error, Debug)]
pub enum AdsError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission rule {rule} failed: {reason}")]
    RuleEvaluationFailed { rule: String, reason: String },

    #[error("Ad event log unavailable: {0}")]
    EventLogUnavailable(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AdsError {
    /// Wrap a collaborator failure raised while `rule` was evaluating.
    pub fn rule_failed(rule: impl Into<String>, source: &AdsError) -> Self {
        AdsError::RuleEvaluationFailed {
            rule: rule.into(),
            reason: source.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_failed_message_names_rule_and_cause() {
        let cause = AdsError::EventLogUnavailable("connection reset".into());
        let err = AdsError::rule_failed("per_day_frequency_cap", &cause);
        assert_eq!(
            err.to_string(),
            "Permission rule per_day_frequency_cap failed: Ad event log unavailable: connection reset"
        );
    }
}
