//! Error handling for percolate-log

/// Result alias for logger setup.
pub type LogResult<T> = Result<T, LogError>;

/// Logger setup failure.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The filter directive could not be parsed
    #[error("invalid filter '{filter}': {reason}")]
    Filter {
        /// Directive as given
        filter: String,
        /// Parser message
        reason: String,
    },

    /// The output format name is unknown
    #[error("unknown log format '{0}', expected pretty, compact or json")]
    Format(String),

    /// Installing the global subscriber failed
    #[error("failed to install subscriber: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_input() {
        let err = LogError::Filter {
            filter: "percolate=loud".to_string(),
            reason: "invalid level".to_string(),
        };
        assert!(err.to_string().contains("percolate=loud"));
        assert!(LogError::Format("xml".to_string()).to_string().contains("xml"));
    }
}
