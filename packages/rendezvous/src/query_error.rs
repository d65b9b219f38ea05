use thiserror::Error;

/// Failures that a [`Query`][crate::Query] reports through the rejection channel of the
/// [`Promise`][crate::Promise] returned from [`Query::request()`][crate::Query::request].
///
/// Custom rejection reason types opt into these failures by implementing
/// `From<QueryError>`.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum QueryError {
    /// No responder was registered within the configured responder timeout.
    #[error("Request timeout")]
    Timeout,

    /// The responder panicked before settling the request.
    #[error("responder panicked: {message}")]
    ResponderPanicked {
        /// The message carried by the panic payload, if it had one.
        message: String,
    },
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_matches_reason() {
        assert_eq!(QueryError::Timeout.to_string(), "Request timeout");
    }

    #[test]
    fn responder_panicked_display_includes_message() {
        let error = QueryError::ResponderPanicked {
            message: "boom".to_string(),
        };

        assert!(error.to_string().contains("boom"));
    }
}
