//! Outbound acknowledgment sent to the command's reply-to address

use serde::Serialize;

/// Reply telling the sender whether its command was accepted as well-formed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub error: bool,
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
}

impl Reply {
    /// Reply for a command that parsed successfully
    pub fn accepted(correlation_id: impl Into<String>) -> Self {
        Self {
            error: false,
            correlation_id: correlation_id.into(),
        }
    }

    /// Reply for a payload that could not be parsed
    pub fn malformed(correlation_id: impl Into<String>) -> Self {
        Self {
            error: true,
            correlation_id: correlation_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_constructors() {
        let ok = Reply::accepted("abc-1");
        assert!(!ok.error);
        assert_eq!(ok.correlation_id, "abc-1");

        let bad = Reply::malformed("");
        assert!(bad.error);
        assert!(bad.correlation_id.is_empty());
    }
}
