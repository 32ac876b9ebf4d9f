use thiserror::Error;

#[derive(Error, Debug)]
pub enum BcdiError {
    #[error("Dimension mismatch in {context}: expected {expected:?}, got {found:?}")]
    DimensionMismatch {
        context: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Engine failure: {0}")]
    EngineFailure(String),

    #[error("Operator {operator} failed: {source}")]
    Operator {
        operator: &'static str,
        #[source]
        source: Box<BcdiError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("NPZ error: {0}")]
    Npz(String),
}

impl BcdiError {
    /// Shape disagreement between two buffers.
    pub fn shape(context: impl Into<String>, expected: &[usize], found: &[usize]) -> Self {
        BcdiError::DimensionMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }

    /// Tag an error with the operator it was raised from. Already-tagged
    /// errors keep their innermost operator name.
    pub fn in_operator(self, operator: &'static str) -> Self {
        match self {
            tagged @ BcdiError::Operator { .. } => tagged,
            other => BcdiError::Operator {
                operator,
                source: Box::new(other),
            },
        }
    }
}

pub type BcdiResult<T> = Result<T, BcdiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_tag_names_operator() {
        let err = BcdiError::InvalidArgument("support is empty".to_string()).in_operator("Center");
        let msg = err.to_string();
        assert!(msg.contains("Center"), "{msg}");
        assert!(msg.contains("support is empty"), "{msg}");
    }

    #[test]
    fn test_operator_tag_is_not_nested() {
        let err = BcdiError::EngineFailure("plan".to_string())
            .in_operator("HIOOpt")
            .in_operator("OperatorList");
        match err {
            BcdiError::Operator { operator, .. } => assert_eq!(operator, "HIOOpt"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shape_error_message() {
        let err = BcdiError::shape("support", &[4, 4, 4], &[4, 4, 3]);
        assert_eq!(
            err.to_string(),
            "Dimension mismatch in support: expected [4, 4, 4], got [4, 4, 3]"
        );
    }
}
