use thiserror::Error;

/// Main error type for the optimization engine
#[derive(Error, Debug)]
pub enum BoError {
    #[error("Space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Surrogate error: {0}")]
    Surrogate(#[from] SurrogateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("All {attempted} seed evaluations failed; no data to fit a surrogate")]
    AllEvaluationsFailed { attempted: usize },

    #[error("Worker pool error: {0}")]
    ThreadPool(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Search-space construction and encoding errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("Search space has no parameters")]
    Empty,

    #[error("Duplicate parameter: {name}")]
    DuplicateParameter { name: String },

    #[error("Invalid bounds for {name}: low ({low}) must be less than high ({high})")]
    InvalidBounds { name: String, low: f64, high: f64 },

    #[error("Invalid log bounds for {name}: low ({low}) must be positive")]
    InvalidLogBounds { name: String, low: f64 },

    #[error("Parameter {name} has an empty value list")]
    EmptyValues { name: String },

    #[error("Parameter {name} has a non-finite discrete value")]
    NonFiniteValue { name: String },

    #[error("Configuration is missing parameter: {name}")]
    MissingParameter { name: String },

    #[error("Configuration has unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("Parameter {name} expects a {expected} value")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("Value {value} is not one of the values of {name}")]
    ValueNotInSpace { name: String, value: String },

    #[error("Vector length mismatch: expected {expected}, got {got}")]
    VectorLength { expected: usize, got: usize },
}

/// Surrogate fitting errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurrogateError {
    #[error(
        "Kernel matrix not positive definite after {attempts} attempts (noise variance {noise_variance:e})"
    )]
    NotPositiveDefinite { attempts: usize, noise_variance: f64 },

    #[error("Mismatched training data: {inputs} inputs, {targets} targets")]
    MismatchedData { inputs: usize, targets: usize },

    #[error("Training input {index} has width {got}, expected {expected}")]
    InconsistentWidth {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("Training target {index} is not finite")]
    NonFiniteTarget { index: usize },
}

/// Per-candidate evaluation failures. Recovered locally by the optimizer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Objective failed: {message}")]
    Failed { message: String },

    #[error("Objective returned a non-finite score: {score}")]
    NonFiniteScore { score: f64 },

    #[error("Objective panicked: {message}")]
    Panicked { message: String },
}

/// Result type alias for optimizer operations
pub type BoResult<T> = Result<T, BoError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::errors::BoError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SpaceError::InvalidBounds {
            name: "lr".to_string(),
            low: 1.0,
            high: 0.5,
        };

        assert!(error.to_string().contains("lr"));
        assert!(error.to_string().contains("0.5"));
    }

    #[test]
    fn test_error_conversion() {
        let surrogate_error = SurrogateError::NotPositiveDefinite {
            attempts: 8,
            noise_variance: 1e-3,
        };
        let bo_error: BoError = surrogate_error.into();

        match bo_error {
            BoError::Surrogate(_) => (),
            _ => panic!("Expected Surrogate error"),
        }
    }

    #[test]
    fn test_config_macro() {
        let err = config_error!("patience must be positive, got {}", 0);
        assert!(matches!(err, BoError::Config(ref m) if m.contains("patience")));
    }
}
