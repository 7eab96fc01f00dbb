//! Exit codes for the `geohis` CLI.
//!
//! Exit codes communicate the analysis outcome without requiring output
//! parsing. They are a stable contract for automation.

use geohis_common::ErrorKind;

/// Exit codes for geohis operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Success
    // ========================================================================
    /// Analysis completed (warnings may still be present in the result)
    Ok = 0,

    // ========================================================================
    // Failures
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 1,

    /// Malformed input, arguments or configuration
    MalformedInput = 2,

    /// Pairwise judgments failed the consistency check (CR > 0.10)
    InconsistentWeights = 3,

    /// Too few positives or negatives to validate
    InsufficientSamples = 4,

    /// Cancelled or timed out; a partial result may have been written
    Cancelled = 5,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Ok
    }

    pub fn is_error(self) -> bool {
        !self.is_success()
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Ok => "OK",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::MalformedInput => "ERR_MALFORMED_INPUT",
            ExitCode::InconsistentWeights => "ERR_INCONSISTENT_WEIGHTS",
            ExitCode::InsufficientSamples => "ERR_INSUFFICIENT_SAMPLES",
            ExitCode::Cancelled => "ERR_CANCELLED",
        }
    }

    /// Exit code for a terminal error of the given kind.
    ///
    /// `SamplingError` means no usable factor reached a point, which is an
    /// input problem. Recoverable kinds only become terminal when a hazard
    /// loses its last factor, which is likewise reported as bad input.
    pub fn from_error_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::MalformedInput
            | ErrorKind::SamplingError
            | ErrorKind::UnknownClass
            | ErrorKind::NoEvidence => ExitCode::MalformedInput,
            ErrorKind::InconsistentJudgments => ExitCode::InconsistentWeights,
            ErrorKind::InsufficientSamples => ExitCode::InsufficientSamples,
            ErrorKind::Cancelled => ExitCode::Cancelled,
            ErrorKind::InternalError => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Ok.as_i32(), 0);
        assert_eq!(ExitCode::InternalError.as_i32(), 1);
        assert_eq!(ExitCode::MalformedInput.as_i32(), 2);
        assert_eq!(ExitCode::InconsistentWeights.as_i32(), 3);
        assert_eq!(ExitCode::InsufficientSamples.as_i32(), 4);
        assert_eq!(ExitCode::Cancelled.as_i32(), 5);
    }

    #[test]
    fn test_from_error_kind() {
        assert_eq!(
            ExitCode::from_error_kind(ErrorKind::InconsistentJudgments),
            ExitCode::InconsistentWeights
        );
        assert_eq!(
            ExitCode::from_error_kind(ErrorKind::SamplingError),
            ExitCode::MalformedInput
        );
        assert_eq!(
            ExitCode::from_error_kind(ErrorKind::Cancelled),
            ExitCode::Cancelled
        );
        assert_eq!(
            ExitCode::from_error_kind(ErrorKind::InternalError),
            ExitCode::InternalError
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::Cancelled.to_string(), "ERR_CANCELLED (5)");
        assert!(ExitCode::Ok.is_success());
        assert!(ExitCode::InsufficientSamples.is_error());
        assert_eq!(i32::from(ExitCode::MalformedInput), 2);
    }
}
