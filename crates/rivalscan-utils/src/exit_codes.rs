//! Exit code constants for the rivalscan CLI.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `AUTH_REQUIRED` | No authenticated session |
//! | 4 | `MISSING_KEYS` | No active provider API key |
//! | 5 | `BUDGET_EXCEEDED` | Backend denied projected spend |
//! | 6 | `GATE_DENIED` | Feature gate rejected the run |
//! | 7 | `ANALYSIS_FAILED` | The analysis run failed |

/// Exit codes matching the documented exit code table.
///
/// `ExitCode` provides type-safe exit code handling. Use the named constants
/// for common exit codes, or [`as_i32()`](Self::as_i32) to get the numeric
/// value for `std::process::exit()`.
///
/// The numeric values are part of the public API and will not change within
/// a minor release line.
///
/// # Example
///
/// ```rust
/// use rivalscan_utils::ExitCode;
///
/// let code = ExitCode::SUCCESS;
/// assert_eq!(code.as_i32(), 0);
///
/// assert_eq!(ExitCode::BUDGET_EXCEEDED, ExitCode::from_i32(5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - operation completed successfully
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid or missing command-line arguments or configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Authentication required - no active session for a write operation
    pub const AUTH_REQUIRED: ExitCode = ExitCode(3);

    /// Missing API keys - the user has no active provider key of any kind
    pub const MISSING_KEYS: ExitCode = ExitCode(4);

    /// Budget exceeded - the backend explicitly denied the projected spend
    pub const BUDGET_EXCEEDED: ExitCode = ExitCode(5);

    /// Gate denied - the feature gate explicitly rejected the run
    pub const GATE_DENIED: ExitCode = ExitCode(6);

    /// Analysis failed - the run itself failed after retries
    pub const ANALYSIS_FAILED: ExitCode = ExitCode(7);

    /// Get the numeric exit code value.
    ///
    /// Use this with `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    ///
    /// Prefer using the named constants when possible.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
