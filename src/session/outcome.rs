//! Terminal outcome of a flake run.

/// How a run ended. Exactly one is produced per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every attempt in the budget passed.
    Passed { attempts: u32 },
    /// The attempt with this one-based index failed and nobody asked to stop.
    Failed { attempt: u32, output: Vec<u8> },
    /// Cancellation was armed; `completed` attempts passed before it.
    Interrupted { completed: u32 },
}

impl RunOutcome {
    /// Number of attempts reported for this outcome.
    ///
    /// For `Failed` this includes the failing attempt; for `Interrupted` it
    /// counts only the attempts that passed before the interruption.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Passed { attempts } => *attempts,
            Self::Failed { attempt, .. } => *attempt,
            Self::Interrupted { completed } => *completed,
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    /// Captured output of the failing attempt, if any.
    #[must_use]
    pub fn captured_output(&self) -> Option<&[u8]> {
        match self {
            Self::Failed { output, .. } => Some(output),
            _ => None,
        }
    }

    /// One-line summary shared by both presentation modes.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Passed { attempts } => {
                format!("All {} test attempts passed successfully!", attempts)
            }
            Self::Failed { attempt, .. } => format!("Test failed on attempt {}", attempt),
            Self::Interrupted { completed } => format!("Interrupted after {} attempts", completed),
        }
    }

    /// Process exit status for interactive mode.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Failed { .. } => 1,
            Self::Passed { .. } | Self::Interrupted { .. } => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passed_outcome() {
        let outcome = RunOutcome::Passed { attempts: 5 };
        assert_eq!(outcome.attempts(), 5);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.summary(), "All 5 test attempts passed successfully!");
        assert!(outcome.captured_output().is_none());
    }

    #[test]
    fn test_failed_outcome() {
        let outcome = RunOutcome::Failed {
            attempt: 3,
            output: b"boom\n".to_vec(),
        };
        assert!(outcome.is_failure());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(outcome.summary(), "Test failed on attempt 3");
        assert_eq!(outcome.captured_output(), Some(&b"boom\n"[..]));
    }

    #[test]
    fn test_interrupted_outcome() {
        let outcome = RunOutcome::Interrupted { completed: 3 };
        assert!(outcome.is_interrupted());
        assert!(!outcome.is_failure());
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.summary(), "Interrupted after 3 attempts");
    }
}
