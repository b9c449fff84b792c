use std::fmt;

/// Errors surfaced to the local caller before any message leaves the process.
///
/// CAS failure is not represented here: a compare-and-exchange that loses the
/// race is an expected, first-class `false` result. Requests rejected on the
/// sequencer side are dropped silently and never propagate back to the origin,
/// so local validation is the only reliable reporting path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DsmError {
    /// This process is not in the variable's subscriber set and may neither
    /// mutate nor observe it.
    NotSubscribed { process: u32, var: String },

    /// The variable was never declared in the group configuration.
    UnknownVariable { var: String },

    /// The destination's endpoint is gone. Only reachable when the harness
    /// tears a group down while callers are still active.
    Disconnected { dest: u32 },
}

impl fmt::Display for DsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DsmError::NotSubscribed { process, var } => {
                write!(f, "process {} is not subscribed to variable '{}'", process, var)
            }
            DsmError::UnknownVariable { var } => {
                write!(f, "variable '{}' is not declared in the group configuration", var)
            }
            DsmError::Disconnected { dest } => {
                write!(f, "process {} is no longer reachable", dest)
            }
        }
    }
}

impl std::error::Error for DsmError {}
