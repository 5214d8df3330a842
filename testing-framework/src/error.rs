//! Error types for interchain orchestration.

use crate::link::LinkState;
use std::fmt;
use thiserror::Error;

/// A step of the link handshake, used to locate failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeStep {
    /// Register the chain pair and path name with the relayer
    GeneratePath,
    /// Create a light client of each chain on the other
    CreateClients,
    /// Connection-open handshake
    CreateConnection,
    /// Channel-open handshake
    CreateChannel,
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GeneratePath => "generate-path",
            Self::CreateClients => "create-clients",
            Self::CreateConnection => "create-connection",
            Self::CreateChannel => "create-channel",
        };
        f.write_str(name)
    }
}

/// Budget that was exhausted by a [`InterchainError::DeadlineExceeded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// Block-count budget
    Blocks(u64),
    /// Wall-clock budget, in milliseconds
    WallClockMs(u64),
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocks(n) => write!(f, "{} blocks", n),
            Self::WallClockMs(ms) => write!(f, "{}ms", ms),
        }
    }
}

/// Rejected topology declarations. Raised before any process starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    /// Chain name already declared.
    #[error("chain '{0}' is already declared")]
    DuplicateChain(String),

    /// Relayer name already declared.
    #[error("relayer '{0}' is already declared")]
    DuplicateRelayer(String),

    /// Path name already declared.
    #[error("path '{0}' is already declared")]
    DuplicatePath(String),

    /// A link references a chain or relayer that was never added.
    #[error("link '{path}' references unknown participant '{participant}'")]
    UnknownParticipant {
        /// Path name of the rejected link
        path: String,
        /// Name that could not be resolved
        participant: String,
    },

    /// Both ends of a link are the same chain.
    #[error("link '{0}' must join two distinct chains")]
    SelfLink(String),

    /// Declarations are closed once build has started.
    #[error("topology is frozen once build has started")]
    Frozen,
}

/// One problem collected during teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownIssue {
    /// Component that failed to tear down (e.g. `relayer:rly`, `chain:gaia`)
    pub component: String,
    /// Rendered error
    pub message: String,
}

impl fmt::Display for TeardownIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.component, self.message)
    }
}

fn join_issues(issues: &[TeardownIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_errors(errors: &[InterchainError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error type for interchain orchestration.
#[derive(Error, Debug)]
pub enum InterchainError {
    /// Topology declaration rejected.
    #[error("declaration error: {0}")]
    Declaration(#[from] DeclarationError),

    /// A network, chain or relayer failed to reach its ready state.
    #[error("failed to initialize {component}: {source:#}")]
    InitializationFailure {
        /// Component label (`network`, `chain:<name>`, `relayer:<name>`)
        component: String,
        /// Underlying failure
        #[source]
        source: anyhow::Error,
    },

    /// The relayer rejected a handshake step. Fatal to that link only.
    #[error("relayer '{relayer}' rejected {step} on path '{path}': {source:#}")]
    HandshakeRejection {
        /// Path name of the link
        path: String,
        /// Relayer assigned to the link
        relayer: String,
        /// Step that was rejected
        step: HandshakeStep,
        /// Relayer-reported failure
        #[source]
        source: anyhow::Error,
    },

    /// A poll or handshake confirmation exhausted its budget.
    #[error("deadline exceeded while {operation} (budget: {budget})")]
    DeadlineExceeded {
        /// What was being waited for
        operation: String,
        /// Exhausted budget
        budget: Budget,
    },

    /// Teardown completed with collected failures.
    #[error("teardown finished with {} error(s): {}", .0.len(), join_issues(.0))]
    TeardownFailure(Vec<TeardownIssue>),

    /// One or more links failed during build.
    #[error("{} link(s) failed: {}", .0.len(), join_errors(.0))]
    LinksFailed(Vec<InterchainError>),

    /// Build failed and the cleanup pass also reported problems.
    #[error("{cause} (teardown after failure also reported: {})", join_issues(.teardown))]
    BuildAborted {
        /// The error that failed the build
        cause: Box<InterchainError>,
        /// Problems reported by the cleanup pass
        teardown: Vec<TeardownIssue>,
    },

    /// A chain was addressed before it reached `Started`.
    #[error("chain '{0}' is not started")]
    ChainNotStarted(String),

    /// A link was used before reaching `channel-created`.
    #[error("link '{path}' has not completed channel establishment (state: {state})")]
    LinkNotReady {
        /// Path name
        path: String,
        /// Current handshake state
        state: LinkState,
    },

    /// A handshake step was requested before its predecessor completed.
    #[error("cannot run {step} on path '{path}' while the link is {state}")]
    StepOutOfOrder {
        /// Path name
        path: String,
        /// Requested step
        step: HandshakeStep,
        /// Recorded state
        state: LinkState,
    },

    /// No chain with that name.
    #[error("unknown chain '{0}'")]
    UnknownChain(String),

    /// No relayer with that name.
    #[error("unknown relayer '{0}'")]
    UnknownRelayer(String),

    /// No link with that path name.
    #[error("unknown path '{0}'")]
    UnknownPath(String),

    /// Operation not allowed in the current lifecycle phase.
    #[error("operation '{operation}' is not allowed while {phase}")]
    InvalidPhase {
        /// Attempted operation
        operation: &'static str,
        /// Current phase
        phase: String,
    },

    /// Cancelled by deadline or caller before completion.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Failure reported by a collaborator outside of a build step.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl InterchainError {
    /// The error that caused a failure, looking through `BuildAborted`
    pub fn primary(&self) -> &InterchainError {
        match self {
            Self::BuildAborted { cause, .. } => cause.primary(),
            other => other,
        }
    }

    /// Whether this is (or wraps) a deadline error
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self.primary(), Self::DeadlineExceeded { .. })
    }

    /// Teardown issues carried by this error, if any
    pub fn teardown_issues(&self) -> &[TeardownIssue] {
        match self {
            Self::TeardownFailure(issues) => issues,
            Self::BuildAborted { teardown, .. } => teardown,
            _ => &[],
        }
    }
}

/// Result alias for orchestration operations.
pub type Result<T, E = InterchainError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_unwraps_build_aborted() {
        let err = InterchainError::BuildAborted {
            cause: Box::new(InterchainError::UnknownChain("gaia".into())),
            teardown: vec![TeardownIssue {
                component: "chain:gaia".into(),
                message: "already gone".into(),
            }],
        };

        assert!(matches!(err.primary(), InterchainError::UnknownChain(name) if name == "gaia"));
        assert_eq!(err.teardown_issues().len(), 1);
        assert!(err.to_string().contains("already gone"));
    }

    #[test]
    fn test_handshake_rejection_message_names_link_and_step() {
        let err = InterchainError::HandshakeRejection {
            path: "gaia-osmo".into(),
            relayer: "rly".into(),
            step: HandshakeStep::CreateConnection,
            source: anyhow::anyhow!("counterparty client expired"),
        };

        let msg = err.to_string();
        assert!(msg.contains("gaia-osmo"));
        assert!(msg.contains("create-connection"));
        assert!(msg.contains("counterparty client expired"));
    }

    #[test]
    fn test_deadline_budget_display() {
        let err = InterchainError::DeadlineExceeded {
            operation: "polling balance".into(),
            budget: Budget::Blocks(20),
        };
        assert!(err.is_deadline_exceeded());
        assert_eq!(
            err.to_string(),
            "deadline exceeded while polling balance (budget: 20 blocks)"
        );
    }
}
