//! Isolate lifecycle phases

use std::fmt;

/// Lifecycle phase of an isolate.
///
/// Phases only move forward. `Shutdown` is terminal: every phase except
/// `Shutdown` itself may move to it, and nothing leaves it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Phase {
    /// Not yet allocated
    #[default]
    Unknown,
    /// Interpreter-internal state is being allocated
    Initializing,
    /// Base libraries from the snapshot are installed
    LibrariesSetup,
    /// Additional libraries were loaded on top of the snapshot
    LocalLibrariesPresent,
    /// Entrypoint may be resolved and run
    Ready,
    /// An entrypoint is executing
    Running,
    /// Torn down
    Shutdown,
}

/// A phase change the state machine does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid isolate phase transition: {from} -> {to}")]
pub struct PhaseError {
    /// Phase the isolate was in
    pub from: Phase,
    /// Phase that was requested
    pub to: Phase,
}

impl Phase {
    /// Whether `self -> next` is a legal move
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Unknown, Initializing)
                | (Initializing, LibrariesSetup)
                | (LibrariesSetup, LocalLibrariesPresent)
                | (LibrariesSetup, Ready)
                | (LocalLibrariesPresent, Ready)
                | (Ready, Running)
        ) || (self != Shutdown && next == Shutdown)
    }

    /// The single authoritative transition function
    pub fn transition(self, next: Phase) -> Result<Phase, PhaseError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(PhaseError {
                from: self,
                to: next,
            })
        }
    }

    /// Libraries are installed and the isolate has not started running
    pub fn is_pre_running(self) -> bool {
        matches!(
            self,
            Phase::LibrariesSetup | Phase::LocalLibrariesPresent | Phase::Ready
        )
    }

    /// Program code may be invoked in this phase
    pub fn can_execute(self) -> bool {
        matches!(self, Phase::Ready | Phase::Running)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Unknown => "Unknown",
            Phase::Initializing => "Initializing",
            Phase::LibrariesSetup => "LibrariesSetup",
            Phase::LocalLibrariesPresent => "LocalLibrariesPresent",
            Phase::Ready => "Ready",
            Phase::Running => "Running",
            Phase::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}
