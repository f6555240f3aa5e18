//! Managed background component lifecycle

use std::fmt;

use trustwatch_core::WatchResult;

/// Background component the host starts at boot and terminates at shutdown.
///
/// Both calls are idempotent: starting a running daemon or terminating a
/// stopped one does nothing.
pub trait Daemon: Send + Sync {
    fn start(&self) -> WatchResult<()>;
    fn terminate(&self) -> WatchResult<()>;
    fn state(&self) -> LifecycleState;
}

/// Lifecycle state: Stopped -> Starting -> Running -> Stopping -> Stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl LifecycleState {
    /// Valid successor states
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }

    pub fn is_running(self) -> bool {
        self == LifecycleState::Running
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}
