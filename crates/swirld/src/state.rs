//! Node state machine
//!
//! | From                  | Event          | To         |
//! |-----------------------|----------------|------------|
//! | Babbling              | FellBehind     | CatchingUp |
//! | Babbling, CatchingUp  | LeaveRequested | Leaving    |
//! | CatchingUp            | CaughtUp       | Babbling   |
//! | Joining               | JoinAccepted   | CatchingUp |
//! | Leaving               | LeaveCompleted | Shutdown   |
//! | any but Shutdown      | Shutdown       | Shutdown   |
//!
//! Every other combination is rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    /// Steady state: gossip with random peers
    Babbling,
    /// Too far behind for plain gossip
    CatchingUp,
    /// Waiting for our PeerAdd to reach consensus
    Joining,
    /// Waiting for our PeerRemove to take effect
    Leaving,
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateEvent {
    FellBehind,
    CaughtUp,
    JoinAccepted,
    LeaveRequested,
    LeaveCompleted,
    Shutdown,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalid transition from {from} on {event:?}")]
    InvalidTransition { from: NodeState, event: StateEvent },
}

impl NodeState {
    pub fn next(self, event: StateEvent) -> Result<NodeState, StateError> {
        use NodeState::*;
        use StateEvent as E;
        match (self, event) {
            (Babbling, E::FellBehind) => Ok(CatchingUp),
            (Babbling | CatchingUp, E::LeaveRequested) => Ok(Leaving),
            (CatchingUp, E::CaughtUp) => Ok(Babbling),
            (Joining, E::JoinAccepted) => Ok(CatchingUp),
            (Leaving, E::LeaveCompleted) => Ok(Shutdown),
            (Babbling | CatchingUp | Joining | Leaving, E::Shutdown) => Ok(Shutdown),
            (from, event) => Err(StateError::InvalidTransition { from, event }),
        }
    }

    pub fn is_terminal(self) -> bool {
        self == NodeState::Shutdown
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Babbling => "Babbling",
            NodeState::CatchingUp => "CatchingUp",
            NodeState::Joining => "Joining",
            NodeState::Leaving => "Leaving",
            NodeState::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

/// Current state, published to any number of watchers
pub struct StateMachine {
    tx: watch::Sender<NodeState>,
}

impl StateMachine {
    pub fn new(initial: NodeState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> NodeState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NodeState> {
        self.tx.subscribe()
    }

    /// Apply `event` atomically; returns the new state
    pub fn fire(&self, event: StateEvent) -> Result<NodeState, StateError> {
        let mut outcome = Err(StateError::InvalidTransition {
            from: NodeState::Shutdown,
            event,
        });
        self.tx.send_if_modified(|state| match state.next(event) {
            Ok(next) => {
                info!(from = %state, to = %next, ?event, "state transition");
                *state = next;
                outcome = Ok(next);
                true
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATES: [NodeState; 5] = [
        NodeState::Babbling,
        NodeState::CatchingUp,
        NodeState::Joining,
        NodeState::Leaving,
        NodeState::Shutdown,
    ];

    #[test]
    fn test_transition_table() {
        use NodeState::*;
        assert_eq!(Babbling.next(StateEvent::FellBehind), Ok(CatchingUp));
        assert_eq!(CatchingUp.next(StateEvent::CaughtUp), Ok(Babbling));
        assert_eq!(Joining.next(StateEvent::JoinAccepted), Ok(CatchingUp));
        assert_eq!(Babbling.next(StateEvent::LeaveRequested), Ok(Leaving));
        assert_eq!(CatchingUp.next(StateEvent::LeaveRequested), Ok(Leaving));
        assert_eq!(Leaving.next(StateEvent::LeaveCompleted), Ok(Shutdown));
    }

    #[test]
    fn test_shutdown_is_terminal() {
        for state in STATES {
            let result = state.next(StateEvent::Shutdown);
            if state.is_terminal() {
                assert!(result.is_err());
            } else {
                assert_eq!(result, Ok(NodeState::Shutdown));
            }
        }
        assert!(NodeState::Shutdown.next(StateEvent::CaughtUp).is_err());
    }

    #[test]
    fn test_invalid_transitions() {
        assert_eq!(
            NodeState::Joining.next(StateEvent::LeaveRequested),
            Err(StateError::InvalidTransition {
                from: NodeState::Joining,
                event: StateEvent::LeaveRequested
            })
        );
        assert!(NodeState::Leaving.next(StateEvent::FellBehind).is_err());
        assert!(NodeState::Babbling.next(StateEvent::CaughtUp).is_err());
    }

    #[tokio::test]
    async fn test_state_machine_publishes() {
        let machine = StateMachine::new(NodeState::Joining);
        let mut rx = machine.subscribe();

        assert_eq!(machine.fire(StateEvent::JoinAccepted), Ok(NodeState::CatchingUp));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), NodeState::CatchingUp);

        // rejected events leave the state untouched
        assert!(machine.fire(StateEvent::LeaveCompleted).is_err());
        assert_eq!(machine.current(), NodeState::CatchingUp);
        assert!(!rx.has_changed().unwrap());
    }
}
