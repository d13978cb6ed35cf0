#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Init,
    Plan,
    Execute,
    Validate,
    Commit,
    Archive,
    Failed,
}

impl ControllerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Plan => "PLAN",
            Self::Execute => "EXECUTE",
            Self::Validate => "VALIDATE",
            Self::Commit => "COMMIT",
            Self::Archive => "ARCHIVE",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Archive | Self::Failed)
    }

    fn successors(self) -> &'static [ControllerState] {
        match self {
            Self::Init => &[Self::Plan],
            Self::Plan => &[Self::Execute],
            Self::Execute => &[Self::Validate],
            Self::Validate => &[Self::Commit],
            Self::Commit => &[Self::Archive],
            Self::Archive | Self::Failed => &[],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FsmError {
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

impl FsmError {
    pub fn code(&self) -> &'static str {
        "invalid_transition"
    }
}

/// Deterministic lifecycle: INIT → PLAN → EXECUTE → VALIDATE → COMMIT →
/// ARCHIVE, with FAILED reachable from any non-terminal state. Terminal
/// states accept no transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fsm {
    current: ControllerState,
}

impl Default for Fsm {
    fn default() -> Self {
        Self::new()
    }
}

impl Fsm {
    pub fn new() -> Self {
        Self {
            current: ControllerState::Init,
        }
    }

    pub fn current(&self) -> ControllerState {
        self.current
    }

    pub fn can_transition(&self, target: ControllerState) -> bool {
        if target == ControllerState::Failed {
            return !self.current.is_terminal();
        }
        self.current.successors().contains(&target)
    }

    pub fn transition(&mut self, target: ControllerState) -> Result<ControllerState, FsmError> {
        if !self.can_transition(target) {
            return Err(FsmError::InvalidTransition {
                from: self.current.as_str(),
                to: target.as_str(),
            });
        }
        self.current = target;
        Ok(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_the_full_lifecycle() {
        let mut fsm = Fsm::new();
        for target in [
            ControllerState::Plan,
            ControllerState::Execute,
            ControllerState::Validate,
            ControllerState::Commit,
            ControllerState::Archive,
        ] {
            fsm.transition(target).expect("legal transition");
        }
        assert_eq!(fsm.current(), ControllerState::Archive);
        assert!(fsm.current().is_terminal());
    }

    #[test]
    fn failed_is_reachable_from_any_non_terminal_state() {
        for walk in [0, 1, 2, 3, 4] {
            let mut fsm = Fsm::new();
            let path = [
                ControllerState::Plan,
                ControllerState::Execute,
                ControllerState::Validate,
                ControllerState::Commit,
            ];
            for target in path.iter().take(walk) {
                fsm.transition(*target).expect("legal transition");
            }
            fsm.transition(ControllerState::Failed)
                .expect("failed reachable");
            assert_eq!(fsm.current(), ControllerState::Failed);
        }
    }

    #[test]
    fn terminal_states_reject_every_transition() {
        for terminal in [ControllerState::Archive, ControllerState::Failed] {
            let mut fsm = Fsm::new();
            fsm.current = terminal;
            for target in [
                ControllerState::Init,
                ControllerState::Plan,
                ControllerState::Execute,
                ControllerState::Validate,
                ControllerState::Commit,
                ControllerState::Archive,
                ControllerState::Failed,
            ] {
                let err = fsm.transition(target).expect_err("terminal rejects");
                assert_eq!(err.code(), "invalid_transition");
            }
        }
    }

    #[test]
    fn skipping_states_is_rejected() {
        let mut fsm = Fsm::new();
        assert!(fsm.transition(ControllerState::Execute).is_err());
        assert!(fsm.transition(ControllerState::Archive).is_err());
        fsm.transition(ControllerState::Plan).expect("plan");
        assert!(fsm.transition(ControllerState::Validate).is_err());
    }
}
