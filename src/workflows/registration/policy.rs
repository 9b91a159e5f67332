use super::domain::StatusCode;

/// Decides whether a status may follow another. Consulted after the target status resolves
/// and before anything is written.
pub trait TransitionPolicy: Send + Sync {
    fn is_transition_allowed(&self, previous: &StatusCode, next: &StatusCode) -> bool;
}

/// Any status may follow any other, including retired ones for administrative correction.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveWorkflow;

impl TransitionPolicy for PermissiveWorkflow {
    fn is_transition_allowed(&self, _previous: &StatusCode, _next: &StatusCode) -> bool {
        true
    }
}

/// Blocks any move out of the listed terminal statuses.
#[derive(Debug, Clone, Default)]
pub struct TerminalStatuses {
    terminal: Vec<StatusCode>,
}

impl TerminalStatuses {
    pub fn new<I, C>(codes: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        Self {
            terminal: codes.into_iter().map(|code| StatusCode(code.into())).collect(),
        }
    }
}

impl TransitionPolicy for TerminalStatuses {
    fn is_transition_allowed(&self, previous: &StatusCode, next: &StatusCode) -> bool {
        previous == next || !self.terminal.contains(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_allows_everything() {
        let policy = PermissiveWorkflow;
        assert!(policy.is_transition_allowed(&StatusCode::new("ARCHIVE"), &StatusCode::new("RECU")));
        assert!(policy.is_transition_allowed(&StatusCode::new("RECU"), &StatusCode::new("RECU")));
    }

    #[test]
    fn terminal_statuses_block_exits() {
        let policy = TerminalStatuses::new(["ARCHIVE"]);
        assert!(!policy.is_transition_allowed(&StatusCode::new("ARCHIVE"), &StatusCode::new("RECU")));
        assert!(policy.is_transition_allowed(&StatusCode::new("RECU"), &StatusCode::new("ARCHIVE")));
    }
}
