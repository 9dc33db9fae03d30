use cityscope_core::error::LifecycleError;
use cityscope_core::events::{EventEnvelope, LifecycleEvent};
use cityscope_core::model::{DatasetCandidate, ServiceModel};

/// One line per service: state plus the actions that state allows.
pub fn status_lines(models: &[ServiceModel]) -> Vec<String> {
    models
        .iter()
        .map(|model| {
            let state = model.current_state();
            let actions: Vec<&str> = state
                .actions(model.kind())
                .iter()
                .map(|a| a.label())
                .collect();
            let mut line = format!(
                "{} {:<10} {:<14} {}",
                state.icon(),
                model.kind().label(),
                state.label(),
                if actions.is_empty() {
                    "-".to_string()
                } else {
                    actions.join(", ")
                }
            );
            if let Some(partial) = model.partial_failure() {
                let completed: Vec<String> =
                    partial.completed.iter().map(|r| r.to_string()).collect();
                line.push_str(&format!(
                    "  (partial: {} running, {} failed)",
                    completed.join("+"),
                    partial.failed
                ));
            }
            line
        })
        .collect()
}

pub fn print_status(models: &[ServiceModel]) {
    for line in status_lines(models) {
        println!("{}", line);
    }
}

pub fn print_candidates(candidates: &[DatasetCandidate]) {
    if candidates.is_empty() {
        println!("No datasets available");
        return;
    }
    let width = candidates.iter().map(|c| c.id.len()).max().unwrap_or(0);
    for c in candidates {
        println!("{:<width$}  {}  {}", c.id, c.display_name, c.detail_url, width = width);
    }
}

pub fn describe_event(env: &EventEnvelope) -> Option<String> {
    match &env.event {
        LifecycleEvent::StateChanged { kind, from, to, .. } => {
            Some(format!("{}: {} -> {}", kind, from, to))
        }
        LifecycleEvent::StepFailed {
            kind,
            resource,
            status,
        } => Some(match status {
            Some(code) => format!("{}: {} step failed (HTTP {})", kind, resource, code),
            None => format!("{}: {} step failed", kind, resource),
        }),
        LifecycleEvent::StepSucceeded { .. } => None,
    }
}

/// Extra guidance printed after a failed command.
pub fn hint(err: &LifecycleError) -> Option<&'static str> {
    match err {
        LifecycleError::RemoteFailure { .. } if err.is_partial() => Some(
            "Some parts of this service were started. Run `cityscope status` before retrying.",
        ),
        LifecycleError::RemoteFailure { .. } => {
            Some("Run `cityscope status` to refresh before retrying.")
        }
        LifecycleError::AlreadyPending { .. } => Some("Wait for the running command to finish."),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cityscope_core::model::{PartialFailure, Resource, ServiceKind, ServiceState};

    #[test]
    fn test_status_line_lists_actions() {
        let mut model = ServiceModel::new(ServiceKind::Loopback);
        model.set(ServiceState::Running);
        let lines = status_lines(&[model]);
        assert!(lines[0].contains("loopback"));
        assert!(lines[0].contains("running"));
        assert!(lines[0].ends_with("stop, credential, configure"));
    }

    #[test]
    fn test_status_line_shows_partial_failure() {
        let mut model = ServiceModel::new(ServiceKind::Blog);
        model.set_partial(PartialFailure {
            completed: vec![Resource::Mysql],
            failed: Resource::Wordpress,
        });
        let lines = status_lines(&[model]);
        assert!(lines[0].contains("unknown"));
        assert!(lines[0].contains("(partial: mysql running, wordpress failed)"));
    }
}
