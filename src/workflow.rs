use crate::error::WorkflowError;

/// Step of a multi-step action wizard.
///
/// Every action wizard (agent deployment, alarms, type change, volume
/// conversion) walks the same machine:
///
/// `Discovery -> Selection -> Configuration -> Confirmation -> Executing ->
/// Succeeded | Failed`
///
/// A failed wizard can be retried, which re-enters Discovery. Closing a
/// wizard resets it to Discovery with cleared selection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    Discovery,
    Selection,
    Configuration,
    Confirmation,
    Executing,
    Succeeded,
    Failed { message: String },
}

impl WorkflowState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Discovery => "discovery",
            WorkflowState::Selection => "selection",
            WorkflowState::Configuration => "configuration",
            WorkflowState::Confirmation => "confirmation",
            WorkflowState::Executing => "executing",
            WorkflowState::Succeeded => "succeeded",
            WorkflowState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Succeeded | WorkflowState::Failed { .. })
    }

    /// While executing, all controls are disabled and the wizard cannot be
    /// advanced or closed out from under the in-flight call.
    pub fn controls_locked(&self) -> bool {
        matches!(self, WorkflowState::Executing)
    }
}

/// State holder enforcing the legal transition table
#[derive(Debug, Clone)]
pub struct Workflow {
    state: WorkflowState,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Discovery,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    fn transition(&mut self, to: WorkflowState) -> Result<(), WorkflowError> {
        let legal = matches!(
            (&self.state, &to),
            (WorkflowState::Discovery, WorkflowState::Selection)
                | (WorkflowState::Selection, WorkflowState::Configuration)
                | (WorkflowState::Configuration, WorkflowState::Confirmation)
                | (WorkflowState::Confirmation, WorkflowState::Executing)
                | (WorkflowState::Executing, WorkflowState::Succeeded)
                | (WorkflowState::Executing, WorkflowState::Failed { .. })
                // Any pre-execution step may fail (discovery errors etc.)
                | (WorkflowState::Discovery, WorkflowState::Failed { .. })
                | (WorkflowState::Selection, WorkflowState::Failed { .. })
                | (WorkflowState::Configuration, WorkflowState::Failed { .. })
                | (WorkflowState::Confirmation, WorkflowState::Failed { .. })
                // Retry re-enters discovery
                | (WorkflowState::Failed { .. }, WorkflowState::Discovery)
        );

        if !legal {
            return Err(WorkflowError::InvalidTransition {
                from: self.state.name().to_string(),
                to: to.name().to_string(),
            });
        }
        self.state = to;
        Ok(())
    }

    /// Discovery finished; move to item selection
    pub fn items_discovered(&mut self) -> Result<(), WorkflowError> {
        self.transition(WorkflowState::Selection)
    }

    /// Selection confirmed; move to parameter configuration
    pub fn selection_made(&mut self) -> Result<(), WorkflowError> {
        self.transition(WorkflowState::Configuration)
    }

    /// Configuration accepted; ask for explicit confirmation
    pub fn configured(&mut self) -> Result<(), WorkflowError> {
        self.transition(WorkflowState::Confirmation)
    }

    /// User acknowledged; the mutating call may now fire
    pub fn confirmed(&mut self) -> Result<(), WorkflowError> {
        self.transition(WorkflowState::Executing)
    }

    pub fn succeeded(&mut self) -> Result<(), WorkflowError> {
        self.transition(WorkflowState::Succeeded)
    }

    pub fn failed(&mut self, message: impl Into<String>) -> Result<(), WorkflowError> {
        self.transition(WorkflowState::Failed {
            message: message.into(),
        })
    }

    /// User-triggered retry after a failure
    pub fn retry(&mut self) -> Result<(), WorkflowError> {
        self.transition(WorkflowState::Discovery)
    }

    /// Closing a wizard always resets it to its initial state
    pub fn reset(&mut self) {
        self.state = WorkflowState::Discovery;
    }
}

/// Result summary a finished wizard hands back to the conversation, which
/// appends it to the transcript and schedules a delayed instance refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    pub headline: String,
    pub detail: Option<String>,
    /// Partial success surfaces as a warning, never as an error
    pub warning: bool,
}

impl ActionReport {
    pub fn success(headline: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            detail: None,
            warning: false,
        }
    }

    pub fn warning(headline: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            detail: Some(detail.into()),
            warning: true,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
