use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{AlarmRequest, ApiClient, ApiOutcome};
use crate::error::{ChatOpsError, Result, WorkflowError};
use crate::instances::Instance;
use crate::workflow::{ActionReport, Workflow, WorkflowState};

/// Alarm thresholds sent as the `alarmConfig` payload.
///
/// Defaults mirror the standard alarm set the automation creates: CPU and
/// memory at 80%, disk at 85%.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmThresholds {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

impl Default for AlarmThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 80.0,
            memory_percent: 80.0,
            disk_percent: 85.0,
        }
    }
}

impl AlarmThresholds {
    pub fn validate(&self) -> std::result::Result<(), WorkflowError> {
        for (name, value) in [
            ("cpuPercent", self.cpu_percent),
            ("memoryPercent", self.memory_percent),
            ("diskPercent", self.disk_percent),
        ] {
            if !(1.0..=100.0).contains(&value) {
                return Err(WorkflowError::ParameterOutOfRange {
                    name: name.to_string(),
                    value: value as i64,
                    min: 1,
                    max: 100,
                });
            }
        }
        Ok(())
    }
}

/// Per-instance alarm configuration wizard.
///
/// Only offered for running instances that already have the CloudWatch agent
/// configured. A partial backend outcome (some alarms created, some not) is
/// a warning: the instance is NOT marked as alarms-configured and the
/// warning text is surfaced in the transcript.
#[derive(Debug, Clone)]
pub struct AlarmWizard {
    workflow: Workflow,
    account_id: String,
    instance: Instance,
    thresholds: AlarmThresholds,
}

impl AlarmWizard {
    /// Open the wizard for one instance, enforcing the gate
    pub fn begin(account_id: &str, instance: Instance) -> Result<Self> {
        if !instance.available_actions().configure_alarms {
            return Err(ChatOpsError::Workflow(WorkflowError::InvalidTransition {
                from: "discovery".to_string(),
                to: format!(
                    "alarm configuration for {} ({}, agent configured: {})",
                    instance.instance_id,
                    instance.state.as_str(),
                    instance.cloudwatch_configured
                ),
            }));
        }

        let mut workflow = Workflow::new();
        // Single-instance wizard: the gate check is its discovery and the
        // instance itself is the selection.
        workflow.items_discovered()?;
        workflow.selection_made()?;

        Ok(Self {
            workflow,
            account_id: account_id.to_string(),
            instance,
            thresholds: AlarmThresholds::default(),
        })
    }

    pub fn state(&self) -> &WorkflowState {
        self.workflow.state()
    }

    pub fn thresholds(&self) -> AlarmThresholds {
        self.thresholds
    }

    /// Configuration step: override thresholds within 1..=100 percent
    pub fn set_thresholds(&mut self, thresholds: AlarmThresholds) -> Result<()> {
        thresholds.validate()?;
        self.thresholds = thresholds;
        Ok(())
    }

    pub fn accept_configuration(&mut self) -> Result<()> {
        self.workflow.configured()?;
        Ok(())
    }

    pub fn confirm(&mut self) -> Result<()> {
        self.workflow.confirmed()?;
        Ok(())
    }

    pub async fn execute(&mut self, client: &ApiClient) -> Result<ActionReport> {
        let request = AlarmRequest {
            instance_id: self.instance.instance_id.clone(),
            account_id: self.account_id.clone(),
            region: self.instance.region.clone(),
            platform: self.instance.platform.clone(),
            instance_name: self.instance.instance_name.clone(),
            alarm_config: self.thresholds,
        };

        info!(
            "Configuring alarms for {} (cpu {}%, memory {}%, disk {}%)",
            self.instance.display_name(),
            self.thresholds.cpu_percent,
            self.thresholds.memory_percent,
            self.thresholds.disk_percent
        );

        match client.configure_alarms(&request).await {
            Ok(ApiOutcome::Ok(report)) => {
                self.workflow.succeeded()?;
                let headline = report.message.unwrap_or_else(|| {
                    format!(
                        "Alarms configured successfully for {}",
                        self.instance.display_name()
                    )
                });
                Ok(ActionReport::success(headline))
            }
            Ok(ApiOutcome::Partial { message, .. }) => {
                // Non-fatal: the wizard completes but the instance stays
                // un-flagged until a later discovery confirms all alarms.
                self.workflow.succeeded()?;
                warn!(
                    "Partial alarm configuration for {}: {}",
                    self.instance.instance_id, message
                );
                Ok(ActionReport::warning(
                    format!(
                        "Some alarms could not be configured for {}",
                        self.instance.display_name()
                    ),
                    message,
                ))
            }
            Err(e) => {
                let err = ChatOpsError::from(e);
                self.workflow.failed(err.user_message())?;
                Err(err)
            }
        }
    }

    pub fn retry(&mut self) -> Result<()> {
        self.workflow.retry()?;
        self.workflow.items_discovered()?;
        self.workflow.selection_made()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instances::InstanceState;

    fn instance(state: InstanceState, agent: bool) -> Instance {
        Instance {
            instance_id: "i-0abc123".to_string(),
            instance_name: "web-server".to_string(),
            state,
            region: "us-east-1".to_string(),
            platform: "linux".to_string(),
            instance_type: "t3.micro".to_string(),
            launch_time: None,
            cloudwatch_configured: agent,
            cloudwatch_display: None,
            cloudwatch_status: None,
            action_needed: false,
            alarms_configured: false,
        }
    }

    #[test]
    fn test_gate_requires_running_with_agent() {
        assert!(AlarmWizard::begin("111122223333", instance(InstanceState::Running, true)).is_ok());
        assert!(
            AlarmWizard::begin("111122223333", instance(InstanceState::Running, false)).is_err()
        );
        assert!(
            AlarmWizard::begin("111122223333", instance(InstanceState::Stopped, true)).is_err()
        );
    }

    #[test]
    fn test_begin_lands_in_configuration() {
        let wizard =
            AlarmWizard::begin("111122223333", instance(InstanceState::Running, true)).unwrap();
        assert_eq!(wizard.state(), &WorkflowState::Configuration);
    }

    #[test]
    fn test_threshold_validation() {
        let mut wizard =
            AlarmWizard::begin("111122223333", instance(InstanceState::Running, true)).unwrap();
        let bad = AlarmThresholds {
            cpu_percent: 120.0,
            ..AlarmThresholds::default()
        };
        assert!(wizard.set_thresholds(bad).is_err());
        let good = AlarmThresholds {
            cpu_percent: 90.0,
            ..AlarmThresholds::default()
        };
        wizard.set_thresholds(good).unwrap();
        assert_eq!(wizard.thresholds().cpu_percent, 90.0);
    }

    #[test]
    fn test_default_thresholds() {
        let thresholds = AlarmThresholds::default();
        assert_eq!(thresholds.cpu_percent, 80.0);
        assert_eq!(thresholds.memory_percent, 80.0);
        assert_eq!(thresholds.disk_percent, 85.0);
    }

    #[test]
    fn test_alarm_config_serializes_camel_case() {
        let json = serde_json::to_value(AlarmThresholds::default()).unwrap();
        assert_eq!(json["cpuPercent"], 80.0);
        assert_eq!(json["diskPercent"], 85.0);
    }

    #[test]
    fn test_cannot_execute_before_confirmation() {
        let mut wizard =
            AlarmWizard::begin("111122223333", instance(InstanceState::Running, true)).unwrap();
        // confirm() from configuration (without accept_configuration) is illegal
        assert!(wizard.confirm().is_err());
        wizard.accept_configuration().unwrap();
        wizard.confirm().unwrap();
        assert_eq!(wizard.state(), &WorkflowState::Executing);
    }
}
