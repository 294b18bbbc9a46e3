use tracing::info;

use crate::api::{ApiClient, InstanceStatus, TypeChangeRequest};
use crate::error::{ChatOpsError, Result, WorkflowError};
use crate::instances::Instance;
use crate::workflow::{ActionReport, Workflow, WorkflowState};

/// Instance types offered by the type-change wizard
pub const INSTANCE_TYPE_CATALOG: &[&str] = &[
    "t3.micro",
    "t3.small",
    "t3.medium",
    "t3.large",
    "t3.xlarge",
    "m5.large",
    "m5.xlarge",
    "m5.2xlarge",
    "c5.large",
    "c5.xlarge",
    "r5.large",
    "r5.xlarge",
];

/// Downtime warning shown on the confirmation step. Type changes stop and
/// restart the instance.
pub const DOWNTIME_WARNING: &str =
    "This will cause 2-5 minutes downtime as the instance must be stopped and restarted.";

/// Instance type change wizard.
///
/// Discovery and selection are the instance row itself; the configuration
/// step is choosing a target type from the catalog. The backend processes
/// the change asynchronously, so success here only means "initiated".
#[derive(Debug, Clone)]
pub struct TypeChangeWizard {
    workflow: Workflow,
    account_id: String,
    instance: Instance,
    new_instance_type: Option<String>,
}

impl TypeChangeWizard {
    pub fn begin(account_id: &str, instance: Instance) -> Result<Self> {
        if !instance.available_actions().change_type {
            return Err(ChatOpsError::Workflow(WorkflowError::InvalidTransition {
                from: "discovery".to_string(),
                to: format!(
                    "type change for terminated instance {}",
                    instance.instance_id
                ),
            }));
        }

        let mut workflow = Workflow::new();
        workflow.items_discovered()?;
        workflow.selection_made()?;

        Ok(Self {
            workflow,
            account_id: account_id.to_string(),
            instance,
            new_instance_type: None,
        })
    }

    pub fn state(&self) -> &WorkflowState {
        self.workflow.state()
    }

    pub fn current_type(&self) -> &str {
        &self.instance.instance_type
    }

    /// Catalog entries other than the instance's current type
    pub fn available_types(&self) -> Vec<&'static str> {
        INSTANCE_TYPE_CATALOG
            .iter()
            .copied()
            .filter(|t| *t != self.instance.instance_type)
            .collect()
    }

    /// Configuration step: pick the target type
    pub fn choose_type(&mut self, new_instance_type: &str) -> Result<()> {
        if new_instance_type == self.instance.instance_type {
            return Err(ChatOpsError::Workflow(WorkflowError::InvalidTransition {
                from: "configuration".to_string(),
                to: format!("current type {}", new_instance_type),
            }));
        }
        if !INSTANCE_TYPE_CATALOG.contains(&new_instance_type) {
            return Err(ChatOpsError::Workflow(WorkflowError::InvalidTransition {
                from: "configuration".to_string(),
                to: format!("unsupported type {}", new_instance_type),
            }));
        }
        self.new_instance_type = Some(new_instance_type.to_string());
        self.workflow.configured()?;
        Ok(())
    }

    /// Text shown on the confirmation step, including the downtime warning
    pub fn confirmation_prompt(&self) -> String {
        format!(
            "Change {} from {} to {}? {}",
            self.instance.display_name(),
            self.instance.instance_type,
            self.new_instance_type.as_deref().unwrap_or("?"),
            DOWNTIME_WARNING
        )
    }

    pub fn confirm(&mut self) -> Result<()> {
        self.workflow.confirmed()?;
        Ok(())
    }

    pub async fn execute(&mut self, client: &ApiClient) -> Result<ActionReport> {
        let new_instance_type = self
            .new_instance_type
            .clone()
            .ok_or(WorkflowError::NothingSelected)?;

        let request = TypeChangeRequest {
            instance_id: self.instance.instance_id.clone(),
            account_id: self.account_id.clone(),
            region: self.instance.region.clone(),
            new_instance_type: new_instance_type.clone(),
            instance_name: self.instance.instance_name.clone(),
        };

        info!(
            "Changing {} from {} to {}",
            self.instance.display_name(),
            self.instance.instance_type,
            new_instance_type
        );

        match client.change_instance_type(&request).await {
            Ok(started) => {
                self.workflow.succeeded()?;
                let headline = started.message.unwrap_or_else(|| {
                    format!(
                        "Instance type change initiated for {} to {}",
                        self.instance.display_name(),
                        new_instance_type
                    )
                });
                let report = match started.estimated_completion {
                    Some(eta) => ActionReport::success(headline)
                        .with_detail(format!("Estimated completion: {}", eta)),
                    None => ActionReport::success(headline),
                };
                Ok(report)
            }
            Err(e) => {
                let err = ChatOpsError::from(e);
                self.workflow.failed(err.user_message())?;
                Err(err)
            }
        }
    }

    /// Poll the instance state once after an initiated change. The backend
    /// mutation is asynchronous; the caller decides the polling cadence.
    pub async fn poll_status(&self, client: &ApiClient) -> Result<InstanceStatus> {
        let status = client
            .instance_status(
                &self.account_id,
                &self.instance.instance_id,
                &self.instance.region,
            )
            .await?;
        Ok(status)
    }

    pub fn retry(&mut self) -> Result<()> {
        self.workflow.retry()?;
        self.workflow.items_discovered()?;
        self.workflow.selection_made()?;
        self.new_instance_type = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instances::InstanceState;

    fn instance(state: InstanceState) -> Instance {
        Instance {
            instance_id: "i-0abc123".to_string(),
            instance_name: "app-server".to_string(),
            state,
            region: "us-east-1".to_string(),
            platform: "linux".to_string(),
            instance_type: "t3.medium".to_string(),
            launch_time: None,
            cloudwatch_configured: true,
            cloudwatch_display: None,
            cloudwatch_status: None,
            action_needed: false,
            alarms_configured: false,
        }
    }

    #[test]
    fn test_begin_rejects_terminated() {
        assert!(TypeChangeWizard::begin("111122223333", instance(InstanceState::Terminated)).is_err());
        // Stopped instances are fine: no extra downtime concern
        assert!(TypeChangeWizard::begin("111122223333", instance(InstanceState::Stopped)).is_ok());
    }

    #[test]
    fn test_catalog_excludes_current_type() {
        let wizard =
            TypeChangeWizard::begin("111122223333", instance(InstanceState::Running)).unwrap();
        let available = wizard.available_types();
        assert!(!available.contains(&"t3.medium"));
        assert!(available.contains(&"t3.large"));
    }

    #[test]
    fn test_choose_type_validation() {
        let mut wizard =
            TypeChangeWizard::begin("111122223333", instance(InstanceState::Running)).unwrap();
        assert!(wizard.choose_type("t3.medium").is_err());
        assert!(wizard.choose_type("z1d.metal").is_err());
        wizard.choose_type("m5.large").unwrap();
        assert_eq!(wizard.state(), &WorkflowState::Confirmation);
        assert!(wizard.confirmation_prompt().contains(DOWNTIME_WARNING));
        assert!(wizard.confirmation_prompt().contains("t3.medium"));
        assert!(wizard.confirmation_prompt().contains("m5.large"));
    }

    #[test]
    fn test_confirm_before_choose_is_illegal() {
        let mut wizard =
            TypeChangeWizard::begin("111122223333", instance(InstanceState::Running)).unwrap();
        assert!(wizard.confirm().is_err());
    }
}
