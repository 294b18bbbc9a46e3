use tracing::info;

use crate::api::{ApiClient, DeployAgentRequest};
use crate::error::{ChatOpsError, Result, WorkflowError};
use crate::instances::Instance;
use crate::workflow::{ActionReport, Workflow, WorkflowState};

/// CloudWatch agent deployment flow.
///
/// This is the row-click action for unconfigured instances. There is nothing
/// to select or configure, so the wizard goes straight to confirmation; the
/// deployment command fires only after explicit acknowledgment.
#[derive(Debug, Clone)]
pub struct AgentDeployment {
    workflow: Workflow,
    account_id: String,
    instance: Instance,
}

impl AgentDeployment {
    pub fn begin(account_id: &str, instance: Instance) -> Result<Self> {
        if !instance.available_actions().deploy_agent {
            return Err(ChatOpsError::Workflow(WorkflowError::InvalidTransition {
                from: "discovery".to_string(),
                to: format!(
                    "agent deployment for {} ({}, tier: {})",
                    instance.instance_id,
                    instance.state.as_str(),
                    instance.config_tier().label()
                ),
            }));
        }

        let mut workflow = Workflow::new();
        workflow.items_discovered()?;
        workflow.selection_made()?;
        workflow.configured()?;

        Ok(Self {
            workflow,
            account_id: account_id.to_string(),
            instance,
        })
    }

    pub fn state(&self) -> &WorkflowState {
        self.workflow.state()
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Text shown on the confirmation step
    pub fn confirmation_prompt(&self) -> String {
        format!(
            "Deploy the CloudWatch agent on {} in {}? The agent will be installed via SSM.",
            self.instance.display_name(),
            self.instance.region
        )
    }

    pub fn confirm(&mut self) -> Result<()> {
        self.workflow.confirmed()?;
        Ok(())
    }

    pub async fn execute(&mut self, client: &ApiClient) -> Result<ActionReport> {
        let request = DeployAgentRequest {
            instance_id: self.instance.instance_id.clone(),
            account_id: self.account_id.clone(),
            region: self.instance.region.clone(),
        };

        info!(
            "Deploying CloudWatch agent on {}",
            self.instance.display_name()
        );

        match client.deploy_cloudwatch_agent(&request).await {
            Ok(started) => {
                self.workflow.succeeded()?;
                let headline = started.message.unwrap_or_else(|| {
                    format!(
                        "CloudWatch agent deployment initiated on {}",
                        self.instance.display_name()
                    )
                });
                let report = match started.command_id {
                    Some(command_id) => ActionReport::success(headline)
                        .with_detail(format!("SSM command id: {}", command_id)),
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

    pub fn retry(&mut self) -> Result<()> {
        self.workflow.retry()?;
        self.workflow.items_discovered()?;
        self.workflow.selection_made()?;
        self.workflow.configured()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instances::InstanceState;

    fn unconfigured_instance() -> Instance {
        Instance {
            instance_id: "i-0abc123".to_string(),
            instance_name: "db-server".to_string(),
            state: InstanceState::Running,
            region: "eu-west-1".to_string(),
            platform: "linux".to_string(),
            instance_type: "t3.large".to_string(),
            launch_time: None,
            cloudwatch_configured: false,
            cloudwatch_display: None,
            cloudwatch_status: None,
            action_needed: true,
            alarms_configured: false,
        }
    }

    #[test]
    fn test_begin_lands_in_confirmation() {
        let deployment = AgentDeployment::begin("111122223333", unconfigured_instance()).unwrap();
        assert_eq!(deployment.state(), &WorkflowState::Confirmation);
        assert!(deployment
            .confirmation_prompt()
            .contains("db-server (i-0abc123)"));
    }

    #[test]
    fn test_begin_rejects_configured_instance() {
        let mut instance = unconfigured_instance();
        instance.cloudwatch_configured = true;
        assert!(AgentDeployment::begin("111122223333", instance).is_err());
    }

    #[test]
    fn test_confirm_unlocks_execution() {
        let mut deployment =
            AgentDeployment::begin("111122223333", unconfigured_instance()).unwrap();
        deployment.confirm().unwrap();
        assert_eq!(deployment.state(), &WorkflowState::Executing);
        assert!(deployment.state().controls_locked());
    }
}
