use serde::{Deserialize, Serialize};

/// EC2 instance as reported by instance discovery.
///
/// Field names follow the backend payload (PascalCase keys).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    pub instance_id: String,

    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    pub state: InstanceState,

    pub region: String,

    #[serde(default = "default_platform")]
    pub platform: String,

    pub instance_type: String,

    #[serde(default)]
    pub launch_time: Option<String>,

    #[serde(rename = "CloudWatchConfigured", default)]
    pub cloudwatch_configured: bool,

    #[serde(rename = "CloudWatchDisplay", default)]
    pub cloudwatch_display: Option<String>,

    #[serde(rename = "CloudWatchStatus", default)]
    pub cloudwatch_status: Option<String>,

    #[serde(default)]
    pub action_needed: bool,

    #[serde(default)]
    pub alarms_configured: bool,
}

fn default_instance_name() -> String {
    "No Name".to_string()
}

fn default_platform() -> String {
    "linux".to_string()
}

/// Instance lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Running,
    Stopped,
    Terminated,
    #[serde(other)]
    Other,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Running => "running",
            InstanceState::Stopped => "stopped",
            InstanceState::Terminated => "terminated",
            InstanceState::Other => "other",
        }
    }
}

/// Monitoring configuration tier derived from the two configuration flags.
///
/// Ordered so that the least-configured instances sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    NotConfigured = 0,
    AgentConfigured = 1,
    AlarmConfigured = 2,
}

impl ConfigTier {
    pub fn label(&self) -> &'static str {
        match self {
            ConfigTier::NotConfigured => "not configured",
            ConfigTier::AgentConfigured => "agent configured",
            ConfigTier::AlarmConfigured => "alarms configured",
        }
    }
}

/// Per-instance client-side view of what actions are available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceActions {
    /// Agent deployment confirmation flow (row click)
    pub deploy_agent: bool,
    /// GP2 to GP3 volume conversion
    pub convert_volumes: bool,
    /// Instance type change
    pub change_type: bool,
    /// CloudWatch alarm configuration
    pub configure_alarms: bool,
}

impl Instance {
    /// Human-readable name, falling back to the instance id
    pub fn display_name(&self) -> String {
        if self.instance_name == "No Name" || self.instance_name.is_empty() {
            self.instance_id.clone()
        } else {
            format!("{} ({})", self.instance_name, self.instance_id)
        }
    }

    /// Derive the configuration tier from the two flags
    pub fn config_tier(&self) -> ConfigTier {
        match (self.cloudwatch_configured, self.alarms_configured) {
            (true, true) => ConfigTier::AlarmConfigured,
            (true, false) => ConfigTier::AgentConfigured,
            _ => ConfigTier::NotConfigured,
        }
    }

    /// Actions available for this instance.
    ///
    /// Agent deployment is the row-click action and only offered while
    /// nothing is configured yet. Volume conversion and type changes are
    /// gated only on the instance not being terminated. Alarms additionally
    /// require a running instance with the agent already in place.
    pub fn available_actions(&self) -> InstanceActions {
        let not_terminated = self.state != InstanceState::Terminated;
        InstanceActions {
            deploy_agent: self.config_tier() == ConfigTier::NotConfigured && not_terminated,
            convert_volumes: not_terminated,
            change_type: not_terminated,
            configure_alarms: self.state == InstanceState::Running && self.cloudwatch_configured,
        }
    }
}

/// Discovery summary counts, as reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    #[serde(default)]
    pub total_instances: usize,
    #[serde(default)]
    pub running_instances: usize,
    #[serde(default)]
    pub configured_instances: usize,
    #[serde(default)]
    pub alarms_configured_instances: usize,
    #[serde(default)]
    pub unconfigured_instances: usize,
}

impl InstanceSummary {
    /// Recompute the summary counts client-side from an instance list
    pub fn from_instances(instances: &[Instance]) -> Self {
        Self {
            total_instances: instances.len(),
            running_instances: instances
                .iter()
                .filter(|i| i.state == InstanceState::Running)
                .count(),
            configured_instances: instances.iter().filter(|i| i.cloudwatch_configured).count(),
            alarms_configured_instances: instances.iter().filter(|i| i.alarms_configured).count(),
            unconfigured_instances: instances
                .iter()
                .filter(|i| i.action_needed && i.state == InstanceState::Running)
                .count(),
        }
    }
}

/// Sort instances for display: configuration tier ascending so the
/// least-configured instances surface first, then running before
/// non-running. Stable otherwise.
pub fn sort_for_display(instances: &mut [Instance]) {
    instances.sort_by_key(|i| {
        (
            i.config_tier(),
            if i.state == InstanceState::Running { 0u8 } else { 1u8 },
        )
    });
}
