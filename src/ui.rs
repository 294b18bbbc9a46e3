use crossterm::style::Stylize;

use crate::api::{AccountGroup, HealthReport};
use crate::conversation::{Message, MessagePayload, Sender};
use crate::health::HealthCheckResult;
use crate::instances::{ConfigTier, Instance, InstanceState};
use crate::volumes::{conversion_benefit, Volume};

/// Line-oriented terminal rendering for the chat transcript and tables.
/// Deliberately not a full-screen TUI; output scrolls with the conversation.
pub struct ChatRenderer {
    bot_name: String,
}

impl ChatRenderer {
    pub fn new(bot_name: &str) -> Self {
        Self {
            bot_name: bot_name.to_string(),
        }
    }

    /// Render one transcript message, including any embedded table
    pub fn render_message(&self, message: &Message) {
        match message.sender {
            Sender::User => {
                println!("{} {}", "you>".bold().green(), message.text);
            }
            Sender::Bot => {
                println!("{} {}", format!("{}>", self.bot_name).bold().cyan(), message.text);
            }
        }

        match &message.payload {
            MessagePayload::None => {}
            MessagePayload::AccountGroups(groups) => self.render_account_groups(groups),
            MessagePayload::Instances { instances, .. } => self.render_instance_table(instances),
        }
    }

    pub fn render_account_groups(&self, groups: &[AccountGroup]) {
        if groups.is_empty() {
            println!("  (no account groups configured)");
            return;
        }
        for group in groups {
            println!(
                "  {} {}  instances: {} total / {} unconfigured",
                "•".bold(),
                group.display_name(),
                group.total_instances,
                group.unconfigured_instances
            );
        }
        println!("  Use /select <account-id> to continue.");
    }

    pub fn render_instance_table(&self, instances: &[Instance]) {
        if instances.is_empty() {
            println!("  (no instances discovered)");
            return;
        }
        println!(
            "  {:<22} {:<20} {:<10} {:<12} {:<12} {}",
            "INSTANCE", "NAME", "STATE", "REGION", "TYPE", "STATUS"
        );
        for instance in instances {
            let status = tier_glyph(instance);
            let state = match instance.state {
                InstanceState::Running => "running".green(),
                InstanceState::Stopped => "stopped".yellow(),
                InstanceState::Terminated => "terminated".red(),
                InstanceState::Other => "other".grey(),
            };
            println!(
                "  {:<22} {:<20} {:<10} {:<12} {:<12} {}",
                instance.instance_id,
                truncate(&instance.instance_name, 20),
                state,
                instance.region,
                instance.instance_type,
                status
            );
        }
    }

    pub fn render_volume_table(&self, volumes: &[Volume], selected: &[String]) {
        if volumes.is_empty() {
            println!("  (no candidate volumes found)");
            return;
        }
        println!(
            "  {:<4} {:<22} {:<8} {:>8}  {}",
            "SEL", "VOLUME", "TYPE", "SIZE", "BENEFIT"
        );
        for volume in volumes {
            let mark = if selected.contains(&volume.volume_id) {
                "[x]".green().to_string()
            } else {
                "[ ]".to_string()
            };
            println!(
                "  {:<4} {:<22} {:<8} {:>6}GB  {}",
                mark,
                volume.volume_id,
                volume.volume_type,
                volume.size,
                conversion_benefit(&volume.volume_type).note
            );
        }
    }

    pub fn render_health(&self, result: &HealthCheckResult) {
        if result.is_healthy {
            println!(
                "{} backend healthy ({}ms)",
                "✓".bold().green(),
                result.response_time_ms
            );
        } else {
            println!(
                "{} backend unhealthy: {}",
                "✗".bold().red(),
                result
                    .error_message
                    .as_deref()
                    .unwrap_or("unknown error")
            );
        }
        if let Some(report) = &result.report {
            self.render_health_report(report);
        }
    }

    fn render_health_report(&self, report: &HealthReport) {
        if let Some(service) = &report.service {
            println!("  service: {}", service);
        }
        if let Some(version) = &report.version {
            println!("  version: {}", version);
        }
        if let Some(region) = &report.aws_region {
            println!("  region:  {}", region);
        }
        if let Some(features) = report.features.as_ref().and_then(|f| f.as_object()) {
            let enabled: Vec<&str> = features
                .iter()
                .filter(|(_, v)| v.as_bool().unwrap_or(false))
                .map(|(k, _)| k.as_str())
                .collect();
            if !enabled.is_empty() {
                println!("  features: {}", enabled.join(", "));
            }
        }
    }

    pub fn render_error_banner(&self, message: &str) {
        eprintln!("{} {}", "error:".bold().red(), message);
    }

    pub fn render_warning_banner(&self, message: &str) {
        eprintln!("{} {}", "warning:".bold().yellow(), message);
    }
}

fn tier_glyph(instance: &Instance) -> String {
    match instance.config_tier() {
        ConfigTier::NotConfigured => "○ not configured".red().to_string(),
        ConfigTier::AgentConfigured => "◐ agent configured".yellow().to_string(),
        ConfigTier::AlarmConfigured => "● alarms configured".green().to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", truncated)
    }
}
