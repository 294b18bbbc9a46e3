use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::{info, warn};

use ec2_chatops::agent::AgentDeployment;
use ec2_chatops::alarms::{AlarmThresholds, AlarmWizard};
use ec2_chatops::api::ApiClient;
use ec2_chatops::config::Config;
use ec2_chatops::conversation::{Conversation, FollowUp, Message};
use ec2_chatops::health::BackendHealthChecker;
use ec2_chatops::instance_type::TypeChangeWizard;
use ec2_chatops::instances::Instance;
use ec2_chatops::intent::Intent;
use ec2_chatops::logging::init_logging;
use ec2_chatops::ui::ChatRenderer;
use ec2_chatops::volumes::{ConversionScope, VolumeConversionWizard};

#[derive(Parser)]
#[command(name = "ec2-chatops")]
#[command(about = "Conversational EC2 operations: CloudWatch rollout, alarms, type changes and gp3 conversion")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive chat session
    Chat,

    /// Check backend health and exit
    Health,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Generate an example configuration file
    Generate {
        /// Output file path (defaults to standard config directory)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Conversation plus a render watermark so the main loop and the delayed
/// follow-up tasks never print the same transcript entry twice.
///
/// The watermark is the monotonic append count, not a transcript index:
/// bounded transcripts trim their oldest entries, which would shift an
/// index-based watermark.
struct ChatSession {
    conversation: Conversation,
    rendered: u64,
}

impl ChatSession {
    fn new(conversation: Conversation) -> Self {
        Self {
            conversation,
            rendered: 0,
        }
    }

    /// Transcript entries appended since the last render. Entries trimmed
    /// before they were ever rendered are gone and are skipped.
    fn drain_new(&mut self) -> Vec<Message> {
        let total = self.conversation.total_appended();
        let pending = (total - self.rendered) as usize;
        self.rendered = total;

        let transcript = self.conversation.transcript();
        let start = transcript.len().saturating_sub(pending);
        transcript[start..].to_vec()
    }
}

type InputLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).await?;

    let mut logging_config = config.logging.clone();
    if cli.verbose {
        logging_config.level = "debug".to_string();
    }
    let _guard = init_logging(&logging_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting ec2-chatops v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Chat => run_chat(config).await,
        Commands::Health => run_health(config).await,
        Commands::Config { command } => run_config(command, cli.config.as_deref(), config).await,
    }
}

async fn run_health(config: Config) -> Result<()> {
    let client = ApiClient::new(&config.api).context("Failed to build API client")?;
    let renderer = ChatRenderer::new(&config.conversation.bot_name);
    let result = BackendHealthChecker::default().check(&client).await?;
    renderer.render_health(&result);
    if !result.is_healthy {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_config(command: ConfigCommands, path: Option<&str>, config: Config) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
            println!("{}", rendered);
        }
        ConfigCommands::Generate { output } => {
            let written = Config::generate(output.as_deref().or(path)).await?;
            println!("Wrote example configuration to {:?}", written);
        }
    }
    Ok(())
}

async fn run_chat(config: Config) -> Result<()> {
    let client = ApiClient::new(&config.api).context("Failed to build API client")?;
    let bot_name = config.conversation.bot_name.clone();
    let renderer = ChatRenderer::new(&bot_name);

    // One startup health probe; a slow or down backend should be visible
    // before the first chat turn, not during it.
    let health = BackendHealthChecker::default().check(&client).await?;
    if !health.is_healthy {
        renderer.render_warning_banner(&format!(
            "Backend at {} looks unhealthy: {}",
            client.base_url(),
            health.error_message.as_deref().unwrap_or("unknown error")
        ));
    }

    let session = Arc::new(Mutex::new(ChatSession::new(Conversation::new(
        config.conversation.clone(),
    ))));

    render_new(&renderer, &session).await;
    println!("Type /help for commands, /quit to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim().to_string();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            let mut parts = command.split_whitespace();
            let name = parts.next().unwrap_or("");
            let args: Vec<&str> = parts.collect();
            match name {
                "quit" | "exit" => break,
                "help" => print_help(),
                "accounts" => {
                    let mut session_guard = session.lock().await;
                    session_guard
                        .conversation
                        .begin_account_discovery(&client, Intent::GenericChat)
                        .await;
                    drop(session_guard);
                    render_new(&renderer, &session).await;
                }
                "select" => match args.first() {
                    Some(account_id) => {
                        let mut session_guard = session.lock().await;
                        if let Err(e) =
                            session_guard.conversation.select_account(&client, account_id).await
                        {
                            renderer.render_error_banner(&e.to_string());
                        }
                        drop(session_guard);
                        render_new(&renderer, &session).await;
                    }
                    None => renderer.render_error_banner("usage: /select <account-id>"),
                },
                "refresh" => {
                    let mut session_guard = session.lock().await;
                    match session_guard.conversation.refresh_instances(&client).await {
                        Ok(()) => {
                            renderer.render_instance_table(session_guard.conversation.instances())
                        }
                        Err(e) => renderer.render_error_banner(&e.to_string()),
                    }
                    drop(session_guard);
                    render_new(&renderer, &session).await;
                }
                "instances" => {
                    let session_guard = session.lock().await;
                    renderer.render_instance_table(session_guard.conversation.instances());
                }
                "deploy" => {
                    run_deploy(&client, &renderer, &session, &bot_name, &args, &mut lines).await;
                }
                "alarms" => {
                    run_alarms(&client, &renderer, &session, &bot_name, &args, &mut lines).await;
                }
                "type" => {
                    run_type_change(&client, &renderer, &session, &bot_name, &args, &mut lines)
                        .await;
                }
                "convert" => {
                    run_convert(&client, &renderer, &session, &bot_name, &args, &mut lines).await;
                }
                other => {
                    renderer.render_error_banner(&format!(
                        "Unknown command /{}; try /help",
                        other
                    ));
                }
            }
            continue;
        }

        let mut session_guard = session.lock().await;
        match session_guard.conversation.handle_input(&client, &input).await {
            Ok(follow_up) => {
                drop(session_guard);
                render_new(&renderer, &session).await;
                schedule_follow_up(follow_up, Arc::clone(&session), client.clone(), &bot_name);
            }
            Err(e) => {
                drop(session_guard);
                renderer.render_error_banner(&e.to_string());
            }
        }
    }

    info!("Chat session ended");
    Ok(())
}

fn print_help() {
    println!("  /accounts                 discover configured AWS accounts");
    println!("  /select <account-id>      select an account and list instances");
    println!("  /instances                show the current instance table");
    println!("  /refresh                  re-fetch the instance list (bypasses caches)");
    println!("  /deploy <instance-id>     deploy the CloudWatch agent");
    println!("  /alarms <instance-id>     configure CloudWatch alarms");
    println!("  /type <instance-id>       change the instance type");
    println!("  /convert <instance-id>    convert gp2 volumes on one instance");
    println!("  /convert region <region>  convert gp2 volumes region-wide");
    println!("  /quit                     exit");
    println!("  Anything else is sent to the assistant as chat.");
}

/// Render transcript entries appended since the last render
async fn render_new(renderer: &ChatRenderer, session: &Arc<Mutex<ChatSession>>) {
    let mut session = session.lock().await;
    for message in session.drain_new() {
        renderer.render_message(&message);
    }
}

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

async fn read_reply(lines: &mut InputLines, text: &str) -> Option<String> {
    prompt(text);
    match lines.next_line().await {
        Ok(Some(line)) => Some(line.trim().to_string()),
        _ => None,
    }
}

async fn confirmed(lines: &mut InputLines, text: &str) -> bool {
    matches!(
        read_reply(lines, &format!("{} [y/N] ", text)).await.as_deref(),
        Some("y") | Some("Y") | Some("yes")
    )
}

/// Resolve the selected account and the named instance from the session
async fn wizard_context(
    renderer: &ChatRenderer,
    session: &Arc<Mutex<ChatSession>>,
    args: &[&str],
) -> Option<(String, Instance)> {
    let Some(instance_id) = args.first() else {
        renderer.render_error_banner("an instance id is required; see /help");
        return None;
    };
    let session = session.lock().await;
    let Some(account_id) = session.conversation.selected_account() else {
        renderer.render_error_banner("no account selected; use /accounts then /select first");
        return None;
    };
    let Some(instance) = session
        .conversation
        .instances()
        .iter()
        .find(|i| i.instance_id == *instance_id)
    else {
        renderer.render_error_banner(&format!("unknown instance {}", instance_id));
        return None;
    };
    Some((account_id.to_string(), instance.clone()))
}

async fn finish_action(
    renderer: &ChatRenderer,
    session: &Arc<Mutex<ChatSession>>,
    client: &ApiClient,
    bot_name: &str,
    report: ec2_chatops::workflow::ActionReport,
) {
    let follow_up = {
        let mut session = session.lock().await;
        session.conversation.report_action(&report)
    };
    render_new(renderer, session).await;
    schedule_follow_up(follow_up, Arc::clone(session), client.clone(), bot_name);
}

async fn run_deploy(
    client: &ApiClient,
    renderer: &ChatRenderer,
    session: &Arc<Mutex<ChatSession>>,
    bot_name: &str,
    args: &[&str],
    lines: &mut InputLines,
) {
    let Some((account_id, instance)) = wizard_context(renderer, session, args).await else {
        return;
    };

    let mut deployment = match AgentDeployment::begin(&account_id, instance) {
        Ok(deployment) => deployment,
        Err(e) => return renderer.render_error_banner(&e.to_string()),
    };

    if !confirmed(lines, &deployment.confirmation_prompt()).await {
        println!("Cancelled.");
        return;
    }
    if let Err(e) = deployment.confirm() {
        return renderer.render_error_banner(&e.to_string());
    }

    match deployment.execute(client).await {
        Ok(report) => finish_action(renderer, session, client, bot_name, report).await,
        Err(e) => renderer.render_error_banner(&e.to_string()),
    }
}

async fn run_alarms(
    client: &ApiClient,
    renderer: &ChatRenderer,
    session: &Arc<Mutex<ChatSession>>,
    bot_name: &str,
    args: &[&str],
    lines: &mut InputLines,
) {
    let Some((account_id, instance)) = wizard_context(renderer, session, args).await else {
        return;
    };

    let mut wizard = match AlarmWizard::begin(&account_id, instance) {
        Ok(wizard) => wizard,
        Err(e) => return renderer.render_error_banner(&e.to_string()),
    };

    let defaults = wizard.thresholds();
    println!(
        "Default thresholds: cpu {}%, memory {}%, disk {}%",
        defaults.cpu_percent, defaults.memory_percent, defaults.disk_percent
    );
    if let Some(reply) =
        read_reply(lines, "Custom thresholds as 'cpu memory disk', or Enter to accept: ").await
    {
        if !reply.is_empty() {
            match parse_thresholds(&reply) {
                Some(thresholds) => {
                    if let Err(e) = wizard.set_thresholds(thresholds) {
                        return renderer.render_error_banner(&e.to_string());
                    }
                }
                None => {
                    return renderer
                        .render_error_banner("expected three percentages, e.g. '80 80 85'")
                }
            }
        }
    }
    if let Err(e) = wizard.accept_configuration() {
        return renderer.render_error_banner(&e.to_string());
    }

    if !confirmed(lines, "Create the CloudWatch alarms?").await {
        println!("Cancelled.");
        return;
    }
    if let Err(e) = wizard.confirm() {
        return renderer.render_error_banner(&e.to_string());
    }

    match wizard.execute(client).await {
        Ok(report) => finish_action(renderer, session, client, bot_name, report).await,
        Err(e) => renderer.render_error_banner(&e.to_string()),
    }
}

fn parse_thresholds(input: &str) -> Option<AlarmThresholds> {
    let values: Vec<f64> = input
        .split_whitespace()
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match values[..] {
        [cpu, memory, disk] => Some(AlarmThresholds {
            cpu_percent: cpu,
            memory_percent: memory,
            disk_percent: disk,
        }),
        _ => None,
    }
}

async fn run_type_change(
    client: &ApiClient,
    renderer: &ChatRenderer,
    session: &Arc<Mutex<ChatSession>>,
    bot_name: &str,
    args: &[&str],
    lines: &mut InputLines,
) {
    let Some((account_id, instance)) = wizard_context(renderer, session, args).await else {
        return;
    };

    let mut wizard = match TypeChangeWizard::begin(&account_id, instance) {
        Ok(wizard) => wizard,
        Err(e) => return renderer.render_error_banner(&e.to_string()),
    };

    println!("Current type: {}", wizard.current_type());
    println!("Available: {}", wizard.available_types().join(", "));
    let Some(choice) = read_reply(lines, "New instance type: ").await else {
        return;
    };
    if let Err(e) = wizard.choose_type(&choice) {
        return renderer.render_error_banner(&e.to_string());
    }

    if !confirmed(lines, &wizard.confirmation_prompt()).await {
        println!("Cancelled.");
        return;
    }
    if let Err(e) = wizard.confirm() {
        return renderer.render_error_banner(&e.to_string());
    }

    match wizard.execute(client).await {
        Ok(report) => finish_action(renderer, session, client, bot_name, report).await,
        Err(e) => renderer.render_error_banner(&e.to_string()),
    }
}

async fn run_convert(
    client: &ApiClient,
    renderer: &ChatRenderer,
    session: &Arc<Mutex<ChatSession>>,
    bot_name: &str,
    args: &[&str],
    lines: &mut InputLines,
) {
    // `/convert region <region>` runs region-wide; `/convert <instance-id>`
    // scopes to one instance (and takes its region)
    let (account_id, region, scope) = match args {
        ["region", region, ..] => {
            let session = session.lock().await;
            let Some(account_id) = session.conversation.selected_account() else {
                return renderer
                    .render_error_banner("no account selected; use /accounts then /select first");
            };
            (account_id.to_string(), region.to_string(), ConversionScope::Region)
        }
        _ => {
            let Some((account_id, instance)) = wizard_context(renderer, session, args).await
            else {
                return;
            };
            let region = instance.region.clone();
            let scope = ConversionScope::Instance(instance.instance_id);
            (account_id, region, scope)
        }
    };

    let mut wizard = VolumeConversionWizard::new(&account_id, &region, scope);
    match wizard.discover(client).await {
        Ok(0) => {
            println!("No gp2 volumes found for {}.", region);
            return;
        }
        Ok(count) => println!("Found {} candidate volumes:", count),
        Err(e) => return renderer.render_error_banner(&e.to_string()),
    }
    renderer.render_volume_table(wizard.volumes(), wizard.selected());

    if let Some(reply) =
        read_reply(lines, "Volume ids to convert (space-separated), or Enter for selection: ")
            .await
    {
        if !reply.is_empty() {
            let ids: Vec<String> = reply.split_whitespace().map(str::to_string).collect();
            if let Err(e) = wizard.select(ids) {
                return renderer.render_error_banner(&e.to_string());
            }
        }
    }

    let parameters = match wizard.accept_selection() {
        Ok(parameters) => parameters,
        Err(e) => return renderer.render_error_banner(&e.to_string()),
    };
    println!(
        "gp3 parameters: {} IOPS, {} MiB/s throughput",
        parameters.iops, parameters.throughput
    );
    if let Some(reply) =
        read_reply(lines, "Override as 'iops throughput', or Enter to accept: ").await
    {
        if !reply.is_empty() {
            let values: Vec<u32> = reply
                .split_whitespace()
                .filter_map(|v| v.parse().ok())
                .collect();
            let (iops, throughput) = match values[..] {
                [iops, throughput] => (Some(iops), Some(throughput)),
                [iops] => (Some(iops), None),
                _ => (None, None),
            };
            match wizard.override_parameters(iops, throughput) {
                Ok(parameters) => println!(
                    "gp3 parameters: {} IOPS, {} MiB/s throughput",
                    parameters.iops, parameters.throughput
                ),
                Err(e) => return renderer.render_error_banner(&e.to_string()),
            }
        }
    }
    if let Err(e) = wizard.accept_configuration() {
        return renderer.render_error_banner(&e.to_string());
    }

    let question = format!(
        "Convert {} volumes to gp3? Estimated {}.",
        wizard.selected().len(),
        ec2_chatops::volumes::CONVERSION_TIME_ESTIMATE
    );
    if !confirmed(lines, &question).await {
        println!("Cancelled.");
        return;
    }
    if let Err(e) = wizard.confirm() {
        return renderer.render_error_banner(&e.to_string());
    }

    match wizard.execute(client).await {
        Ok(report) => finish_action(renderer, session, client, bot_name, report).await,
        Err(e) => renderer.render_error_banner(&e.to_string()),
    }
}

/// Spawn the deferred work a conversation turn asked for. The delay gives
/// the backend's asynchronous mutations time to land before re-discovery.
fn schedule_follow_up(
    follow_up: FollowUp,
    session: Arc<Mutex<ChatSession>>,
    client: ApiClient,
    bot_name: &str,
) {
    let bot_name = bot_name.to_string();
    match follow_up {
        FollowUp::None => {}
        FollowUp::ScheduleDiscovery(delay) => {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let renderer = ChatRenderer::new(&bot_name);
                let mut session = session.lock().await;
                session
                    .conversation
                    .begin_account_discovery(&client, Intent::GenericChat)
                    .await;
                for message in session.drain_new() {
                    renderer.render_message(&message);
                }
                prompt("> ");
            });
        }
        FollowUp::ScheduleRefresh(delay) => {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let renderer = ChatRenderer::new(&bot_name);
                let mut session = session.lock().await;
                match session.conversation.refresh_instances(&client).await {
                    Ok(()) => {
                        println!("(instance list refreshed)");
                        renderer.render_instance_table(session.conversation.instances());
                    }
                    Err(e) => warn!("Scheduled refresh failed: {}", e),
                }
                for message in session.drain_new() {
                    renderer.render_message(&message);
                }
                prompt("> ");
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ec2_chatops::config::ConversationConfig;
    use ec2_chatops::workflow::ActionReport;

    #[test]
    fn test_drain_new_tracks_messages_across_trimming() {
        let config = ConversationConfig {
            max_transcript: 2,
            ..ConversationConfig::default()
        };
        let mut session = ChatSession::new(Conversation::new(config));
        assert_eq!(session.drain_new().len(), 1); // welcome

        for headline in ["first", "second", "third"] {
            session.conversation.report_action(&ActionReport::success(headline));
        }
        // Three appended, two kept: render the survivors once, skip the
        // trimmed one, and never repeat
        let new = session.drain_new();
        assert_eq!(new.len(), 2);
        assert_eq!(new[0].text, "second");
        assert_eq!(new[1].text, "third");
        assert!(session.drain_new().is_empty());
    }

    #[test]
    fn test_drain_new_is_incremental() {
        let mut session = ChatSession::new(Conversation::new(ConversationConfig::default()));
        assert_eq!(session.drain_new().len(), 1);

        session
            .conversation
            .report_action(&ActionReport::success("agent deployment initiated"));
        let new = session.drain_new();
        assert_eq!(new.len(), 1);
        assert!(new[0].text.contains("deployment initiated"));
        assert!(session.drain_new().is_empty());
    }
}
