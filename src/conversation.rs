use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{AccountGroup, ChatBackend};
use crate::config::ConversationConfig;
use crate::error::{ConversationError, Result};
use crate::instances::{sort_for_display, Instance, InstanceSummary};
use crate::intent::{classify, Intent};
use crate::workflow::ActionReport;

/// Who authored a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

/// Structured payload embedded in a transcript message
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    None,
    AccountGroups(Vec<AccountGroup>),
    Instances {
        instances: Vec<Instance>,
        summary: InstanceSummary,
    },
}

/// Rendering kind of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    AccountGroups,
    InstancesTable,
}

/// One transcript entry. The transcript is append-only; the only in-place
/// mutation allowed is refreshing an embedded instance table payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    pub payload: MessagePayload,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn user(text: &str) -> Self {
        Self {
            sender: Sender::User,
            text: text.to_string(),
            payload: MessagePayload::None,
            timestamp: Utc::now(),
        }
    }

    fn bot(text: String) -> Self {
        Self {
            sender: Sender::Bot,
            text,
            payload: MessagePayload::None,
            timestamp: Utc::now(),
        }
    }

    fn bot_with_payload(text: String, payload: MessagePayload) -> Self {
        Self {
            sender: Sender::Bot,
            text,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self.payload {
            MessagePayload::None => MessageKind::Text,
            MessagePayload::AccountGroups(_) => MessageKind::AccountGroups,
            MessagePayload::Instances { .. } => MessageKind::InstancesTable,
        }
    }
}

/// Conversation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Welcome,
    AccountSelection,
    InstanceManagement,
}

/// Deferred work the caller should schedule after handling a turn.
///
/// Backend mutations and some chat replies decouple the conversational
/// response from a heavier discovery round-trip; the REPL owns the task
/// spawning so the conversation itself stays single-threaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    None,
    /// Re-trigger account discovery after the delay
    ScheduleDiscovery(Duration),
    /// Refresh the instance list after the delay
    ScheduleRefresh(Duration),
}

const APOLOGY: &str =
    "Sorry, I ran into a problem talking to the backend. Please try again in a moment.";

const WELCOME: &str = "Hi! I can help you discover instances across AWS accounts, \
configure CloudWatch agents, set up monitoring alarms, change instance types, and \
convert GP2 volumes to GP3. Try 'configure cloudwatch', 'set up alarms', \
'change instance type', or 'convert volumes'.";

/// Conversation state machine driving the chat session.
///
/// `Welcome -> AccountSelection -> InstanceManagement`; generic chat never
/// changes stage, and a failed discovery leaves the stage untouched (the
/// stage only advances after the data it needs has arrived).
pub struct Conversation {
    session_id: String,
    stage: Stage,
    transcript: Vec<Message>,
    /// Total messages ever appended; unlike the transcript length this
    /// never decreases when old entries are trimmed
    appended: u64,
    accounts: Vec<AccountGroup>,
    selected_account: Option<String>,
    instances: Vec<Instance>,
    config: ConversationConfig,
}

impl Conversation {
    pub fn new(config: ConversationConfig) -> Self {
        let mut conversation = Self {
            session_id: Uuid::new_v4().to_string(),
            stage: Stage::Welcome,
            transcript: Vec::new(),
            appended: 0,
            accounts: Vec::new(),
            selected_account: None,
            instances: Vec::new(),
            config,
        };
        conversation.append(Message::bot(WELCOME.to_string()));
        conversation
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Monotonic count of messages ever appended, for render watermarks
    pub fn total_appended(&self) -> u64 {
        self.appended
    }

    pub fn accounts(&self) -> &[AccountGroup] {
        &self.accounts
    }

    pub fn selected_account(&self) -> Option<&str> {
        self.selected_account.as_deref()
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Handle one user turn: classify the input, route action intents into
    /// account discovery, everything else into the chat endpoint.
    ///
    /// Empty or whitespace-only input is rejected before classification.
    pub async fn handle_input(
        &mut self,
        backend: &dyn ChatBackend,
        input: &str,
    ) -> Result<FollowUp> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ConversationError::EmptyInput.into());
        }

        self.append(Message::user(trimmed));

        let intent = classify(trimmed);
        info!("Classified input as {}", intent.as_str());

        if intent.is_action() {
            self.begin_account_discovery(backend, intent).await;
            return Ok(FollowUp::None);
        }

        match backend.send_message(&self.session_id, trimmed).await {
            Ok(reply) => {
                let triggers = reply.triggers_discovery();
                self.append(Message::bot(reply.message));
                if triggers {
                    // The conversational reply recognized an action intent;
                    // account discovery follows after a short delay.
                    return Ok(FollowUp::ScheduleDiscovery(self.config.refresh_delay()));
                }
                Ok(FollowUp::None)
            }
            Err(e) => {
                warn!("Chat turn failed: {}", e);
                self.append(Message::bot(APOLOGY.to_string()));
                Ok(FollowUp::None)
            }
        }
    }

    /// Fetch account groups and move to account selection. On failure the
    /// transcript gets an apology and the stage stays where it was.
    pub async fn begin_account_discovery(
        &mut self,
        backend: &dyn ChatBackend,
        intent: Intent,
    ) {
        match backend.discover_accounts().await {
            Ok(discovery) => {
                self.accounts = discovery.account_groups;
                let text = format!(
                    "{} You have {} accounts configured. Select an account to continue.",
                    intent_blurb(intent),
                    self.accounts.len()
                )
                .trim_start()
                .to_string();
                self.append(Message::bot_with_payload(
                    text,
                    MessagePayload::AccountGroups(self.accounts.clone()),
                ));
                self.stage = Stage::AccountSelection;
            }
            Err(e) => {
                warn!("Account discovery failed: {}", e);
                self.append(Message::bot(APOLOGY.to_string()));
            }
        }
    }

    /// Select an account and fetch its instances. Selection is exclusive;
    /// picking a new account replaces the previous one.
    pub async fn select_account(
        &mut self,
        backend: &dyn ChatBackend,
        account_id: &str,
    ) -> Result<()> {
        match backend.discover_instances(account_id, false).await {
            Ok(discovery) => {
                let mut instances = discovery.instances;
                sort_for_display(&mut instances);
                let summary = InstanceSummary::from_instances(&instances);

                self.append(Message::bot_with_payload(
                    summary_text(account_id, &summary),
                    MessagePayload::Instances {
                        instances: instances.clone(),
                        summary: summary.clone(),
                    },
                ));
                self.instances = instances;
                self.selected_account = Some(account_id.to_string());
                self.stage = Stage::InstanceManagement;
                Ok(())
            }
            Err(e) => {
                warn!("Instance discovery failed for {}: {}", account_id, e);
                self.append(Message::bot(APOLOGY.to_string()));
                Ok(())
            }
        }
    }

    /// Refresh the instance list for the selected account. The held list and
    /// the last embedded table payload are replaced together so the table
    /// view and the transcript stay consistent; no new message is appended.
    pub async fn refresh_instances(&mut self, backend: &dyn ChatBackend) -> Result<()> {
        let account_id = self
            .selected_account
            .clone()
            .ok_or(ConversationError::NoAccountSelected)?;

        match backend.discover_instances(&account_id, true).await {
            Ok(discovery) => {
                let mut instances = discovery.instances;
                sort_for_display(&mut instances);
                let summary = InstanceSummary::from_instances(&instances);

                if let Some(message) = self
                    .transcript
                    .iter_mut()
                    .rev()
                    .find(|m| m.kind() == MessageKind::InstancesTable)
                {
                    message.text = summary_text(&account_id, &summary);
                    message.payload = MessagePayload::Instances {
                        instances: instances.clone(),
                        summary: summary.clone(),
                    };
                }
                self.instances = instances;
                Ok(())
            }
            Err(e) => {
                warn!("Instance refresh failed for {}: {}", account_id, e);
                self.append(Message::bot(APOLOGY.to_string()));
                Ok(())
            }
        }
    }

    /// Fold a finished wizard result into the transcript and schedule the
    /// delayed refresh (backend mutations are asynchronous and won't show up
    /// in discovery immediately).
    pub fn report_action(&mut self, report: &ActionReport) -> FollowUp {
        let text = match (&report.detail, report.warning) {
            (Some(detail), true) => format!("⚠️ {} — {}", report.headline, detail),
            (Some(detail), false) => format!("{} ({})", report.headline, detail),
            (None, true) => format!("⚠️ {}", report.headline),
            (None, false) => report.headline.clone(),
        };
        self.append(Message::bot(text));
        FollowUp::ScheduleRefresh(self.config.refresh_delay())
    }

    fn append(&mut self, message: Message) {
        self.appended += 1;
        self.transcript.push(message);
        if self.config.max_transcript > 0 && self.transcript.len() > self.config.max_transcript {
            let excess = self.transcript.len() - self.config.max_transcript;
            self.transcript.drain(..excess);
        }
    }
}

fn intent_blurb(intent: Intent) -> &'static str {
    match intent {
        Intent::VolumeConversion => {
            "I'll help you convert volumes for cost savings and better performance! \
GP2 to GP3 can save up to 20% on storage costs."
        }
        Intent::InstanceTypeChange => {
            "I'll help you change instance types safely! Note that type changes \
require a stop/start cycle."
        }
        Intent::CloudWatchConfiguration => {
            "I'll scan your configured accounts for CloudWatch agent status."
        }
        Intent::AlarmConfiguration => {
            "I'll help you configure CloudWatch alarms for your instances."
        }
        Intent::GenericChat => "",
    }
}

fn summary_text(account_id: &str, summary: &InstanceSummary) -> String {
    format!(
        "Found {} instances in account {} ({} running): \
{} instances need CloudWatch agent installation, \
{} instances have CloudWatch agent configured, \
{} instances have alarms configured.",
        summary.total_instances,
        account_id,
        summary.running_instances,
        summary.unconfigured_instances,
        summary.configured_instances,
        summary.alarms_configured_instances
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AccountDiscovery, ApiResult, ConverseReply, InstanceDiscovery};
    use crate::error::ApiError;
    use crate::instances::InstanceState;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stub backend with canned data and per-call failure switches
    #[derive(Default)]
    struct StubBackend {
        instances: Vec<Instance>,
        fail_accounts: bool,
        fail_instances: bool,
        reply_intent: Option<Intent>,
        instance_calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatBackend for StubBackend {
        async fn send_message(
            &self,
            _session_id: &str,
            _message: &str,
        ) -> ApiResult<ConverseReply> {
            Ok(ConverseReply {
                message: "Hi! I can help with CloudWatch.".to_string(),
                intent: self.reply_intent,
                action: self
                    .reply_intent
                    .map(|_| "trigger_discovery".to_string()),
                suggestions: vec![],
                account_count: Some(1),
            })
        }

        async fn discover_accounts(&self) -> ApiResult<AccountDiscovery> {
            if self.fail_accounts {
                return Err(ApiError::Network {
                    message: "connection refused".to_string(),
                });
            }
            Ok(AccountDiscovery {
                account_groups: vec![account("111122223333")],
                total_accounts: 1,
                message: None,
            })
        }

        async fn discover_instances(
            &self,
            _account_id: &str,
            _force_refresh: bool,
        ) -> ApiResult<InstanceDiscovery> {
            self.instance_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_instances {
                return Err(ApiError::Http {
                    status: 500,
                    message: "assume role failed".to_string(),
                });
            }
            Ok(InstanceDiscovery {
                instances: self.instances.clone(),
                summary: InstanceSummary::from_instances(&self.instances),
                account_id: Some("111122223333".to_string()),
                discovered_at: None,
            })
        }
    }

    fn account(id: &str) -> AccountGroup {
        AccountGroup {
            account_id: id.to_string(),
            group_name: Some("Prod".to_string()),
            account_name: None,
            environment: None,
            owner: None,
            description: None,
            configured_instances: 0,
            unconfigured_instances: 0,
            total_instances: 0,
            cloudwatch_agent_status: None,
        }
    }

    fn instance(id: &str, agent: bool) -> Instance {
        Instance {
            instance_id: id.to_string(),
            instance_name: "No Name".to_string(),
            state: InstanceState::Running,
            region: "us-east-1".to_string(),
            platform: "linux".to_string(),
            instance_type: "t3.micro".to_string(),
            launch_time: None,
            cloudwatch_configured: agent,
            cloudwatch_display: None,
            cloudwatch_status: None,
            action_needed: !agent,
            alarms_configured: false,
        }
    }

    #[tokio::test]
    async fn test_empty_input_rejected_before_classification() {
        let mut conversation = Conversation::new(ConversationConfig::default());
        let backend = StubBackend::default();
        let before = conversation.transcript().len();
        assert!(conversation.handle_input(&backend, "   ").await.is_err());
        assert_eq!(conversation.transcript().len(), before);
        assert_eq!(conversation.stage(), Stage::Welcome);
    }

    #[tokio::test]
    async fn test_action_intent_advances_to_account_selection() {
        let mut conversation = Conversation::new(ConversationConfig::default());
        let backend = StubBackend::default();
        let follow_up = conversation
            .handle_input(&backend, "configure cloudwatch")
            .await
            .unwrap();
        assert_eq!(follow_up, FollowUp::None);
        assert_eq!(conversation.stage(), Stage::AccountSelection);
        assert_eq!(conversation.accounts().len(), 1);
        let last = conversation.transcript().last().unwrap();
        assert_eq!(last.kind(), MessageKind::AccountGroups);
    }

    #[tokio::test]
    async fn test_discovery_failure_appends_apology_stage_unchanged() {
        let mut conversation = Conversation::new(ConversationConfig::default());
        let backend = StubBackend {
            fail_accounts: true,
            ..Default::default()
        };
        conversation
            .handle_input(&backend, "configure cloudwatch")
            .await
            .unwrap();
        assert_eq!(conversation.stage(), Stage::Welcome);
        let last = conversation.transcript().last().unwrap();
        assert_eq!(last.sender, Sender::Bot);
        assert!(last.text.contains("Sorry"));
    }

    #[tokio::test]
    async fn test_generic_chat_never_changes_stage() {
        let mut conversation = Conversation::new(ConversationConfig::default());
        let backend = StubBackend::default();
        let follow_up = conversation
            .handle_input(&backend, "hello there")
            .await
            .unwrap();
        assert_eq!(follow_up, FollowUp::None);
        assert_eq!(conversation.stage(), Stage::Welcome);
    }

    #[tokio::test]
    async fn test_chat_reply_with_intent_schedules_discovery() {
        let mut conversation = Conversation::new(ConversationConfig::default());
        let backend = StubBackend {
            // Input classifies as generic locally, but the backend's own
            // classifier recognized an intent in the reply
            reply_intent: Some(Intent::CloudWatchConfiguration),
            ..Default::default()
        };
        let follow_up = conversation
            .handle_input(&backend, "help me please")
            .await
            .unwrap();
        assert!(matches!(follow_up, FollowUp::ScheduleDiscovery(_)));
        // Stage does not advance until the discovery actually runs
        assert_eq!(conversation.stage(), Stage::Welcome);
    }

    #[tokio::test]
    async fn test_select_account_reports_counts() {
        let mut conversation = Conversation::new(ConversationConfig::default());
        let backend = StubBackend {
            instances: vec![instance("i-1", true), instance("i-2", false)],
            ..Default::default()
        };
        conversation
            .select_account(&backend, "111122223333")
            .await
            .unwrap();

        assert_eq!(conversation.stage(), Stage::InstanceManagement);
        assert_eq!(conversation.selected_account(), Some("111122223333"));
        let last = conversation.transcript().last().unwrap();
        assert_eq!(last.kind(), MessageKind::InstancesTable);
        assert!(last
            .text
            .contains("1 instances need CloudWatch agent installation"));
        assert!(last
            .text
            .contains("1 instances have CloudWatch agent configured"));
        // Unconfigured instance sorts first
        assert_eq!(conversation.instances()[0].instance_id, "i-2");
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent_and_updates_payload_in_place() {
        let mut conversation = Conversation::new(ConversationConfig::default());
        let backend = StubBackend {
            instances: vec![instance("i-1", true), instance("i-2", false)],
            ..Default::default()
        };
        conversation
            .select_account(&backend, "111122223333")
            .await
            .unwrap();
        let transcript_len = conversation.transcript().len();
        let list_before = conversation.instances().to_vec();

        conversation.refresh_instances(&backend).await.unwrap();
        conversation.refresh_instances(&backend).await.unwrap();

        // Same backend data: identical list, no duplicated messages
        assert_eq!(conversation.instances(), &list_before[..]);
        assert_eq!(conversation.transcript().len(), transcript_len);

        // Embedded payload stays consistent with the held list
        let table = conversation
            .transcript()
            .iter()
            .rev()
            .find(|m| m.kind() == MessageKind::InstancesTable)
            .unwrap();
        match &table.payload {
            MessagePayload::Instances { instances, .. } => {
                assert_eq!(instances, conversation.instances());
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert_eq!(backend.instance_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_refresh_without_account_is_an_error() {
        let mut conversation = Conversation::new(ConversationConfig::default());
        let backend = StubBackend::default();
        assert!(conversation.refresh_instances(&backend).await.is_err());
    }

    #[tokio::test]
    async fn test_report_action_schedules_refresh() {
        let mut conversation = Conversation::new(ConversationConfig::default());
        let report = ActionReport::success("CloudWatch agent deployment initiated on i-1");
        let follow_up = conversation.report_action(&report);
        assert!(matches!(follow_up, FollowUp::ScheduleRefresh(_)));
        assert!(conversation
            .transcript()
            .last()
            .unwrap()
            .text
            .contains("deployment initiated"));
    }

    #[tokio::test]
    async fn test_partial_warning_rendering() {
        let mut conversation = Conversation::new(ConversationConfig::default());
        let report = ActionReport::warning(
            "Some alarms could not be configured for i-1",
            "2 of 4 alarms created",
        );
        conversation.report_action(&report);
        let last = conversation.transcript().last().unwrap();
        assert!(last.text.starts_with("⚠️"));
        assert!(last.text.contains("2 of 4"));
    }

    #[test]
    fn test_append_count_survives_transcript_trimming() {
        let config = ConversationConfig {
            max_transcript: 2,
            ..ConversationConfig::default()
        };
        let mut conversation = Conversation::new(config);
        assert_eq!(conversation.total_appended(), 1); // welcome

        for headline in ["first", "second", "third"] {
            conversation.report_action(&ActionReport::success(headline));
        }
        // Oldest entries are trimmed; the counter keeps growing
        assert_eq!(conversation.transcript().len(), 2);
        assert_eq!(conversation.total_appended(), 4);
        assert_eq!(conversation.transcript().last().unwrap().text, "third");
    }

    #[test]
    fn test_session_id_is_unique_per_mount() {
        let a = Conversation::new(ConversationConfig::default());
        let b = Conversation::new(ConversationConfig::default());
        assert_ne!(a.session_id(), b.session_id());
    }
}
