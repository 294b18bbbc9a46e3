use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::instances::{Instance, InstanceSummary};
use crate::intent::Intent;
use crate::volumes::{ConversionSummary, Volume};

/// Result type for API boundary operations
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Canonical outcome for operations that may report partial success.
///
/// Partial success (HTTP 207 or a `partialSuccess` marker) is a distinct,
/// non-fatal outcome and is never folded into the error path.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome<T> {
    Ok(T),
    Partial { value: T, message: String },
}

impl<T> ApiOutcome<T> {
    pub fn value(&self) -> &T {
        match self {
            ApiOutcome::Ok(value) => value,
            ApiOutcome::Partial { value, .. } => value,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, ApiOutcome::Partial { .. })
    }
}

/// HTTP client for the CloudWatch bot backend.
///
/// The backend grew two envelope conventions (`{status:"success", data:{..}}`
/// and `{success:true, ...}` inline); both are normalized here so the rest of
/// the crate only sees typed payloads. Configured timeouts are enforced on
/// the underlying client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ApiError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.resolve(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a chat turn to the conversational endpoint
    pub async fn send_message(&self, session_id: &str, message: &str) -> ApiResult<ConverseReply> {
        require_field("session_id", session_id)?;
        require_field("message", message)?;

        debug!("Sending chat turn for session {}", session_id);
        let body = serde_json::json!({
            "session_id": session_id,
            "message": message,
        });
        let normalized = self.post("/api/converse", &body).await?;
        decode(normalized.value)
    }

    /// Discover configured account groups
    pub async fn discover_accounts(&self) -> ApiResult<AccountDiscovery> {
        info!("Discovering account groups");
        let normalized = self.get("/api/discover-accounts").await?;
        let discovery: AccountDiscovery = decode(normalized.value)?;
        info!("Discovered {} account groups", discovery.account_groups.len());
        Ok(discovery)
    }

    /// Discover instances for one account, optionally bypassing server caches
    pub async fn discover_instances(
        &self,
        account_id: &str,
        force_refresh: bool,
    ) -> ApiResult<InstanceDiscovery> {
        require_field("accountId", account_id)?;

        info!(
            "Discovering instances for account {} (force_refresh={})",
            account_id, force_refresh
        );
        let mut path = format!("/api/discover-instances/{}", account_id);
        if force_refresh {
            path.push_str("?force_refresh=true");
        }
        let normalized = self.get(&path).await?;
        let discovery: InstanceDiscovery = decode(normalized.value)?;
        info!(
            "Discovered {} instances for account {}",
            discovery.instances.len(),
            account_id
        );
        Ok(discovery)
    }

    /// Start CloudWatch agent deployment on an instance
    pub async fn deploy_cloudwatch_agent(
        &self,
        request: &DeployAgentRequest,
    ) -> ApiResult<DeploymentStarted> {
        require_field("instanceId", &request.instance_id)?;
        require_field("accountId", &request.account_id)?;
        require_field("region", &request.region)?;

        info!(
            "Deploying CloudWatch agent on {} (account {}, region {})",
            request.instance_id, request.account_id, request.region
        );
        let body = serde_json::to_value(request).map_err(envelope_err)?;
        let normalized = self.post("/api/deploy-cloudwatch-agent", &body).await?;
        decode(normalized.value)
    }

    /// Configure CloudWatch alarms for an instance.
    ///
    /// HTTP 207 from the backend means some alarms were created and some were
    /// not; that surfaces as `ApiOutcome::Partial`, not an error.
    pub async fn configure_alarms(
        &self,
        request: &AlarmRequest,
    ) -> ApiResult<ApiOutcome<AlarmConfigReport>> {
        require_field("instanceId", &request.instance_id)?;
        require_field("accountId", &request.account_id)?;
        require_field("region", &request.region)?;

        info!(
            "Configuring alarms for {} (account {})",
            request.instance_id, request.account_id
        );
        let body = serde_json::to_value(request).map_err(envelope_err)?;
        let normalized = self.post("/api/configure-alarms", &body).await?;

        let report: AlarmConfigReport = decode(normalized.value)?;
        if normalized.partial {
            let message = normalized
                .message
                .unwrap_or_else(|| "Some alarms could not be configured".to_string());
            warn!(
                "Partial alarm configuration for {}: {}",
                request.instance_id, message
            );
            return Ok(ApiOutcome::Partial {
                value: report,
                message,
            });
        }
        Ok(ApiOutcome::Ok(report))
    }

    /// Initiate an instance type change (asynchronous on the backend)
    pub async fn change_instance_type(
        &self,
        request: &TypeChangeRequest,
    ) -> ApiResult<TypeChangeStarted> {
        require_field("instanceId", &request.instance_id)?;
        require_field("accountId", &request.account_id)?;
        require_field("region", &request.region)?;
        require_field("newInstanceType", &request.new_instance_type)?;

        info!(
            "Changing instance type of {} to {}",
            request.instance_id, request.new_instance_type
        );
        let body = serde_json::to_value(request).map_err(envelope_err)?;
        let normalized = self.post("/api/change-instance-type", &body).await?;
        decode(normalized.value)
    }

    /// Discover convertible volumes, scoped to one instance or a whole region
    pub async fn find_gp2_volumes(
        &self,
        request: &VolumeDiscoveryRequest,
    ) -> ApiResult<VolumeDiscovery> {
        require_field("accountId", &request.account_id)?;
        require_field("region", &request.region)?;

        info!(
            "Finding {} volumes in account {} ({})",
            request.volume_type_filter,
            request.account_id,
            request
                .instance_id
                .as_deref()
                .unwrap_or("region-wide")
        );
        let body = serde_json::to_value(request).map_err(envelope_err)?;
        let normalized = self.post("/api/find-gp2-volumes", &body).await?;
        let discovery: VolumeDiscovery = decode(normalized.value)?;
        info!("Found {} candidate volumes", discovery.volumes.len());
        Ok(discovery)
    }

    /// Start conversion of one volume to gp3
    pub async fn convert_volume(
        &self,
        request: &VolumeConversionRequest,
    ) -> ApiResult<VolumeConversionStarted> {
        require_field("accountId", &request.account_id)?;
        require_field("region", &request.region)?;
        require_field("volumeId", &request.volume_id)?;

        info!("Converting volume {} to gp3", request.volume_id);
        let body = serde_json::to_value(request).map_err(envelope_err)?;
        let normalized = self.post("/api/convert-volume-universal", &body).await?;
        decode(normalized.value)
    }

    /// Convert a batch of volumes, one backend call per volume, and aggregate
    /// the result. Individual failures do not abort the batch.
    pub async fn convert_volumes(
        &self,
        account_id: &str,
        region: &str,
        volume_ids: &[String],
        target_iops: Option<u32>,
        target_throughput: Option<u32>,
    ) -> ApiResult<BatchConversionResult> {
        require_field("accountId", account_id)?;
        require_field("region", region)?;
        if volume_ids.is_empty() {
            return Err(ApiError::Validation {
                field: "volumeIds".to_string(),
            });
        }

        info!(
            "Starting batch conversion of {} volumes in account {}",
            volume_ids.len(),
            account_id
        );

        let mut failures = Vec::new();
        let mut successful = 0usize;
        for volume_id in volume_ids {
            let request = VolumeConversionRequest {
                account_id: account_id.to_string(),
                region: region.to_string(),
                volume_id: volume_id.clone(),
                target_iops,
                target_throughput,
            };
            match self.convert_volume(&request).await {
                Ok(_) => successful += 1,
                Err(e) => {
                    warn!("Conversion failed for {}: {}", volume_id, e);
                    failures.push(VolumeFailure {
                        volume_id: volume_id.clone(),
                        error: e,
                    });
                }
            }
        }

        let summary = ConversionSummary {
            successful_conversions: successful,
            failed_conversions: failures.len(),
            total_volumes: volume_ids.len(),
        };
        info!(
            "Batch conversion finished: {}/{} succeeded",
            summary.successful_conversions, summary.total_volumes
        );
        Ok(BatchConversionResult { summary, failures })
    }

    /// Check progress of recent volume modifications
    pub async fn check_volume_conversion_status(
        &self,
        account_id: &str,
        region: &str,
        volume_ids: &[String],
    ) -> ApiResult<Vec<VolumeModification>> {
        require_field("accountId", account_id)?;
        require_field("region", region)?;

        debug!(
            "Checking volume conversion status in account {} ({} volumes)",
            account_id,
            volume_ids.len()
        );
        let body = serde_json::json!({
            "accountId": account_id,
            "region": region,
            "volumeIds": volume_ids,
        });
        let normalized = self.post("/api/check-volume-conversion-status", &body).await?;
        let report: ModificationReport = decode(normalized.value)?;
        Ok(report.modifications)
    }

    /// Poll the current state of one instance (used after type changes)
    pub async fn instance_status(
        &self,
        account_id: &str,
        instance_id: &str,
        region: &str,
    ) -> ApiResult<InstanceStatus> {
        require_field("accountId", account_id)?;
        require_field("instanceId", instance_id)?;
        require_field("region", region)?;

        debug!("Checking status of {} in account {}", instance_id, account_id);
        let path = format!(
            "/api/instance-status/{}/{}?region={}",
            account_id, instance_id, region
        );
        let normalized = self.get(&path).await?;
        decode(normalized.value)
    }

    /// Backend health check, invoked explicitly at startup or on demand
    pub async fn health_check(&self) -> ApiResult<HealthReport> {
        debug!("Running backend health check");
        let normalized = self.get("/api/health").await?;
        decode(normalized.value)
    }

    async fn get(&self, path: &str) -> ApiResult<Normalized> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).send().await.map_err(transport_err)?;
        Self::read(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> ApiResult<Normalized> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport_err)?;
        Self::read(response).await
    }

    async fn read(response: reqwest::Response) -> ApiResult<Normalized> {
        let status = response.status();
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                return Err(ApiError::Envelope {
                    message: format!("Response body was not JSON: {}", e),
                })
            }
            // Non-JSON error body: fall back to the HTTP status text
            Err(_) => Value::Null,
        };
        normalize_envelope(status, body)
    }
}

/// Internal normalized response: unwrapped payload plus partial-success flag
#[derive(Debug, Clone)]
struct Normalized {
    value: Value,
    partial: bool,
    message: Option<String>,
}

/// Adapt both server envelope conventions into one shape.
///
/// Accepted success shapes:
///   `{"status": "success", "data": {...}}` (payload under `data`)
///   `{"success": true, ...}` (payload inline)
///   any other 2xx object (payload as-is, e.g. account discovery)
/// HTTP 207 or `partialSuccess: true` marks partial success.
fn normalize_envelope(status: StatusCode, body: Value) -> ApiResult<Normalized> {
    let partial = status.as_u16() == 207
        || body
            .get("partialSuccess")
            .and_then(Value::as_bool)
            .unwrap_or(false);
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);

    if !status.is_success() && !partial {
        return Err(ApiError::Http {
            status: status.as_u16(),
            message: server_error_text(&body)
                .unwrap_or_else(|| http_status_text(status)),
        });
    }

    // {status: "success"/"error", data: ...} convention
    let envelope_status = body
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_string);
    if let Some(envelope_status) = envelope_status {
        match envelope_status.as_str() {
            "error" => {
                return Err(ApiError::Http {
                    status: status.as_u16(),
                    message: server_error_text(&body)
                        .unwrap_or_else(|| "Request failed".to_string()),
                });
            }
            "success" => {
                let value = body.get("data").cloned().unwrap_or(body);
                return Ok(Normalized {
                    value,
                    partial,
                    message,
                });
            }
            // e.g. health reports {"status": "healthy"}; fall through
            _ => {}
        }
    }

    // {success: bool, ...} convention
    if let Some(success) = body.get("success").and_then(Value::as_bool) {
        if !success && !partial {
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: server_error_text(&body)
                    .unwrap_or_else(|| "Request failed".to_string()),
            });
        }
    }

    Ok(Normalized {
        value: body,
        partial,
        message,
    })
}

fn server_error_text(body: &Value) -> Option<String> {
    body.get("error")
        .and_then(Value::as_str)
        .or_else(|| body.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

fn http_status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

fn transport_err(err: reqwest::Error) -> ApiError {
    ApiError::Network {
        message: err.to_string(),
    }
}

fn envelope_err(err: serde_json::Error) -> ApiError {
    ApiError::Envelope {
        message: err.to_string(),
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> ApiResult<T> {
    serde_json::from_value(value).map_err(envelope_err)
}

fn require_field(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// The slice of the backend the conversation state machine depends on.
///
/// Split out as a trait so the conversation can be exercised against a stub
/// backend in tests; `ApiClient` is the production implementation.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send_message(&self, session_id: &str, message: &str) -> ApiResult<ConverseReply>;

    async fn discover_accounts(&self) -> ApiResult<AccountDiscovery>;

    async fn discover_instances(
        &self,
        account_id: &str,
        force_refresh: bool,
    ) -> ApiResult<InstanceDiscovery>;
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn send_message(&self, session_id: &str, message: &str) -> ApiResult<ConverseReply> {
        ApiClient::send_message(self, session_id, message).await
    }

    async fn discover_accounts(&self) -> ApiResult<AccountDiscovery> {
        ApiClient::discover_accounts(self).await
    }

    async fn discover_instances(
        &self,
        account_id: &str,
        force_refresh: bool,
    ) -> ApiResult<InstanceDiscovery> {
        ApiClient::discover_instances(self, account_id, force_refresh).await
    }
}

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

/// Account group as stored by the backend registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountGroup {
    #[serde(rename = "AccountID")]
    pub account_id: String,

    #[serde(default)]
    pub group_name: Option<String>,

    #[serde(default)]
    pub account_name: Option<String>,

    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub owner: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub configured_instances: u64,

    #[serde(rename = "UnConfiguredInstances", default)]
    pub unconfigured_instances: u64,

    #[serde(default)]
    pub total_instances: u64,

    /// CloudWatch agent rollout state for the group, when known
    #[serde(rename = "CloudWatchAgentStatus", default)]
    pub cloudwatch_agent_status: Option<String>,
}

impl AccountGroup {
    pub fn display_name(&self) -> String {
        match (&self.account_name, &self.group_name) {
            (Some(name), _) => format!("{} ({})", name, self.account_id),
            (None, Some(group)) => format!("{} ({})", group, self.account_id),
            (None, None) => self.account_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDiscovery {
    #[serde(default)]
    pub account_groups: Vec<AccountGroup>,

    #[serde(default)]
    pub total_accounts: usize,

    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDiscovery {
    #[serde(default)]
    pub instances: Vec<Instance>,

    #[serde(default)]
    pub summary: InstanceSummary,

    #[serde(default)]
    pub account_id: Option<String>,

    #[serde(default)]
    pub discovered_at: Option<String>,
}

/// Reply from the conversational endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseReply {
    pub message: String,

    /// Intent tag when the backend recognized one; unknown tags are dropped
    #[serde(default, deserialize_with = "lenient_intent")]
    pub intent: Option<Intent>,

    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    pub suggestions: Vec<String>,

    #[serde(default)]
    pub account_count: Option<u64>,
}

impl ConverseReply {
    /// Whether the reply asks the client to kick off account discovery
    pub fn triggers_discovery(&self) -> bool {
        self.action.as_deref() == Some("trigger_discovery")
            || self.intent.map(|i| i.is_action()).unwrap_or(false)
    }
}

fn lenient_intent<'de, D>(deserializer: D) -> std::result::Result<Option<Intent>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployAgentRequest {
    pub instance_id: String,
    pub account_id: String,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStarted {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub command_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRequest {
    pub instance_id: String,
    pub account_id: String,
    pub region: String,
    pub platform: String,
    pub instance_name: String,
    pub alarm_config: crate::alarms::AlarmThresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmConfigReport {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub instance_id: Option<String>,

    #[serde(default)]
    pub instance_name: Option<String>,

    #[serde(default)]
    pub alarm_details: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeChangeRequest {
    pub instance_id: String,
    pub account_id: String,
    pub region: String,
    pub new_instance_type: String,
    pub instance_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeChangeStarted {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub new_instance_type: Option<String>,

    #[serde(default)]
    pub estimated_completion: Option<String>,

    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeDiscoveryRequest {
    pub account_id: String,
    pub region: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    pub volume_type_filter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeDiscovery {
    #[serde(default)]
    pub volumes: Vec<Volume>,

    #[serde(default)]
    pub summary: Option<Value>,

    #[serde(default)]
    pub discovery_scope: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeConversionRequest {
    pub account_id: String,
    pub region: String,
    pub volume_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_iops: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_throughput: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeConversionStarted {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub volume_details: Option<Value>,

    #[serde(default)]
    pub conversion_details: Option<Value>,
}

/// One failed volume in a batch conversion
#[derive(Debug, Clone)]
pub struct VolumeFailure {
    pub volume_id: String,
    pub error: ApiError,
}

/// Aggregate outcome of a batch conversion
#[derive(Debug, Clone)]
pub struct BatchConversionResult {
    pub summary: ConversionSummary,
    pub failures: Vec<VolumeFailure>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModificationReport {
    #[serde(default)]
    modifications: Vec<VolumeModification>,
}

/// In-flight EBS volume modification as reported by the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeModification {
    pub volume_id: String,

    #[serde(default)]
    pub modification_state: Option<String>,

    #[serde(default)]
    pub progress: Option<u64>,

    #[serde(default)]
    pub target_volume_type: Option<String>,

    #[serde(default)]
    pub original_volume_type: Option<String>,
}

impl VolumeModification {
    /// Whether the modification has settled (completed or failed)
    pub fn is_settled(&self) -> bool {
        matches!(
            self.modification_state.as_deref(),
            Some("completed") | Some("failed") | None
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    pub instance_id: String,
    pub state: String,
    pub instance_type: String,
}

/// Backend health report (`/api/health`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,

    #[serde(default)]
    pub service: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub aws_region: Option<String>,

    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub features: Option<Value>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
