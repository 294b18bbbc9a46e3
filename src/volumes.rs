use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{ApiClient, VolumeDiscoveryRequest};
use crate::error::{ApiError, ChatOpsError, Result, WorkflowError};
use crate::workflow::{ActionReport, Workflow, WorkflowState};

/// EBS volume as reported by volume discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub volume_id: String,

    #[serde(default = "default_volume_type")]
    pub volume_type: String,

    /// Size in GiB
    #[serde(default)]
    pub size: u64,

    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub availability_zone: Option<String>,

    #[serde(default)]
    pub encrypted: bool,

    #[serde(default)]
    pub attached_instance_id: Option<String>,

    #[serde(default)]
    pub iops: Option<u32>,

    #[serde(default)]
    pub throughput: Option<u32>,
}

fn default_volume_type() -> String {
    "gp2".to_string()
}

/// Whether a volume conversion targets one instance's volumes or a region
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionScope {
    Instance(String),
    Region,
}

impl ConversionScope {
    pub fn describe(&self) -> String {
        match self {
            ConversionScope::Instance(id) => format!("volumes attached to {}", id),
            ConversionScope::Region => "all volumes in the region".to_string(),
        }
    }
}

/// Static expected-benefit entry used to pre-select volumes worth converting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionBenefit {
    pub recommended: bool,
    pub note: &'static str,
}

/// Expected benefit of converting a volume of the given type to gp3
pub fn conversion_benefit(volume_type: &str) -> ConversionBenefit {
    match volume_type.to_lowercase().as_str() {
        "gp2" => ConversionBenefit {
            recommended: true,
            note: "Up to 20% storage cost savings with better baseline performance",
        },
        "io1" | "io2" => ConversionBenefit {
            recommended: true,
            note: "Significant cost reduction for all but the highest IOPS workloads",
        },
        "standard" | "magnetic" => ConversionBenefit {
            recommended: true,
            note: "Large performance improvement over magnetic storage",
        },
        "gp3" => ConversionBenefit {
            recommended: false,
            note: "Already gp3; nothing to convert",
        },
        _ => ConversionBenefit {
            recommended: false,
            note: "Review manually before converting",
        },
    }
}

// gp3 service limits
pub const GP3_MIN_IOPS: u32 = 3000;
pub const GP3_MAX_IOPS: u32 = 16_000;
pub const GP3_MIN_THROUGHPUT: u32 = 125;
pub const GP3_MAX_THROUGHPUT: u32 = 1000;

/// Fixed time estimate surfaced while a conversion batch is executing
pub const CONVERSION_TIME_ESTIMATE: &str = "5-15 minutes per volume";

/// gp3 performance parameters for a conversion batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gp3Parameters {
    pub iops: u32,
    pub throughput: u32,
}

impl Gp3Parameters {
    /// Default parameters derived from the average size of the selected
    /// volumes: `iops = clamp(size * 3, 3000, 16000)` and
    /// `throughput = clamp(iops / 4, 125, 1000)`.
    pub fn from_average_size(avg_size_gib: f64) -> Self {
        let iops = ((avg_size_gib * 3.0) as u32).clamp(GP3_MIN_IOPS, GP3_MAX_IOPS);
        let throughput = (iops / 4).clamp(GP3_MIN_THROUGHPUT, GP3_MAX_THROUGHPUT);
        Self { iops, throughput }
    }

    pub fn set_iops(&mut self, iops: u32) -> std::result::Result<(), WorkflowError> {
        if !(GP3_MIN_IOPS..=GP3_MAX_IOPS).contains(&iops) {
            return Err(WorkflowError::ParameterOutOfRange {
                name: "iops".to_string(),
                value: iops as i64,
                min: GP3_MIN_IOPS as i64,
                max: GP3_MAX_IOPS as i64,
            });
        }
        self.iops = iops;
        Ok(())
    }

    pub fn set_throughput(&mut self, throughput: u32) -> std::result::Result<(), WorkflowError> {
        if !(GP3_MIN_THROUGHPUT..=GP3_MAX_THROUGHPUT).contains(&throughput) {
            return Err(WorkflowError::ParameterOutOfRange {
                name: "throughput".to_string(),
                value: throughput as i64,
                min: GP3_MIN_THROUGHPUT as i64,
                max: GP3_MAX_THROUGHPUT as i64,
            });
        }
        self.throughput = throughput;
        Ok(())
    }
}

/// Aggregate conversion counts for a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionSummary {
    pub successful_conversions: usize,
    pub failed_conversions: usize,
    pub total_volumes: usize,
}

/// GP2 to GP3 conversion wizard.
///
/// Walks the shared workflow: discover candidate volumes for the chosen
/// scope, pre-select the ones the benefit table recommends, derive gp3
/// parameters from the selection, require explicit confirmation, then run
/// the batch and hand an `ActionReport` back to the conversation.
#[derive(Debug, Clone)]
pub struct VolumeConversionWizard {
    workflow: Workflow,
    account_id: String,
    region: String,
    scope: ConversionScope,
    source_type: String,
    volumes: Vec<Volume>,
    selected: Vec<String>,
    parameters: Option<Gp3Parameters>,
}

impl VolumeConversionWizard {
    pub fn new(account_id: &str, region: &str, scope: ConversionScope) -> Self {
        Self {
            workflow: Workflow::new(),
            account_id: account_id.to_string(),
            region: region.to_string(),
            scope,
            source_type: "gp2".to_string(),
            volumes: Vec::new(),
            selected: Vec::new(),
            parameters: None,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        self.workflow.state()
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn parameters(&self) -> Option<Gp3Parameters> {
        self.parameters
    }

    /// Discovery step: read-only volume query scoped by the chosen filter.
    /// Pre-selects recommended volumes, falling back to all of them.
    pub async fn discover(&mut self, client: &ApiClient) -> Result<usize> {
        info!(
            "Volume discovery for account {} ({})",
            self.account_id,
            self.scope.describe()
        );

        let request = VolumeDiscoveryRequest {
            account_id: self.account_id.clone(),
            region: self.region.clone(),
            instance_id: match &self.scope {
                ConversionScope::Instance(id) => Some(id.clone()),
                ConversionScope::Region => None,
            },
            volume_type_filter: self.source_type.clone(),
        };

        match client.find_gp2_volumes(&request).await {
            Ok(discovery) => {
                self.volumes = discovery.volumes;
                self.selected = default_selection(&self.volumes);
                self.workflow.items_discovered()?;
                Ok(self.volumes.len())
            }
            Err(e) => {
                let err = ChatOpsError::from(e);
                self.workflow.failed(err.user_message())?;
                Err(err)
            }
        }
    }

    /// Selection step: replace the pre-selected subset
    pub fn select(&mut self, volume_ids: Vec<String>) -> Result<()> {
        if volume_ids.is_empty() {
            return Err(WorkflowError::NothingSelected.into());
        }
        let unknown: Vec<&String> = volume_ids
            .iter()
            .filter(|id| !self.volumes.iter().any(|v| &v.volume_id == *id))
            .collect();
        if let Some(id) = unknown.first() {
            return Err(ChatOpsError::Workflow(WorkflowError::InvalidTransition {
                from: "selection".to_string(),
                to: format!("unknown volume {}", id),
            }));
        }
        self.selected = volume_ids;
        Ok(())
    }

    /// Accept the selection and compute default gp3 parameters from the
    /// average selected size
    pub fn accept_selection(&mut self) -> Result<Gp3Parameters> {
        if self.selected.is_empty() {
            return Err(WorkflowError::NothingSelected.into());
        }
        self.workflow.selection_made()?;

        let sizes: Vec<u64> = self
            .volumes
            .iter()
            .filter(|v| self.selected.contains(&v.volume_id))
            .map(|v| v.size)
            .collect();
        let avg = if sizes.is_empty() {
            0.0
        } else {
            sizes.iter().sum::<u64>() as f64 / sizes.len() as f64
        };
        let parameters = Gp3Parameters::from_average_size(avg);
        self.parameters = Some(parameters);
        Ok(parameters)
    }

    /// Configuration step: manual override within gp3 bounds
    pub fn override_parameters(
        &mut self,
        iops: Option<u32>,
        throughput: Option<u32>,
    ) -> Result<Gp3Parameters> {
        let mut parameters = self
            .parameters
            .ok_or(WorkflowError::NothingSelected)?;
        if let Some(iops) = iops {
            parameters.set_iops(iops)?;
        }
        if let Some(throughput) = throughput {
            parameters.set_throughput(throughput)?;
        }
        self.parameters = Some(parameters);
        Ok(parameters)
    }

    /// Accept configuration and move to confirmation
    pub fn accept_configuration(&mut self) -> Result<()> {
        self.workflow.configured()?;
        Ok(())
    }

    /// Explicit user acknowledgment; nothing mutates before this
    pub fn confirm(&mut self) -> Result<()> {
        self.workflow.confirmed()?;
        Ok(())
    }

    /// Execute the batch. Partial batch failure is a warning outcome; a
    /// fully failed batch is an error and puts the wizard into the failed
    /// state.
    pub async fn execute(&mut self, client: &ApiClient) -> Result<ActionReport> {
        let parameters = self
            .parameters
            .ok_or(WorkflowError::NothingSelected)?;

        info!(
            "Executing conversion of {} volumes (iops={}, throughput={}), estimated {}",
            self.selected.len(),
            parameters.iops,
            parameters.throughput,
            CONVERSION_TIME_ESTIMATE
        );

        let result = client
            .convert_volumes(
                &self.account_id,
                &self.region,
                &self.selected,
                Some(parameters.iops),
                Some(parameters.throughput),
            )
            .await;

        match result {
            Ok(batch) => {
                let summary = batch.summary;
                if summary.successful_conversions == 0 {
                    // Nothing succeeded: this is a failure, not a partial
                    // outcome; surface the first per-volume error.
                    let err = ChatOpsError::Api(
                        batch
                            .failures
                            .into_iter()
                            .next()
                            .map(|f| f.error)
                            .unwrap_or(ApiError::Envelope {
                                message: "Conversion batch produced no results".to_string(),
                            }),
                    );
                    self.workflow.failed(err.user_message())?;
                    return Err(err);
                }

                self.workflow.succeeded()?;
                if summary.failed_conversions > 0 {
                    warn!(
                        "Partial conversion: {} of {} volumes failed",
                        summary.failed_conversions, summary.total_volumes
                    );
                    let failed: Vec<String> = batch
                        .failures
                        .iter()
                        .map(|f| f.volume_id.clone())
                        .collect();
                    return Ok(ActionReport::warning(
                        format!(
                            "Converted {} of {} volumes to gp3 ({})",
                            summary.successful_conversions,
                            summary.total_volumes,
                            CONVERSION_TIME_ESTIMATE
                        ),
                        format!("Failed volumes: {}", failed.join(", ")),
                    ));
                }

                Ok(ActionReport::success(format!(
                    "Started gp3 conversion for {} volumes ({})",
                    summary.successful_conversions, CONVERSION_TIME_ESTIMATE
                )))
            }
            Err(e) => {
                let err = ChatOpsError::from(e);
                self.workflow.failed(err.user_message())?;
                Err(err)
            }
        }
    }

    /// Retry after failure: back to discovery with selection cleared
    pub fn retry(&mut self) -> Result<()> {
        self.workflow.retry()?;
        self.volumes.clear();
        self.selected.clear();
        self.parameters = None;
        Ok(())
    }

    /// Closing the wizard resets everything
    pub fn close(&mut self) {
        self.workflow.reset();
        self.volumes.clear();
        self.selected.clear();
        self.parameters = None;
    }
}

/// Default selection: volumes the benefit table recommends, else all
fn default_selection(volumes: &[Volume]) -> Vec<String> {
    let recommended: Vec<String> = volumes
        .iter()
        .filter(|v| conversion_benefit(&v.volume_type).recommended)
        .map(|v| v.volume_id.clone())
        .collect();
    if recommended.is_empty() {
        volumes.iter().map(|v| v.volume_id.clone()).collect()
    } else {
        recommended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn volume(id: &str, volume_type: &str, size: u64) -> Volume {
        Volume {
            volume_id: id.to_string(),
            volume_type: volume_type.to_string(),
            size,
            state: Some("in-use".to_string()),
            availability_zone: Some("us-east-1a".to_string()),
            encrypted: false,
            attached_instance_id: None,
            iops: None,
            throughput: None,
        }
    }

    #[test]
    fn test_gp3_defaults_small_volume_hits_floor() {
        // avg 100 GiB: 300 iops clamps up to 3000, throughput 3000/4 = 750
        let params = Gp3Parameters::from_average_size(100.0);
        assert_eq!(params.iops, 3000);
        assert_eq!(params.throughput, 750);
    }

    #[test]
    fn test_gp3_defaults_large_volume_hits_ceiling() {
        let params = Gp3Parameters::from_average_size(10_000.0);
        assert_eq!(params.iops, 16_000);
        assert_eq!(params.throughput, 1000);
    }

    #[test]
    fn test_gp3_override_bounds() {
        let mut params = Gp3Parameters::from_average_size(100.0);
        assert!(params.set_iops(2999).is_err());
        assert!(params.set_iops(16_001).is_err());
        params.set_iops(4000).unwrap();
        assert_eq!(params.iops, 4000);
        assert!(params.set_throughput(100).is_err());
        params.set_throughput(500).unwrap();
        assert_eq!(params.throughput, 500);
    }

    #[test]
    fn test_benefit_table() {
        assert!(conversion_benefit("gp2").recommended);
        assert!(conversion_benefit("io1").recommended);
        assert!(conversion_benefit("IO2").recommended);
        assert!(!conversion_benefit("gp3").recommended);
    }

    #[test]
    fn test_default_selection_prefers_recommended() {
        let volumes = vec![
            volume("vol-1", "gp2", 100),
            volume("vol-2", "gp3", 200),
            volume("vol-3", "io1", 50),
        ];
        assert_eq!(default_selection(&volumes), vec!["vol-1", "vol-3"]);
    }

    #[test]
    fn test_default_selection_falls_back_to_all() {
        let volumes = vec![volume("vol-1", "gp3", 100), volume("vol-2", "gp3", 200)];
        assert_eq!(default_selection(&volumes), vec!["vol-1", "vol-2"]);
    }

    #[test]
    fn test_selection_rejects_unknown_and_empty() {
        let mut wizard =
            VolumeConversionWizard::new("111122223333", "us-east-1", ConversionScope::Region);
        wizard.volumes = vec![volume("vol-1", "gp2", 100)];
        assert!(wizard.select(vec![]).is_err());
        assert!(wizard.select(vec!["vol-9".to_string()]).is_err());
        wizard.select(vec!["vol-1".to_string()]).unwrap();
    }

    #[test]
    fn test_accept_selection_computes_average_defaults() {
        let mut wizard = VolumeConversionWizard::new(
            "111122223333",
            "us-east-1",
            ConversionScope::Instance("i-1".to_string()),
        );
        wizard.volumes = vec![volume("vol-1", "gp2", 2000), volume("vol-2", "gp2", 4000)];
        wizard.selected = default_selection(&wizard.volumes);
        wizard.workflow.items_discovered().unwrap();

        // avg 3000 GiB -> 9000 iops, 2250/4 clamps nothing: 9000/4 = 2250 -> 1000
        let params = wizard.accept_selection().unwrap();
        assert_eq!(params.iops, 9000);
        assert_eq!(params.throughput, 1000);
    }

    #[test]
    fn test_volume_deserializes_backend_payload() {
        let json = r#"{
            "volumeId": "vol-0abc",
            "volumeType": "gp2",
            "size": 100,
            "state": "in-use",
            "availabilityZone": "us-east-1a",
            "encrypted": true,
            "attachedInstanceId": "i-0abc123"
        }"#;
        let parsed: Volume = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.volume_id, "vol-0abc");
        assert_eq!(parsed.size, 100);
        assert!(parsed.encrypted);
    }

    proptest! {
        #[test]
        fn prop_gp3_defaults_always_in_bounds(size in 0.0f64..100_000.0) {
            let params = Gp3Parameters::from_average_size(size);
            prop_assert!((GP3_MIN_IOPS..=GP3_MAX_IOPS).contains(&params.iops));
            prop_assert!(
                (GP3_MIN_THROUGHPUT..=GP3_MAX_THROUGHPUT).contains(&params.throughput)
            );
            // Throughput tracks iops/4 within bounds
            prop_assert!(params.throughput <= params.iops / 4 || params.throughput == GP3_MIN_THROUGHPUT);
        }
    }
}
