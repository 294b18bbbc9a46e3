use std::time::Instant;
use tracing::{info, warn};

use crate::api::{ApiClient, HealthReport};
use crate::error::Result;

/// Health check result
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub is_healthy: bool,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
    pub report: Option<HealthReport>,
}

/// Backend health checker.
///
/// Invoked explicitly by the hosting application at a defined lifecycle
/// point (startup, or the `health` subcommand) — never as an import-time
/// side effect.
pub struct BackendHealthChecker {
    warning_threshold_ms: u64,
}

impl Default for BackendHealthChecker {
    fn default() -> Self {
        Self {
            warning_threshold_ms: 1000,
        }
    }
}

impl BackendHealthChecker {
    pub fn with_threshold(warning_threshold_ms: u64) -> Self {
        Self {
            warning_threshold_ms,
        }
    }

    /// Check backend health via `/api/health`
    pub async fn check(&self, client: &ApiClient) -> Result<HealthCheckResult> {
        info!("Checking backend health at {}", client.base_url());

        let start = Instant::now();
        let result = match client.health_check().await {
            Ok(report) => {
                let response_time_ms = start.elapsed().as_millis() as u64;
                let mut error_message = None;
                let is_healthy = report.is_healthy();
                if !is_healthy {
                    error_message = Some(format!("Backend reported status: {}", report.status));
                } else if response_time_ms > self.warning_threshold_ms {
                    warn!("Backend is healthy but slow: {}ms", response_time_ms);
                }
                HealthCheckResult {
                    is_healthy,
                    response_time_ms,
                    error_message,
                    report: Some(report),
                }
            }
            Err(e) => HealthCheckResult {
                is_healthy: false,
                response_time_ms: start.elapsed().as_millis() as u64,
                error_message: Some(e.to_string()),
                report: None,
            },
        };

        if result.is_healthy {
            info!("Backend is healthy ({}ms)", result.response_time_ms);
        } else {
            warn!("Backend is unhealthy: {:?}", result.error_message);
        }

        Ok(result)
    }
}
