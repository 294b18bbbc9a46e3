use serde::{Deserialize, Serialize};

/// Inferred user goal category driving which workflow to open.
///
/// Serde tags match the intent strings emitted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    VolumeConversion,
    InstanceTypeChange,
    #[serde(rename = "cloudwatch_configuration")]
    CloudWatchConfiguration,
    AlarmConfiguration,
    GenericChat,
}

impl Intent {
    /// Whether this intent opens an action workflow (vs plain chat)
    pub fn is_action(&self) -> bool {
        !matches!(self, Intent::GenericChat)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::VolumeConversion => "volume_conversion",
            Intent::InstanceTypeChange => "instance_type_change",
            Intent::CloudWatchConfiguration => "cloudwatch_configuration",
            Intent::AlarmConfiguration => "alarm_configuration",
            Intent::GenericChat => "generic_chat",
        }
    }
}

// Keyword sets per intent, checked in priority order. First set with any
// case-insensitive substring match wins; there is no scoring. The order
// deliberately biases ambiguous input toward the newer features, and
// "monitor" living in the CloudWatch set is a known, accepted overlap with
// alarm phrasing.
const VOLUME_CONVERSION_KEYWORDS: &[&str] = &[
    "gp2", "gp3", "volume", "ebs", "convert", "storage",
];

const INSTANCE_TYPE_KEYWORDS: &[&str] = &[
    "instance type",
    "change type",
    "resize",
    "right-size",
    "rightsize",
    "upgrade instance",
    "downsize",
];

const CLOUDWATCH_KEYWORDS: &[&str] = &["cloudwatch", "monitor", "agent", "metrics"];

const ALARM_KEYWORDS: &[&str] = &["alarm", "alert", "notification", "threshold"];

const PRIORITY: &[(Intent, &[&str])] = &[
    (Intent::VolumeConversion, VOLUME_CONVERSION_KEYWORDS),
    (Intent::InstanceTypeChange, INSTANCE_TYPE_KEYWORDS),
    (Intent::CloudWatchConfiguration, CLOUDWATCH_KEYWORDS),
    (Intent::AlarmConfiguration, ALARM_KEYWORDS),
];

/// Classify free-text user input into an intent.
///
/// Input must be non-empty; callers reject empty/whitespace-only input
/// before classification.
pub fn classify(input: &str) -> Intent {
    let lowered = input.to_lowercase();
    for (intent, keywords) in PRIORITY {
        if keywords.iter().any(|kw| lowered.contains(kw)) {
            return *intent;
        }
    }
    Intent::GenericChat
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_keywords_win() {
        assert_eq!(classify("convert my gp2 volumes"), Intent::VolumeConversion);
        assert_eq!(classify("EBS storage costs"), Intent::VolumeConversion);
        assert_eq!(classify("GP3 please"), Intent::VolumeConversion);
    }

    #[test]
    fn test_instance_type_change() {
        assert_eq!(
            classify("change the instance type of i-123"),
            Intent::InstanceTypeChange
        );
        assert_eq!(classify("resize my servers"), Intent::InstanceTypeChange);
    }

    #[test]
    fn test_cloudwatch_over_alarm_priority() {
        // Both "cloudwatch" and "alarm" present; CloudWatch is checked first
        assert_eq!(
            classify("configure cloudwatch alarm"),
            Intent::CloudWatchConfiguration
        );
        // "monitor" lives in the CloudWatch set
        assert_eq!(
            classify("change monitoring setup"),
            Intent::CloudWatchConfiguration
        );
    }

    #[test]
    fn test_alarm_without_cloudwatch_keywords() {
        assert_eq!(classify("set up alerts"), Intent::AlarmConfiguration);
        assert_eq!(classify("alarm thresholds"), Intent::AlarmConfiguration);
    }

    #[test]
    fn test_volume_over_everything() {
        // "volume" outranks both cloudwatch and alarm keywords
        assert_eq!(
            classify("cloudwatch alarm for my volume"),
            Intent::VolumeConversion
        );
    }

    #[test]
    fn test_generic_fallback() {
        assert_eq!(classify("hello there"), Intent::GenericChat);
        assert_eq!(classify("what can you do?"), Intent::GenericChat);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("CONVERT VOLUMES"), Intent::VolumeConversion);
        assert_eq!(classify("CloudWatch"), Intent::CloudWatchConfiguration);
    }

    #[test]
    fn test_backend_intent_tags_round_trip() {
        let parsed: Intent = serde_json::from_str("\"volume_conversion\"").unwrap();
        assert_eq!(parsed, Intent::VolumeConversion);
        let parsed: Intent = serde_json::from_str("\"cloudwatch_configuration\"").unwrap();
        assert_eq!(parsed, Intent::CloudWatchConfiguration);
        let parsed: Intent = serde_json::from_str("\"alarm_configuration\"").unwrap();
        assert_eq!(parsed, Intent::AlarmConfiguration);
        assert_eq!(
            serde_json::to_string(&Intent::InstanceTypeChange).unwrap(),
            "\"instance_type_change\""
        );
    }
}
