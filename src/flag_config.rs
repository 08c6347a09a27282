use serde::{Deserialize, Serialize};

/// Stickiness value selecting the anonymous feature-flag user id for bucketing.
pub const FF_USER_ID_STICKINESS: &str = "ffUserId";

/// Flag configuration set, as served by the remote source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub flags: Vec<TryParse<Flag>>,
}

impl Config {
    pub fn new(flags: Vec<Flag>) -> Self {
        Config {
            version: None,
            flags: flags.into_iter().map(TryParse::Parsed).collect(),
        }
    }

    /// Iterate over flags that were parsed successfully.
    pub fn parsed_flags(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter().filter_map(Option::from)
    }

    pub fn get_flag(&self, flag_name: &str) -> Option<&Flag> {
        self.parsed_flags().find(|flag| flag.flag_name == flag_name)
    }

    /// Find a flag entry by name, whether it parsed or not. Unparsed entries are matched by their
    /// raw `flagName`.
    pub fn find_flag(&self, flag_name: &str) -> Option<&TryParse<Flag>> {
        self.flags
            .iter()
            .find(|flag| flag.flag_name() == Some(flag_name))
    }

    /// Log every flag entry that failed to parse. Returns the number of such entries.
    pub(crate) fn log_unparsed_flags(&self) -> usize {
        let mut count = 0;
        for flag in &self.flags {
            if let TryParse::ParseFailed(value) = flag {
                count += 1;
                log::warn!(target: "ffclient", flag:serde = value; "flag failed to parse");
            }
        }
        count
    }
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TryParse<T> {
    Parsed(T),
    ParseFailed(serde_json::Value),
}
impl TryParse<Flag> {
    /// Name of the flag. For entries that failed to parse, it is recovered from the raw value if
    /// possible.
    pub fn flag_name(&self) -> Option<&str> {
        match self {
            TryParse::Parsed(flag) => Some(&flag.flag_name),
            TryParse::ParseFailed(value) => value.get("flagName").and_then(|name| name.as_str()),
        }
    }
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}
impl<'a, T> From<&'a TryParse<T>> for Option<&'a T> {
    fn from(value: &TryParse<T>) -> Option<&T> {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub flag_name: String,
    /// Salt for bucketing. Must stay stable across config refreshes.
    pub flag_id: String,
    #[serde(default)]
    pub flag_type: String,
    #[serde(default, alias = "targetingConfig")]
    pub targeting_configs: Vec<TargetingConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetingConfig {
    pub target_priority: i64,
    /// Rollout percentage (0-100), encoded as a string.
    pub rollout_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stickiness_property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_criteria: Option<Vec<TargetCriterion>>,
}

impl Default for TargetingConfig {
    /// Disabled for everyone.
    fn default() -> Self {
        TargetingConfig {
            target_priority: 1,
            rollout_value: "0".to_owned(),
            stickiness_property: None,
            target_criteria: None,
        }
    }
}

impl TargetingConfig {
    pub fn uses_ff_user_id(&self) -> bool {
        self.stickiness_property.as_deref() == Some(FF_USER_ID_STICKINESS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCriterion {
    pub target_field_name: String,
    pub target_field_values: Vec<String>,
}

#[cfg(test)]
mod tests {
    use std::{fs::File, io::BufReader};

    use super::{Config, TargetingConfig, TryParse};

    #[test]
    fn parse_flags_fixture() {
        let f = File::open("tests/data/config/flags.json")
            .expect("Failed to open tests/data/config/flags.json");
        let config: Config = serde_json::from_reader(BufReader::new(f)).unwrap();

        assert_eq!(config.version.as_deref(), Some("1"));
        let flag = config.get_flag("feature-A").unwrap();
        assert_eq!(flag.flag_id, "feature-a-id");
        assert_eq!(flag.targeting_configs.len(), 2);
        assert!(config.get_flag("anonymous-rollout").unwrap().targeting_configs[0].uses_ff_user_id());
    }

    #[test]
    fn parse_partially_if_unexpected() {
        let config: Config = serde_json::from_str(
            r#"
              {
                "flags": [
                  {
                    "flagName": "success",
                    "flagId": "1",
                    "flagType": "release",
                    "targetingConfigs": []
                  },
                  {
                    "flagName": "fail_parsing",
                    "flagId": "2",
                    "targetingConfigs": [{ "rolloutValue": 100 }]
                  },
                  { "flagId": 3 }
                ]
              }
            "#,
        )
        .unwrap();
        assert!(matches!(config.flags[0], TryParse::Parsed(_)));
        assert!(matches!(config.flags[1], TryParse::ParseFailed(_)));
        assert_eq!(config.parsed_flags().count(), 1);
        assert_eq!(config.log_unparsed_flags(), 2);
        assert!(config.get_flag("fail_parsing").is_none());

        assert!(matches!(
            config.find_flag("fail_parsing"),
            Some(TryParse::ParseFailed(_))
        ));
        assert!(matches!(
            config.find_flag("success"),
            Some(TryParse::Parsed(_))
        ));
        assert!(config.find_flag("missing").is_none());
        assert_eq!(config.flags[2].flag_name(), None);
    }

    #[test]
    fn targeting_config_alias_and_defaults() {
        let config: Config = serde_json::from_str(
            r#"
              {
                "flags": [
                  {
                    "flagName": "legacy",
                    "flagId": "1",
                    "targetingConfig": [{ "targetPriority": 2, "rolloutValue": "50" }]
                  },
                  { "flagName": "bare", "flagId": "2" }
                ]
              }
            "#,
        )
        .unwrap();
        let legacy = config.get_flag("legacy").unwrap();
        assert_eq!(legacy.targeting_configs[0].rollout_value, "50");
        assert_eq!(legacy.targeting_configs[0].target_criteria, None);
        assert!(config.get_flag("bare").unwrap().targeting_configs.is_empty());
    }

    #[test]
    fn default_targeting_config_is_disabled() {
        let default = TargetingConfig::default();
        assert_eq!(default.rollout_value, "0");
        assert_eq!(default.target_priority, 1);
        assert!(!default.uses_ff_user_id());
    }
}
