//! Exclusion and override rules applied to a plan's settings before it runs.

use std::collections::BTreeMap;

use regex::Regex;

use super::applier::{ApplyError, ApplyPlan};
use crate::config::RestoreConfig;
use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct ApplyRules {
    excluded: Vec<Regex>,
    overrides: BTreeMap<String, bool>,
}

/// What a rule pass changed, and what it had to leave alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedRules {
    pub excluded: Vec<String>,
    pub overridden: Vec<String>,
    pub skipped_locked: Vec<String>,
}

impl ApplyRules {
    pub fn new(excluded: Vec<Regex>, overrides: BTreeMap<String, bool>) -> Self {
        Self {
            excluded,
            overrides,
        }
    }

    pub fn from_config(config: &RestoreConfig) -> Result<Self, ConfigError> {
        let excluded = config
            .excluded_settings
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(excluded, config.setting_overrides.clone()))
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.iter().any(|re| re.is_match(name))
    }

    pub fn override_for(&self, name: &str) -> Option<bool> {
        self.overrides.get(name).copied()
    }

    /// Applies overrides, then exclusions, to every unlocked setting.
    ///
    /// An excluded setting is forced off even when an override would turn it
    /// on. Locked settings are never touched.
    pub fn apply_to(&self, plan: &mut dyn ApplyPlan) -> Result<AppliedRules, ApplyError> {
        let mut applied = AppliedRules::default();

        for setting in plan.settings() {
            let wanted = if self.is_excluded(&setting.name) {
                Some((false, true))
            } else {
                self.override_for(&setting.name).map(|v| (v, false))
            };
            let Some((value, excluded)) = wanted else {
                continue;
            };

            if setting.locked {
                applied.skipped_locked.push(setting.name);
                continue;
            }

            if setting.value != value {
                plan.set_setting(&setting.name, value)?;
            }
            if excluded {
                applied.excluded.push(setting.name);
            } else {
                applied.overridden.push(setting.name);
            }
        }

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::applier::{ApplySummary, PlanSetting, PrecheckMessage};
    use crate::pipeline::ProgressReporter;

    struct SettingsPlan {
        settings: Vec<PlanSetting>,
        writes: Vec<(String, bool)>,
    }

    impl SettingsPlan {
        fn new(settings: &[(&str, bool, bool)]) -> Self {
            Self {
                settings: settings
                    .iter()
                    .map(|(name, value, locked)| PlanSetting {
                        name: name.to_string(),
                        value: *value,
                        locked: *locked,
                    })
                    .collect(),
                writes: Vec::new(),
            }
        }
    }

    impl ApplyPlan for SettingsPlan {
        fn apply_run_id(&self) -> &str {
            "run"
        }

        fn settings(&self) -> Vec<PlanSetting> {
            self.settings.clone()
        }

        fn set_setting(&mut self, name: &str, value: bool) -> Result<(), ApplyError> {
            self.writes.push((name.to_string(), value));
            Ok(())
        }

        fn precheck(&mut self) -> Vec<PrecheckMessage> {
            Vec::new()
        }

        fn execute(
            &mut self,
            _progress: &dyn ProgressReporter,
        ) -> Result<ApplySummary, ApplyError> {
            Ok(ApplySummary::default())
        }
    }

    fn default_rules() -> ApplyRules {
        ApplyRules::from_config(&RestoreConfig::default()).unwrap()
    }

    #[test]
    fn test_default_exclusion_matches_lti_settings() {
        let rules = default_rules();
        assert!(rules.is_excluded("lti_12_included"));
        assert!(rules.is_excluded("lti_3_userinfo"));
        assert!(rules.is_excluded("lti__included"));
        assert!(!rules.is_excluded("lti_12_other"));
        assert!(!rules.is_excluded("forum_12_included"));
        assert!(!rules.is_excluded("xlti_12_included"));
    }

    #[test]
    fn test_default_overrides() {
        let rules = default_rules();
        assert_eq!(rules.override_for("overwrite_conf"), Some(false));
        assert_eq!(rules.override_for("users"), Some(false));
        assert_eq!(rules.override_for("keep_roles_and_enrolments"), Some(true));
        assert_eq!(rules.override_for("keep_groups_and_groupings"), Some(true));
        assert_eq!(rules.override_for("activities"), None);
    }

    #[test]
    fn test_apply_skips_locked_settings() {
        let rules = default_rules();
        let mut plan = SettingsPlan::new(&[
            ("users", true, true),
            ("lti_4_included", true, true),
            ("overwrite_conf", true, false),
        ]);

        let applied = rules.apply_to(&mut plan).unwrap();
        assert_eq!(applied.skipped_locked, vec!["users", "lti_4_included"]);
        assert_eq!(applied.overridden, vec!["overwrite_conf"]);
        assert_eq!(plan.writes, vec![("overwrite_conf".to_string(), false)]);
    }

    #[test]
    fn test_apply_excludes_and_overrides() {
        let rules = default_rules();
        let mut plan = SettingsPlan::new(&[
            ("lti_7_included", true, false),
            ("lti_7_userinfo", false, false),
            ("keep_roles_and_enrolments", false, false),
            ("activities", true, false),
        ]);

        let applied = rules.apply_to(&mut plan).unwrap();
        assert_eq!(applied.excluded, vec!["lti_7_included", "lti_7_userinfo"]);
        assert_eq!(applied.overridden, vec!["keep_roles_and_enrolments"]);
        // Only settings whose value changes are written.
        assert_eq!(
            plan.writes,
            vec![
                ("lti_7_included".to_string(), false),
                ("keep_roles_and_enrolments".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_exclusion_beats_override() {
        let mut overrides = BTreeMap::new();
        overrides.insert("lti_1_included".to_string(), true);
        let rules = ApplyRules::new(vec![Regex::new("^lti_").unwrap()], overrides);
        let mut plan = SettingsPlan::new(&[("lti_1_included", true, false)]);

        let applied = rules.apply_to(&mut plan).unwrap();
        assert_eq!(applied.excluded, vec!["lti_1_included"]);
        assert_eq!(plan.writes, vec![("lti_1_included".to_string(), false)]);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let config = RestoreConfig {
            excluded_settings: vec!["(".to_string()],
            ..RestoreConfig::default()
        };
        assert!(matches!(
            ApplyRules::from_config(&config),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }
}
