//! Admission rules: toggles, include/exclude patterns and ban lists

mod matcher;

pub use matcher::RuleMatcher;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::focus::FieldPath;
use crate::{Result, TapedeckError};

/// User-configurable rule set, persisted alongside the recordings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleSet {
    /// Serve recorded responses instead of hitting the network
    #[serde(rename = "switch")]
    pub serve: bool,
    /// Record responses even while serving is off
    #[serde(rename = "saveSwitch")]
    pub capture: bool,
    /// Collapse every request body onto a single variant
    pub ignore_params: bool,
    /// URLs must match this pattern (empty admits all)
    pub include_regexp: String,
    /// URLs matching this pattern are never cached
    pub exclude_regexp: String,
    /// Sites must match this pattern (empty admits all)
    pub include_site_regexp: String,
    /// Sites matching this pattern are never cached
    pub exclude_site_regexp: String,
    /// Exact URLs paused by the user
    pub banned_url: BTreeMap<String, bool>,
    /// Exact sites paused by the user
    pub banned_site: BTreeMap<String, bool>,
    /// Dot-path narrowing the response shown to the editor
    pub field_focus: String,
}

impl RuleSet {
    /// Whether either serve or capture is active
    pub fn is_recording(&self) -> bool {
        self.serve || self.capture
    }

    /// Check that every pattern compiles and the focus path parses
    ///
    /// # Errors
    ///
    /// Returns the first invalid pattern or path
    pub fn validate(&self) -> Result<()> {
        for field in RuleField::PATTERNS {
            check_pattern(field.name(), self.pattern(field))?;
        }
        if !self.field_focus.is_empty() {
            FieldPath::parse(&self.field_focus)?;
        }
        Ok(())
    }

    /// Set one field from a JSON value
    ///
    /// The value is fully validated before anything is assigned, so a
    /// rejected value leaves the previous one in place.
    ///
    /// # Errors
    ///
    /// Returns error if the value has the wrong type, a pattern fails to
    /// compile or a focus path is malformed
    pub fn set(&mut self, field: RuleField, value: Value) -> Result<()> {
        let name = field.name();
        match field {
            RuleField::Switch => self.serve = expect_bool(name, &value)?,
            RuleField::SaveSwitch => self.capture = expect_bool(name, &value)?,
            RuleField::IgnoreParams => self.ignore_params = expect_bool(name, &value)?,
            RuleField::IncludeRegexp
            | RuleField::ExcludeRegexp
            | RuleField::IncludeSiteRegexp
            | RuleField::ExcludeSiteRegexp => {
                let pattern = expect_string(name, value)?;
                check_pattern(name, &pattern)?;
                *self.pattern_mut(field) = pattern;
            }
            RuleField::BannedUrl => self.banned_url = expect_flags(name, value)?,
            RuleField::BannedSite => self.banned_site = expect_flags(name, value)?,
            RuleField::FieldFocus => {
                let path = expect_string(name, value)?;
                if !path.is_empty() {
                    FieldPath::parse(&path)?;
                }
                self.field_focus = path;
            }
        }
        Ok(())
    }

    fn pattern(&self, field: RuleField) -> &str {
        match field {
            RuleField::IncludeRegexp => &self.include_regexp,
            RuleField::ExcludeRegexp => &self.exclude_regexp,
            RuleField::IncludeSiteRegexp => &self.include_site_regexp,
            RuleField::ExcludeSiteRegexp => &self.exclude_site_regexp,
            _ => "",
        }
    }

    fn pattern_mut(&mut self, field: RuleField) -> &mut String {
        match field {
            RuleField::IncludeRegexp => &mut self.include_regexp,
            RuleField::ExcludeRegexp => &mut self.exclude_regexp,
            RuleField::IncludeSiteRegexp => &mut self.include_site_regexp,
            _ => &mut self.exclude_site_regexp,
        }
    }
}

/// Names of the settable rule fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleField {
    /// `switch`
    Switch,
    /// `saveSwitch`
    SaveSwitch,
    /// `ignoreParams`
    IgnoreParams,
    /// `includeRegexp`
    IncludeRegexp,
    /// `excludeRegexp`
    ExcludeRegexp,
    /// `includeSiteRegexp`
    IncludeSiteRegexp,
    /// `excludeSiteRegexp`
    ExcludeSiteRegexp,
    /// `bannedUrl`
    BannedUrl,
    /// `bannedSite`
    BannedSite,
    /// `fieldFocus`
    FieldFocus,
}

impl RuleField {
    const PATTERNS: [RuleField; 4] = [
        RuleField::IncludeRegexp,
        RuleField::ExcludeRegexp,
        RuleField::IncludeSiteRegexp,
        RuleField::ExcludeSiteRegexp,
    ];

    /// Persisted field name
    pub fn name(self) -> &'static str {
        match self {
            RuleField::Switch => "switch",
            RuleField::SaveSwitch => "saveSwitch",
            RuleField::IgnoreParams => "ignoreParams",
            RuleField::IncludeRegexp => "includeRegexp",
            RuleField::ExcludeRegexp => "excludeRegexp",
            RuleField::IncludeSiteRegexp => "includeSiteRegexp",
            RuleField::ExcludeSiteRegexp => "excludeSiteRegexp",
            RuleField::BannedUrl => "bannedUrl",
            RuleField::BannedSite => "bannedSite",
            RuleField::FieldFocus => "fieldFocus",
        }
    }
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RuleField {
    type Err = TapedeckError;

    fn from_str(s: &str) -> Result<Self> {
        let field = match s {
            "switch" => RuleField::Switch,
            "saveSwitch" => RuleField::SaveSwitch,
            "ignoreParams" => RuleField::IgnoreParams,
            "includeRegexp" => RuleField::IncludeRegexp,
            "excludeRegexp" => RuleField::ExcludeRegexp,
            "includeSiteRegexp" => RuleField::IncludeSiteRegexp,
            "excludeSiteRegexp" => RuleField::ExcludeSiteRegexp,
            "bannedUrl" => RuleField::BannedUrl,
            "bannedSite" => RuleField::BannedSite,
            "fieldFocus" => RuleField::FieldFocus,
            other => return Err(TapedeckError::UnknownRuleField(other.to_string())),
        };
        Ok(field)
    }
}

fn check_pattern(field: &'static str, pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Ok(());
    }
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|source| TapedeckError::InvalidPattern { field, source })
}

fn expect_bool(field: &'static str, value: &Value) -> Result<bool> {
    value.as_bool().ok_or(TapedeckError::InvalidRuleValue {
        field,
        expected: "a boolean",
    })
}

fn expect_string(field: &'static str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(TapedeckError::InvalidRuleValue {
            field,
            expected: "a string",
        }),
    }
}

fn expect_flags(field: &'static str, value: Value) -> Result<BTreeMap<String, bool>> {
    serde_json::from_value(value).map_err(|_| TapedeckError::InvalidRuleValue {
        field,
        expected: "an object of booleans",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rules_parse_with_missing_fields() {
        let rules: RuleSet = serde_json::from_value(json!({
            "switch": true,
            "excludeRegexp": "health"
        }))
        .unwrap();

        assert!(rules.serve);
        assert!(!rules.capture);
        assert_eq!(rules.exclude_regexp, "health");
        assert!(rules.banned_url.is_empty());
    }

    #[test]
    fn test_rules_serialize_field_names() {
        let rules = RuleSet {
            capture: true,
            ..RuleSet::default()
        };
        let value = serde_json::to_value(&rules).unwrap();

        assert_eq!(value["switch"], json!(false));
        assert_eq!(value["saveSwitch"], json!(true));
        assert!(value.get("includeSiteRegexp").is_some());
        assert!(value.get("fieldFocus").is_some());
    }

    #[test]
    fn test_set_rejects_bad_pattern_without_mutation() {
        let mut rules = RuleSet::default();
        rules
            .set(RuleField::IncludeRegexp, json!("^/api"))
            .unwrap();

        let err = rules.set(RuleField::IncludeRegexp, json!("(unclosed"));
        assert!(matches!(err, Err(TapedeckError::InvalidPattern { .. })));
        assert_eq!(rules.include_regexp, "^/api");
    }

    #[test]
    fn test_set_rejects_wrong_type() {
        let mut rules = RuleSet::default();
        assert!(rules.set(RuleField::Switch, json!("yes")).is_err());
        assert!(rules.set(RuleField::BannedUrl, json!({"a": 1})).is_err());
        assert!(!rules.serve);
    }

    #[test]
    fn test_set_field_focus() {
        let mut rules = RuleSet::default();
        rules.set(RuleField::FieldFocus, json!(".data.items")).unwrap();
        assert_eq!(rules.field_focus, ".data.items");

        assert!(rules.set(RuleField::FieldFocus, json!("data.items")).is_err());
        assert_eq!(rules.field_focus, ".data.items");

        rules.set(RuleField::FieldFocus, json!("")).unwrap();
        assert!(rules.field_focus.is_empty());
    }

    #[test]
    fn test_field_names_round_trip() {
        for name in ["switch", "saveSwitch", "bannedSite", "fieldFocus"] {
            let field: RuleField = name.parse().unwrap();
            assert_eq!(field.name(), name);
        }
        assert!("nope".parse::<RuleField>().is_err());
    }

    #[test]
    fn test_validate() {
        let mut rules = RuleSet::default();
        assert!(rules.validate().is_ok());

        rules.exclude_site_regexp = "[".to_string();
        assert!(rules.validate().is_err());
    }
}
