use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use scrutin_model::{FindingKind, Severity};
use serde::Deserialize;

use crate::error::RuleLoadError;

/// A line oriented rule: every match of `pattern` on a line is a finding.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub key: String,
    pub pattern: Regex,
    pub message: String,
    pub kind: FindingKind,
    pub severity: Severity,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default, rename = "rule")]
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    key: String,
    pattern: String,
    message: Option<String>,
    #[serde(default = "default_severity")]
    severity: Severity,
    #[serde(default)]
    hotspot: bool,
}

fn default_severity() -> Severity {
    Severity::Major
}

impl PatternRule {
    pub fn new(
        key: impl Into<String>,
        pattern: &str,
        message: impl Into<String>,
        kind: FindingKind,
        severity: Severity,
    ) -> Result<Self, RuleLoadError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(RuleLoadError::BlankKey);
        }
        let pattern = Regex::new(pattern).map_err(|source| RuleLoadError::Pattern {
            key: key.clone(),
            source,
        })?;
        Ok(Self {
            key,
            pattern,
            message: message.into(),
            kind,
            severity,
        })
    }

    /// `KEY=PATTERN` as accepted by `--rule`.
    pub fn parse_inline(spec: &str) -> Result<Self, RuleLoadError> {
        let (key, pattern) = spec
            .split_once('=')
            .ok_or_else(|| RuleLoadError::InlineSpec(spec.to_string()))?;
        let message = format!("Matches pattern '{pattern}'");
        Self::new(key.trim(), pattern, message, FindingKind::Issue, Severity::Major)
    }
}

/// Ordered, key unique set of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<PatternRule>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Small built-in set used when no rule is configured.
    pub fn builtin() -> Result<Self, RuleLoadError> {
        let mut set = Self::empty();
        set.push(PatternRule::new(
            "todo-comment",
            r"\b(TODO|FIXME|XXX)\b",
            "Complete the task associated with this comment",
            FindingKind::Issue,
            Severity::Info,
        )?)?;
        set.push(PatternRule::new(
            "trailing-whitespace",
            r"[ \t]+$",
            "Remove trailing whitespace",
            FindingKind::Issue,
            Severity::Minor,
        )?)?;
        set.push(PatternRule::new(
            "hardcoded-credential",
            r#"(?i)\b(password|passwd|secret|api_key|token)\s*[:=]\s*["'][^"']+["']"#,
            "Make sure this credential is not hard coded",
            FindingKind::SecurityHotspot,
            Severity::Blocker,
        )?)?;
        Ok(set)
    }

    pub fn load(path: &Path) -> Result<Self, RuleLoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RuleLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|err| match err {
            RuleLoadError::Parse { source, .. } => RuleLoadError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, RuleLoadError> {
        let file: RuleFile = toml::from_str(raw).map_err(|source| RuleLoadError::Parse {
            path: Default::default(),
            source,
        })?;
        let mut set = Self::empty();
        for entry in file.rules {
            let message = entry
                .message
                .unwrap_or_else(|| format!("Matches pattern '{}'", entry.pattern));
            let kind = if entry.hotspot {
                FindingKind::SecurityHotspot
            } else {
                FindingKind::Issue
            };
            set.push(PatternRule::new(
                entry.key,
                &entry.pattern,
                message,
                kind,
                entry.severity,
            )?)?;
        }
        Ok(set)
    }

    pub fn push(&mut self, rule: PatternRule) -> Result<(), RuleLoadError> {
        if self.rules.iter().any(|existing| existing.key == rule.key) {
            return Err(RuleLoadError::DuplicateKey(rule.key));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn extend(&mut self, other: RuleSet) -> Result<(), RuleLoadError> {
        for rule in other.rules {
            self.push(rule)?;
        }
        Ok(())
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn keys(&self) -> HashSet<&str> {
        self.rules.iter().map(|rule| rule.key.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rules_compile() {
        let set = RuleSet::builtin().unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.keys().contains("todo-comment"));
    }

    #[test]
    fn toml_rules_parse_with_defaults() {
        let set = RuleSet::from_toml_str(
            r#"
            [[rule]]
            key = "no-unwrap"
            pattern = '\.unwrap\(\)'

            [[rule]]
            key = "private-key"
            pattern = "BEGIN PRIVATE KEY"
            message = "Private key committed"
            severity = "critical"
            hotspot = true
            "#,
        )
        .unwrap();

        let rules = set.rules();
        assert_eq!(rules[0].severity, Severity::Major);
        assert_eq!(rules[0].kind, FindingKind::Issue);
        assert_eq!(rules[1].kind, FindingKind::SecurityHotspot);
        assert_eq!(rules[1].severity, Severity::Critical);
        assert_eq!(rules[1].message, "Private key committed");
    }

    #[test]
    fn duplicate_and_invalid_rules_are_rejected() {
        let mut set = RuleSet::builtin().unwrap();
        let dup = PatternRule::parse_inline("todo-comment=x").unwrap();
        assert!(matches!(set.push(dup), Err(RuleLoadError::DuplicateKey(_))));

        assert!(matches!(
            PatternRule::parse_inline("broken=("),
            Err(RuleLoadError::Pattern { .. })
        ));
        assert!(matches!(
            PatternRule::parse_inline("no-separator"),
            Err(RuleLoadError::InlineSpec(_))
        ));
    }
}
