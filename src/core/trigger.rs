//! Trigger condition - decides whether a push event starts a release job

use crate::core::config::TriggerConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const TAG_PREFIX: &str = "refs/tags/";

/// Errors raised while compiling trigger filters
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Invalid tag pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Trigger has no tag patterns")]
    Empty,
}

/// A push as reported by the repository's event source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Pushed reference, e.g. `refs/tags/v1.2.3`
    pub reference: String,

    /// Repository identity (clone URL or local path)
    pub repository: String,

    /// Commit the reference points at, when the event source reports it
    pub commit: Option<String>,
}

impl PushEvent {
    pub fn new(reference: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            repository: repository.into(),
            commit: None,
        }
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Tag name carried by this push, if the reference is a tag
    ///
    /// `refs/tags/<name>` yields `<name>`, any other `refs/...` reference
    /// yields `None`, and a bare name is taken as a tag name.
    pub fn tag_name(&self) -> Option<&str> {
        if let Some(name) = self.reference.strip_prefix(TAG_PREFIX) {
            return (!name.is_empty()).then_some(name);
        }
        if self.reference.starts_with("refs/") || self.reference.is_empty() {
            return None;
        }
        Some(&self.reference)
    }
}

/// The tag that triggered a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseTag {
    /// Full tag name (`v1.2.3`)
    pub name: String,

    /// Version to publish (`1.2.3`)
    pub version: String,
}

impl ReleaseTag {
    pub fn new(name: &str) -> Self {
        let version = name.strip_prefix('v').unwrap_or(name).to_string();
        Self {
            name: name.to_string(),
            version,
        }
    }
}

/// A single tag filter
///
/// Glob grammar: `*` matches anything but `/`, `**` matches anything,
/// `?` and `+` quantify the preceding character, `[...]` is a class and a
/// leading `!` turns the filter into an exclusion.
#[derive(Debug, Clone)]
pub struct TagPattern {
    glob: String,
    regex: Regex,
    negated: bool,
}

impl TagPattern {
    pub fn new(glob: &str) -> Result<Self, TriggerError> {
        let (negated, body) = match glob.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, glob),
        };

        if body.is_empty() {
            return Err(TriggerError::InvalidPattern {
                pattern: glob.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }

        let source = glob_to_regex(body).map_err(|reason| TriggerError::InvalidPattern {
            pattern: glob.to_string(),
            reason,
        })?;
        let regex = Regex::new(&source).map_err(|e| TriggerError::InvalidPattern {
            pattern: glob.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            glob: glob.to_string(),
            regex,
            negated,
        })
    }

    /// Whole-string match of the tag against this filter, ignoring negation
    pub fn matches(&self, tag: &str) -> bool {
        self.regex.is_match(tag)
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }
}

fn glob_to_regex(glob: &str) -> Result<String, String> {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    out.push_str(".*");
                    i += 1;
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' | '+' => {
                if i == 0 {
                    return Err(format!("'{}' has nothing to repeat", chars[i]));
                }
                out.push(chars[i]);
            }
            '[' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|c| *c == ']')
                    .ok_or_else(|| "unclosed character class".to_string())?;
                let class: String = chars[i + 1..i + 1 + close].iter().collect();
                out.push('[');
                out.push_str(&class.replace('\\', "\\\\"));
                out.push(']');
                i += close + 1;
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    Ok(out)
}

/// Ordered set of tag filters
#[derive(Debug, Clone)]
pub struct Trigger {
    patterns: Vec<TagPattern>,
}

impl Trigger {
    pub fn new(patterns: Vec<TagPattern>) -> Result<Self, TriggerError> {
        if patterns.is_empty() {
            return Err(TriggerError::Empty);
        }
        Ok(Self { patterns })
    }

    pub fn from_config(config: &TriggerConfig) -> Result<Self, TriggerError> {
        let patterns = config
            .tags
            .iter()
            .map(|glob| TagPattern::new(glob))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(patterns)
    }

    pub fn patterns(&self) -> &[TagPattern] {
        &self.patterns
    }

    /// Evaluate a push once; the last filter that matches decides
    pub fn evaluate(&self, event: &PushEvent) -> Option<ReleaseTag> {
        let tag = event.tag_name()?;

        let mut included = false;
        for pattern in &self.patterns {
            if pattern.matches(tag) {
                included = !pattern.is_negated();
            }
        }

        included.then(|| ReleaseTag::new(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_trigger() -> Trigger {
        Trigger::from_config(&TriggerConfig::default()).unwrap()
    }

    #[test]
    fn test_semver_tag_triggers() {
        let trigger = default_trigger();
        let tag = trigger
            .evaluate(&PushEvent::new("refs/tags/v1.2.3", "repo"))
            .unwrap();
        assert_eq!(tag.name, "v1.2.3");
        assert_eq!(tag.version, "1.2.3");
    }

    #[test]
    fn test_non_matching_refs_do_not_trigger() {
        let trigger = default_trigger();
        for reference in [
            "refs/heads/main",
            "refs/heads/v1.2.3",
            "refs/tags/1.2.3",
            "refs/tags/v1.2",
            "refs/tags/release-1.2.3",
            "refs/tags/v1/2.3.4",
            "refs/tags/",
            "",
        ] {
            assert!(
                trigger.evaluate(&PushEvent::new(reference, "repo")).is_none(),
                "{} should not trigger",
                reference
            );
        }
    }

    #[test]
    fn test_bare_tag_name_is_accepted() {
        let trigger = default_trigger();
        assert!(trigger.evaluate(&PushEvent::new("v0.4.10", "repo")).is_some());
    }

    #[test]
    fn test_star_does_not_cross_slash() {
        let pattern = TagPattern::new("v*").unwrap();
        assert!(pattern.matches("v1.0.0"));
        assert!(!pattern.matches("v1/0"));

        let pattern = TagPattern::new("release/**").unwrap();
        assert!(pattern.matches("release/a/b"));
    }

    #[test]
    fn test_quantifiers_and_classes() {
        let pattern = TagPattern::new("v[0-9]+.[0-9]+.[0-9]+").unwrap();
        assert!(pattern.matches("v10.2.33"));
        assert!(!pattern.matches("v1.2.x"));

        let pattern = TagPattern::new("vv?1").unwrap();
        assert!(pattern.matches("v1"));
        assert!(pattern.matches("vv1"));
    }

    #[test]
    fn test_negated_pattern_excludes() {
        let trigger = Trigger::new(vec![
            TagPattern::new("v*.*.*").unwrap(),
            TagPattern::new("!v*.*.*-*").unwrap(),
        ])
        .unwrap();

        assert!(trigger.evaluate(&PushEvent::new("refs/tags/v1.0.0", "r")).is_some());
        assert!(trigger
            .evaluate(&PushEvent::new("refs/tags/v1.0.0-rc.1", "r"))
            .is_none());
    }

    #[test]
    fn test_invalid_patterns_are_rejected() {
        assert!(TagPattern::new("").is_err());
        assert!(TagPattern::new("!").is_err());
        assert!(TagPattern::new("+v").is_err());
        assert!(TagPattern::new("v[0-9").is_err());
        assert!(matches!(Trigger::new(vec![]), Err(TriggerError::Empty)));
    }
}
