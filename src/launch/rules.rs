//! Rule engine for manifest entries
//!
//! A rules array starts excluded; each rule whose populated clauses all
//! match the current system flips the decision to its action, and a matching
//! `disallow` short-circuits to excluded. An entry with no rules is always
//! included.

use super::manifest::{FeatureRule, OsRule, Rule};
use crate::error::{Error, Result};
use regex::Regex;

/// The system and feature facts rules are evaluated against
#[derive(Clone, Debug)]
pub struct RuleContext {
    /// OS name in manifest vocabulary (`windows`, `osx`, `linux`)
    pub os_name: String,
    /// CPU architecture
    pub os_arch: String,
    /// OS version string, matched by rule version regexes
    pub os_version: String,
    /// The launch is a demo session
    pub is_demo_user: bool,
    /// A custom resolution is configured
    pub has_custom_resolution: bool,
    /// Demote regex-compile failures to warn-and-match
    pub tolerant: bool,
}

impl RuleContext {
    /// Build a context from the running system and the given feature flags
    pub fn for_current_system(
        is_demo_user: bool,
        has_custom_resolution: bool,
        tolerant: bool,
    ) -> Self {
        Self {
            os_name: current_os_name().to_string(),
            os_arch: std::env::consts::ARCH.to_string(),
            os_version: sysinfo::System::os_version().unwrap_or_default(),
            is_demo_user,
            has_custom_resolution,
            tolerant,
        }
    }
}

/// The manifest vocabulary name of the running OS
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

fn os_matches(os: &OsRule, ctx: &RuleContext) -> Result<bool> {
    if !os.name.is_empty() && os.name != ctx.os_name {
        return Ok(false);
    }
    if !os.arch.is_empty() && os.arch != ctx.os_arch {
        return Ok(false);
    }
    if !os.version.is_empty() {
        match Regex::new(&os.version) {
            Ok(re) => {
                if !re.is_match(&ctx.os_version) {
                    return Ok(false);
                }
            }
            Err(e) => {
                if !ctx.tolerant {
                    return Err(Error::RegexInvalid {
                        pattern: os.version.clone(),
                        reason: e.to_string(),
                    });
                }
                tracing::warn!(
                    pattern = %os.version,
                    error = %e,
                    "invalid OS version regex, clause treated as matching"
                );
            }
        }
    }
    Ok(true)
}

fn features_match(features: &FeatureRule, ctx: &RuleContext) -> bool {
    if let Some(demo) = features.is_demo_user {
        if demo != ctx.is_demo_user {
            return false;
        }
    }
    if let Some(resolution) = features.has_custom_resolution {
        if resolution != ctx.has_custom_resolution {
            return false;
        }
    }
    true
}

/// Evaluate a rules array to an include/exclude decision
///
/// # Errors
/// [`Error::RegexInvalid`] when an OS version pattern fails to compile and
/// the context is not tolerant.
pub fn evaluate_rules(rules: &[Rule], ctx: &RuleContext) -> Result<bool> {
    if rules.is_empty() {
        return Ok(true);
    }

    let mut allowed = false;
    for rule in rules {
        let os_ok = match &rule.os {
            Some(os) => os_matches(os, ctx)?,
            None => true,
        };
        let features_ok = match &rule.features {
            Some(features) => features_match(features, ctx),
            None => true,
        };
        if os_ok && features_ok {
            if rule.action == "disallow" {
                return Ok(false);
            }
            allowed = rule.action == "allow";
        }
    }
    Ok(allowed)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn linux_ctx() -> RuleContext {
        RuleContext {
            os_name: "linux".into(),
            os_arch: "x86_32".into(),
            os_version: "6.1.0".into(),
            is_demo_user: false,
            has_custom_resolution: false,
            tolerant: false,
        }
    }

    fn rule(action: &str, os: Option<OsRule>) -> Rule {
        Rule {
            action: action.into(),
            os,
            features: None,
        }
    }

    #[test]
    fn test_empty_rules_included() {
        assert!(evaluate_rules(&[], &linux_ctx()).unwrap());
    }

    #[test]
    fn test_plain_allow_included() {
        assert!(evaluate_rules(&[rule("allow", None)], &linux_ctx()).unwrap());
    }

    #[test]
    fn test_non_matching_allow_excluded() {
        let rules = [rule(
            "allow",
            Some(OsRule {
                name: "windows".into(),
                ..OsRule::default()
            }),
        )];
        assert!(!evaluate_rules(&rules, &linux_ctx()).unwrap());
    }

    #[test]
    fn test_matching_disallow_short_circuits() {
        // Allow for linux, then disallow for this exact arch: excluded.
        let rules = [
            rule(
                "allow",
                Some(OsRule {
                    name: "linux".into(),
                    ..OsRule::default()
                }),
            ),
            rule(
                "disallow",
                Some(OsRule {
                    arch: "x86_32".into(),
                    ..OsRule::default()
                }),
            ),
        ];
        assert!(!evaluate_rules(&rules, &linux_ctx()).unwrap());
    }

    #[test]
    fn test_last_matching_allow_wins() {
        let rules = [
            rule(
                "allow",
                Some(OsRule {
                    name: "osx".into(),
                    ..OsRule::default()
                }),
            ),
            rule("allow", None),
        ];
        assert!(evaluate_rules(&rules, &linux_ctx()).unwrap());
    }

    #[test]
    fn test_version_regex_matching() {
        let mut ctx = linux_ctx();
        ctx.os_version = "10.0.19045".into();
        let matching = [rule(
            "allow",
            Some(OsRule {
                version: r"^10\.".into(),
                ..OsRule::default()
            }),
        )];
        assert!(evaluate_rules(&matching, &ctx).unwrap());

        let non_matching = [rule(
            "allow",
            Some(OsRule {
                version: r"^11\.".into(),
                ..OsRule::default()
            }),
        )];
        assert!(!evaluate_rules(&non_matching, &ctx).unwrap());
    }

    #[test]
    fn test_invalid_regex_fatal_unless_tolerant() {
        let rules = [rule(
            "allow",
            Some(OsRule {
                version: "([unclosed".into(),
                ..OsRule::default()
            }),
        )];
        assert!(matches!(
            evaluate_rules(&rules, &linux_ctx()),
            Err(Error::RegexInvalid { .. })
        ));

        let mut tolerant = linux_ctx();
        tolerant.tolerant = true;
        // The broken clause is treated as matching in tolerant mode.
        assert!(evaluate_rules(&rules, &tolerant).unwrap());
    }

    #[test]
    fn test_feature_flags() {
        let mut ctx = linux_ctx();
        ctx.has_custom_resolution = true;
        let rules = [Rule {
            action: "allow".into(),
            os: None,
            features: Some(FeatureRule {
                is_demo_user: None,
                has_custom_resolution: Some(true),
            }),
        }];
        assert!(evaluate_rules(&rules, &ctx).unwrap());

        ctx.has_custom_resolution = false;
        assert!(!evaluate_rules(&rules, &ctx).unwrap());
    }
}
