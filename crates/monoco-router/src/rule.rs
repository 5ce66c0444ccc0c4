//! Routing rules and their compiled matchers.

use crate::context::ConversationContext;
use crate::error::{RouteError, RouteResult};
use monoco_core::Role;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Condition kind of a routing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Exact prefix match on the first `/`-prefixed token.
    Command,
    /// Case-insensitive `@Name` presence in mentions or body.
    Mention,
    /// Case-insensitive substring OR over a `|`-separated list.
    Keyword,
    /// Regular expression over the concatenated bodies.
    Regex,
    /// Always matches; must carry the lowest priority.
    Fallback,
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "command" => Ok(Self::Command),
            "mention" => Ok(Self::Mention),
            "keyword" => Ok(Self::Keyword),
            "regex" => Ok(Self::Regex),
            "fallback" => Ok(Self::Fallback),
            other => Err(format!("unknown rule kind `{other}`")),
        }
    }
}

enum Matcher {
    Command(String),
    Mention(String),
    Keyword(Vec<String>),
    Regex(regex::Regex),
    Fallback,
}

/// One compiled routing rule.
pub struct RoutingRule {
    /// Unique rule name.
    pub name: String,
    /// Condition kind.
    pub kind: RuleKind,
    /// Raw pattern as configured.
    pub pattern: String,
    /// Role dispatched to on a match.
    pub target_role: Role,
    /// Evaluation priority (higher first).
    pub priority: i32,
    /// Disabled rules are skipped.
    pub enabled: bool,
    matcher: Matcher,
}

impl RoutingRule {
    /// Compile a configuration section into a rule.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidRule`] for unknown kinds or roles and
    /// for regex patterns that fail to compile.
    pub fn compile(section: &monoco_config::RuleSection) -> RouteResult<Self> {
        let invalid = |reason: String| RouteError::InvalidRule {
            name: section.name.clone(),
            reason,
        };

        let kind: RuleKind = section.kind.parse().map_err(invalid)?;
        let target_role: Role = section
            .target_role
            .parse()
            .map_err(|e: monoco_core::CoreError| invalid(e.to_string()))?;

        let matcher = match kind {
            RuleKind::Command => Matcher::Command(section.pattern.clone()),
            RuleKind::Mention => Matcher::Mention(section.pattern.to_lowercase()),
            RuleKind::Keyword => Matcher::Keyword(
                section
                    .pattern
                    .split('|')
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            ),
            RuleKind::Regex => Matcher::Regex(
                regex::Regex::new(&section.pattern)
                    .map_err(|e| invalid(format!("bad regex: {e}")))?,
            ),
            RuleKind::Fallback => Matcher::Fallback,
        };

        Ok(Self {
            name: section.name.clone(),
            kind,
            pattern: section.pattern.clone(),
            target_role,
            priority: section.priority,
            enabled: section.enabled,
            matcher,
        })
    }

    /// The seeded default fallback, targeting the Architect at the lowest
    /// possible priority.
    #[must_use]
    pub fn seeded_fallback() -> Self {
        Self {
            name: "seeded-fallback".to_string(),
            kind: RuleKind::Fallback,
            pattern: String::new(),
            target_role: Role::Architect,
            priority: i32::MIN,
            enabled: true,
            matcher: Matcher::Fallback,
        }
    }

    /// Whether the rule matches the given context.
    #[must_use]
    pub fn matches(&self, context: &ConversationContext) -> bool {
        match &self.matcher {
            Matcher::Command(command) => context
                .latest_body()
                .split_whitespace()
                .next()
                .and_then(|token| token.strip_prefix('/'))
                .is_some_and(|token| token == command),
            Matcher::Mention(mention) => {
                let in_mentions = context
                    .mentions()
                    .any(|m| m.to_lowercase() == *mention);
                in_mentions || context.concatenated_body().to_lowercase().contains(mention)
            },
            Matcher::Keyword(keywords) => {
                let body = context.concatenated_body().to_lowercase();
                keywords.iter().any(|k| body.contains(k))
            },
            Matcher::Regex(regex) => regex.is_match(&context.concatenated_body()),
            Matcher::Fallback => true,
        }
    }
}

impl std::fmt::Debug for RoutingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingRule")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("pattern", &self.pattern)
            .field("target_role", &self.target_role)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::context_with_bodies;

    fn section(kind: &str, pattern: &str, role: &str) -> monoco_config::RuleSection {
        monoco_config::RuleSection {
            name: format!("{kind}-rule"),
            kind: kind.to_string(),
            pattern: pattern.to_string(),
            target_role: role.to_string(),
            priority: 0,
            enabled: true,
        }
    }

    #[test]
    fn test_command_matches_first_token_only() {
        let rule = RoutingRule::compile(&section("command", "issue", "architect")).unwrap();
        assert!(rule.matches(&context_with_bodies(&["/issue create a login page"])));
        assert!(!rule.matches(&context_with_bodies(&["please /issue later"])));
        assert!(!rule.matches(&context_with_bodies(&["/issues plural"])));
    }

    #[test]
    fn test_mention_matches_mentions_and_body() {
        let rule = RoutingRule::compile(&section("mention", "@Prime", "mailbox")).unwrap();

        let mut ctx = context_with_bodies(&["no mention here"]);
        assert!(!rule.matches(&ctx));

        ctx = context_with_bodies(&["hey @prime can you help"]);
        assert!(rule.matches(&ctx));

        let ctx = crate::context::test_support::context_with_mentions(
            &["unrelated body"],
            &["@Prime"],
        );
        assert!(rule.matches(&ctx));
    }

    #[test]
    fn test_keyword_or_list() {
        let rule = RoutingRule::compile(&section("keyword", "bug | crash|panic", "engineer")).unwrap();
        assert!(rule.matches(&context_with_bodies(&["we hit a CRASH in prod"])));
        assert!(rule.matches(&context_with_bodies(&["kernel Panic observed"])));
        assert!(!rule.matches(&context_with_bodies(&["all good"])));
    }

    #[test]
    fn test_regex_over_concatenated_bodies() {
        let rule = RoutingRule::compile(&section("regex", r"FEAT-\d+", "engineer")).unwrap();
        assert!(rule.matches(&context_with_bodies(&["see", "ticket FEAT-17 please"])));
        assert!(!rule.matches(&context_with_bodies(&["see ticket"])));
    }

    #[test]
    fn test_bad_regex_rejected() {
        let err = RoutingRule::compile(&section("regex", "(unclosed", "engineer")).unwrap_err();
        assert!(matches!(err, RouteError::InvalidRule { .. }));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let err = RoutingRule::compile(&section("keyword", "x", "janitor")).unwrap_err();
        assert!(matches!(err, RouteError::InvalidRule { .. }));
    }

    #[test]
    fn test_fallback_always_matches() {
        let rule = RoutingRule::seeded_fallback();
        assert!(rule.matches(&context_with_bodies(&[])));
        assert_eq!(rule.priority, i32::MIN);
        assert_eq!(rule.target_role, Role::Architect);
    }
}
