//! Rule evaluation and copy-on-write reload.

use crate::context::ConversationContext;
use crate::error::{RouteError, RouteResult};
use crate::rule::{RoutingRule, RuleKind};
use monoco_core::Role;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Outcome of one routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    /// Role to dispatch to.
    pub role: Role,
    /// Name of the rule that matched.
    pub rule_name: String,
    /// Human-readable reason for logs and synthetic replies.
    pub reason: String,
}

/// Priority-ordered rule evaluator.
pub struct MessageRouter {
    rules: RwLock<Arc<Vec<RoutingRule>>>,
}

impl MessageRouter {
    /// Build a router from configuration rules.
    ///
    /// A fallback rule targeting the Architect is seeded if the
    /// configuration carries none.
    ///
    /// # Errors
    ///
    /// Returns the first rule that fails to compile.
    pub fn from_config(sections: &[monoco_config::RuleSection]) -> RouteResult<Self> {
        let rules = Self::compile(sections)?;
        Ok(Self {
            rules: RwLock::new(Arc::new(rules)),
        })
    }

    /// Replace the rule list atomically.
    ///
    /// Compilation failures leave the previous rules in place; the new list
    /// takes effect on the next routing decision.
    ///
    /// # Errors
    ///
    /// Returns the first rule that fails to compile.
    pub fn reload(&self, sections: &[monoco_config::RuleSection]) -> RouteResult<()> {
        let rules = Self::compile(sections)?;
        let count = rules.len();
        *self
            .rules
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Arc::new(rules);
        info!(rules = count, "routing rules reloaded");
        Ok(())
    }

    fn compile(sections: &[monoco_config::RuleSection]) -> RouteResult<Vec<RoutingRule>> {
        let mut rules = sections
            .iter()
            .map(RoutingRule::compile)
            .collect::<RouteResult<Vec<_>>>()?;

        if !rules
            .iter()
            .any(|r| r.kind == RuleKind::Fallback && r.enabled)
        {
            debug!("no enabled fallback rule configured, seeding architect fallback");
            rules.push(RoutingRule::seeded_fallback());
        }

        // Descending priority; first match wins.
        rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
        Ok(rules)
    }

    /// Route a conversation context to a role.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::NoMatch`] only when every rule, including the
    /// fallback, is disabled.
    pub fn route(&self, context: &ConversationContext) -> RouteResult<RouteDecision> {
        let rules = Arc::clone(
            &self
                .rules
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );

        for rule in rules.iter().filter(|r| r.enabled) {
            if rule.matches(context) {
                let decision = RouteDecision {
                    role: rule.target_role,
                    rule_name: rule.name.clone(),
                    reason: format!(
                        "rule `{}` ({:?}) matched for session {}",
                        rule.name, rule.kind, context.session_id
                    ),
                };
                debug!(
                    session_id = %context.session_id,
                    rule = %rule.name,
                    role = %decision.role,
                    "routed inbound conversation"
                );
                return Ok(decision);
            }
        }

        Err(RouteError::NoMatch {
            session_id: context.session_id.clone(),
        })
    }

    /// Number of active rules (seeded fallback included).
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("rules", &self.rule_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::{context_with_bodies, context_with_mentions};
    use monoco_config::RuleSection;

    fn rule(name: &str, kind: &str, pattern: &str, role: &str, priority: i32) -> RuleSection {
        RuleSection {
            name: name.to_string(),
            kind: kind.to_string(),
            pattern: pattern.to_string(),
            target_role: role.to_string(),
            priority,
            enabled: true,
        }
    }

    #[test]
    fn test_priority_order_first_match_wins() {
        let router = MessageRouter::from_config(&[
            rule("low", "keyword", "deploy", "engineer", 1),
            rule("high", "keyword", "deploy", "reviewer", 10),
        ])
        .unwrap();

        let decision = router
            .route(&context_with_bodies(&["please deploy this"]))
            .unwrap();
        assert_eq!(decision.rule_name, "high");
        assert_eq!(decision.role, Role::Reviewer);
    }

    #[test]
    fn test_fallback_seeded_when_absent() {
        let router = MessageRouter::from_config(&[]).unwrap();
        assert_eq!(router.rule_count(), 1);

        let decision = router
            .route(&context_with_bodies(&["anything at all"]))
            .unwrap();
        assert_eq!(decision.role, Role::Architect);
        assert_eq!(decision.rule_name, "seeded-fallback");
    }

    #[test]
    fn test_mention_routes_to_prime() {
        let router = MessageRouter::from_config(&[rule(
            "mention-prime",
            "mention",
            "@Prime",
            "prime",
            100,
        )])
        .unwrap();

        let context = context_with_mentions(&["@Prime help"], &["@Prime"]);
        let decision = router.route(&context).unwrap();
        assert_eq!(decision.role, Role::Mailbox);
    }

    #[test]
    fn test_disabled_rule_skipped() {
        let mut disabled = rule("cmd", "command", "issue", "architect", 10);
        disabled.enabled = false;
        let router = MessageRouter::from_config(&[
            disabled,
            rule("kw", "keyword", "issue", "engineer", 1),
        ])
        .unwrap();

        let decision = router
            .route(&context_with_bodies(&["/issue from chat"]))
            .unwrap();
        assert_eq!(decision.rule_name, "kw");
    }

    #[test]
    fn test_reload_swaps_rules() {
        let router =
            MessageRouter::from_config(&[rule("kw", "keyword", "bug", "engineer", 1)]).unwrap();

        router
            .reload(&[rule("kw2", "keyword", "bug", "coroner", 1)])
            .unwrap();

        let decision = router
            .route(&context_with_bodies(&["found a bug"]))
            .unwrap();
        assert_eq!(decision.role, Role::Coroner);
    }

    #[test]
    fn test_reload_failure_keeps_old_rules() {
        let router =
            MessageRouter::from_config(&[rule("kw", "keyword", "bug", "engineer", 1)]).unwrap();

        let err = router
            .reload(&[rule("bad", "regex", "(unclosed", "engineer", 1)])
            .unwrap_err();
        assert!(matches!(err, RouteError::InvalidRule { .. }));

        let decision = router
            .route(&context_with_bodies(&["found a bug"]))
            .unwrap();
        assert_eq!(decision.rule_name, "kw");
    }
}
