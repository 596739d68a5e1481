//! Rule evaluation — meeting attributes + ordered rule set -> verdict.
//!
//! Pure: no I/O, no clock, no mutation. Identical inputs always yield the
//! identical verdict, which is what makes decisions replayable and auditable.

use crate::db::{DbMeeting, DbRule};
use crate::types::{RuleAction, RuleField, RuleOperator, Verdict, VerdictOutcome};

/// A meeting attribute read for comparison. Numeric fields keep their number
/// so `gte`/`lte` never go through string parsing twice.
enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    fn as_text(&self) -> String {
        match self {
            FieldValue::Number(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => {
                format!("{}", *v as i64)
            }
            FieldValue::Number(v) => v.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

/// Evaluate a meeting against a user's rule set.
///
/// Rules run in ascending `(priority, id)` order and the first matching active
/// rule decides the outcome (short-circuit). A rule whose field is missing on
/// the meeting, or whose numeric comparison cannot be made, is skipped — it
/// never fails the meeting outright. No active rules, or no match, resolves to
/// `needs_review` with an explanatory reason.
pub fn evaluate(meeting: &DbMeeting, rules: &[DbRule]) -> Verdict {
    let mut active: Vec<&DbRule> = rules.iter().filter(|r| r.is_active).collect();
    active.sort_by_key(|r| (r.priority, r.id));

    if active.is_empty() {
        return Verdict {
            outcome: VerdictOutcome::NeedsReview,
            matched_rule_id: None,
            reason: "no active qualification rules configured".to_string(),
        };
    }

    for rule in active {
        if rule_matches(meeting, rule) == Some(true) {
            let outcome = match rule.action {
                RuleAction::Qualify => VerdictOutcome::Qualified,
                RuleAction::Disqualify => VerdictOutcome::Disqualified,
            };
            return Verdict {
                outcome,
                matched_rule_id: Some(rule.id),
                reason: format!(
                    "rule {} matched: {} {} {}",
                    rule.id,
                    rule.field.as_str(),
                    rule.operator.as_str(),
                    rule.value
                ),
            };
        }
    }

    Verdict {
        outcome: VerdictOutcome::NeedsReview,
        matched_rule_id: None,
        reason: "no qualification rule matched".to_string(),
    }
}

/// Whether one rule matches the meeting.
///
/// None means the rule could not be applied (missing field, non-numeric value
/// under a numeric operator) and evaluation moves on to the next rule.
fn rule_matches(meeting: &DbMeeting, rule: &DbRule) -> Option<bool> {
    let value = field_value(meeting, rule.field)?;

    match rule.operator {
        RuleOperator::Gte | RuleOperator::Lte => {
            let field_num = value.as_number()?;
            let rule_num = rule.value.trim().parse::<f64>().ok()?;
            Some(match rule.operator {
                RuleOperator::Gte => field_num >= rule_num,
                _ => field_num <= rule_num,
            })
        }
        // Case-sensitive exact match on the string form
        RuleOperator::Eq => Some(value.as_text() == rule.value),
        RuleOperator::Ne => Some(value.as_text() != rule.value),
        // Case-insensitive substring test
        RuleOperator::Contains => Some(
            value
                .as_text()
                .to_lowercase()
                .contains(&rule.value.to_lowercase()),
        ),
        RuleOperator::NotContains => Some(
            !value
                .as_text()
                .to_lowercase()
                .contains(&rule.value.to_lowercase()),
        ),
    }
}

fn field_value(meeting: &DbMeeting, field: RuleField) -> Option<FieldValue> {
    match field {
        RuleField::Revenue => meeting.revenue.map(FieldValue::Number),
        RuleField::CompanySize => meeting.company_size.map(|v| FieldValue::Number(v as f64)),
        RuleField::Industry => meeting.industry.clone().map(FieldValue::Text),
        RuleField::Budget => meeting.budget.clone().map(FieldValue::Text),
        RuleField::Custom => meeting.custom_data.clone().map(FieldValue::Text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MeetingStatus;

    fn meeting() -> DbMeeting {
        DbMeeting {
            id: "m1".to_string(),
            user_id: "u1".to_string(),
            external_id: "evt-1".to_string(),
            title: "Intro call".to_string(),
            start_time: "2026-02-03T15:00:00+00:00".to_string(),
            end_time: "2026-02-03T15:30:00+00:00".to_string(),
            attendee_email: Some("alice@acme.com".to_string()),
            company: Some("Acme".to_string()),
            revenue: Some(2_000_000.0),
            company_size: Some(250),
            industry: Some("Enterprise Software".to_string()),
            budget: Some("50000".to_string()),
            custom_data: None,
            status: MeetingStatus::Pending,
            qualification_reason: None,
            matched_rule_id: None,
            no_show_reason: None,
            no_show_marked_at: None,
            last_processed: None,
            created_at: "2026-02-01T00:00:00+00:00".to_string(),
            updated_at: "2026-02-01T00:00:00+00:00".to_string(),
        }
    }

    fn rule(
        id: i64,
        field: RuleField,
        operator: RuleOperator,
        value: &str,
        action: RuleAction,
        priority: i64,
    ) -> DbRule {
        DbRule {
            id,
            user_id: "u1".to_string(),
            field,
            operator,
            value: value.to_string(),
            action,
            priority,
            is_active: true,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_revenue_gte_qualifies() {
        let rules = vec![rule(
            1,
            RuleField::Revenue,
            RuleOperator::Gte,
            "1000000",
            RuleAction::Qualify,
            0,
        )];
        let verdict = evaluate(&meeting(), &rules);
        assert_eq!(verdict.outcome, VerdictOutcome::Qualified);
        assert_eq!(verdict.matched_rule_id, Some(1));
    }

    #[test]
    fn test_no_rules_needs_review() {
        let verdict = evaluate(&meeting(), &[]);
        assert_eq!(verdict.outcome, VerdictOutcome::NeedsReview);
        assert!(verdict.matched_rule_id.is_none());
    }

    #[test]
    fn test_no_match_needs_review() {
        let rules = vec![rule(
            1,
            RuleField::Revenue,
            RuleOperator::Gte,
            "10000000",
            RuleAction::Qualify,
            0,
        )];
        let verdict = evaluate(&meeting(), &rules);
        assert_eq!(verdict.outcome, VerdictOutcome::NeedsReview);
        assert_eq!(verdict.reason, "no qualification rule matched");
    }

    #[test]
    fn test_deterministic() {
        let rules = vec![
            rule(1, RuleField::Industry, RuleOperator::Contains, "software", RuleAction::Qualify, 5),
            rule(2, RuleField::Revenue, RuleOperator::Lte, "500000", RuleAction::Disqualify, 1),
        ];
        let first = evaluate(&meeting(), &rules);
        let second = evaluate(&meeting(), &rules);
        assert_eq!(first, second);
    }

    #[test]
    fn test_first_match_by_priority_wins() {
        // Disqualify at priority 0 beats qualify at priority 1 even though
        // both match.
        let rules = vec![
            rule(1, RuleField::Revenue, RuleOperator::Gte, "1000000", RuleAction::Qualify, 1),
            rule(2, RuleField::CompanySize, RuleOperator::Gte, "100", RuleAction::Disqualify, 0),
        ];
        let verdict = evaluate(&meeting(), &rules);
        assert_eq!(verdict.outcome, VerdictOutcome::Disqualified);
        assert_eq!(verdict.matched_rule_id, Some(2));
    }

    #[test]
    fn test_priority_tie_broken_by_id() {
        let rules = vec![
            rule(9, RuleField::Revenue, RuleOperator::Gte, "0", RuleAction::Disqualify, 3),
            rule(4, RuleField::Revenue, RuleOperator::Gte, "0", RuleAction::Qualify, 3),
        ];
        let verdict = evaluate(&meeting(), &rules);
        assert_eq!(verdict.matched_rule_id, Some(4));
        assert_eq!(verdict.outcome, VerdictOutcome::Qualified);
    }

    #[test]
    fn test_removing_non_matching_rule_preserves_outcome() {
        let matching = rule(3, RuleField::Revenue, RuleOperator::Gte, "1000000", RuleAction::Qualify, 5);
        let non_matching = rule(1, RuleField::Budget, RuleOperator::Eq, "nope", RuleAction::Disqualify, 0);

        let with = evaluate(&meeting(), &[non_matching, matching.clone()]);
        let without = evaluate(&meeting(), &[matching]);
        assert_eq!(with, without);
    }

    #[test]
    fn test_missing_field_skips_rule() {
        let mut m = meeting();
        m.revenue = None;
        let rules = vec![
            rule(1, RuleField::Revenue, RuleOperator::Gte, "1", RuleAction::Disqualify, 0),
            rule(2, RuleField::CompanySize, RuleOperator::Gte, "100", RuleAction::Qualify, 1),
        ];
        let verdict = evaluate(&m, &rules);
        // Revenue rule cannot match without the field; company-size decides
        assert_eq!(verdict.outcome, VerdictOutcome::Qualified);
        assert_eq!(verdict.matched_rule_id, Some(2));
    }

    #[test]
    fn test_non_numeric_field_skips_numeric_operator() {
        let mut m = meeting();
        m.budget = Some("call us".to_string());
        let rules = vec![
            rule(1, RuleField::Budget, RuleOperator::Gte, "10000", RuleAction::Qualify, 0),
        ];
        let verdict = evaluate(&m, &rules);
        assert_eq!(verdict.outcome, VerdictOutcome::NeedsReview);
    }

    #[test]
    fn test_numeric_budget_string_coerced() {
        let rules = vec![
            rule(1, RuleField::Budget, RuleOperator::Gte, "10000", RuleAction::Qualify, 0),
        ];
        // budget is "50000" as a string — coerces to 50000.0
        let verdict = evaluate(&meeting(), &rules);
        assert_eq!(verdict.outcome, VerdictOutcome::Qualified);
    }

    #[test]
    fn test_eq_is_case_sensitive() {
        let rules = vec![
            rule(1, RuleField::Industry, RuleOperator::Eq, "enterprise software", RuleAction::Qualify, 0),
        ];
        let verdict = evaluate(&meeting(), &rules);
        assert_eq!(verdict.outcome, VerdictOutcome::NeedsReview);

        let rules = vec![
            rule(1, RuleField::Industry, RuleOperator::Eq, "Enterprise Software", RuleAction::Qualify, 0),
        ];
        let verdict = evaluate(&meeting(), &rules);
        assert_eq!(verdict.outcome, VerdictOutcome::Qualified);
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let rules = vec![
            rule(1, RuleField::Industry, RuleOperator::Contains, "SOFTWARE", RuleAction::Qualify, 0),
        ];
        let verdict = evaluate(&meeting(), &rules);
        assert_eq!(verdict.outcome, VerdictOutcome::Qualified);
    }

    #[test]
    fn test_not_contains_disqualifies() {
        let rules = vec![
            rule(1, RuleField::Industry, RuleOperator::NotContains, "fintech", RuleAction::Disqualify, 0),
        ];
        let verdict = evaluate(&meeting(), &rules);
        assert_eq!(verdict.outcome, VerdictOutcome::Disqualified);
    }

    #[test]
    fn test_inactive_rules_ignored() {
        let mut inactive = rule(1, RuleField::Revenue, RuleOperator::Gte, "1", RuleAction::Disqualify, 0);
        inactive.is_active = false;
        let verdict = evaluate(&meeting(), &[inactive]);
        assert_eq!(verdict.outcome, VerdictOutcome::NeedsReview);
        assert_eq!(verdict.reason, "no active qualification rules configured");
    }

    #[test]
    fn test_eq_on_numeric_field_uses_integer_form() {
        let rules = vec![
            rule(1, RuleField::CompanySize, RuleOperator::Eq, "250", RuleAction::Qualify, 0),
        ];
        let verdict = evaluate(&meeting(), &rules);
        assert_eq!(verdict.outcome, VerdictOutcome::Qualified);
    }
}
