use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::*;
use crate::types::{RuleAction, RuleField, RuleOperator};

/// A qualification rule as supplied by the shell, before it has an id.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub user_id: String,
    pub field: RuleField,
    pub operator: RuleOperator,
    pub value: String,
    pub action: RuleAction,
    pub priority: i64,
    pub is_active: bool,
}

fn map_rule_row(row: &Row<'_>) -> Result<DbRule, rusqlite::Error> {
    let field_raw: String = row.get(2)?;
    let operator_raw: String = row.get(3)?;
    let action_raw: String = row.get(5)?;
    Ok(DbRule {
        id: row.get(0)?,
        user_id: row.get(1)?,
        field: column_enum(2, field_raw, RuleField::parse)?,
        operator: column_enum(3, operator_raw, RuleOperator::parse)?,
        value: row.get(4)?,
        action: column_enum(5, action_raw, RuleAction::parse)?,
        priority: row.get(6)?,
        is_active: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

const RULE_COLUMNS: &str =
    "id, user_id, field, operator, value, action, priority, is_active, created_at, updated_at";

impl TriageDb {
    // =========================================================================
    // Qualification rules
    // =========================================================================

    pub fn insert_rule(&self, rule: &NewRule, now: &DateTime<Utc>) -> Result<DbRule, DbError> {
        let now_str = now.to_rfc3339();
        self.conn.execute(
            "INSERT INTO qualification_rules
                 (user_id, field, operator, value, action, priority, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                rule.user_id,
                rule.field.as_str(),
                rule.operator.as_str(),
                rule.value,
                rule.action.as_str(),
                rule.priority,
                rule.is_active,
                now_str,
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        let sql = format!(
            "SELECT {} FROM qualification_rules WHERE id = ?1",
            RULE_COLUMNS
        );
        let rule = self.conn.query_row(&sql, params![id], map_rule_row)?;
        Ok(rule)
    }

    /// Active rules for a user in evaluation order: ascending `(priority, id)`.
    pub fn list_active_rules(&self, user_id: &str) -> Result<Vec<DbRule>, DbError> {
        let sql = format!(
            "SELECT {} FROM qualification_rules
             WHERE user_id = ?1 AND is_active = 1
             ORDER BY priority ASC, id ASC",
            RULE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], map_rule_row)?;

        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?);
        }
        Ok(rules)
    }

    /// Toggle a rule without deleting it. Returns false when no such rule.
    pub fn set_rule_active(
        &self,
        rule_id: i64,
        is_active: bool,
        now: &DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let affected = self.conn.execute(
            "UPDATE qualification_rules SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            params![is_active, now.to_rfc3339(), rule_id],
        )?;
        Ok(affected > 0)
    }
}
