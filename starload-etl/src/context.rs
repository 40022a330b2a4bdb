//! Per-run context and key templating
//!
//! Stage keys may reference run values with `{name}` placeholders, for
//! example `log-data/{year}/{month}/`. Literal braces are written `{{` and `}}`.

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Template rendering failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown template key '{key}' in '{template}'")]
    UnknownKey { template: String, key: String },

    #[error("unbalanced brace at byte {position} in '{template}'")]
    UnbalancedBrace { template: String, position: usize },
}

/// Values describing one scheduled run
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    logical_date: DateTime<Utc>,
    values: BTreeMap<String, String>,
}

impl RunContext {
    /// New context with a fresh run id
    pub fn new(logical_date: DateTime<Utc>) -> Self {
        Self::with_run_id(Uuid::new_v4(), logical_date)
    }

    pub fn with_run_id(run_id: Uuid, logical_date: DateTime<Utc>) -> Self {
        let ts = logical_date.to_rfc3339();
        let mut values = BTreeMap::new();
        values.insert("run_id".to_string(), run_id.to_string());
        values.insert("ds".to_string(), logical_date.format("%Y-%m-%d").to_string());
        values.insert("ds_nodash".to_string(), logical_date.format("%Y%m%d").to_string());
        values.insert("ts".to_string(), ts.clone());
        values.insert(
            "ts_nodash".to_string(),
            logical_date.format("%Y%m%dT%H%M%S").to_string(),
        );
        values.insert("execution_date".to_string(), ts.clone());
        values.insert("logical_date".to_string(), ts);
        values.insert("year".to_string(), logical_date.year().to_string());
        values.insert("month".to_string(), format!("{:02}", logical_date.month()));
        values.insert("day".to_string(), format!("{:02}", logical_date.day()));
        values.insert("hour".to_string(), format!("{:02}", logical_date.hour()));

        Self {
            run_id,
            logical_date,
            values,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn logical_date(&self) -> DateTime<Utc> {
        self.logical_date
    }

    /// Look up a template value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Add or replace a template value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Substitute `{key}` placeholders with context values
    pub fn render(&self, template: &str) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(template.len());
        let mut chars = template.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    out.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    out.push('}');
                }
                '{' => {
                    let mut key = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((_, '{')) | None => {
                                return Err(TemplateError::UnbalancedBrace {
                                    template: template.to_string(),
                                    position: pos,
                                })
                            }
                            Some((_, k)) => key.push(k),
                        }
                    }
                    let value = self.get(key.trim()).ok_or_else(|| TemplateError::UnknownKey {
                        template: template.to_string(),
                        key: key.clone(),
                    })?;
                    out.push_str(value);
                }
                '}' => {
                    return Err(TemplateError::UnbalancedBrace {
                        template: template.to_string(),
                        position: pos,
                    })
                }
                other => out.push(other),
            }
        }

        Ok(out)
    }
}
