//! # Script Preparation
//!
//! Turns raw script text into executable statements:
//!
//! 1. `$0`, `$1`, ... are replaced with text parameters
//! 2. context tokens (`__ip__`, `__login_user_id__`, ...) are replaced
//! 3. the text is split on `;` outside quotes, comments are stripped and
//!    empty statements dropped
//! 4. `?` placeholders are counted per statement

use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::errors::{SqlError, SqlResult};

/// Values substituted for the context tokens a script may contain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replacements {
    pub client_ip: String,
    pub token_user_id: String,
    pub token_user_code: String,
    pub login_user_id: String,
    pub login_user_code: String,
}

impl Replacements {
    pub fn apply(&self, text: &str) -> String {
        text.replace("__ip__", &self.client_ip)
            .replace("__token_user_id__", &self.token_user_id)
            .replace("__token_user_code__", &self.token_user_code)
            .replace("__login_user_id__", &self.login_user_id)
            .replace("__login_user_code__", &self.login_user_code)
    }
}

/// A single statement ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    pub sql: String,
    pub placeholders: usize,
}

impl PreparedStatement {
    /// Whether the statement yields rows rather than a rows-affected count
    pub fn is_row_returning(&self) -> bool {
        let keyword = self
            .sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        matches!(
            keyword.trim_start_matches('('),
            "SELECT" | "SHOW" | "DESCRIBE" | "DESC" | "EXPLAIN" | "WITH"
        )
    }
}

/// An ordered batch of statements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedScript {
    pub statements: Vec<PreparedStatement>,
}

impl PreparedScript {
    pub fn prepare(script: &str, text_params: &[String], replacements: &Replacements) -> Self {
        let text = replacements.apply(&substitute_text_params(script, text_params));
        let statements = split_statements(&text)
            .into_iter()
            .map(|sql| {
                let placeholders = count_placeholders(&sql);
                PreparedStatement { sql, placeholders }
            })
            .collect();
        Self { statements }
    }

    /// Placeholders across the whole batch
    pub fn total_placeholders(&self) -> usize {
        self.statements.iter().map(|s| s.placeholders).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Reject a parameter group that cannot fill the batch
    pub fn check_params(&self, actual: usize) -> SqlResult<()> {
        let expected = self.total_placeholders();
        if actual < expected {
            return Err(SqlError::ParamCount { expected, actual });
        }
        Ok(())
    }
}

fn text_param_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$(\d+)").ok()).as_ref()
}

/// Replace `$i` (0-based) with the i-th text parameter.
///
/// Tokens are matched whole, so `$10` never picks up the value of `$1`.
/// Tokens without a matching parameter are left as written.
pub fn substitute_text_params(script: &str, params: &[String]) -> String {
    let Some(pattern) = text_param_pattern().filter(|_| !params.is_empty()) else {
        return script.to_string();
    };
    pattern
        .replace_all(script, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| params.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Split on `;` outside quoted regions, dropping comments and blanks
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in script.chars() {
        if let Some(q) = quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            ';' => {
                push_normalized(&mut statements, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_normalized(&mut statements, &current);
    statements
}

fn push_normalized(out: &mut Vec<String>, raw: &str) {
    let stmt = normalize(raw);
    if !stmt.is_empty() {
        out.push(stmt);
    }
}

/// Strip full-line `--` and `#` comments and surrounding whitespace
pub fn normalize(statement: &str) -> String {
    statement
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            !(t.starts_with("--") || t.starts_with('#'))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Count `?` outside quoted regions
pub fn count_placeholders(statement: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in statement.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '?' => count += 1,
                _ => {}
            },
        }
    }
    count
}
