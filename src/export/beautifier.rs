//! SQL pretty-printer
//!
//! Two passes over a fragment:
//! 1. Keywords are upper-cased from the T-SQL token stream, so string
//!    literals, comments and bracketed identifiers keep their text.
//! 2. Each statement is aligned according to its kind: column definitions
//!    for `CREATE TABLE`, assignments for `UPDATE`, aliases for `SELECT`.
//!
//! Layout is otherwise preserved; this is not a reindenter.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::dialect::MsSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Word};
use thiserror::Error;

static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "ADD", "ALL", "ALTER", "AND", "ANY", "APPLY", "AS", "ASC", "BEGIN", "BETWEEN", "BY",
        "CASE", "CAST", "CHECK", "CLUSTERED", "COLLATE", "CONSTRAINT", "CONVERT", "CREATE",
        "CROSS", "DECLARE", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE", "END",
        "EXCEPT", "EXEC", "EXECUTE", "EXISTS", "FOREIGN", "FROM", "FULL", "GO", "GROUP",
        "HAVING", "IDENTITY", "IF", "IN", "INDEX", "INNER", "INSERT", "INTERSECT", "INTO", "IS",
        "JOIN", "KEY", "LEFT", "LIKE", "MATCHED", "MERGE", "NOCHECK", "NOLOCK", "NONCLUSTERED",
        "NOT", "NULL", "ON", "OR", "ORDER", "OUTER", "OUTPUT", "OVER", "PARTITION", "PRIMARY",
        "REFERENCES", "RETURN", "RIGHT", "SELECT", "SET", "TABLE", "THEN", "TOP", "TRUNCATE",
        "UNION", "UNIQUE", "UPDATE", "USE", "USING", "VALUES", "WHEN", "WHERE", "WITH",
    ]
    .into_iter()
    .collect()
});

static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bCREATE\s+TABLE\b").unwrap());
static UPDATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bUPDATE\b").unwrap());
static SELECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bSELECT\b").unwrap());

static COLUMN_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)^(\[[^\]]+\]|`[^`]+`|"[^"]+"|\w+)\s*(.*)"#).unwrap());
static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.\[\]@]+\s*=\s*\S+").unwrap());
static COLUMN_ALIAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bAS\s+(\w+)(,|$)").unwrap());

/// Beautifier errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BeautifyError {
    #[error("SQL query must be a non-empty string")]
    Empty,
}

/// Statement shape that decides the alignment pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    CreateTable,
    Update,
    Select,
    Other,
}

impl StatementKind {
    /// Kind of a token run; checked in the order `CREATE TABLE`, `UPDATE`,
    /// `SELECT`
    fn of_tokens(tokens: &[Token]) -> Self {
        let words: Vec<String> = tokens
            .iter()
            .filter(|t| !matches!(t, Token::Whitespace(_)))
            .map(|t| match t {
                Token::Word(w) if w.quote_style.is_none() => w.value.to_uppercase(),
                _ => String::new(),
            })
            .collect();

        if words.windows(2).any(|pair| pair[0] == "CREATE" && pair[1] == "TABLE") {
            StatementKind::CreateTable
        } else if words.iter().any(|w| w == "UPDATE") {
            StatementKind::Update
        } else if words.iter().any(|w| w == "SELECT") {
            StatementKind::Select
        } else {
            StatementKind::Other
        }
    }

    /// Text fallback for input the tokenizer rejects
    fn of_text(sql: &str) -> Self {
        if CREATE_TABLE.is_match(sql) {
            StatementKind::CreateTable
        } else if UPDATE.is_match(sql) {
            StatementKind::Update
        } else if SELECT.is_match(sql) {
            StatementKind::Select
        } else {
            StatementKind::Other
        }
    }
}

/// Formats SQL fragments for the generated script
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlBeautifier;

impl SqlBeautifier {
    pub fn new() -> Self {
        Self
    }

    /// Upper-case keywords, then align each statement by kind.
    ///
    /// Statements are split at `;`, which stays with its statement. Input
    /// the tokenizer cannot read is treated as a single statement and only
    /// aligned.
    pub fn beautify(&self, sql: &str) -> Result<String, BeautifyError> {
        if sql.trim().is_empty() {
            return Err(BeautifyError::Empty);
        }

        let statements = match Tokenizer::new(&MsSqlDialect {}, sql)
            .with_unescape(false)
            .tokenize()
        {
            Ok(tokens) => split_statements(tokens),
            Err(e) => {
                tracing::debug!(error = %e, "SQL tokenizer failed, aligning raw text");
                vec![(sql.to_string(), StatementKind::of_text(sql))]
            }
        };

        let formatted: Vec<String> = statements
            .into_iter()
            .filter(|(text, _)| !text.trim().is_empty())
            .map(|(text, kind)| {
                let aligned = match kind {
                    StatementKind::CreateTable => format_create_table(&text),
                    StatementKind::Update => align_equals_signs(&text),
                    StatementKind::Select => align_column_aliases(&text),
                    StatementKind::Other => text,
                };
                aligned.trim().to_string()
            })
            .collect();

        Ok(formatted.join("\n"))
    }

    /// Kind of the first statement in `sql`
    pub fn detect_kind(&self, sql: &str) -> StatementKind {
        match Tokenizer::new(&MsSqlDialect {}, sql).with_unescape(false).tokenize() {
            Ok(tokens) => split_statements(tokens)
                .into_iter()
                .find(|(text, _)| !text.trim().is_empty())
                .map_or(StatementKind::Other, |(_, kind)| kind),
            Err(_) => StatementKind::of_text(sql),
        }
    }
}

fn upper_keyword(token: Token) -> Token {
    match token {
        Token::Word(word)
            if word.quote_style.is_none() && KEYWORDS.contains(word.value.to_uppercase().as_str()) =>
        {
            Token::Word(Word {
                value: word.value.to_uppercase(),
                ..word
            })
        }
        other => other,
    }
}

/// Render statements with upper-cased keywords, each tagged with its kind
fn split_statements(tokens: Vec<Token>) -> Vec<(String, StatementKind)> {
    let mut statements = Vec::new();
    let mut current: Vec<Token> = Vec::new();

    let mut flush = |current: &mut Vec<Token>| {
        if current.is_empty() {
            return;
        }
        let kind = StatementKind::of_tokens(current);
        let text: String = current.drain(..).map(|t| t.to_string()).collect();
        statements.push((text, kind));
    };

    for token in tokens {
        if token == Token::EOF {
            continue;
        }
        let is_end = token == Token::SemiColon;
        current.push(upper_keyword(token));
        if is_end {
            flush(&mut current);
        }
    }
    flush(&mut current);

    statements
}

/// Column definitions of a parenthesised group, split at top-level commas.
///
/// Accepts the group with or without its outer parentheses. Commas nested in
/// parentheses or inside quoted literals do not split.
pub fn split_column_definitions(group: &str) -> Vec<&str> {
    let group = group.trim();
    let inner = match matching_close(group, 0) {
        Some(end) if group.starts_with('(') && end == group.len() - 1 => &group[1..end],
        _ => group,
    };

    let mut columns = Vec::new();
    let mut depth = 0usize;
    let mut in_literal = false;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '\'' => in_literal = !in_literal,
            '(' if !in_literal => depth += 1,
            ')' if !in_literal => depth = depth.saturating_sub(1),
            ',' if !in_literal && depth == 0 => {
                columns.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    columns.push(inner[start..].trim());
    columns.retain(|c| !c.is_empty());
    columns
}

/// Byte index of the `)` closing the `(` at `open`. Parentheses inside
/// quoted literals are not counted.
fn matching_close(text: &str, open: usize) -> Option<usize> {
    if !text[open..].starts_with('(') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_literal = false;
    for (i, c) in text[open..].char_indices() {
        match c {
            '\'' => in_literal = !in_literal,
            '(' if !in_literal => depth += 1,
            ')' if !in_literal => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// One column definition per line, names padded to the longest name.
pub fn format_create_table(sql: &str) -> String {
    let Some(start) = sql.find('(') else {
        return sql.to_string();
    };
    let end = match matching_close(sql, start).or_else(|| sql.rfind(')')) {
        Some(end) if end > start => end,
        _ => return sql.to_string(),
    };

    let prefix = &sql[..=start];
    let suffix = &sql[end..];
    let columns = split_column_definitions(&sql[start + 1..end]);
    if columns.is_empty() {
        return format!("{} {}", prefix, suffix);
    }

    let parsed: Vec<(Option<&str>, &str)> = columns
        .iter()
        .map(|column| match COLUMN_NAME.captures(column) {
            Some(caps) => (
                caps.get(1).map(|m| m.as_str()),
                caps.get(2).map_or("", |m| m.as_str().trim()),
            ),
            None => (None, *column),
        })
        .collect();
    let width = parsed
        .iter()
        .filter_map(|(name, _)| name.map(|n| n.chars().count()))
        .max()
        .unwrap_or(0);

    let last = parsed.len() - 1;
    let lines: Vec<String> = parsed
        .iter()
        .enumerate()
        .map(|(i, (name, definition))| {
            let comma = if i < last { "," } else { "" };
            match name {
                Some(name) => format!("    {:<width$} {}{}", name, definition, comma),
                None => format!("    {}{}", definition, comma),
            }
        })
        .collect();

    format!("{}\n{}\n{}", prefix, lines.join("\n"), suffix)
}

/// Align `lhs = rhs` lines on the `=`
pub fn align_equals_signs(sql: &str) -> String {
    let mut lines: Vec<String> = sql.split('\n').map(str::to_string).collect();

    let assignments: Vec<(usize, String, String)> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            let trimmed = line.trim();
            if !ASSIGNMENT.is_match(trimmed) {
                return None;
            }
            let (lhs, rhs) = trimmed.split_once('=')?;
            Some((i, lhs.trim().to_string(), rhs.trim().to_string()))
        })
        .collect();

    let Some(width) = assignments.iter().map(|(_, lhs, _)| lhs.chars().count()).max() else {
        return sql.to_string();
    };
    for (i, lhs, rhs) in assignments {
        lines[i] = format!("    {:<width$} = {}", lhs, rhs);
    }
    lines.join("\n")
}

/// Align the `AS <alias>` of aliased select-list lines
pub fn align_column_aliases(sql: &str) -> String {
    let mut lines: Vec<String> = sql.split('\n').map(str::to_string).collect();

    let aliased: Vec<(usize, String, String, String)> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            let indent = &line[..line.len() - line.trim_start().len()];
            let trimmed = line.trim();
            let caps = COLUMN_ALIAS.captures(trimmed)?;
            let clause = caps.get(0)?;
            let alias = caps.get(1)?;
            Some((
                i,
                indent.to_string(),
                trimmed[..clause.start()].trim_end().to_string(),
                trimmed[alias.start()..].to_string(),
            ))
        })
        .collect();

    let Some(width) = aliased.iter().map(|(_, _, expr, _)| expr.chars().count()).max() else {
        return sql.to_string();
    };
    for (i, indent, expr, alias) in aliased {
        lines[i] = format!("{}{:<width$} AS {}", indent, expr, alias);
    }
    lines.join("\n")
}
