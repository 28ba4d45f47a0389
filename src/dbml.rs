//! Line-oriented DBML parser producing a raw [`ParseTree`].
//!
//! The tree is a deliberately loose shape: depending on the source it may
//! carry tables at the root (flat) or nested under per-schema blocks. The
//! adapter in [`crate::schema`] normalizes both shapes into the canonical
//! [`crate::schema::Schema`]; nothing outside that module should consume a
//! `ParseTree` directly.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

static TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^Table\s+(?P<name>"[^"]+"|[\w.]+)(?:\s+as\s+(?P<alias>"[^"]+"|\w+))?\s*(?:\[(?P<settings>[^\]]*)\])?\s*\{\s*$"#,
    )
    .unwrap()
});
static GROUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^TableGroup\s+(?P<name>"[^"]+"|[\w.]+)\s*(?:\[(?P<settings>[^\]]*)\])?\s*\{\s*$"#,
    )
    .unwrap()
});
static PROJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^Project(?:\s+(?P<name>"[^"]+"|[\w.]+))?\s*\{\s*$"#).unwrap());
static ENUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^Enum\s+(?:"[^"]+"|[\w.]+)\s*\{\s*$"#).unwrap());
static REF_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^Ref(?:\s+(?P<name>"[^"]+"|\w+))?\s*:\s*(?P<expr>.+)$"#).unwrap());
static REF_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^Ref(?:\s+(?P<name>"[^"]+"|\w+))?\s*\{\s*$"#).unwrap());
static COLUMN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?P<name>"[^"]+"|\w+)\s+(?P<type>"[^"]+"|[\w.]+(?:\([^)]*\))?(?:\[\])?)\s*(?:\[(?P<settings>.*)\])?\s*$"#,
    )
    .unwrap()
});
static NOTE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[Nn]ote\s*:\s*(?P<text>.*)$").unwrap());
static KV_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?P<key>\w+)\s*:\s*(?P<value>.+)$").unwrap());
static REF_EXPR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<left>.+?)\s*(?P<op><>|[<>-])\s*(?P<right>.+)$").unwrap()
});

/// 1-based line/column of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// One entry of a raw diagnostics list. Older parser versions reported errors
/// this way, with the location under either `location` or `start`.
#[derive(Debug, Clone, Default)]
pub struct RawDiagnostic {
    pub message: String,
    pub location: Option<Location>,
    pub start: Option<Location>,
}

/// Raw parse failure. The location may sit directly on the error or inside
/// the first diagnostic; [`crate::schema`] extracts it defensively.
#[derive(Debug, Clone, Default)]
pub struct RawError {
    pub message: String,
    pub location: Option<Location>,
    pub diagnostics: Vec<RawDiagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct RawField {
    pub name: String,
    pub type_name: String,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub is_not_null: bool,
    pub note: Option<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub name: String,
    pub alias: Option<String>,
    pub fields: Vec<RawField>,
    pub note: Option<String>,
    pub header_color: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RawGroup {
    pub name: String,
    pub table_names: Vec<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RawRef {
    pub name: Option<String>,
    pub source_table: String,
    pub source_field: String,
    pub target_table: String,
    pub target_field: String,
}

#[derive(Debug, Clone, Default)]
pub struct RawProject {
    pub name: Option<String>,
    pub database_type: Option<String>,
    pub note: Option<String>,
}

/// Tables nested one level under a named schema, the wrapped shape some
/// parser versions emit instead of root-level collections.
#[derive(Debug, Clone, Default)]
pub struct SchemaBlock {
    pub name: String,
    pub tables: Vec<RawTable>,
    pub groups: Vec<RawGroup>,
    pub refs: Vec<RawRef>,
}

#[derive(Debug, Clone, Default)]
pub struct ParseTree {
    pub tables: Vec<RawTable>,
    pub groups: Vec<RawGroup>,
    pub refs: Vec<RawRef>,
    pub project: Option<RawProject>,
    pub schemas: Vec<SchemaBlock>,
}

fn err_at(line: usize, column: usize, message: impl Into<String>) -> RawError {
    RawError {
        message: message.into(),
        location: Some(Location {
            line: line + 1,
            column: column + 1,
        }),
        diagnostics: Vec::new(),
    }
}

fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}

/// Replaces `//` line comments and `/* */` block comments with spaces,
/// keeping every line boundary so diagnostics stay accurate.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_block = false;
    let mut in_line = false;
    let mut quote: Option<char> = None;
    while let Some(c) = chars.next() {
        if c == '\n' {
            in_line = false;
            out.push('\n');
            continue;
        }
        if in_line {
            out.push(' ');
            continue;
        }
        if in_block {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                out.push_str("  ");
                in_block = false;
            } else {
                out.push(' ');
            }
            continue;
        }
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                chars.next();
                out.push_str("  ");
                in_line = true;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str("  ");
                in_block = true;
            }
            _ => out.push(c),
        }
    }
    out
}

/// Splits a `[a, b: c, d]` settings body on commas, honoring quotes and
/// parentheses. Returns lowercase keys with optional raw values.
fn split_settings(body: &str) -> Vec<(String, Option<String>)> {
    let mut items: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in body.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                items.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        items.push(current);
    }
    items
        .into_iter()
        .filter_map(|item| {
            let item = item.trim().to_string();
            if item.is_empty() {
                return None;
            }
            match item.split_once(':') {
                Some((key, value)) => Some((
                    key.trim().to_ascii_lowercase(),
                    Some(value.trim().to_string()),
                )),
                None => Some((item.to_ascii_lowercase(), None)),
            }
        })
        .collect()
}

/// Splits `schema.table.field` into table (everything before the last dot)
/// and field. Quoted segments keep dots intact.
fn split_endpoint(raw: &str) -> Option<(String, String)> {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix('"') {
        // "my table".field
        let close = rest.find('"')?;
        let table = rest[..close].to_string();
        let field = rest[close + 1..].strip_prefix('.')?.trim().to_string();
        if field.is_empty() {
            return None;
        }
        return Some((table, unquote(&field)));
    }
    let dot = trimmed.rfind('.')?;
    let table = trimmed[..dot].trim();
    let field = trimmed[dot + 1..].trim();
    if table.is_empty() || field.is_empty() {
        return None;
    }
    Some((unquote(table), unquote(field)))
}

fn parse_ref_expr(expr: &str, name: Option<String>, line: usize) -> Result<RawRef, RawError> {
    let caps = REF_EXPR_RE
        .captures(expr.trim())
        .ok_or_else(|| err_at(line, 0, format!("malformed relationship: {}", expr.trim())))?;
    let op = caps.name("op").map(|m| m.as_str()).unwrap_or(">");
    let left = split_endpoint(caps.name("left").map(|m| m.as_str()).unwrap_or(""));
    let right = split_endpoint(caps.name("right").map(|m| m.as_str()).unwrap_or(""));
    let (Some(left), Some(right)) = (left, right) else {
        return Err(err_at(
            line,
            0,
            format!("relationship endpoints must be table.field: {}", expr.trim()),
        ));
    };
    // `<` is the mirrored form of `>`; swap so the many side is always source.
    let ((source_table, source_field), (target_table, target_field)) = if op == "<" {
        (right, left)
    } else {
        (left, right)
    };
    Ok(RawRef {
        name,
        source_table,
        source_field,
        target_table,
        target_field,
    })
}

/// Reads the value of a `Note:` entry, consuming extra lines when the value
/// is a `'''` multi-line string. `i` points at the line holding the key.
fn parse_note_value(lines: &[&str], i: &mut usize, after_colon: &str) -> String {
    let value = after_colon.trim();
    if let Some(rest) = value.strip_prefix("'''") {
        if let Some(end) = rest.find("'''") {
            return rest[..end].trim().to_string();
        }
        let mut parts: Vec<String> = Vec::new();
        if !rest.trim().is_empty() {
            parts.push(rest.trim().to_string());
        }
        *i += 1;
        while *i < lines.len() {
            let line = lines[*i];
            if let Some(end) = line.find("'''") {
                let head = line[..end].trim();
                if !head.is_empty() {
                    parts.push(head.to_string());
                }
                break;
            }
            parts.push(line.trim().to_string());
            *i += 1;
        }
        return parts.join("\n");
    }
    unquote(value)
}

/// Skips a `{ ... }` block whose opening brace sits on the current line.
fn skip_block(lines: &[&str], i: &mut usize) {
    let mut depth = 1usize;
    *i += 1;
    while *i < lines.len() && depth > 0 {
        let line = lines[*i];
        depth += line.matches('{').count();
        depth = depth.saturating_sub(line.matches('}').count());
        if depth == 0 {
            break;
        }
        *i += 1;
    }
}

fn column_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

struct FieldSettings {
    field: RawField,
    inline_ref: Option<RawRef>,
}

fn apply_field_settings(
    mut field: RawField,
    table_name: &str,
    settings: &str,
    line: usize,
) -> Result<FieldSettings, RawError> {
    let mut inline_ref = None;
    for (key, value) in split_settings(settings) {
        match (key.as_str(), value) {
            ("pk", None) | ("primary key", None) => field.is_primary_key = true,
            ("unique", None) => field.is_unique = true,
            ("not null", None) => field.is_not_null = true,
            ("null", None) | ("increment", None) => {}
            ("note", Some(v)) => field.note = Some(unquote(&v)),
            ("default", Some(v)) => field.default = Some(unquote(&v)),
            ("ref", Some(v)) => {
                let expr = format!("{}.{} {}", table_name, field.name, v.trim());
                inline_ref = Some(parse_ref_expr(&expr, None, line)?);
            }
            // Unknown settings are tolerated, matching the wrapped parser.
            _ => {}
        }
    }
    Ok(FieldSettings { field, inline_ref })
}

fn parse_table(
    lines: &[&str],
    i: &mut usize,
    caps: &regex::Captures<'_>,
    refs: &mut Vec<RawRef>,
) -> Result<RawTable, RawError> {
    let mut table = RawTable {
        name: unquote(caps.name("name").map(|m| m.as_str()).unwrap_or("")),
        alias: caps.name("alias").map(|m| unquote(m.as_str())),
        ..RawTable::default()
    };
    if let Some(settings) = caps.name("settings") {
        for (key, value) in split_settings(settings.as_str()) {
            if key == "headercolor" {
                table.header_color = value.map(|v| unquote(&v));
            }
        }
    }
    *i += 1;
    while *i < lines.len() {
        let raw_line = lines[*i];
        let line = raw_line.trim();
        if line.is_empty() {
            *i += 1;
            continue;
        }
        if line == "}" {
            return Ok(table);
        }
        if line.starts_with("indexes") && line.ends_with('{') {
            skip_block(lines, i);
            *i += 1;
            continue;
        }
        if let Some(note_caps) = NOTE_LINE_RE.captures(line) {
            let text = note_caps.name("text").map(|m| m.as_str()).unwrap_or("");
            table.note = Some(parse_note_value(lines, i, text));
            *i += 1;
            continue;
        }
        if let Some(col_caps) = COLUMN_RE.captures(line) {
            let field = RawField {
                name: unquote(col_caps.name("name").map(|m| m.as_str()).unwrap_or("")),
                type_name: unquote(col_caps.name("type").map(|m| m.as_str()).unwrap_or("")),
                ..RawField::default()
            };
            let settings = col_caps.name("settings").map(|m| m.as_str()).unwrap_or("");
            let parsed = apply_field_settings(field, &table.name, settings, *i)?;
            table.fields.push(parsed.field);
            if let Some(r) = parsed.inline_ref {
                refs.push(r);
            }
            *i += 1;
            continue;
        }
        return Err(err_at(
            *i,
            column_of(raw_line),
            format!("unexpected line in table '{}': {}", table.name, line),
        ));
    }
    Err(err_at(
        lines.len().saturating_sub(1),
        0,
        format!("unterminated table '{}'", table.name),
    ))
}

fn parse_group(
    lines: &[&str],
    i: &mut usize,
    caps: &regex::Captures<'_>,
) -> Result<RawGroup, RawError> {
    let mut group = RawGroup {
        name: unquote(caps.name("name").map(|m| m.as_str()).unwrap_or("")),
        ..RawGroup::default()
    };
    if let Some(settings) = caps.name("settings") {
        for (key, value) in split_settings(settings.as_str()) {
            if key == "color" || key == "headercolor" {
                group.color = value.map(|v| unquote(&v));
            }
        }
    }
    *i += 1;
    while *i < lines.len() {
        let line = lines[*i].trim();
        if line.is_empty() {
            *i += 1;
            continue;
        }
        if line == "}" {
            return Ok(group);
        }
        for name in line.split_whitespace() {
            group.table_names.push(unquote(name));
        }
        *i += 1;
    }
    Err(err_at(
        lines.len().saturating_sub(1),
        0,
        format!("unterminated table group '{}'", group.name),
    ))
}

fn parse_project(
    lines: &[&str],
    i: &mut usize,
    caps: &regex::Captures<'_>,
) -> Result<RawProject, RawError> {
    let mut project = RawProject {
        name: caps.name("name").map(|m| unquote(m.as_str())),
        ..RawProject::default()
    };
    *i += 1;
    while *i < lines.len() {
        let raw_line = lines[*i];
        let line = raw_line.trim();
        if line.is_empty() {
            *i += 1;
            continue;
        }
        if line == "}" {
            return Ok(project);
        }
        if let Some(note_caps) = NOTE_LINE_RE.captures(line) {
            let text = note_caps.name("text").map(|m| m.as_str()).unwrap_or("");
            project.note = Some(parse_note_value(lines, i, text));
            *i += 1;
            continue;
        }
        if let Some(kv) = KV_RE.captures(line) {
            let key = kv.name("key").map(|m| m.as_str()).unwrap_or("");
            let value = kv.name("value").map(|m| m.as_str()).unwrap_or("");
            if key.eq_ignore_ascii_case("database_type") {
                project.database_type = Some(unquote(value));
            }
            *i += 1;
            continue;
        }
        return Err(err_at(
            *i,
            column_of(raw_line),
            format!("unexpected line in project block: {line}"),
        ));
    }
    Err(err_at(lines.len().saturating_sub(1), 0, "unterminated project block"))
}

fn parse_ref_block(
    lines: &[&str],
    i: &mut usize,
    name: Option<String>,
    refs: &mut Vec<RawRef>,
) -> Result<(), RawError> {
    *i += 1;
    while *i < lines.len() {
        let line = lines[*i].trim();
        if line.is_empty() {
            *i += 1;
            continue;
        }
        if line == "}" {
            return Ok(());
        }
        refs.push(parse_ref_expr(line, name.clone(), *i)?);
        *i += 1;
    }
    Err(err_at(lines.len().saturating_sub(1), 0, "unterminated ref block"))
}

/// Parses DBML source into a raw [`ParseTree`].
///
/// Duplicate table or group names are rejected here with a located error
/// rather than silently shadowing each other downstream.
pub fn parse(source: &str) -> Result<ParseTree, RawError> {
    let stripped = strip_comments(source);
    let lines: Vec<&str> = stripped.lines().collect();
    let mut tree = ParseTree::default();
    let mut seen_tables: HashSet<String> = HashSet::new();
    let mut seen_groups: HashSet<String> = HashSet::new();

    let mut i = 0usize;
    while i < lines.len() {
        let raw_line = lines[i];
        let line = raw_line.trim();
        if line.is_empty() {
            i += 1;
            continue;
        }
        let start = i;
        if let Some(caps) = TABLE_RE.captures(line) {
            let table = parse_table(&lines, &mut i, &caps, &mut tree.refs)?;
            if !seen_tables.insert(table.name.clone()) {
                return Err(err_at(
                    start,
                    column_of(raw_line),
                    format!("duplicate table name '{}'", table.name),
                ));
            }
            if let Some(alias) = &table.alias {
                seen_tables.insert(alias.clone());
            }
            tree.tables.push(table);
        } else if let Some(caps) = GROUP_RE.captures(line) {
            let group = parse_group(&lines, &mut i, &caps)?;
            if !seen_groups.insert(group.name.clone()) {
                return Err(err_at(
                    start,
                    column_of(raw_line),
                    format!("duplicate table group name '{}'", group.name),
                ));
            }
            tree.groups.push(group);
        } else if let Some(caps) = PROJECT_RE.captures(line) {
            let project = parse_project(&lines, &mut i, &caps)?;
            if tree.project.is_some() {
                return Err(err_at(start, column_of(raw_line), "multiple project blocks"));
            }
            tree.project = Some(project);
        } else if ENUM_RE.is_match(line) {
            skip_block(&lines, &mut i);
        } else if let Some(caps) = REF_BLOCK_RE.captures(line) {
            let name = caps.name("name").map(|m| unquote(m.as_str()));
            parse_ref_block(&lines, &mut i, name, &mut tree.refs)?;
        } else if let Some(caps) = REF_LINE_RE.captures(line) {
            let name = caps.name("name").map(|m| unquote(m.as_str()));
            let expr = caps.name("expr").map(|m| m.as_str()).unwrap_or("");
            tree.refs.push(parse_ref_expr(expr, name, i)?);
        } else {
            return Err(err_at(
                i,
                column_of(raw_line),
                format!("unexpected statement: {line}"),
            ));
        }
        i += 1;
    }
    Ok(tree)
}
