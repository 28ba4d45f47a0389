//! Canonical schema model and the adapter over the raw DBML parser.
//!
//! The raw [`ParseTree`] carries tables either at the root or nested under
//! per-schema blocks; [`normalize`] folds both shapes into a flat [`Schema`].
//! Table header colors that the parser dropped are recovered from the raw
//! source text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dbml::{self, Location, ParseTree, RawError};

static HEADER_COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)^\s*Table\s+(?P<name>"[^"]+"|[\w.]+)(?:\s+as\s+(?:"[^"]+"|\w+))?\s*\[(?P<settings>[^\]]*)\]"#,
    )
    .unwrap()
});
static COLOR_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)headerColor\s*:\s*(?P<value>#[0-9a-f]{3,8}|\w+)").unwrap()
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub type_name: String,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub is_not_null: bool,
    pub note: Option<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub fields: Vec<Field>,
    pub note: Option<String>,
    pub header_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub table_names: Vec<String>,
    pub header_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_table: String,
    pub source_field: String,
    pub target_table: String,
    pub target_field: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub name: Option<String>,
    pub database_type: Option<String>,
    pub note: Option<String>,
}

/// Normalized in-memory schema, rebuilt on every parse and discarded after
/// compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<Table>,
    pub groups: Vec<Group>,
    pub refs: Vec<Relationship>,
    pub project: Option<ProjectMeta>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Empty or whitespace-only input. Callers treat this as "no diagram",
    /// never as a display-worthy error banner.
    EmptyInput,
    /// The source failed to parse.
    Syntax,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
    pub location: Option<Location>,
}

impl SchemaError {
    pub fn empty_input() -> Self {
        Self {
            kind: SchemaErrorKind::EmptyInput,
            message: "empty input".to_string(),
            location: None,
        }
    }

    pub fn is_empty_input(&self) -> bool {
        self.kind == SchemaErrorKind::EmptyInput
    }
}

/// Pulls a location out of a raw parser error, trying the shapes different
/// parser versions have used: a direct field, then the first diagnostic's
/// `location`, then its `start`. Returns `None` when nothing is recoverable;
/// the message is still surfaced.
fn extract_location(error: &RawError) -> Option<Location> {
    if let Some(location) = error.location {
        return Some(location);
    }
    let first = error.diagnostics.first()?;
    first.location.or(first.start)
}

impl From<RawError> for SchemaError {
    fn from(error: RawError) -> Self {
        let location = extract_location(&error);
        Self {
            kind: SchemaErrorKind::Syntax,
            message: error.message,
            location,
        }
    }
}

fn convert_field(raw: dbml::RawField) -> Field {
    Field {
        name: raw.name,
        type_name: raw.type_name,
        is_primary_key: raw.is_primary_key,
        is_unique: raw.is_unique,
        is_not_null: raw.is_not_null,
        note: raw.note,
        default: raw.default,
    }
}

fn convert_table(raw: dbml::RawTable) -> (Table, Option<String>) {
    let alias = raw.alias;
    let table = Table {
        name: raw.name,
        fields: raw.fields.into_iter().map(convert_field).collect(),
        note: raw.note,
        header_color: raw.header_color,
    };
    (table, alias)
}

fn convert_group(raw: dbml::RawGroup) -> Group {
    Group {
        name: raw.name,
        table_names: raw.table_names,
        header_color: raw.color,
    }
}

fn convert_ref(raw: dbml::RawRef) -> Relationship {
    Relationship {
        source_table: raw.source_table,
        source_field: raw.source_field,
        target_table: raw.target_table,
        target_field: raw.target_field,
        name: raw.name,
    }
}

/// Recovers `headerColor` from the raw source for tables where the parser
/// dropped the annotation. Some parser versions silently discard custom
/// table settings, so the value in the tree is preferred but not trusted to
/// exist.
fn header_color_from_source(source: &str, table_name: &str) -> Option<String> {
    for caps in HEADER_COLOR_RE.captures_iter(source) {
        let name = caps.name("name")?.as_str().trim_matches('"');
        if name != table_name {
            continue;
        }
        let settings = caps.name("settings")?.as_str();
        if let Some(value) = COLOR_VALUE_RE.captures(settings) {
            return Some(value.name("value")?.as_str().to_string());
        }
    }
    None
}

/// Folds a raw parse tree into the canonical flat `Schema`. Root-level
/// collections win; when the tree carries everything nested under schema
/// blocks instead, those are flattened in declaration order. Alias refs are
/// rewritten to the table's real name.
pub fn normalize(tree: ParseTree, source: &str) -> Schema {
    let ParseTree {
        mut tables,
        mut groups,
        mut refs,
        project,
        schemas,
    } = tree;

    if tables.is_empty() && groups.is_empty() && refs.is_empty() {
        for block in schemas {
            tables.extend(block.tables);
            groups.extend(block.groups);
            refs.extend(block.refs);
        }
    }

    let mut schema = Schema::default();
    let mut aliases: Vec<(String, String)> = Vec::new();
    for raw in tables {
        let (mut table, alias) = convert_table(raw);
        if table.header_color.is_none() {
            table.header_color = header_color_from_source(source, &table.name);
        }
        if let Some(alias) = alias {
            aliases.push((alias, table.name.clone()));
        }
        schema.tables.push(table);
    }
    let resolve = |name: &str| -> String {
        aliases
            .iter()
            .find(|(alias, _)| alias.as_str() == name)
            .map(|(_, real)| real.clone())
            .unwrap_or_else(|| name.to_string())
    };
    for raw in refs {
        let mut rel = convert_ref(raw);
        rel.source_table = resolve(&rel.source_table);
        rel.target_table = resolve(&rel.target_table);
        schema.refs.push(rel);
    }
    for raw in groups {
        let mut group = convert_group(raw);
        group.table_names = group.table_names.iter().map(|n| resolve(n)).collect();
        schema.groups.push(group);
    }
    schema.project = project.map(|p| ProjectMeta {
        name: p.name,
        database_type: p.database_type,
        note: p.note,
    });
    schema
}

/// Parses DBML source into a canonical [`Schema`].
pub fn parse(source: &str) -> Result<Schema, SchemaError> {
    if source.trim().is_empty() {
        return Err(SchemaError::empty_input());
    }
    let tree = dbml::parse(source)?;
    Ok(normalize(tree, source))
}
