//! Reader for the bulk-load segments of a plain-text relational dump.
//!
//! A segment looks like:
//!
//! ```text
//! COPY public."Chapters" (id, "bookId", title) FROM stdin;
//! 6f1c...\t0b6f...\tPrologue
//! \.
//! ```

use std::sync::OnceLock;

use regex::Regex;

use crate::data::{NULL_MARKER, Value, sniff_value};

const TERMINATOR: &str = "\\.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyHeader {
    pub schema: Option<String>,
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DumpTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Decoded text of each field in `rows`, `None` for the null marker.
    pub text: Vec<Vec<Option<String>>>,
    pub warnings: Vec<String>,
}

impl DumpTable {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r#"^COPY\s+(?:("(?:[^"]|"")+"|[A-Za-z_][A-Za-z0-9_$]*)\.)?"#,
            r#"("(?:[^"]|"")+"|[A-Za-z_][A-Za-z0-9_$]*)"#,
            r#"\s*\((.*)\)\s+FROM\s+stdin;\s*$"#,
        ))
        .expect("valid COPY header pattern")
    })
}

fn unquote(ident: &str) -> String {
    let trimmed = ident.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].replace("\"\"", "\"")
    } else {
        trimmed.to_string()
    }
}

pub fn parse_copy_header(line: &str) -> Option<CopyHeader> {
    let captures = header_pattern().captures(line.trim_end())?;
    let columns = captures
        .get(3)?
        .as_str()
        .split(',')
        .map(unquote)
        .filter(|c| !c.is_empty())
        .collect();
    Some(CopyHeader {
        schema: captures.get(1).map(|m| unquote(m.as_str())),
        table: unquote(captures.get(2)?.as_str()),
        columns,
    })
}

/// Decodes the text-format backslash escapes.
fn unescape_field(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('v') => out.push('\u{b}'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Decoded text of one raw field, `None` for the null marker.
pub fn field_text(raw: &str) -> Option<String> {
    (raw != NULL_MARKER).then(|| unescape_field(raw))
}

/// Types one raw field. The null marker is checked before unescaping, so an
/// escaped literal `\\N` stays a string.
pub fn type_field(raw: &str) -> Value {
    match field_text(raw) {
        None => Value::Null,
        Some(decoded) if decoded == NULL_MARKER => Value::String(decoded),
        Some(decoded) => sniff_value(&decoded),
    }
}

/// Every segment header in the dump, in file order.
pub fn list_tables(text: &str) -> Vec<CopyHeader> {
    text.lines().filter_map(parse_copy_header).collect()
}

/// Extracts the segment for `table`. A missing segment yields an empty
/// [`DumpTable`] with a warning; it is never an error.
pub fn parse_table(text: &str, table: &str) -> DumpTable {
    let mut lines = text.lines().enumerate();
    let header = lines
        .by_ref()
        .find_map(|(_, line)| parse_copy_header(line).filter(|h| h.table == table));
    let Some(header) = header else {
        return DumpTable {
            warnings: vec![format!("no COPY segment for table '{table}'")],
            ..DumpTable::default()
        };
    };

    let mut parsed = DumpTable {
        columns: header.columns,
        ..DumpTable::default()
    };
    let mut terminated = false;
    for (index, line) in lines {
        if line == TERMINATOR {
            terminated = true;
            break;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != parsed.columns.len() {
            parsed.warnings.push(format!(
                "line {}: expected {} fields, found {}; row dropped",
                index + 1,
                parsed.columns.len(),
                fields.len()
            ));
            continue;
        }
        parsed.text.push(fields.iter().map(|raw| field_text(raw)).collect());
        parsed.rows.push(fields.into_iter().map(type_field).collect());
    }
    if !terminated {
        parsed
            .warnings
            .push(format!("segment for '{table}' has no terminator line"));
    }
    parsed
}
