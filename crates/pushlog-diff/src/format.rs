use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("No parser for '{0}'")]
    UnsupportedFormat(String),

    #[error("Content is not valid UTF-8")]
    Encoding,

    #[error("Line {line}: {message}")]
    Syntax { line: usize, message: String },
}

fn syntax(line: usize, message: &str) -> ParseError {
    ParseError::Syntax {
        line,
        message: message.to_string(),
    }
}

/// Ordered `key -> text` map parsed from a resource file.
///
/// A repeated key keeps its first position and its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entities {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl Entities {
    pub fn insert(&mut self, key: String, value: String) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn append_line(&mut self, key: &str, line: &str) {
        if let Some(&i) = self.index.get(key) {
            let value = &mut self.entries[i].1;
            if !value.is_empty() {
                value.push('\n');
            }
            value.push_str(line);
        }
    }
}

/// Resource file formats with an entity parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceFormat {
    Properties,
    Fluent,
    Dtd,
    Unknown,
}

impl ResourceFormat {
    /// Pick the format from the file extension.
    pub fn from_path(path: &str) -> Self {
        match Path::new(path).extension().and_then(|ext| ext.to_str()) {
            Some("properties") => ResourceFormat::Properties,
            Some("ftl") => ResourceFormat::Fluent,
            Some("dtd") => ResourceFormat::Dtd,
            _ => ResourceFormat::Unknown,
        }
    }

    pub fn parse_entities(&self, bytes: &[u8]) -> Result<Entities, ParseError> {
        match self {
            ResourceFormat::Properties => parse_properties(&decode(bytes)?),
            ResourceFormat::Fluent => parse_fluent(&decode(bytes)?),
            ResourceFormat::Dtd => parse_dtd(&decode(bytes)?),
            ResourceFormat::Unknown => Err(ParseError::UnsupportedFormat(self.name().to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResourceFormat::Properties => "properties",
            ResourceFormat::Fluent => "fluent",
            ResourceFormat::Dtd => "dtd",
            ResourceFormat::Unknown => "unknown",
        }
    }
}

/// UTF-8 decode, drop a leading BOM and normalize newlines to `\n`.
pub fn decode(bytes: &[u8]) -> Result<String, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ParseError::Encoding)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    Ok(text.replace("\r\n", "\n").replace('\r', "\n"))
}

// ============================================================
// .properties
// ============================================================

fn parse_properties(text: &str) -> Result<Entities, ParseError> {
    let mut entities = Entities::default();
    let mut lines = text.split('\n').enumerate();

    while let Some((index, line)) = lines.next() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        let mut logical = trimmed.to_string();
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let (key, value) = split_property(&logical)
            .ok_or_else(|| syntax(index + 1, "expected '=' or ':' after key"))?;
        entities.insert(unescape(key), unescape(value));
    }

    Ok(entities)
}

/// An odd number of trailing backslashes joins the next line.
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_property(line: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                let key = line[..i].trim_end();
                if key.is_empty() {
                    return None;
                }
                return Some((key, line[i + 1..].trim_start()));
            }
            _ => {}
        }
    }
    None
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                let decoded = (hex.len() == 4)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);
                match decoded {
                    Some(ch) => {
                        out.push(ch);
                        chars.nth(3);
                    }
                    None => out.push('u'),
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    out
}

// ============================================================
// Fluent
// ============================================================

fn parse_fluent(text: &str) -> Result<Entities, ParseError> {
    let mut entities = Entities::default();
    // Message that attributes attach to
    let mut message: Option<String> = None;
    // Entry receiving continuation lines
    let mut current: Option<String> = None;
    // Open placeables in the current entry's pattern
    let mut depth = 0usize;

    for (index, line) in text.split('\n').enumerate() {
        let lineno = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with('#') {
            message = None;
            current = None;
            depth = 0;
            continue;
        }

        let trimmed = line.trim_start();
        if depth > 0 && closes_or_selects(line) {
            // Variants and closing braces may start at column 0
            if let Some(key) = current.as_deref() {
                entities.append_line(key, trimmed);
            }
            depth = placeable_depth(depth, trimmed);
        } else if let Some(attribute) = trimmed.strip_prefix('.') {
            let id = message
                .as_deref()
                .ok_or_else(|| syntax(lineno, "attribute outside of a message"))?;
            let (name, value) =
                split_entry(attribute).ok_or_else(|| syntax(lineno, "malformed attribute"))?;
            let key = format!("{id}.{name}");
            entities.insert(key.clone(), value.to_string());
            current = Some(key);
            depth = placeable_depth(0, value);
        } else if line.starts_with(' ') {
            let key = current
                .as_deref()
                .ok_or_else(|| syntax(lineno, "continuation line outside of a message"))?;
            entities.append_line(key, trimmed);
            depth = placeable_depth(depth, trimmed);
        } else {
            let (id, value) =
                split_entry(line).ok_or_else(|| syntax(lineno, "expected 'identifier = value'"))?;
            entities.insert(id.to_string(), value.to_string());
            message = Some(id.to_string());
            current = message.clone();
            depth = placeable_depth(0, value);
        }
    }

    if depth > 0 {
        return Err(syntax(text.split('\n').count(), "unclosed placeable"));
    }

    Ok(entities)
}

fn closes_or_selects(line: &str) -> bool {
    line.starts_with('}') || line.starts_with('[') || line.starts_with("*[")
}

/// Placeable nesting after `text`, starting from `depth`. Braces inside
/// string literals are skipped.
fn placeable_depth(mut depth: usize, text: &str) -> usize {
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let (id, value) = line.split_once('=')?;
    let id = id.trim_end();
    let name = id.strip_prefix('-').unwrap_or(id);
    if !is_identifier(name) {
        return None;
    }
    Some((id, value.trim()))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ============================================================
// DTD
// ============================================================

fn parse_dtd(text: &str) -> Result<Entities, ParseError> {
    let mut entities = Entities::default();
    let mut rest = text;
    let mut line = 1;

    loop {
        let before = rest;
        rest = rest.trim_start();
        line += before[..before.len() - rest.len()].matches('\n').count();
        if rest.is_empty() {
            break;
        }
        let start = rest;

        if let Some(after) = rest.strip_prefix("<!--") {
            let end = after
                .find("-->")
                .ok_or_else(|| syntax(line, "unterminated comment"))?;
            rest = &after[end + 3..];
        } else if let Some(after) = rest.strip_prefix("<?") {
            let end = after
                .find("?>")
                .ok_or_else(|| syntax(line, "unterminated processing instruction"))?;
            rest = &after[end + 2..];
        } else if let Some(after) = rest.strip_prefix("<!ENTITY") {
            let (entity, remaining) = parse_entity_decl(after)
                .ok_or_else(|| syntax(line, "malformed entity declaration"))?;
            if let Some((key, value)) = entity {
                entities.insert(key, value);
            }
            rest = remaining;
        } else if rest.starts_with('%') {
            // Parameter entity reference, e.g. %brandDTD;
            let end = rest
                .find(';')
                .ok_or_else(|| syntax(line, "unterminated entity reference"))?;
            rest = &rest[end + 1..];
        } else {
            return Err(syntax(line, "unexpected content"));
        }
        line += start[..start.len() - rest.len()].matches('\n').count();
    }

    Ok(entities)
}

type EntityDecl = Option<(String, String)>;

/// Parse the remainder of `<!ENTITY ...>`. Parameter entity declarations
/// are consumed but yield no entity.
fn parse_entity_decl(input: &str) -> Option<(EntityDecl, &str)> {
    if !input.starts_with(char::is_whitespace) {
        return None;
    }
    let mut rest = input.trim_start();

    let parameter = match rest.strip_prefix('%') {
        Some(after) => {
            rest = after.trim_start();
            true
        }
        None => false,
    };

    let name_end = rest
        .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '>')
        .unwrap_or(rest.len());
    let name = &rest[..name_end];
    if name.is_empty() {
        return None;
    }
    rest = rest[name_end..].trim_start();

    if parameter {
        let end = rest.find('>')?;
        return Some((None, &rest[end + 1..]));
    }

    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let body = &rest[1..];
    let close = body.find(quote)?;
    let value = &body[..close];
    let after = body[close + 1..].trim_start().strip_prefix('>')?;

    Some((Some((name.to_string(), value.to_string())), after))
}
