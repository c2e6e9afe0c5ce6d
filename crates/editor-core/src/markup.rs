//! Tokenizer, tree builder and writer for the article wire markup.
//!
//! The markup is a small HTML subset: elements with attributes, text and
//! character references. Comments, doctypes and processing instructions
//! are skipped.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("unterminated tag starting at byte {0}")]
    UnterminatedTag(usize),
    #[error("unterminated attribute value starting at byte {0}")]
    UnterminatedQuote(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Element(MarkupElement),
    Text(String),
}

impl MarkupNode {
    pub fn text(text: impl Into<String>) -> Self {
        MarkupNode::Text(text.into())
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_node(self, &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupElement {
    pub tag: String,
    /// Attributes in source order.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<MarkupNode>,
}

impl MarkupElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn with_children(mut self, children: Vec<MarkupNode>) -> Self {
        self.children = children;
        self
    }

    pub fn into_node(self) -> MarkupNode {
        MarkupNode::Element(self)
    }
}

/// Tags that never have content, whether or not they are written `<x/>`.
const ALWAYS_VOID: [&str; 3] = ["hr", "br", "img"];

/// Tags written as `<x/>` when they have no children.
const SELF_CLOSE_WHEN_EMPTY: [&str; 5] = ["embed", "ndlaembed", "hr", "br", "img"];

pub fn parse_markup(input: &str) -> Result<Vec<MarkupNode>, MarkupError> {
    let bytes = input.as_bytes();
    let mut builder = TreeBuilder::default();
    let mut idx = 0_usize;

    while idx < bytes.len() {
        if bytes[idx] != b'<' {
            let next = find_byte(bytes, idx, b'<').unwrap_or(bytes.len());
            builder.text(decode_entities(&input[idx..next]));
            idx = next;
            continue;
        }

        if starts_with(bytes, idx, b"<!--") {
            idx = skip_comment(bytes, idx);
            continue;
        }

        if starts_with(bytes, idx, b"<!") || starts_with(bytes, idx, b"<?") {
            idx = skip_to_gt(bytes, idx.saturating_add(2));
            continue;
        }

        let Some((tag, next_idx)) = parse_tag(input, idx)? else {
            // A lone `<` that does not open a tag is text.
            builder.text("<".to_string());
            idx = idx.saturating_add(1);
            continue;
        };

        if tag.is_end {
            builder.close(&tag.name);
        } else {
            let void = tag.self_closing || ALWAYS_VOID.contains(&tag.name.as_str());
            let element = MarkupElement {
                tag: tag.name,
                attrs: tag.attrs,
                children: Vec::new(),
            };
            if void {
                builder.push(MarkupNode::Element(element));
            } else {
                builder.open(element);
            }
        }
        idx = next_idx;
    }

    Ok(builder.finish())
}

pub fn write_markup(nodes: &[MarkupNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, &mut out);
    }
    out
}

#[derive(Default)]
struct TreeBuilder {
    root: Vec<MarkupNode>,
    open: Vec<MarkupElement>,
}

impl TreeBuilder {
    fn push(&mut self, node: MarkupNode) {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.root.push(node),
        }
    }

    fn text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        let siblings = match self.open.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.root,
        };
        if let Some(MarkupNode::Text(prev)) = siblings.last_mut() {
            prev.push_str(&text);
        } else {
            siblings.push(MarkupNode::Text(text));
        }
    }

    fn open(&mut self, element: MarkupElement) {
        self.open.push(element);
    }

    /// Closes the nearest open `name`, implicitly closing anything opened
    /// after it. A stray end tag is ignored.
    fn close(&mut self, name: &str) {
        let Some(pos) = self.open.iter().rposition(|el| el.tag == name) else {
            return;
        };
        while self.open.len() > pos {
            let Some(element) = self.open.pop() else {
                break;
            };
            self.push(MarkupNode::Element(element));
        }
    }

    fn finish(mut self) -> Vec<MarkupNode> {
        while let Some(element) = self.open.pop() {
            self.push(MarkupNode::Element(element));
        }
        self.root
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedTag {
    name: String,
    attrs: Vec<(String, String)>,
    is_end: bool,
    self_closing: bool,
}

fn parse_tag(input: &str, start: usize) -> Result<Option<(ParsedTag, usize)>, MarkupError> {
    let bytes = input.as_bytes();
    let mut idx = start.saturating_add(1);
    let mut is_end = false;
    if bytes.get(idx).copied() == Some(b'/') {
        is_end = true;
        idx = idx.saturating_add(1);
    }

    let name_start = idx;
    while idx < bytes.len() && is_tag_name_char(bytes[idx]) {
        idx = idx.saturating_add(1);
    }
    if idx == name_start {
        return Ok(None);
    }
    let name = input[name_start..idx].to_ascii_lowercase();

    let mut attrs = Vec::new();
    loop {
        idx = skip_spaces(bytes, idx);
        match bytes.get(idx).copied() {
            None => return Err(MarkupError::UnterminatedTag(start)),
            Some(b'>') => {
                let tag = ParsedTag {
                    name,
                    attrs,
                    is_end,
                    self_closing: false,
                };
                return Ok(Some((tag, idx.saturating_add(1))));
            }
            Some(b'/') => {
                let after = skip_spaces(bytes, idx.saturating_add(1));
                if bytes.get(after).copied() == Some(b'>') {
                    let tag = ParsedTag {
                        name,
                        attrs,
                        is_end,
                        self_closing: true,
                    };
                    return Ok(Some((tag, after.saturating_add(1))));
                }
                idx = idx.saturating_add(1);
            }
            Some(_) => {
                let (attr, next) = parse_attr(input, idx)?;
                if let Some(attr) = attr {
                    attrs.push(attr);
                }
                idx = next;
            }
        }
    }
}

fn parse_attr(input: &str, start: usize) -> Result<(Option<(String, String)>, usize), MarkupError> {
    let bytes = input.as_bytes();
    let mut idx = start;
    while idx < bytes.len() && !is_attr_name_end(bytes[idx]) {
        idx = idx.saturating_add(1);
    }
    if idx == start {
        // Skip a byte that cannot start an attribute name.
        return Ok((None, idx.saturating_add(1)));
    }
    let name = input[start..idx].to_ascii_lowercase();

    let after_name = skip_spaces(bytes, idx);
    if bytes.get(after_name).copied() != Some(b'=') {
        return Ok((Some((name, String::new())), idx));
    }
    idx = skip_spaces(bytes, after_name.saturating_add(1));

    match bytes.get(idx).copied() {
        Some(quote @ (b'"' | b'\'')) => {
            let value_start = idx.saturating_add(1);
            let Some(end) = find_byte(bytes, value_start, quote) else {
                return Err(MarkupError::UnterminatedQuote(idx));
            };
            let value = decode_entities(&input[value_start..end]);
            Ok((Some((name, value)), end.saturating_add(1)))
        }
        Some(_) => {
            let value_start = idx;
            while idx < bytes.len() && !bytes[idx].is_ascii_whitespace() && bytes[idx] != b'>' {
                idx = idx.saturating_add(1);
            }
            let value = decode_entities(&input[value_start..idx]);
            Ok((Some((name, value)), idx))
        }
        None => Err(MarkupError::UnterminatedTag(start)),
    }
}

fn write_node(node: &MarkupNode, out: &mut String) {
    match node {
        MarkupNode::Text(text) => escape_into(text, false, out),
        MarkupNode::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in &el.attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_into(value, true, out);
                out.push('"');
            }
            if el.children.is_empty() && SELF_CLOSE_WHEN_EMPTY.contains(&el.tag.as_str()) {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in &el.children {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

fn escape_into(text: &str, attr: bool, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

/// Decodes named and numeric character references. Unknown references are
/// kept literally.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest[1..].find(';').map(|ix| ix + 1).filter(|&ix| ix <= 12) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        match decode_reference(&rest[1..semi]) {
            Some(ch) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        _ => return None,
    })
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    find_subslice(bytes, start.saturating_add(4), b"-->")
        .map(|end| end.saturating_add(3))
        .unwrap_or(bytes.len())
}

fn skip_to_gt(bytes: &[u8], idx: usize) -> usize {
    find_byte(bytes, idx, b'>')
        .map(|end| end.saturating_add(1))
        .unwrap_or(bytes.len())
}

fn skip_spaces(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx = idx.saturating_add(1);
    }
    idx
}

fn is_tag_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b':')
}

fn is_attr_name_end(byte: u8) -> bool {
    byte.is_ascii_whitespace() || matches!(byte, b'=' | b'>' | b'/' | b'"' | b'\'')
}

fn starts_with(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    end <= bytes.len() && bytes[idx..end] == *pattern
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }

    bytes[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

fn find_byte(bytes: &[u8], from: usize, byte: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|candidate| *candidate == byte)
        .map(|offset| from + offset)
}
