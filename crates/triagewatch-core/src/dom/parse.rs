//! Tolerant HTML reader.
//!
//! Not an HTML5 tree builder: it covers what the portal emits (ASP.NET
//! WebForms output, inline styles, nested frames referenced by `src`) and
//! recovers from the rest. Stray end tags are dropped, open elements are
//! closed at end of input, and `option`/`li`/`p` close their open sibling.

use std::borrow::Cow;

use super::{Document, NodeId};

const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT: &[&str] = &["script", "style", "textarea", "title"];

/// Elements closed implicitly when a sibling of the same name opens.
const SELF_NESTING: &[&str] = &["option", "li", "p"];

pub(crate) fn parse_into(doc: &mut Document, base: NodeId, html: &str) {
    let mut stack = vec![base];
    let mut rest = html;

    while !rest.is_empty() {
        let parent = *stack.last().unwrap_or(&base);

        if let Some(after) = rest.strip_prefix("<!--") {
            let end = after.find("-->").unwrap_or(after.len());
            let node = doc.create_comment();
            doc.link(parent, node);
            rest = after.get(end + 3..).unwrap_or("");
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            rest = skip_past(rest, '>');
        } else if let Some(after) = rest.strip_prefix("</") {
            let name_len = name_len(after);
            let name = after[..name_len].to_ascii_lowercase();
            rest = skip_past(after, '>');
            // Only unwind if the element is actually open above the base.
            if let Some(pos) = stack
                .iter()
                .rposition(|n| doc.tag_name(*n) == Some(name.as_str()))
            {
                if pos > 0 {
                    stack.truncate(pos);
                }
            }
        } else if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
        {
            let tag = read_start_tag(&rest[1..]);
            rest = &rest[1 + tag.consumed..];

            if stack.len() > 1
                && SELF_NESTING.contains(&tag.name.as_str())
                && doc.tag_name(parent) == Some(tag.name.as_str())
            {
                stack.pop();
            }
            let parent = *stack.last().unwrap_or(&base);

            let attrs: Vec<(&str, &str)> = tag
                .attrs
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            let el = doc.create_element(&tag.name, &attrs);
            doc.link(parent, el);

            if RAW_TEXT.contains(&tag.name.as_str()) && !tag.self_closing {
                let close = format!("</{}", tag.name);
                let end = rest.to_ascii_lowercase().find(&close).unwrap_or(rest.len());
                if end > 0 {
                    let text = doc.create_text(&decode_entities(&rest[..end]));
                    doc.link(el, text);
                }
                rest = skip_past(&rest[end..], '>');
            } else if !VOID.contains(&tag.name.as_str()) && !tag.self_closing {
                stack.push(el);
            }
        } else {
            // Text up to the next '<'; a '<' that opens nothing is literal.
            let end = match rest.find('<') {
                Some(0) => rest[1..].find('<').map_or(rest.len(), |i| i + 1),
                Some(i) => i,
                None => rest.len(),
            };
            let text = doc.create_text(&decode_entities(&rest[..end]));
            doc.link(parent, text);
            rest = &rest[end..];
        }
    }
}

struct StartTag {
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
    /// Bytes consumed after the opening '<', including the closing '>'.
    consumed: usize,
}

fn name_len(s: &str) -> usize {
    s.find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == ':' || c == '_'))
        .unwrap_or(s.len())
}

fn skip_past(s: &str, c: char) -> &str {
    s.find(c).map_or("", |i| &s[i + 1..])
}

fn read_start_tag(s: &str) -> StartTag {
    let len = name_len(s);
    let name = s[..len].to_ascii_lowercase();
    let mut attrs = Vec::new();
    let mut self_closing = false;
    let mut i = len;
    let bytes = s.as_bytes();

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        match bytes[i] {
            b'>' => {
                i += 1;
                break;
            }
            b'/' => {
                self_closing = s[i..].starts_with("/>");
                i += 1;
                continue;
            }
            _ => {}
        }

        let name_end = s[i..]
            .find(|c: char| c.is_ascii_whitespace() || c == '=' || c == '>' || c == '/')
            .map_or(s.len(), |n| i + n);
        let attr_name = s[i..name_end].to_ascii_lowercase();
        i = name_end;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let mut value = String::new();
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i] as char;
                let start = i + 1;
                let end = s[start..].find(quote).map_or(s.len(), |n| start + n);
                value = decode_entities(&s[start..end]).into_owned();
                i = (end + 1).min(s.len());
            } else {
                let start = i;
                let end = s[start..]
                    .find(|c: char| c.is_ascii_whitespace() || c == '>')
                    .map_or(s.len(), |n| start + n);
                value = decode_entities(&s[start..end]).into_owned();
                i = end;
            }
        }
        if !attr_name.is_empty() && !attrs.iter().any(|(k, _)| *k == attr_name) {
            attrs.push((attr_name, value));
        }
    }

    StartTag {
        name,
        attrs,
        self_closing,
        consumed: i,
    }
}

/// Decode the character references the portal actually emits.
fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.bytes().take(12).position(|b| b == b';') else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => entity.strip_prefix('#').and_then(|num| {
                let code = match num.strip_prefix(['x', 'X']) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => num.parse().ok(),
                };
                code.and_then(char::from_u32)
            }),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}
