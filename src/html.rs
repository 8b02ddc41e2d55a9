use crate::dom::{Dom, NodeId};
use crate::{Error, Result};

/// Parses a document or fragment into a fresh DOM.
///
/// The parser is tolerant in the way quiz pages need: unknown end tags close up
/// to the nearest matching open element, void elements never take children and
/// `<script>`/`<style>` bodies are kept verbatim as text.
pub(crate) fn parse_html(html: &str) -> Result<Dom> {
    let mut builder = TreeBuilder {
        dom: Dom::new(),
        open: Vec::new(),
    };
    let mut cursor = Cursor::new(html);

    while !cursor.at_end() {
        if cursor.eat("<!--") {
            cursor
                .take_until("-->")
                .ok_or_else(|| Error::HtmlParse("unclosed HTML comment".into()))?;
        } else if cursor.eat("<!") {
            cursor
                .take_until(">")
                .ok_or_else(|| Error::HtmlParse("unclosed doctype".into()))?;
        } else if cursor.at_end_tag() {
            let name = cursor.end_tag()?;
            builder.close(&name);
        } else if cursor.at_start_tag() {
            let tag = cursor.start_tag()?;
            let node = builder.open(&tag);
            if tag.self_closing || is_void_tag(&tag.name) {
                continue;
            }
            if is_raw_text_tag(&tag.name) {
                let body = cursor
                    .raw_text_until_end_of(&tag.name)
                    .ok_or_else(|| Error::HtmlParse(format!("unclosed <{}>", tag.name)))?;
                if !body.is_empty() {
                    builder.dom.create_text(node, body.to_string());
                }
                cursor.end_tag()?;
            } else {
                builder.open.push(node);
            }
        } else {
            let text = cursor.text();
            builder.text(&decode_html_character_references(text));
        }
    }

    let mut dom = builder.dom;
    dom.initialize_form_control_values()?;
    Ok(dom)
}

struct StartTag {
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
}

struct TreeBuilder {
    dom: Dom,
    // Open elements below the document root, innermost last.
    open: Vec<NodeId>,
}

impl TreeBuilder {
    fn parent(&self) -> NodeId {
        self.open.last().copied().unwrap_or(self.dom.root)
    }

    fn open(&mut self, tag: &StartTag) -> NodeId {
        let parent = self.parent();
        self.dom
            .create_element(parent, tag.name.clone(), tag.attrs.clone())
    }

    fn close(&mut self, name: &str) {
        if let Some(index) = self
            .open
            .iter()
            .rposition(|node| self.dom.is_tag(*node, name))
        {
            self.open.truncate(index);
        }
    }

    fn text(&mut self, text: &str) {
        let parent = self.parent();
        self.dom.create_text(parent, text.to_string());
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eat(&mut self, prefix: &str) -> bool {
        let matched = self.rest().starts_with(prefix);
        if matched {
            self.pos += prefix.len();
        }
        matched
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|ch: char| !pred(ch)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn skip_ws(&mut self) {
        self.take_while(|ch| ch.is_ascii_whitespace());
    }

    /// Consumes through `needle` and returns what came before it.
    fn take_until(&mut self, needle: &str) -> Option<&'a str> {
        let rest = self.rest();
        let at = rest.find(needle)?;
        self.pos += at + needle.len();
        Some(&rest[..at])
    }

    fn at_start_tag(&self) -> bool {
        let mut chars = self.rest().chars();
        chars.next() == Some('<') && chars.next().is_some_and(|ch| ch.is_ascii_alphabetic())
    }

    fn at_end_tag(&self) -> bool {
        self.rest().starts_with("</")
    }

    // Text runs to the next `<` that opens markup; a stray `<` stays text.
    fn text(&mut self) -> &'a str {
        let start = self.pos;
        self.pos += self.peek().map_or(0, char::len_utf8);
        while let Some(offset) = self.rest().find('<') {
            self.pos += offset;
            if self.at_start_tag() || self.at_end_tag() || self.rest().starts_with("<!") {
                return &self.src[start..self.pos];
            }
            self.pos += 1;
        }
        self.pos = self.src.len();
        &self.src[start..]
    }

    fn start_tag(&mut self) -> Result<StartTag> {
        self.eat("<");
        let name = self.take_while(is_tag_char).to_ascii_lowercase();
        if name.is_empty() {
            return Err(Error::HtmlParse("empty tag name".into()));
        }

        let mut tag = StartTag {
            name,
            attrs: Vec::new(),
            self_closing: false,
        };
        loop {
            self.skip_ws();
            if self.at_end() {
                return Err(Error::HtmlParse(format!("unclosed start tag <{}>", tag.name)));
            }
            if self.eat(">") {
                return Ok(tag);
            }
            if self.eat("/>") {
                tag.self_closing = true;
                return Ok(tag);
            }

            let attr_name = self.take_while(is_attr_name_char).to_ascii_lowercase();
            if attr_name.is_empty() {
                return Err(Error::HtmlParse(format!(
                    "invalid attribute name in <{}>",
                    tag.name
                )));
            }
            self.skip_ws();
            let value = if self.eat("=") {
                self.skip_ws();
                decode_html_character_references(self.attr_value()?)
            } else {
                String::new()
            };
            // Duplicate attributes: the first one is kept.
            if tag.attrs.iter().all(|(existing, _)| *existing != attr_name) {
                tag.attrs.push((attr_name, value));
            }
        }
    }

    fn attr_value(&mut self) -> Result<&'a str> {
        match self.peek() {
            None => Err(Error::HtmlParse("missing attribute value".into())),
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut buf = [0u8; 4];
                self.take_until(quote.encode_utf8(&mut buf))
                    .ok_or_else(|| Error::HtmlParse("unclosed quoted attribute value".into()))
            }
            Some(_) => {
                let rest = self.rest();
                let len = rest
                    .char_indices()
                    .find(|(at, ch)| {
                        ch.is_ascii_whitespace() || *ch == '>' || rest[*at..].starts_with("/>")
                    })
                    .map_or(rest.len(), |(at, _)| at);
                self.pos += len;
                Ok(&rest[..len])
            }
        }
    }

    fn end_tag(&mut self) -> Result<String> {
        self.eat("</");
        self.skip_ws();
        let name = self.take_while(is_tag_char).to_ascii_lowercase();
        self.take_until(">")
            .ok_or_else(|| Error::HtmlParse("unclosed end tag".into()))?;
        Ok(name)
    }

    /// Raw body up to (not including) `</name`, matched case-insensitively.
    fn raw_text_until_end_of(&mut self, name: &str) -> Option<&'a str> {
        let rest = self.rest();
        let closing = format!("</{name}");
        let at = rest
            .char_indices()
            .map(|(at, _)| at)
            .find(|at| {
                rest.get(*at..*at + closing.len())
                    .is_some_and(|window| window.eq_ignore_ascii_case(&closing))
            })?;
        self.pos += at;
        Some(&rest[..at])
    }
}

fn decode_html_character_references(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp + 1..];
        let reference = rest
            .split_once(';')
            .and_then(|(name, _)| Some((character_reference(name)?, name.len() + 1)));
        match reference {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &rest[consumed..];
            }
            None => out.push('&'),
        }
    }
    out.push_str(rest);
    out
}

fn character_reference(name: &str) -> Option<char> {
    if let Some(numeric) = name.strip_prefix('#') {
        let codepoint = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse().ok()?,
        };
        return char::from_u32(codepoint);
    }
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{00A0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "laquo" => '\u{00AB}',
        "raquo" => '\u{00BB}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201C}',
        "rdquo" => '\u{201D}',
        "copy" => '\u{00A9}',
        _ => return None,
    };
    Some(ch)
}

fn is_tag_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_')
}

fn is_attr_name_char(ch: char) -> bool {
    !ch.is_ascii_whitespace() && !matches!(ch, '=' | '>' | '/' | '"' | '\'')
}

fn is_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style" | "textarea" | "title")
}

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}
