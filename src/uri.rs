//! `encodeURI`/`decodeURI` and their component variants, byte-for-byte with the
//! ECMAScript algorithms so stored URLs round-trip the way pages expect.

use crate::{Error, Result};

// Never escaped by either encoder.
const URI_MARKS: &str = "-_.!~*'()";
// Left alone by `encodeURI` and kept escaped by `decodeURI`.
const URI_RESERVED: &str = ";,/?:@&=+$#";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Uri,
    Component,
}

impl Scope {
    fn leaves_unescaped(self, ch: char) -> bool {
        ch.is_ascii_alphanumeric()
            || URI_MARKS.contains(ch)
            || (self == Self::Uri && URI_RESERVED.contains(ch))
    }
}

pub fn encode_uri(src: &str) -> String {
    encode(src, Scope::Uri)
}

pub fn encode_uri_component(src: &str) -> String {
    encode(src, Scope::Component)
}

/// Decodes escapes except those that would produce a reserved URI character.
pub fn decode_uri(src: &str) -> Result<String> {
    decode(src, Scope::Uri)
}

pub fn decode_uri_component(src: &str) -> Result<String> {
    decode(src, Scope::Component)
}

fn encode(src: &str, scope: Scope) -> String {
    let mut out = String::with_capacity(src.len());
    let mut utf8 = [0u8; 4];
    for ch in src.chars() {
        if scope.leaves_unescaped(ch) {
            out.push(ch);
            continue;
        }
        for byte in ch.encode_utf8(&mut utf8).bytes() {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode(src: &str, scope: Scope) -> Result<String> {
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(at) = rest.find('%') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];

        // One escaped character: a lead byte plus its continuation bytes,
        // each written as `%XX`.
        let width = match escaped_byte(rest.as_bytes())? {
            0x00..=0x7F => 1,
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return Err(malformed()),
        };
        let raw = rest.get(..width * 3).ok_or_else(malformed)?;
        let bytes = raw
            .as_bytes()
            .chunks(3)
            .map(escaped_byte)
            .collect::<Result<Vec<u8>>>()?;
        let decoded = std::str::from_utf8(&bytes).map_err(|_| malformed())?;

        let keep_escaped = scope == Scope::Uri
            && decoded.chars().all(|ch| ch.is_ascii() && URI_RESERVED.contains(ch));
        out.push_str(if keep_escaped { raw } else { decoded });
        rest = &rest[raw.len()..];
    }
    out.push_str(rest);
    Ok(out)
}

fn escaped_byte(chunk: &[u8]) -> Result<u8> {
    match chunk {
        [b'%', hi, lo, ..] if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
            Ok((hex_value(*hi) << 4) | hex_value(*lo))
        }
        _ => Err(malformed()),
    }
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

fn malformed() -> Error {
    Error::Script("URIError: malformed URI sequence".into())
}
