use crate::dom::{Dom, Element, NodeId, has_class};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttrMatch {
    Exists(String),
    Equals(String, String),
}

impl AttrMatch {
    fn matches(&self, element: &Element) -> bool {
        match self {
            Self::Exists(key) => element.attr(key).is_some(),
            Self::Equals(key, value) => element.attr(key) == Some(value.as_str()),
        }
    }
}

/// One compound selector such as `div#content.quiz[data-x]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Compound {
    pub(crate) tag: Option<String>,
    pub(crate) universal: bool,
    pub(crate) id: Option<String>,
    pub(crate) classes: Vec<String>,
    pub(crate) attrs: Vec<AttrMatch>,
}

impl Compound {
    fn matches(&self, element: &Element) -> bool {
        self.tag.as_deref().is_none_or(|tag| element.is_tag(tag))
            && self.id.as_deref().is_none_or(|id| element.attr("id") == Some(id))
            && self.classes.iter().all(|class_name| has_class(element, class_name))
            && self.attrs.iter().all(|attr| attr.matches(element))
    }

    fn is_empty(&self) -> bool {
        !self.universal
            && self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Combinator {
    Descendant,
    Child,
}

/// A compound plus how it relates to the compound on its left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Link {
    pub(crate) combinator: Combinator,
    pub(crate) compound: Compound,
}

/// A parsed selector list. Each alternative is a chain read left to right;
/// the first link's combinator is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Selector {
    pub(crate) alternatives: Vec<Vec<Link>>,
}

impl Selector {
    pub(crate) fn parse(src: &str) -> Result<Self> {
        let unsupported = || Error::UnsupportedSelector(src.to_string());

        let mut alternatives = Vec::new();
        let mut chain: Vec<Link> = Vec::new();
        let mut pending: Option<Combinator> = None;
        let mut word = String::new();
        let mut depth = 0usize;

        let flush = |word: &mut String, chain: &mut Vec<Link>, pending: &mut Option<Combinator>| -> Result<()> {
            if word.is_empty() {
                return Ok(());
            }
            let compound = parse_compound(word).ok_or_else(unsupported)?;
            let combinator = pending.take().unwrap_or(Combinator::Descendant);
            chain.push(Link {
                combinator,
                compound,
            });
            word.clear();
            Ok(())
        };

        for ch in src.chars() {
            if depth > 0 {
                if ch == ']' {
                    depth -= 1;
                }
                word.push(ch);
                continue;
            }
            match ch {
                '[' => {
                    depth += 1;
                    word.push(ch);
                }
                ']' | '+' | '~' | ':' => return Err(unsupported()),
                '>' => {
                    flush(&mut word, &mut chain, &mut pending)?;
                    if chain.is_empty() || pending.is_some() {
                        return Err(unsupported());
                    }
                    pending = Some(Combinator::Child);
                }
                ',' => {
                    flush(&mut word, &mut chain, &mut pending)?;
                    if chain.is_empty() || pending.is_some() {
                        return Err(unsupported());
                    }
                    alternatives.push(std::mem::take(&mut chain));
                }
                ch if ch.is_ascii_whitespace() => flush(&mut word, &mut chain, &mut pending)?,
                _ => word.push(ch),
            }
        }

        if depth > 0 {
            return Err(unsupported());
        }
        flush(&mut word, &mut chain, &mut pending)?;
        if chain.is_empty() || pending.is_some() {
            return Err(unsupported());
        }
        alternatives.push(chain);
        Ok(Self { alternatives })
    }

    /// `Some(id)` when the whole selector is a single `#id`.
    pub(crate) fn id_only(&self) -> Option<&str> {
        let [chain] = self.alternatives.as_slice() else {
            return None;
        };
        let [link] = chain.as_slice() else {
            return None;
        };
        let compound = &link.compound;
        let id = compound.id.as_deref()?;
        let rest = Compound {
            id: None,
            ..compound.clone()
        };
        rest.is_empty().then_some(id)
    }

    pub(crate) fn matches(&self, dom: &Dom, node: NodeId) -> bool {
        self.alternatives
            .iter()
            .any(|chain| chain_matches(dom, node, chain))
    }
}

// Matches right to left: the last compound must be `node`, each earlier one
// an ancestor reachable through the recorded combinator.
fn chain_matches(dom: &Dom, node: NodeId, chain: &[Link]) -> bool {
    let Some((last, rest)) = chain.split_last() else {
        return false;
    };
    if !compound_matches(dom, node, &last.compound) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }
    let mut ancestor = dom.parent(node);
    while let Some(candidate) = ancestor {
        if chain_matches(dom, candidate, rest) {
            return true;
        }
        if last.combinator == Combinator::Child {
            return false;
        }
        ancestor = dom.parent(candidate);
    }
    false
}

fn compound_matches(dom: &Dom, node: NodeId, compound: &Compound) -> bool {
    dom.element(node)
        .is_some_and(|element| compound.matches(element))
}

fn parse_compound(word: &str) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut rest = word;

    if let Some(after) = rest.strip_prefix('*') {
        compound.universal = true;
        rest = after;
    } else {
        let (tag, after) = take_ident(rest);
        if !tag.is_empty() {
            compound.tag = Some(tag.to_ascii_lowercase());
        }
        rest = after;
    }

    while let Some(marker) = rest.chars().next() {
        let after_marker = &rest[marker.len_utf8()..];
        match marker {
            '#' => {
                let (id, after) = take_ident(after_marker);
                if id.is_empty() || compound.id.replace(id.to_string()).is_some() {
                    return None;
                }
                rest = after;
            }
            '.' => {
                let (class_name, after) = take_ident(after_marker);
                if class_name.is_empty() {
                    return None;
                }
                compound.classes.push(class_name.to_string());
                rest = after;
            }
            '[' => {
                let (body, after) = after_marker.split_once(']')?;
                compound.attrs.push(parse_attr_match(body.trim())?);
                rest = after;
            }
            _ => return None,
        }
    }

    (!compound.is_empty()).then_some(compound)
}

fn parse_attr_match(body: &str) -> Option<AttrMatch> {
    match body.split_once('=') {
        None => is_ident(body).then(|| AttrMatch::Exists(body.to_ascii_lowercase())),
        Some((key, value)) => {
            let key = key.trim();
            if !is_ident(key) {
                return None;
            }
            let value = value.trim();
            let value = match value.chars().next() {
                Some(quote @ ('"' | '\'')) => value[1..].strip_suffix(quote)?,
                _ if is_ident(value) => value,
                _ => return None,
            };
            Some(AttrMatch::Equals(key.to_ascii_lowercase(), value.to_string()))
        }
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_') || !ch.is_ascii()
}

fn is_ident(src: &str) -> bool {
    !src.is_empty() && src.chars().all(is_ident_char)
}

fn take_ident(src: &str) -> (&str, &str) {
    let end = src
        .char_indices()
        .find(|(_, ch)| !is_ident_char(*ch))
        .map_or(src.len(), |(idx, _)| idx);
    src.split_at(end)
}
