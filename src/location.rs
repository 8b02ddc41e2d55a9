use crate::config::SourceParam;

/// A parsed absolute URL, split the way `window.location` exposes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocationParts {
    pub(crate) scheme: String,
    /// `Some` for `scheme://host/...` URLs, `None` for opaque ones like
    /// `about:blank`.
    pub(crate) host: Option<String>,
    /// Normalized path when there is a host, the opaque remainder otherwise.
    pub(crate) pathname: String,
    pub(crate) search: String,
    pub(crate) hash: String,
}

impl LocationParts {
    pub(crate) fn blank() -> Self {
        Self {
            scheme: "about".into(),
            host: None,
            pathname: "blank".into(),
            search: String::new(),
            hash: String::new(),
        }
    }

    pub(crate) fn href(&self) -> String {
        let authority = match &self.host {
            Some(host) => format!("//{host}"),
            None => String::new(),
        };
        format!(
            "{}:{authority}{}{}{}",
            self.scheme, self.pathname, self.search, self.hash
        )
    }

    pub(crate) fn parse(input: &str) -> Option<Self> {
        let (scheme, rest) = input.trim().split_once(':')?;
        if !is_scheme(scheme) {
            return None;
        }
        let scheme = scheme.to_ascii_lowercase();

        let Some(hierarchical) = rest.strip_prefix("//") else {
            let (pathname, search, hash) = split_tail(rest);
            return Some(Self {
                scheme,
                host: None,
                pathname: pathname.to_string(),
                search: search.to_string(),
                hash: hash.to_string(),
            });
        };

        let host_end = hierarchical.find(['/', '?', '#']).unwrap_or(hierarchical.len());
        let (host, tail) = hierarchical.split_at(host_end);
        let (pathname, search, hash) = split_tail(tail);
        Some(Self {
            scheme,
            host: Some(host.to_ascii_lowercase()),
            pathname: normalize_path(pathname),
            search: search.to_string(),
            hash: hash.to_string(),
        })
    }

    /// Resolves `input` the way assigning `location.href` would.
    pub(crate) fn resolve(&self, input: &str) -> String {
        let input = input.trim();
        if let Some(absolute) = Self::parse(input) {
            return absolute.href();
        }
        if input.starts_with("//") {
            return Self::parse(&format!("{}:{input}", self.scheme))
                .map_or_else(|| input.to_string(), |parts| parts.href());
        }

        let mut next = self.clone();
        if input.is_empty() {
            return next.href();
        }
        if let Some(fragment) = input.strip_prefix('#') {
            next.hash = if fragment.is_empty() {
                String::new()
            } else {
                format!("#{fragment}")
            };
            return next.href();
        }

        let (relative, search, hash) = split_tail(input);
        if !relative.is_empty() {
            next.pathname = match &next.host {
                None => relative.to_string(),
                Some(_) if relative.starts_with('/') => normalize_path(relative),
                Some(_) => {
                    let directory = next
                        .pathname
                        .rfind('/')
                        .map_or("/", |slash| &next.pathname[..=slash]);
                    normalize_path(&format!("{directory}{relative}"))
                }
            };
        }
        next.search = search.to_string();
        next.hash = hash.to_string();
        next.href()
    }
}

/// Picks the quiz source location out of a `?a=b&c=d` query string without
/// percent-decoding it.
///
/// `SourceParam::Positional` takes the value of the first parameter whatever
/// its name is; links produced by the quiz server always put `url` first.
pub(crate) fn source_url_from_search(search: &str, mode: &SourceParam) -> Option<String> {
    let query = search.strip_prefix('?').unwrap_or(search);
    if query.is_empty() {
        return None;
    }
    match mode {
        SourceParam::Positional => {
            let first = query.split('&').next()?;
            let (_, value) = first.split_once('=')?;
            Some(value.to_string())
        }
        SourceParam::Named(name) => query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then(|| value.to_string())
        }),
    }
}

fn is_scheme(scheme: &str) -> bool {
    scheme.chars().next().is_some_and(|ch| ch.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
}

/// Splits `path?query#fragment`, keeping the `?` and `#` markers.
fn split_tail(tail: &str) -> (&str, &str, &str) {
    let (before_hash, hash) = tail.find('#').map_or((tail, ""), |at| tail.split_at(at));
    let (path, search) = before_hash
        .find('?')
        .map_or((before_hash, ""), |at| before_hash.split_at(at));
    (path, search, hash)
}

/// Collapses `.`, `..` and empty segments of an absolute path.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    let trailing = path.len() > 1 && path.ends_with('/') && !segments.is_empty();
    let mut out = format!("/{}", segments.join("/"));
    if trailing {
        out.push('/');
    }
    out
}
