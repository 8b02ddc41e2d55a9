use std::error::Error as StdError;
use std::fmt;

mod clock;
mod config;
mod date_format;
mod dom;
mod events;
mod grader;
mod history;
mod html;
mod location;
mod page;
mod record;
mod repository;
mod runtime_state;
mod selector;
mod storage;
mod uri;
mod window;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ClearScope, QuizConfig, SourceParam};
pub use date_format::format_locale_date_time;
pub use dom::NodeId;
pub use events::EventState;
pub use grader::{Grader, SlotState, Verdict};
pub use history::HistoryRenderer;
pub use page::{Page, PageScript, ScriptContext};
pub use record::{ScoreHistory, ScoreRecord, format_score};
pub use repository::ScoreRepository;
pub use runtime_state::{LocationNavigation, LocationNavigationKind};
pub use storage::{KeyValueStore, LocalStorage};
pub use uri::{decode_uri, decode_uri_component, encode_uri, encode_uri_component};
pub use window::{Browser, PageKind};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HtmlParse(String),
    UnsupportedSelector(String),
    SelectorNotFound(String),
    Script(String),
    Storage(String),
    Navigation(String),
    Config(String),
    TypeMismatch {
        selector: String,
        expected: String,
        actual: String,
    },
    AssertionFailed {
        selector: String,
        expected: String,
        actual: String,
        dom_snippet: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlParse(msg) => write!(f, "html parse error: {msg}"),
            Self::UnsupportedSelector(selector) => write!(f, "unsupported selector: {selector}"),
            Self::SelectorNotFound(selector) => write!(f, "selector not found: {selector}"),
            Self::Script(msg) => write!(f, "page script error: {msg}"),
            Self::Storage(msg) => write!(f, "storage error: {msg}"),
            Self::Navigation(msg) => write!(f, "navigation error: {msg}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::TypeMismatch {
                selector,
                expected,
                actual,
            } => write!(
                f,
                "type mismatch for {selector}: expected {expected}, actual {actual}"
            ),
            Self::AssertionFailed {
                selector,
                expected,
                actual,
                dom_snippet,
            } => write!(
                f,
                "assertion failed for {selector}: expected {expected}, actual {actual}, snippet {dom_snippet}"
            ),
        }
    }
}

impl StdError for Error {}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    let mut it = value.chars();
    let mut out = String::new();
    for _ in 0..max_chars {
        let Some(ch) = it.next() else {
            return out;
        };
        out.push(ch);
    }
    if it.next().is_some() {
        out.push_str("...");
    }
    out
}
