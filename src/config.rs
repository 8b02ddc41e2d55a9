use serde::Deserialize;

use crate::{Error, Result};

pub const DEFAULT_STORAGE_KEY: &str = "stats";
pub const DEFAULT_HISTORY_ROUTE: &str = "/stats";
pub const DEFAULT_SAVE_LABEL: &str = "Save Statistics";
pub const DEFAULT_LOCALE: &str = "en-US";

/// How the grader finds the quiz source location in the page query string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceParam {
    /// Value of the first query parameter, whatever its name.
    Positional,
    /// Value of the parameter with this name.
    Named(String),
}

/// What the history page's clear action erases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearScope {
    EntireStorage,
    HistoryOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuizConfig {
    pub storage_key: String,
    pub history_route: String,
    pub source_param: SourceParam,
    pub clear_scope: ClearScope,
    pub locale: String,
    pub save_label: String,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            history_route: DEFAULT_HISTORY_ROUTE.to_string(),
            source_param: SourceParam::Positional,
            clear_scope: ClearScope::EntireStorage,
            locale: DEFAULT_LOCALE.to_string(),
            save_label: DEFAULT_SAVE_LABEL.to_string(),
        }
    }
}

impl QuizConfig {
    /// Reads a config object; missing fields fall back to the defaults.
    pub fn from_json(src: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(src)
            .map_err(|err| Error::Config(format!("invalid quiz config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage_key.is_empty() {
            return Err(Error::Config("storage_key must not be empty".into()));
        }
        if self.history_route.trim().is_empty() {
            return Err(Error::Config("history_route must not be empty".into()));
        }
        if let SourceParam::Named(name) = &self.source_param {
            if name.is_empty() || name.contains(['&', '=']) {
                return Err(Error::Config(format!(
                    "source_param name is not a query parameter name: {name:?}"
                )));
            }
        }
        Ok(())
    }

    pub fn with_source_param(mut self, source_param: SourceParam) -> Self {
        self.source_param = source_param;
        self
    }

    pub fn with_clear_scope(mut self, clear_scope: ClearScope) -> Self {
        self.clear_scope = clear_scope;
        self
    }

    pub fn with_locale(mut self, locale: &str) -> Self {
        self.locale = locale.to_string();
        self
    }
}
