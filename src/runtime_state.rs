use std::collections::VecDeque;

use crate::location::LocationParts;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationNavigationKind {
    /// A script assigned `location.href`.
    HrefSet,
    /// The default action of a clicked link.
    LinkFollow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationNavigation {
    pub kind: LocationNavigationKind,
    pub from: String,
    pub to: String,
}

#[derive(Debug)]
pub(crate) struct LocationState {
    pub(crate) parts: LocationParts,
    pub(crate) navigations: Vec<LocationNavigation>,
}

impl LocationState {
    pub(crate) fn new(url: &str) -> Self {
        let parts = LocationParts::parse(url).unwrap_or_else(LocationParts::blank);
        Self {
            parts,
            navigations: Vec::new(),
        }
    }

    pub(crate) fn href(&self) -> String {
        self.parts.href()
    }

    /// Records a navigation request; the document itself stays loaded until
    /// the owning browser follows it.
    pub(crate) fn navigate(&mut self, kind: LocationNavigationKind, target: &str) -> String {
        let from = self.href();
        let to = self.parts.resolve(target);
        self.navigations.push(LocationNavigation {
            kind,
            from,
            to: to.clone(),
        });
        to
    }
}

#[derive(Debug)]
pub(crate) struct TraceState {
    pub(crate) enabled: bool,
    pub(crate) events: bool,
    pub(crate) logs: VecDeque<String>,
    pub(crate) log_limit: usize,
    // Also send each line to `tracing::debug!`.
    pub(crate) forward: bool,
}

impl Default for TraceState {
    fn default() -> Self {
        Self {
            enabled: false,
            events: true,
            logs: VecDeque::new(),
            log_limit: 10_000,
            forward: true,
        }
    }
}

impl TraceState {
    pub(crate) fn line(&mut self, line: String) {
        if !self.enabled {
            return;
        }
        if self.forward {
            tracing::debug!(target: "cloze_stats::trace", "{line}");
        }
        if self.logs.len() >= self.log_limit {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    pub(crate) fn event_line(&mut self, line: String) {
        if self.events {
            self.line(line);
        }
    }
}
