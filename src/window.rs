use std::rc::Rc;

use crate::clock::{Clock, SystemClock};
use crate::config::QuizConfig;
use crate::grader::Grader;
use crate::history::HistoryRenderer;
use crate::location::LocationParts;
use crate::page::Page;
use crate::storage::LocalStorage;
use crate::{Error, Result};

/// Which page script a route loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// A generated cloze quiz; gets a [`Grader`].
    Quiz,
    /// The score history; gets a [`HistoryRenderer`].
    Stats,
    /// Plain markup with no script.
    Static,
}

#[derive(Debug, Clone)]
struct Route {
    path: String,
    kind: PageKind,
    html: String,
}

/// A single browser tab over a fixed set of routes.
///
/// Every page opened here shares the same [`LocalStorage`], so a score saved on
/// the quiz page is visible to the history page it navigates to.
pub struct Browser {
    config: QuizConfig,
    clock: Rc<dyn Clock>,
    storage: LocalStorage,
    routes: Vec<Route>,
    current: Option<Page>,
    visited: Vec<String>,
}

impl std::fmt::Debug for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("config", &self.config)
            .field("routes", &self.routes.len())
            .field("current", &self.current)
            .field("visited", &self.visited)
            .finish()
    }
}

impl Browser {
    pub fn new(config: QuizConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock: Rc::new(SystemClock),
            storage: LocalStorage::new(),
            routes: Vec::new(),
            current: None,
            visited: Vec::new(),
        })
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Rc::new(clock);
        self
    }

    /// Replaces the storage area, e.g. with one seeded from a fixture.
    pub fn with_local_storage(mut self, storage: LocalStorage) -> Self {
        self.storage = storage;
        self
    }

    pub fn config(&self) -> &QuizConfig {
        &self.config
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    /// Serves `html` at `path`. A later route for the same path replaces the
    /// earlier one.
    pub fn route(&mut self, path: &str, kind: PageKind, html: &str) -> &mut Self {
        self.routes.retain(|route| route.path != path);
        self.routes.push(Route {
            path: path.to_string(),
            kind,
            html: html.to_string(),
        });
        self
    }

    /// Loads `url`, replacing the current page, and runs its page script.
    pub fn open(&mut self, url: &str) -> Result<&mut Page> {
        let parts = LocationParts::parse(url)
            .ok_or_else(|| Error::Navigation(format!("invalid url: {url}")))?;
        let route = self
            .routes
            .iter()
            .find(|route| route.path == parts.pathname)
            .cloned()
            .ok_or_else(|| Error::Navigation(format!("no route for {}", parts.pathname)))?;

        let href = parts.href();
        let mut page = Page::from_html_with_url_and_local_storage(&href, &route.html, self.storage.clone())?;
        match route.kind {
            PageKind::Quiz => {
                let grader = Grader::new(self.config.clone()).with_clock(Rc::clone(&self.clock));
                page.add_script(grader)?;
            }
            PageKind::Stats => page.add_script(HistoryRenderer::new(self.config.clone()))?,
            PageKind::Static => {}
        }

        tracing::debug!(url = %href, kind = ?route.kind, "opened page");
        self.visited.push(href);
        Ok(self.current.insert(page))
    }

    /// Loads the most recent navigation the current page requested, if any.
    pub fn follow_navigation(&mut self) -> Result<Option<&mut Page>> {
        let Some(page) = self.current.as_mut() else {
            return Ok(None);
        };
        let Some(navigation) = page.take_location_navigations().pop() else {
            return Ok(None);
        };
        self.open(&navigation.to).map(Some)
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.current.as_ref()
    }

    pub fn current_page_mut(&mut self) -> Option<&mut Page> {
        self.current.as_mut()
    }

    /// URLs loaded so far, oldest first.
    pub fn visited(&self) -> &[String] {
        &self.visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_routes_and_bad_urls_are_navigation_errors() -> Result<()> {
        let mut browser = Browser::new(QuizConfig::default())?;
        browser.route("/", PageKind::Static, "<p>home</p>");
        assert!(matches!(browser.open("http://localhost:4567/missing"), Err(Error::Navigation(_))));
        assert!(matches!(browser.open("no scheme"), Err(Error::Navigation(_))));
        browser.open("http://localhost:4567/")?.assert_text("p", "home")?;
        assert_eq!(browser.visited(), ["http://localhost:4567/"]);
        Ok(())
    }

    #[test]
    fn follow_without_pending_navigation_is_none() -> Result<()> {
        let mut browser = Browser::new(QuizConfig::default())?;
        assert!(browser.follow_navigation()?.is_none());
        browser.route("/", PageKind::Static, "<p>home</p>");
        browser.open("http://localhost:4567/")?;
        assert!(browser.follow_navigation()?.is_none());
        Ok(())
    }

    #[test]
    fn later_route_replaces_earlier_one() -> Result<()> {
        let mut browser = Browser::new(QuizConfig::default())?;
        browser
            .route("/", PageKind::Static, "<p>old</p>")
            .route("/", PageKind::Static, "<p>new</p>");
        browser.open("http://localhost:4567/")?.assert_text("p", "new")?;
        Ok(())
    }
}
