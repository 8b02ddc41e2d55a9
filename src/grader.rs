use std::collections::HashMap;
use std::fmt;

use crate::clock::{Clock, SystemClock};
use crate::config::QuizConfig;
use crate::date_format::format_locale_date_time;
use crate::dom::NodeId;
use crate::events::EventState;
use crate::location::source_url_from_search;
use crate::page::{PageScript, ScriptContext};
use crate::record::{ScoreRecord, format_score};
use crate::repository::ScoreRepository;
use crate::uri::decode_uri;
use crate::Result;

const ANSWER_CLASS: &str = "answer";
const CORRECT_CLASS: &str = "correct";
const WRONG_CLASS: &str = "wrong";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    Wrong,
}

impl Verdict {
    fn class_name(self) -> &'static str {
        match self {
            Self::Correct => CORRECT_CLASS,
            Self::Wrong => WRONG_CLASS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Unanswered,
    Answered(Verdict),
}

/// Quiz page script: grades each answer slot once and saves the score.
///
/// An answer slot is any element whose `id` is the expected answer and which
/// holds a `<select>`. Grading is driven by one delegated `change` listener on
/// `<body>`, so slots added after load are graded too.
pub struct Grader {
    config: QuizConfig,
    clock: Box<dyn Clock>,
    score: usize,
    slots: HashMap<NodeId, Verdict>,
    delegate: Option<NodeId>,
    save_trigger: Option<NodeId>,
    last_saved: Option<ScoreRecord>,
}

impl fmt::Debug for Grader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grader")
            .field("config", &self.config)
            .field("score", &self.score)
            .field("answered", &self.slots.len())
            .field("last_saved", &self.last_saved)
            .finish()
    }
}

impl Default for Grader {
    fn default() -> Self {
        Self::new(QuizConfig::default())
    }
}

impl Grader {
    pub fn new(config: QuizConfig) -> Self {
        Self {
            config,
            clock: Box::new(SystemClock),
            score: 0,
            slots: HashMap::new(),
            delegate: None,
            save_trigger: None,
            last_saved: None,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Number of slots answered correctly so far.
    pub fn score(&self) -> usize {
        self.score
    }

    pub fn answered(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_state(&self, slot: NodeId) -> SlotState {
        self.slots
            .get(&slot)
            .map_or(SlotState::Unanswered, |verdict| SlotState::Answered(*verdict))
    }

    /// The record written by the most recent successful save.
    pub fn last_saved(&self) -> Option<&ScoreRecord> {
        self.last_saved.as_ref()
    }

    fn install(&mut self, ctx: &mut ScriptContext<'_>) -> Result<()> {
        self.config.validate()?;

        let body = ctx.body();
        let container = match ctx.by_id("content") {
            Some(content) => content,
            None => {
                tracing::warn!("#content not found; appending save trigger to body");
                body.unwrap_or_else(|| ctx.document())
            }
        };
        let trigger = ctx.append_element(container, "div", &[("id", "submit")])?;
        ctx.append_text(trigger, &self.config.save_label)?;
        ctx.add_event_listener(trigger, "click", false);
        self.save_trigger = Some(trigger);

        let delegate = body.unwrap_or_else(|| ctx.document());
        ctx.add_event_listener(delegate, "change", false);
        self.delegate = Some(delegate);
        Ok(())
    }

    fn on_selection_change(&mut self, ctx: &mut ScriptContext<'_>, target: NodeId) -> Result<()> {
        if !ctx.is_tag(target, "select") {
            return Ok(());
        }
        let Some(slot) = ctx.parent_element(target) else {
            return Ok(());
        };
        if let Some(verdict) = self.slots.get(&slot) {
            ctx.trace(format!("[grader] slot already answered ({verdict:?}); ignoring change"));
            return Ok(());
        }

        let chosen = ctx.value(target)?;
        let expected = ctx.attr(slot, "id").unwrap_or_default();

        ctx.set_disabled(target, true)?;
        ctx.class_remove(slot, CORRECT_CLASS)?;
        ctx.class_remove(slot, WRONG_CLASS)?;
        ctx.class_add(slot, ANSWER_CLASS)?;

        let verdict = if chosen == expected {
            self.score += 1;
            Verdict::Correct
        } else {
            Verdict::Wrong
        };
        ctx.class_add(slot, verdict.class_name())?;
        self.slots.insert(slot, verdict);

        ctx.trace(format!(
            "[grader] slot #{expected} chose {chosen:?}: {verdict:?} (score {})",
            self.score
        ));
        Ok(())
    }

    fn on_save_requested(&mut self, ctx: &mut ScriptContext<'_>) -> Result<()> {
        let answered = ctx.query_selector_all(&format!(".{ANSWER_CLASS}"))?.len();

        let raw_url = source_url_from_search(ctx.location_search(), &self.config.source_param)
            .unwrap_or_default();
        let url = decode_uri(&raw_url).unwrap_or_else(|err| {
            tracing::warn!(url = %raw_url, error = %err, "source url is not decodable; keeping it raw");
            raw_url.clone()
        });

        let date = format_locale_date_time(&self.clock.now(), &self.config.locale);
        let record = ScoreRecord::new(url, format_score(self.score, answered), date);

        let repository = ScoreRepository::with_key(ctx.storage().clone(), &self.config.storage_key);
        if let Err(err) = repository.append(&record) {
            tracing::warn!(error = %err, "could not save score; staying on the quiz page");
            return Err(err);
        }

        tracing::info!(url = %record.url, score = %record.score, "saved quiz score");
        self.last_saved = Some(record);
        ctx.navigate(&self.config.history_route);
        Ok(())
    }
}

impl PageScript for Grader {
    fn on_ready(&mut self, ctx: &mut ScriptContext<'_>) -> Result<()> {
        self.install(ctx)
    }

    fn handle_event(&mut self, ctx: &mut ScriptContext<'_>, event: &mut EventState) -> Result<()> {
        let current = Some(event.current_target());
        match event.event_type() {
            "change" if current == self.delegate => self.on_selection_change(ctx, event.target()),
            "click" if current == self.save_trigger => self.on_save_requested(ctx),
            _ => Ok(()),
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::clock::FixedClock;
    use crate::page::Page;
    use crate::storage::KeyValueStore;
    use crate::{Error, LocationNavigationKind};

    fn clock() -> Result<FixedClock> {
        NaiveDate::from_ymd_opt(2026, 3, 7)
            .and_then(|date| date.and_hms_opt(19, 5, 9))
            .map(FixedClock)
            .ok_or_else(|| Error::Config("invalid fixture time".into()))
    }

    #[test]
    fn save_trigger_falls_back_to_body_without_content() -> Result<()> {
        let mut page = Page::from_html("<body><p id='x'>quiz</p></body>")?;
        page.add_script(Grader::default())?;
        page.assert_text("body > #submit", "Save Statistics")?;
        Ok(())
    }

    #[test]
    fn custom_label_is_used_for_the_trigger() -> Result<()> {
        let mut page = Page::from_html("<body><div id='content'></div></body>")?;
        let config = QuizConfig {
            save_label: "Speichern".into(),
            ..QuizConfig::default()
        };
        page.add_script(Grader::new(config))?;
        page.assert_text("#content > #submit", "Speichern")?;
        Ok(())
    }

    #[test]
    fn invalid_config_fails_on_ready() -> Result<()> {
        let mut page = Page::from_html("<body></body>")?;
        let config = QuizConfig {
            storage_key: String::new(),
            ..QuizConfig::default()
        };
        assert!(matches!(page.add_script(Grader::new(config)), Err(Error::Config(_))));
        Ok(())
    }

    #[test]
    fn non_select_changes_are_ignored() -> Result<()> {
        let mut page = Page::from_html(
            "<body><div id='content'><span id='A'><input id='i' value='A'></span></div></body>",
        )?;
        page.add_script(Grader::default())?;
        page.dispatch("#i", "change")?;
        page.assert_class("#A", "answer", false)?;
        assert_eq!(page.script::<Grader>().map(Grader::answered), Some(0));
        Ok(())
    }

    #[test]
    fn slot_state_tracks_verdicts() -> Result<()> {
        let mut page = Page::from_html(
            r#"<body><div id="content">
                <span id="A"><select><option>-</option><option>A</option></select></span>
                <span id="B"><select><option>-</option><option>B</option></select></span>
            </div></body>"#,
        )?;
        page.add_script(Grader::default())?;
        page.select_option("#A select", "A")?;
        page.select_option("#B select", "-")?;

        let a = page.node("#A")?;
        let b = page.node("#B")?;
        let grader = page
            .script::<Grader>()
            .ok_or_else(|| Error::Script("grader missing".into()))?;
        assert_eq!(grader.slot_state(a), SlotState::Answered(Verdict::Correct));
        assert_eq!(grader.slot_state(b), SlotState::Answered(Verdict::Wrong));
        assert_eq!(grader.slot_state(page.node("#content")?), SlotState::Unanswered);
        assert_eq!(grader.score(), 1);
        Ok(())
    }

    #[test]
    fn undecodable_source_url_is_saved_raw() -> Result<()> {
        let mut page = Page::from_html_with_url(
            "http://localhost:4567/wiki?url=100%&lang=en",
            "<body><div id='content'></div></body>",
        )?;
        page.add_script(Grader::default().with_clock(clock()?))?;
        page.click("#submit")?;
        let saved = page
            .script::<Grader>()
            .and_then(Grader::last_saved)
            .ok_or_else(|| Error::Script("nothing saved".into()))?;
        assert_eq!(saved.url, "100%");
        assert_eq!(saved.date, "3/7/2026, 7:05:09 PM");
        assert!(page.storage().get_item("stats").is_some());

        let navigations = page.take_location_navigations();
        assert_eq!(navigations.len(), 1);
        assert_eq!(navigations[0].kind, LocationNavigationKind::HrefSet);
        Ok(())
    }

    /// Adds one more answer slot once the page is ready.
    struct LateSlot;

    impl PageScript for LateSlot {
        fn on_ready(&mut self, ctx: &mut ScriptContext<'_>) -> Result<()> {
            let content = ctx
                .by_id("content")
                .ok_or_else(|| Error::SelectorNotFound("#content".into()))?;
            let slot = ctx.append_element(content, "span", &[("id", "Z")])?;
            let select = ctx.append_element(slot, "select", &[])?;
            for label in ["-", "Z", "Y"] {
                let option = ctx.append_element(select, "option", &[])?;
                ctx.append_text(option, label)?;
            }
            Ok(())
        }

        fn handle_event(&mut self, _: &mut ScriptContext<'_>, _: &mut EventState) -> Result<()> {
            Ok(())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn slots_added_after_install_are_graded() -> Result<()> {
        let mut page = Page::from_html("<body><div id='content'></div></body>")?;
        page.add_script(Grader::default())?;
        page.add_script(LateSlot)?;

        page.select_option("#Z select", "Z")?;
        page.assert_class("#Z", "correct", true)?;
        page.assert_class("#Z", "answer", true)?;
        page.assert_disabled("#Z select", true)?;
        assert_eq!(page.script::<Grader>().map(Grader::score), Some(1));
        Ok(())
    }

    #[test]
    fn configured_locale_formats_the_saved_date() -> Result<()> {
        let mut page = Page::from_html_with_url(
            "http://localhost:4567/wiki?url=https://de.wikipedia.org/wiki/L%C3%BCckentext",
            "<body><div id='content'></div></body>",
        )?;
        let config = QuizConfig::default().with_locale("de-DE");
        page.add_script(Grader::new(config).with_clock(clock()?))?;
        page.click("#submit")?;
        let saved = page
            .script::<Grader>()
            .and_then(Grader::last_saved)
            .ok_or_else(|| Error::Script("nothing saved".into()))?;
        assert_eq!(saved.date, "7.3.2026, 19:05:09");
        assert_eq!(saved.url, "https://de.wikipedia.org/wiki/Lückentext");
        assert_eq!(saved.score, "0.00");
        Ok(())
    }
}
