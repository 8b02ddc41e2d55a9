use std::any::Any;

use crate::config::{ClearScope, QuizConfig};
use crate::dom::NodeId;
use crate::events::EventState;
use crate::page::{PageScript, ScriptContext};
use crate::record::ScoreRecord;
use crate::repository::ScoreRepository;
use crate::storage::LocalStorage;
use crate::uri::decode_uri_component;
use crate::Result;

const CLEAR_SELECTOR: &str = ".clear-score";
const ROW_SELECTOR: &str = "tbody tr";

/// History page script: renders the stored score list into the first
/// `<tbody>` and wires every `.clear-score` element to erase it.
#[derive(Debug, Default)]
pub struct HistoryRenderer {
    config: QuizConfig,
    clear_triggers: Vec<NodeId>,
    rendered: usize,
}

impl HistoryRenderer {
    pub fn new(config: QuizConfig) -> Self {
        Self {
            config,
            clear_triggers: Vec::new(),
            rendered: 0,
        }
    }

    /// Rows appended by the last render.
    pub fn rendered(&self) -> usize {
        self.rendered
    }

    fn repository(&self, storage: &LocalStorage) -> ScoreRepository<LocalStorage> {
        ScoreRepository::with_key(storage.clone(), &self.config.storage_key)
    }

    fn on_load(&mut self, ctx: &mut ScriptContext<'_>) -> Result<()> {
        let history = self.repository(ctx.storage()).load();
        self.rendered = 0;
        if history.is_empty() {
            return Ok(());
        }

        let Some(tbody) = ctx.query_selector("tbody")? else {
            tracing::warn!(records = history.len(), "no <tbody> to render score history into");
            return Ok(());
        };
        for record in &history {
            append_row(ctx, tbody, record)?;
            self.rendered += 1;
        }
        ctx.trace(format!("[history] rendered {} rows", self.rendered));
        Ok(())
    }

    fn on_clear_requested(&mut self, ctx: &mut ScriptContext<'_>, event: &mut EventState) -> Result<()> {
        event.prevent_default();

        let repository = self.repository(ctx.storage());
        let cleared = match self.config.clear_scope {
            ClearScope::EntireStorage => repository.clear_all(),
            ClearScope::HistoryOnly => repository.clear(),
        };
        if let Err(err) = cleared {
            tracing::warn!(error = %err, "could not clear score history");
            return Err(err);
        }

        let rows = ctx.query_selector_all(ROW_SELECTOR)?;
        for row in &rows {
            ctx.remove_node(*row)?;
        }
        self.rendered = 0;
        tracing::info!(rows = rows.len(), scope = ?self.config.clear_scope, "cleared score history");
        Ok(())
    }
}

fn append_row(ctx: &mut ScriptContext<'_>, tbody: NodeId, record: &ScoreRecord) -> Result<()> {
    let href = decode_uri_component(&record.url).unwrap_or_else(|_| {
        tracing::debug!(url = %record.url, "stored url has a malformed escape; showing it raw");
        record.url.clone()
    });

    let row = ctx.append_element(tbody, "tr", &[])?;
    let link_cell = ctx.append_element(row, "td", &[])?;
    let link = ctx.append_element(link_cell, "a", &[("href", &href)])?;
    ctx.append_text(link, &href)?;
    let score_cell = ctx.append_element(row, "td", &[])?;
    ctx.append_text(score_cell, &record.score)?;
    let date_cell = ctx.append_element(row, "td", &[])?;
    ctx.append_text(date_cell, &record.date)?;
    Ok(())
}

impl PageScript for HistoryRenderer {
    fn on_ready(&mut self, ctx: &mut ScriptContext<'_>) -> Result<()> {
        self.config.validate()?;
        self.on_load(ctx)?;
        self.clear_triggers = ctx.query_selector_all(CLEAR_SELECTOR)?;
        for trigger in &self.clear_triggers {
            ctx.add_event_listener(*trigger, "click", false);
        }
        Ok(())
    }

    fn handle_event(&mut self, ctx: &mut ScriptContext<'_>, event: &mut EventState) -> Result<()> {
        if event.event_type() == "click" && self.clear_triggers.contains(&event.current_target()) {
            return self.on_clear_requested(ctx, event);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
