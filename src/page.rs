use std::any::Any;

use crate::dom::{Dom, NodeId};
use crate::events::{EventState, Listener, ListenerStore, ScriptId};
use crate::html::parse_html;
use crate::runtime_state::{LocationNavigation, LocationNavigationKind, LocationState, TraceState};
use crate::storage::LocalStorage;
use crate::{Error, Result, truncate_chars};

/// Behavior attached to a loaded document.
///
/// `on_ready` runs once, right after the script is added to a parsed page.
/// `handle_event` runs for every listener the script registered through
/// [`ScriptContext::add_event_listener`]; returning an error aborts the
/// dispatch and surfaces from the user action that caused it.
pub trait PageScript: Any {
    fn on_ready(&mut self, ctx: &mut ScriptContext<'_>) -> Result<()>;

    fn handle_event(&mut self, ctx: &mut ScriptContext<'_>, event: &mut EventState) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug)]
struct PageState {
    dom: Dom,
    storage: LocalStorage,
    location: LocationState,
    listeners: ListenerStore,
    trace: TraceState,
}

/// The document-side API a [`PageScript`] works against.
pub struct ScriptContext<'a> {
    state: &'a mut PageState,
    script: ScriptId,
}

impl ScriptContext<'_> {
    pub fn document(&self) -> NodeId {
        self.state.dom.root
    }

    /// The first `<body>` element, if the document has one.
    pub fn body(&self) -> Option<NodeId> {
        self.state
            .dom
            .all_element_nodes()
            .into_iter()
            .find(|node| self.state.dom.is_tag(*node, "body"))
    }

    pub fn by_id(&self, id: &str) -> Option<NodeId> {
        self.state.dom.by_id(id)
    }

    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        self.state.dom.query_selector(selector)
    }

    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        self.state.dom.query_selector_all(selector)
    }

    pub fn is_tag(&self, node: NodeId, tag: &str) -> bool {
        self.state.dom.is_tag(node, tag)
    }

    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.state.dom.parent_element(node)
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.state.dom.attr(node, name)
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) -> Result<()> {
        self.state.dom.set_attr(node, name, value)
    }

    pub fn value(&self, node: NodeId) -> Result<String> {
        self.state.dom.value(node)
    }

    pub fn text_content(&self, node: NodeId) -> String {
        self.state.dom.text_content(node)
    }

    pub fn disabled(&self, node: NodeId) -> bool {
        self.state.dom.disabled(node)
    }

    pub fn set_disabled(&mut self, node: NodeId, disabled: bool) -> Result<()> {
        self.state.dom.set_disabled(node, disabled)
    }

    pub fn has_class(&self, node: NodeId, class_name: &str) -> bool {
        self.state.dom.has_class(node, class_name)
    }

    pub fn class_add(&mut self, node: NodeId, class_name: &str) -> Result<()> {
        self.state.dom.class_add(node, class_name)
    }

    pub fn class_remove(&mut self, node: NodeId, class_name: &str) -> Result<()> {
        self.state.dom.class_remove(node, class_name)
    }

    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag_name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<NodeId> {
        self.state.dom.append_element(parent, tag_name, attrs)
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId> {
        self.state.dom.append_text(parent, text)
    }

    pub fn remove_node(&mut self, node: NodeId) -> Result<()> {
        self.state.dom.remove_node(node)
    }

    /// Routes `event` on `node` to the calling script.
    pub fn add_event_listener(&mut self, node: NodeId, event: &str, capture: bool) {
        self.state.listeners.add(
            node,
            event,
            Listener {
                capture,
                script: self.script,
            },
        );
    }

    /// The page's `localStorage`; a clone is another handle to the same area.
    pub fn storage(&self) -> &LocalStorage {
        &self.state.storage
    }

    /// `location.search`, including the leading `?` when non-empty.
    pub fn location_search(&self) -> &str {
        &self.state.location.parts.search
    }

    /// `location.href = target`. Returns the resolved absolute URL.
    pub fn navigate(&mut self, target: &str) -> String {
        let to = self
            .state
            .location
            .navigate(LocationNavigationKind::HrefSet, target);
        self.state.trace.line(format!("[location] href set -> {to}"));
        to
    }

    pub fn trace(&mut self, line: String) {
        self.state.trace.line(line);
    }
}

/// One loaded document, the scripts running on it and the user actions that
/// drive them.
pub struct Page {
    state: PageState,
    scripts: Vec<Box<dyn PageScript>>,
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("url", &self.state.location.href())
            .field("scripts", &self.scripts.len())
            .finish()
    }
}

impl Page {
    pub fn from_html(html: &str) -> Result<Self> {
        Self::from_html_with_url("about:blank", html)
    }

    pub fn from_html_with_url(url: &str, html: &str) -> Result<Self> {
        Self::from_html_with_url_and_local_storage(url, html, LocalStorage::new())
    }

    /// Parses `html` as the document at `url`, backed by `storage`.
    pub fn from_html_with_url_and_local_storage(
        url: &str,
        html: &str,
        storage: LocalStorage,
    ) -> Result<Self> {
        let dom = parse_html(html)?;
        Ok(Self {
            state: PageState {
                dom,
                storage,
                location: LocationState::new(url),
                listeners: ListenerStore::default(),
                trace: TraceState::default(),
            },
            scripts: Vec::new(),
        })
    }

    /// Attaches `script` and runs its ready hook; the document is already
    /// parsed at this point.
    pub fn add_script<S: PageScript>(&mut self, script: S) -> Result<()> {
        let id = ScriptId(self.scripts.len());
        self.scripts.push(Box::new(script));
        let mut ctx = ScriptContext {
            state: &mut self.state,
            script: id,
        };
        self.scripts[id.0].on_ready(&mut ctx)
    }

    /// The first attached script of type `S`.
    pub fn script<S: PageScript>(&self) -> Option<&S> {
        self.scripts
            .iter()
            .find_map(|script| script.as_any().downcast_ref::<S>())
    }

    pub fn url(&self) -> String {
        self.state.location.href()
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.state.storage
    }

    pub fn enable_trace(&mut self, enabled: bool) {
        self.state.trace.enabled = enabled;
    }

    pub fn take_trace_logs(&mut self) -> Vec<String> {
        self.state.trace.logs.drain(..).collect()
    }

    /// Whether trace lines are also emitted as `tracing` debug events under
    /// the `cloze_stats::trace` target. On by default; the buffer read by
    /// [`Page::take_trace_logs`] is filled either way.
    pub fn set_trace_forwarding(&mut self, enabled: bool) {
        self.state.trace.forward = enabled;
    }

    pub fn set_trace_events(&mut self, enabled: bool) {
        self.state.trace.events = enabled;
    }

    pub fn set_trace_log_limit(&mut self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::Config(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        self.state.trace.log_limit = max_entries;
        while self.state.trace.logs.len() > max_entries {
            self.state.trace.logs.pop_front();
        }
        Ok(())
    }

    /// Navigations requested since the last call, oldest first.
    pub fn take_location_navigations(&mut self) -> Vec<LocationNavigation> {
        std::mem::take(&mut self.state.location.navigations)
    }

    /// Picks `value` in a `<select>` and fires `input` and `change`, as a user
    /// would. Disabled selects ignore the action; a value no option carries is
    /// an error and fires nothing.
    pub fn select_option(&mut self, selector: &str, value: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        if !self.state.dom.is_tag(target, "select") {
            return Err(Error::TypeMismatch {
                selector: selector.to_string(),
                expected: "select".into(),
                actual: self
                    .state
                    .dom
                    .tag_name(target)
                    .unwrap_or("non-element")
                    .to_ascii_lowercase(),
            });
        }
        if self.state.dom.disabled(target) {
            return Ok(());
        }
        if !self.state.dom.has_option_value(target, value) {
            return Err(Error::Script(format!(
                "no option with value {value:?} in {selector}"
            )));
        }

        self.state.dom.set_select_value(target, value)?;
        self.dispatch_event(target, "input")?;
        self.dispatch_event(target, "change")?;
        Ok(())
    }

    pub fn click(&mut self, selector: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        if self.state.dom.disabled(target) {
            return Ok(());
        }

        let click_outcome = self.dispatch_event(target, "click")?;
        if click_outcome.default_prevented {
            return Ok(());
        }

        if let Some(link) = self.state.dom.closest_by_tag(target, "a") {
            if let Some(href) = self.state.dom.attr(link, "href") {
                let to = self
                    .state
                    .location
                    .navigate(LocationNavigationKind::LinkFollow, &href);
                self.state.trace.line(format!("[location] follow link -> {to}"));
            }
        }

        Ok(())
    }

    /// Fires `event` at the first match without any default action.
    pub fn dispatch(&mut self, selector: &str, event: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.dispatch_event(target, event)?;
        Ok(())
    }

    pub fn assert_text(&self, selector: &str, expected: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.state.dom.text_content(target);
        if actual != expected {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: expected.to_string(),
                actual,
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_value(&self, selector: &str, expected: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.state.dom.value(target)?;
        if actual != expected {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: expected.to_string(),
                actual,
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_class(&self, selector: &str, class_name: &str, expected: bool) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.state.dom.has_class(target, class_name);
        if actual != expected {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: format!("class {class_name} present={expected}"),
                actual: format!("class {class_name} present={actual}"),
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_disabled(&self, selector: &str, expected: bool) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.state.dom.disabled(target);
        if actual != expected {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_exists(&self, selector: &str) -> Result<()> {
        let _ = self.select_one(selector)?;
        Ok(())
    }

    /// Handle of the first element matching `selector`.
    pub fn node(&self, selector: &str) -> Result<NodeId> {
        self.select_one(selector)
    }

    pub fn query_count(&self, selector: &str) -> Result<usize> {
        Ok(self.state.dom.query_selector_all(selector)?.len())
    }

    pub fn text_content(&self, selector: &str) -> Result<String> {
        let target = self.select_one(selector)?;
        Ok(self.state.dom.text_content(target))
    }

    pub fn dump_dom(&self, selector: &str) -> Result<String> {
        let target = self.select_one(selector)?;
        Ok(self.state.dom.dump_node(target))
    }

    fn select_one(&self, selector: &str) -> Result<NodeId> {
        self.state
            .dom
            .query_selector(selector)?
            .ok_or_else(|| Error::SelectorNotFound(selector.to_string()))
    }

    fn node_snippet(&self, node_id: NodeId) -> String {
        truncate_chars(&self.state.dom.dump_node(node_id), 200)
    }

    fn dispatch_event(&mut self, target: NodeId, event_type: &str) -> Result<EventState> {
        let mut event = EventState::new(event_type, target);

        let mut path = Vec::new();
        let mut cursor = Some(target);
        while let Some(node) = cursor {
            path.push(node);
            cursor = self.state.dom.parent(node);
        }
        path.reverse();

        // Capture phase.
        for node in &path[..path.len() - 1] {
            event.current_target = *node;
            self.invoke_listeners(*node, &mut event, true)?;
            if event.propagation_stopped {
                self.trace_event_done(&event, "propagation_stopped");
                return Ok(event);
            }
        }

        // Target phase: capture listeners first.
        event.current_target = target;
        self.invoke_listeners(target, &mut event, true)?;
        if event.propagation_stopped {
            self.trace_event_done(&event, "propagation_stopped");
            return Ok(event);
        }
        self.invoke_listeners(target, &mut event, false)?;
        if event.propagation_stopped {
            self.trace_event_done(&event, "propagation_stopped");
            return Ok(event);
        }

        // Bubble phase.
        for node in path[..path.len() - 1].iter().rev() {
            event.current_target = *node;
            self.invoke_listeners(*node, &mut event, false)?;
            if event.propagation_stopped {
                self.trace_event_done(&event, "propagation_stopped");
                return Ok(event);
            }
        }

        self.trace_event_done(&event, "completed");
        Ok(event)
    }

    fn invoke_listeners(
        &mut self,
        node_id: NodeId,
        event: &mut EventState,
        capture: bool,
    ) -> Result<()> {
        let listeners = self.state.listeners.get(node_id, &event.event_type, capture);
        for listener in listeners {
            if self.state.trace.enabled {
                let phase = if capture { "capture" } else { "bubble" };
                let line = format!(
                    "[event] {} target={} current={} phase={} default_prevented={}",
                    event.event_type,
                    self.trace_node_label(event.target),
                    self.trace_node_label(event.current_target),
                    phase,
                    event.default_prevented
                );
                self.state.trace.event_line(line);
            }
            let Some(script) = self.scripts.get_mut(listener.script.0) else {
                continue;
            };
            let mut ctx = ScriptContext {
                state: &mut self.state,
                script: listener.script,
            };
            script.handle_event(&mut ctx, event)?;
        }
        Ok(())
    }

    fn trace_event_done(&mut self, event: &EventState, outcome: &str) {
        if !self.state.trace.enabled {
            return;
        }
        let line = format!(
            "[event] done {} target={} outcome={} default_prevented={} propagation_stopped={}",
            event.event_type,
            self.trace_node_label(event.target),
            outcome,
            event.default_prevented,
            event.propagation_stopped
        );
        self.state.trace.event_line(line);
    }

    fn trace_node_label(&self, node: NodeId) -> String {
        if let Some(id) = self.state.dom.attr(node, "id") {
            if !id.is_empty() {
                return format!("#{id}");
            }
        }
        self.state
            .dom
            .tag_name(node)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("node-{}", node.0))
    }
}
