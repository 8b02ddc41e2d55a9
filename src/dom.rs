use std::collections::HashMap;

use crate::selector::Selector;
use crate::{Error, Result};

/// Handle to a node inside one page's DOM arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub(crate) enum NodeType {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) node_type: NodeType,
}

#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) tag_name: String,
    // Insertion ordered so serialization is stable.
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) value: String,
    pub(crate) disabled: bool,
}

impl Element {
    fn new(tag_name: String, attrs: Vec<(String, String)>) -> Self {
        let value = attr_lookup(&attrs, "value").unwrap_or_default();
        let disabled = attr_lookup(&attrs, "disabled").is_some();
        Self {
            tag_name,
            attrs,
            value,
            disabled,
        }
    }

    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn set_attr(&mut self, name: &str, value: &str) {
        if let Some((_, stored)) = self.attrs.iter_mut().find(|(key, _)| key == name) {
            *stored = value.to_string();
        } else {
            self.attrs.push((name.to_string(), value.to_string()));
        }
    }

    fn remove_attr(&mut self, name: &str) {
        self.attrs.retain(|(key, _)| key != name);
    }

    pub(crate) fn is_tag(&self, tag: &str) -> bool {
        self.tag_name.eq_ignore_ascii_case(tag)
    }
}

fn attr_lookup(attrs: &[(String, String)], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
}

#[derive(Debug, Clone)]
pub(crate) struct Dom {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
    id_index: HashMap<String, NodeId>,
}

impl Dom {
    pub(crate) fn new() -> Self {
        let root = Node {
            parent: None,
            children: Vec::new(),
            node_type: NodeType::Document,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            id_index: HashMap::new(),
        }
    }

    fn create_node(&mut self, parent: Option<NodeId>, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            node_type,
        });
        if let Some(parent_id) = parent {
            self.nodes[parent_id.0].children.push(id);
        }
        id
    }

    pub(crate) fn create_element(
        &mut self,
        parent: NodeId,
        tag_name: String,
        attrs: Vec<(String, String)>,
    ) -> NodeId {
        let element = Element::new(tag_name, attrs);
        let id_attr = element.attr("id").map(ToOwned::to_owned);
        let id = self.create_node(Some(parent), NodeType::Element(element));
        if let Some(id_attr) = id_attr {
            if !id_attr.is_empty() && self.is_connected(id) {
                self.id_index.entry(id_attr).or_insert(id);
            }
        }
        id
    }

    pub(crate) fn create_text(&mut self, parent: NodeId, text: String) -> NodeId {
        self.create_node(Some(parent), NodeType::Text(text))
    }

    pub(crate) fn element(&self, node_id: NodeId) -> Option<&Element> {
        match &self.nodes.get(node_id.0)?.node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn element_mut(&mut self, node_id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(node_id.0)?.node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn tag_name(&self, node_id: NodeId) -> Option<&str> {
        self.element(node_id).map(|e| e.tag_name.as_str())
    }

    pub(crate) fn is_tag(&self, node_id: NodeId, tag: &str) -> bool {
        self.element(node_id)
            .map(|element| element.is_tag(tag))
            .unwrap_or(false)
    }

    pub(crate) fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.nodes.get(node_id.0).and_then(|node| node.parent)
    }

    pub(crate) fn parent_element(&self, node_id: NodeId) -> Option<NodeId> {
        self.parent(node_id)
            .filter(|parent| self.element(*parent).is_some())
    }

    pub(crate) fn by_id(&self, id: &str) -> Option<NodeId> {
        self.id_index.get(id).copied()
    }

    pub(crate) fn text_content(&self, node_id: NodeId) -> String {
        self.descendants(node_id)
            .filter_map(|node| match &self.nodes[node.0].node_type {
                NodeType::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn attr(&self, node_id: NodeId, name: &str) -> Option<String> {
        self.element(node_id)
            .and_then(|e| e.attr(name).map(ToOwned::to_owned))
    }

    pub(crate) fn set_attr(&mut self, node_id: NodeId, name: &str, value: &str) -> Result<()> {
        let lowered = name.to_ascii_lowercase();
        let element = self
            .element_mut(node_id)
            .ok_or_else(|| Error::Script("setAttribute target is not an element".into()))?;
        element.set_attr(&lowered, value);
        match lowered.as_str() {
            "value" => element.value = value.to_string(),
            "disabled" => element.disabled = true,
            _ => {}
        }
        if lowered == "id" {
            self.rebuild_id_index();
        }
        Ok(())
    }

    pub(crate) fn remove_attr(&mut self, node_id: NodeId, name: &str) -> Result<()> {
        let lowered = name.to_ascii_lowercase();
        let element = self
            .element_mut(node_id)
            .ok_or_else(|| Error::Script("removeAttribute target is not an element".into()))?;
        element.remove_attr(&lowered);
        if lowered == "disabled" {
            element.disabled = false;
        }
        if lowered == "id" {
            self.rebuild_id_index();
        }
        Ok(())
    }

    pub(crate) fn value(&self, node_id: NodeId) -> Result<String> {
        let element = self
            .element(node_id)
            .ok_or_else(|| Error::Script("value target is not an element".into()))?;
        Ok(element.value.clone())
    }

    pub(crate) fn disabled(&self, node_id: NodeId) -> bool {
        self.element(node_id).map(|e| e.disabled).unwrap_or(false)
    }

    pub(crate) fn set_disabled(&mut self, node_id: NodeId, disabled: bool) -> Result<()> {
        if disabled {
            self.set_attr(node_id, "disabled", "disabled")
        } else {
            self.remove_attr(node_id, "disabled")
        }
    }

    pub(crate) fn has_class(&self, node_id: NodeId, class_name: &str) -> bool {
        self.element(node_id)
            .map(|element| has_class(element, class_name))
            .unwrap_or(false)
    }

    pub(crate) fn class_add(&mut self, node_id: NodeId, class_name: &str) -> Result<()> {
        self.edit_classes(node_id, |classes| {
            if !classes.iter().any(|name| name == class_name) {
                classes.push(class_name.to_string());
            }
        })
    }

    pub(crate) fn class_remove(&mut self, node_id: NodeId, class_name: &str) -> Result<()> {
        self.edit_classes(node_id, |classes| classes.retain(|name| *name != class_name))
    }

    // Rewrites the class attribute from its token list; an empty list drops it.
    fn edit_classes(&mut self, node_id: NodeId, edit: impl FnOnce(&mut Vec<String>)) -> Result<()> {
        let element = self
            .element_mut(node_id)
            .ok_or_else(|| Error::Script("classList target is not an element".into()))?;
        let mut classes: Vec<String> = element
            .attr("class")
            .unwrap_or_default()
            .split_whitespace()
            .map(ToOwned::to_owned)
            .collect();
        edit(&mut classes);
        if classes.is_empty() {
            element.remove_attr("class");
        } else {
            element.set_attr("class", &classes.join(" "));
        }
        Ok(())
    }

    pub(crate) fn initialize_form_control_values(&mut self) -> Result<()> {
        for node in self.all_element_nodes() {
            if self.is_tag(node, "select") {
                self.sync_select_value(node)?;
            }
        }
        Ok(())
    }

    /// Picks the option whose value equals `requested`, or none at all.
    pub(crate) fn set_select_value(&mut self, select_node: NodeId, requested: &str) -> Result<()> {
        if !self.is_tag(select_node, "select") {
            return Err(Error::Script("set value target is not a select".into()));
        }
        let options = self.select_options(select_node);
        let chosen = options.iter().position(|(_, value)| value == requested);
        for (index, (option, _)) in options.iter().enumerate() {
            if let Some(element) = self.element_mut(*option) {
                if Some(index) == chosen {
                    element.set_attr("selected", "selected");
                } else {
                    element.remove_attr("selected");
                }
            }
        }
        let value = chosen.map(|index| options[index].1.clone());
        self.store_select_value(select_node, value.unwrap_or_default())
    }

    // A select shows its first `selected` option, else its first option.
    fn sync_select_value(&mut self, select_node: NodeId) -> Result<()> {
        let options = self.select_options(select_node);
        let value = options
            .iter()
            .find(|(option, _)| self.attr(*option, "selected").is_some())
            .or_else(|| options.first())
            .map(|(_, value)| value.clone());
        self.store_select_value(select_node, value.unwrap_or_default())
    }

    fn store_select_value(&mut self, select_node: NodeId, value: String) -> Result<()> {
        let element = self
            .element_mut(select_node)
            .ok_or_else(|| Error::Script("select target is not an element".into()))?;
        element.value = value;
        Ok(())
    }

    pub(crate) fn has_option_value(&self, select_node: NodeId, value: &str) -> bool {
        self.select_options(select_node)
            .iter()
            .any(|(_, option_value)| option_value == value)
    }

    /// Descendant options paired with their effective values. Without a
    /// `value` attribute an option's value is its text with whitespace
    /// stripped and collapsed.
    fn select_options(&self, select_node: NodeId) -> Vec<(NodeId, String)> {
        self.descendants(select_node)
            .skip(1)
            .filter_map(|node| {
                let element = self.element(node).filter(|element| element.is_tag("option"))?;
                let value = match element.attr("value") {
                    Some(value) => value.to_string(),
                    None => self
                        .text_content(node)
                        .split_ascii_whitespace()
                        .collect::<Vec<_>>()
                        .join(" "),
                };
                Some((node, value))
            })
            .collect()
    }

    pub(crate) fn append_element(
        &mut self,
        parent: NodeId,
        tag_name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<NodeId> {
        if !self.can_have_children(parent) {
            return Err(Error::Script(
                "appendChild target cannot have children".into(),
            ));
        }
        let attrs = attrs
            .iter()
            .map(|(key, value)| (key.to_ascii_lowercase(), (*value).to_string()))
            .collect();
        Ok(self.create_element(parent, tag_name.to_ascii_lowercase(), attrs))
    }

    pub(crate) fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId> {
        if !self.can_have_children(parent) {
            return Err(Error::Script(
                "appendChild target cannot have children".into(),
            ));
        }
        Ok(self.create_text(parent, text.to_string()))
    }

    pub(crate) fn remove_node(&mut self, node: NodeId) -> Result<()> {
        if node == self.root {
            return Err(Error::Script("cannot remove document root".into()));
        }
        let Some(parent) = self.parent(node) else {
            return Ok(());
        };
        self.nodes[parent.0].children.retain(|id| *id != node);
        self.nodes[node.0].parent = None;
        self.rebuild_id_index();
        Ok(())
    }

    pub(crate) fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        let all = self.query_selector_all(selector)?;
        Ok(all.into_iter().next())
    }

    /// Matching elements in document order.
    pub(crate) fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        let selector = Selector::parse(selector)?;
        if let Some(id) = selector.id_only() {
            return Ok(self.by_id(id).into_iter().collect());
        }
        Ok(self
            .all_element_nodes()
            .into_iter()
            .filter(|node| selector.matches(self, *node))
            .collect())
    }

    pub(crate) fn closest_by_tag(&self, node_id: NodeId, tag: &str) -> Option<NodeId> {
        self.ancestors(node_id).find(|node| self.is_tag(*node, tag))
    }

    fn can_have_children(&self, node_id: NodeId) -> bool {
        matches!(
            self.nodes.get(node_id.0).map(|n| &n.node_type),
            Some(NodeType::Document | NodeType::Element(_))
        )
    }

    pub(crate) fn is_connected(&self, node_id: NodeId) -> bool {
        self.ancestors(node_id).any(|node| node == self.root)
    }

    /// `node_id` followed by its parent chain.
    pub(crate) fn ancestors(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(node_id), |node| self.parent(*node))
    }

    /// `node_id` and everything below it, in document order.
    pub(crate) fn descendants(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut pending = vec![node_id];
        std::iter::from_fn(move || {
            let node = pending.pop()?;
            pending.extend(self.nodes[node.0].children.iter().rev().copied());
            Some(node)
        })
    }

    pub(crate) fn all_element_nodes(&self) -> Vec<NodeId> {
        self.descendants(self.root)
            .filter(|node| self.element(*node).is_some())
            .collect()
    }

    // The first connected element carrying an id owns it.
    pub(crate) fn rebuild_id_index(&mut self) {
        let mut index = HashMap::new();
        for node in self.descendants(self.root) {
            if let Some(id) = self.element(node).and_then(|element| element.attr("id")) {
                if !id.is_empty() {
                    index.entry(id.to_string()).or_insert(node);
                }
            }
        }
        self.id_index = index;
    }

    /// Serializes a subtree back to markup.
    pub(crate) fn dump_node(&self, node_id: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(node_id, &mut out);
        out
    }

    fn write_markup(&self, node_id: NodeId, out: &mut String) {
        let node = &self.nodes[node_id.0];
        let element = match &node.node_type {
            NodeType::Text(text) => {
                out.push_str(&escape_html_text(text));
                return;
            }
            NodeType::Document => None,
            NodeType::Element(element) => Some(element),
        };
        if let Some(element) = element {
            out.push('<');
            out.push_str(&element.tag_name);
            for (name, value) in &element.attrs {
                out.push_str(&format!(" {name}=\"{}\"", escape_html_attr(value)));
            }
            out.push('>');
        }
        for child in &node.children {
            self.write_markup(*child, out);
        }
        if let Some(element) = element {
            out.push_str(&format!("</{}>", element.tag_name));
        }
    }
}

pub(crate) fn has_class(element: &Element, class_name: &str) -> bool {
    element
        .attr("class")
        .map(|classes| classes.split_whitespace().any(|c| c == class_name))
        .unwrap_or(false)
}

fn escape_html_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_html_attr(value: &str) -> String {
    escape_html_text(value).replace('"', "&quot;")
}
