//! Arena-backed XML tree for document parts
//!
//! Parts are parsed with `quick-xml` into a flat node arena where every node
//! records its parent and children by index. Structural edits (detach, insert,
//! replace, deep clone) are index operations, so upward walks never need
//! aliased parent pointers. Detached nodes stay in the arena until the tree is
//! dropped; they are simply unreachable from the document node.

use crate::error::{Result, TemplateError};
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Index of a node inside an [`XmlTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Element name and attributes, in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name (`prefix:local`)
    pub name: String,
    /// Attributes as (qualified name, unescaped value)
    pub attributes: Vec<(String, String)>,
}

/// Node payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Synthetic document node holding the prolog and the root element
    Document,
    /// Element
    Element(Element),
    /// Character data (unescaped)
    Text(String),
    /// CDATA section content
    CData(String),
    /// Comment content
    Comment(String),
    /// Processing instruction content
    ProcessingInstruction(String),
    /// Document type declaration content
    DocType(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Parsed XML part
#[derive(Debug, Clone)]
pub struct XmlTree {
    nodes: Vec<Node>,
    document: NodeId,
    has_declaration: bool,
}

impl Default for XmlTree {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlTree {
    /// Create an empty tree holding only the document node
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            document: NodeId(0),
            has_declaration: false,
        }
    }

    /// Parse a complete XML document
    ///
    /// # Errors
    ///
    /// Returns an error if the XML is malformed or tags are unbalanced.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut tree = Self::new();
        let document = tree.document;
        tree.parse_into(xml, document)?;
        if tree.root_element().is_none() {
            return Err(TemplateError::TemplateFormatInvalid(
                "XML part has no root element".to_string(),
            ));
        }
        Ok(tree)
    }

    /// Parse a markup fragment into this arena and return its top-level
    /// element, detached
    ///
    /// # Errors
    ///
    /// Returns an error if the fragment is malformed or has no element.
    pub fn parse_fragment(&mut self, xml: &str) -> Result<NodeId> {
        let holder = self.push(NodeKind::Document);
        self.parse_into(xml, holder)?;
        let element = self.nodes[holder.0]
            .children
            .iter()
            .copied()
            .find(|&c| self.element(c).is_some())
            .ok_or_else(|| {
                TemplateError::TemplateFormatInvalid(format!("fragment has no element: {xml}"))
            })?;
        self.detach(element);
        Ok(element)
    }

    fn parse_into(&mut self, xml: &str, holder: NodeId) -> Result<()> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(false);

        let mut stack = vec![holder];
        let mut buf = Vec::new();
        loop {
            let parent = *stack.last().unwrap_or(&holder);
            match reader.read_event_into(&mut buf)? {
                Event::Decl(_) => self.has_declaration = true,
                Event::Start(e) => {
                    let element = Self::element_from(&e)?;
                    let id = self.push(NodeKind::Element(element));
                    self.append_child(parent, id);
                    stack.push(id);
                }
                Event::Empty(e) => {
                    let element = Self::element_from(&e)?;
                    let id = self.push(NodeKind::Element(element));
                    self.append_child(parent, id);
                }
                Event::End(_) => {
                    if stack.len() <= 1 {
                        return Err(TemplateError::TemplateFormatInvalid(
                            "unbalanced end tag".to_string(),
                        ));
                    }
                    stack.pop();
                }
                Event::Text(e) => {
                    let text = e.unescape()?.into_owned();
                    let id = self.push(NodeKind::Text(text));
                    self.append_child(parent, id);
                }
                Event::CData(e) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    let id = self.push(NodeKind::CData(text));
                    self.append_child(parent, id);
                }
                Event::Comment(e) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    let id = self.push(NodeKind::Comment(text));
                    self.append_child(parent, id);
                }
                Event::PI(e) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    let id = self.push(NodeKind::ProcessingInstruction(text));
                    self.append_child(parent, id);
                }
                Event::DocType(e) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    let id = self.push(NodeKind::DocType(text));
                    self.append_child(parent, id);
                }
                Event::Eof => break,
            }
            buf.clear();
        }

        if stack.len() != 1 {
            return Err(TemplateError::TemplateFormatInvalid(
                "unclosed element at end of part".to_string(),
            ));
        }
        Ok(())
    }

    fn element_from(e: &quick_xml::events::BytesStart<'_>) -> Result<Element> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Element { name, attributes })
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Serialize the tree back to XML text
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        if self.has_declaration {
            out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        }
        for &child in &self.nodes[self.document.0].children {
            self.write_node(child, &mut out);
        }
        out
    }

    /// Serialize a single node and its subtree
    #[must_use]
    pub fn node_to_xml(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        // (node, closing) pairs; closing entries emit the end tag
        let mut stack = vec![(id, false)];
        while let Some((id, closing)) = stack.pop() {
            let node = &self.nodes[id.0];
            match &node.kind {
                NodeKind::Element(element) if closing => {
                    out.push_str("</");
                    out.push_str(&element.name);
                    out.push('>');
                }
                NodeKind::Element(element) => {
                    out.push('<');
                    out.push_str(&element.name);
                    for (key, value) in &element.attributes {
                        out.push(' ');
                        out.push_str(key);
                        out.push_str("=\"");
                        out.push_str(&escape(value.as_str()));
                        out.push('"');
                    }
                    if node.children.is_empty() {
                        out.push_str("/>");
                    } else {
                        out.push('>');
                        stack.push((id, true));
                        for &child in node.children.iter().rev() {
                            stack.push((child, false));
                        }
                    }
                }
                NodeKind::Text(text) => out.push_str(&partial_escape(text.as_str())),
                NodeKind::CData(text) => {
                    out.push_str("<![CDATA[");
                    out.push_str(text);
                    out.push_str("]]>");
                }
                NodeKind::Comment(text) => {
                    out.push_str("<!--");
                    out.push_str(text);
                    out.push_str("-->");
                }
                NodeKind::ProcessingInstruction(text) => {
                    out.push_str("<?");
                    out.push_str(text);
                    out.push_str("?>");
                }
                NodeKind::DocType(text) => {
                    out.push_str("<!DOCTYPE ");
                    out.push_str(text);
                    out.push('>');
                }
                NodeKind::Document => {
                    for &child in node.children.iter().rev() {
                        stack.push((child, false));
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// The synthetic document node
    #[inline]
    #[must_use]
    pub const fn document(&self) -> NodeId {
        self.document
    }

    /// The root element, if the tree has one
    #[must_use]
    pub fn root_element(&self) -> Option<NodeId> {
        self.nodes[self.document.0]
            .children
            .iter()
            .copied()
            .find(|&c| self.element(c).is_some())
    }

    /// Node payload
    #[inline]
    #[must_use]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    /// Element payload, if `id` is an element
    #[inline]
    #[must_use]
    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Qualified element name, if `id` is an element
    #[inline]
    #[must_use]
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.name.as_str())
    }

    /// Whether `id` is an element named `name`
    #[inline]
    #[must_use]
    pub fn is_named(&self, id: NodeId, name: &str) -> bool {
        self.name(id) == Some(name)
    }

    /// Whether `id` is an element whose name is in `names`
    #[inline]
    #[must_use]
    pub fn is_any_of(&self, id: NodeId, names: &[&str]) -> bool {
        self.name(id).is_some_and(|n| names.contains(&n))
    }

    /// Attribute value
    #[must_use]
    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        self.element(id).and_then(|e| {
            e.attributes
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        })
    }

    /// Set or replace an attribute (no-op on non-elements)
    pub fn set_attr(&mut self, id: NodeId, key: &str, value: &str) {
        if let NodeKind::Element(e) = &mut self.nodes[id.0].kind {
            if let Some(slot) = e.attributes.iter_mut().find(|(k, _)| k == key) {
                slot.1 = value.to_string();
            } else {
                e.attributes.push((key.to_string(), value.to_string()));
            }
        }
    }

    /// Remove an attribute if present
    pub fn remove_attr(&mut self, id: NodeId, key: &str) {
        if let NodeKind::Element(e) = &mut self.nodes[id.0].kind {
            e.attributes.retain(|(k, _)| k != key);
        }
    }

    /// Parent node
    #[inline]
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Children in document order
    #[inline]
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Element children in document order
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|&c| self.element(c).is_some())
    }

    /// First child element named `name`
    #[must_use]
    pub fn first_child_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.child_elements(id).find(|&c| self.is_named(c, name))
    }

    /// Position of `id` among its parent's children
    #[must_use]
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.nodes[parent.0].children.iter().position(|&c| c == id)
    }

    /// Preceding sibling
    #[must_use]
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let idx = self.index_in_parent(id)?;
        idx.checked_sub(1).map(|i| self.nodes[parent.0].children[i])
    }

    /// Following sibling
    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let idx = self.index_in_parent(id)?;
        self.nodes[parent.0].children.get(idx + 1).copied()
    }

    /// Ancestors from the parent upward (document node last)
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&n| self.parent(n))
    }

    /// Nearest ancestor-or-self element named in `names`
    #[must_use]
    pub fn closest(&self, id: NodeId, names: &[&str]) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|&n| self.is_any_of(n, names))
    }

    /// Whether `id` is still reachable from the document node
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.document || self.ancestors(id).any(|a| a == self.document)
    }

    /// Pre-order list of `id` and all its descendants
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            for &child in self.nodes[n.0].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Descendant elements named `name`, pre-order, excluding `id` itself
    #[must_use]
    pub fn descendants_named(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .skip(1)
            .filter(|&n| self.is_named(n, name))
            .collect()
    }

    /// Concatenated character data of the subtree
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut text = String::new();
        for n in self.descendants(id) {
            match &self.nodes[n.0].kind {
                NodeKind::Text(t) | NodeKind::CData(t) => text.push_str(t),
                _ => {}
            }
        }
        text
    }

    /// Replace all children of `id` with a single text node
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        for child in self.nodes[id.0].children.clone() {
            self.detach(child);
        }
        let t = self.new_text(text);
        self.append_child(id, t);
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Create a detached element
    pub fn new_element(&mut self, name: &str) -> NodeId {
        self.push(NodeKind::Element(Element {
            name: name.to_string(),
            attributes: Vec::new(),
        }))
    }

    /// Create a detached element with attributes
    pub fn new_element_with(&mut self, name: &str, attributes: &[(&str, &str)]) -> NodeId {
        self.push(NodeKind::Element(Element {
            name: name.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }))
    }

    /// Create a detached text node
    pub fn new_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    /// Append `child` as the last child of `parent`, detaching it first
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert `child` as the first child of `parent`, detaching it first
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(0, child);
    }

    /// Insert `node` immediately before `reference` (no-op if `reference` is detached)
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) {
        self.detach(node);
        let Some(parent) = self.parent(reference) else {
            return;
        };
        let Some(idx) = self.index_in_parent(reference) else {
            return;
        };
        self.nodes[node.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(idx, node);
    }

    /// Insert `node` immediately after `reference` (no-op if `reference` is detached)
    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        self.detach(node);
        let Some(parent) = self.parent(reference) else {
            return;
        };
        let Some(idx) = self.index_in_parent(reference) else {
            return;
        };
        self.nodes[node.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(idx + 1, node);
    }

    /// Detach `id` from its parent; the subtree stays intact but unreachable
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Put `replacement` where `old` is and detach `old`
    pub fn replace(&mut self, old: NodeId, replacement: NodeId) {
        self.insert_before(old, replacement);
        self.detach(old);
    }

    /// Copy the subtree rooted at `id`; the copy is detached
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let root = self.push(self.nodes[id.0].kind.clone());
        let mut stack = vec![(id, root)];
        while let Some((src, dst)) = stack.pop() {
            let children = self.nodes[src.0].children.clone();
            for child in children {
                let copy = self.push(self.nodes[child.0].kind.clone());
                self.nodes[copy.0].parent = Some(dst);
                self.nodes[dst.0].children.push(copy);
                stack.push((child, copy));
            }
        }
        root
    }

    /// Mutable text payload of a text node
    pub fn text_mut(&mut self, id: NodeId) -> Option<&mut String> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Text(t) | NodeKind::CData(t) => Some(t),
            _ => None,
        }
    }
}
