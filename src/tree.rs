//! An owned, mutable arena representation of an MEI XML document.
//!
//! `roxmltree` gives us a fast, read-only DOM over the input bytes; we
//! walk it once to build our own arena (`MeiTree`) that the rest of the
//! crate can mutate freely. Nodes are never physically freed mid-slice:
//! `detach`/`remove_subtree` unlink a node from its parent but leave it
//! in the arena, so any stale `NodeId` still held by a mark-set or
//! spanner table resolves (it just won't show up in a fresh traversal).

use crate::error::{Error, Result};
use std::collections::HashMap;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone)]
pub enum NodeKind {
    Element {
        name: String,
        /// Ordered key -> value attribute list; order matters for round-trip.
        attrs: Vec<(String, String)>,
        children: Vec<NodeId>,
        /// Stable identifier: author `xml:id`, or a synthesized one.
        id: String,
    },
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone)]
pub struct XmlDecl {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

/// An owned MEI document tree. Exclusively owned by a single `slice`
/// call (see spec §5); never shared between concurrent slices.
pub struct MeiTree {
    arena: Vec<Node>,
    root: NodeId,
    id_index: HashMap<String, NodeId>,
    next_gen_id: u32,
    /// Namespace declarations captured from the original root element,
    /// re-emitted on whichever element ends up as the serialized root.
    namespaces: Vec<(Option<String>, String)>,
    xml_decl: Option<XmlDecl>,
}

impl MeiTree {
    pub fn parse(bytes: &[u8]) -> Result<MeiTree> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::MalformedMei(format!("input is not valid UTF-8: {e}")))?;
        let doc = roxmltree::Document::parse(text)?;

        let mut tree = MeiTree {
            arena: Vec::new(),
            root: NodeId(0),
            id_index: HashMap::new(),
            next_gen_id: 0,
            namespaces: Vec::new(),
            xml_decl: None,
        };

        if let Some(version) = text.strip_prefix("<?xml") {
            let _ = version;
            tree.xml_decl = Some(XmlDecl {
                version: "1.0".to_string(),
                encoding: Some("UTF-8".to_string()),
                standalone: None,
            });
        }

        let root_elem = doc.root_element();
        for ns in root_elem.namespaces() {
            tree.namespaces
                .push((ns.name().map(|s| s.to_string()), ns.uri().to_string()));
        }

        let root_id = tree.build_from_roxml(root_elem, None);
        tree.root = root_id;
        tree.reindex_ids();
        Ok(tree)
    }

    fn build_from_roxml(&mut self, node: roxmltree::Node, parent: Option<NodeId>) -> NodeId {
        if node.is_text() {
            let text = node.text().unwrap_or("").to_string();
            let id = NodeId(self.arena.len() as u32);
            self.arena.push(Node {
                parent,
                kind: NodeKind::Text(text),
            });
            return id;
        }

        let name = node.tag_name().name().to_string();
        let mut attrs = Vec::new();
        for attr in node.attributes() {
            attrs.push((self.qualified_attr_name(node, attr), attr.value().to_string()));
        }
        let elem_id = attrs
            .iter()
            .find(|(k, _)| k == "xml:id")
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.synth_id());

        let id = NodeId(self.arena.len() as u32);
        self.arena.push(Node {
            parent,
            kind: NodeKind::Element {
                name,
                attrs,
                children: Vec::new(),
                id: elem_id,
            },
        });

        let mut children = Vec::new();
        for child in node.children() {
            if child.is_element() || (child.is_text() && child.text().is_some()) {
                children.push(self.build_from_roxml(child, Some(id)));
            }
        }
        if let NodeKind::Element { children: c, .. } = &mut self.arena[id.0 as usize].kind {
            *c = children;
        }
        id
    }

    fn qualified_attr_name(&self, node: roxmltree::Node, attr: &roxmltree::Attribute) -> String {
        match attr.namespace() {
            Some(ns) if ns == XML_NS => format!("xml:{}", attr.name()),
            Some(ns) => match node.lookup_prefix(ns) {
                Some(prefix) if !prefix.is_empty() => format!("{prefix}:{}", attr.name()),
                _ => attr.name().to_string(),
            },
            None => attr.name().to_string(),
        }
    }

    fn synth_id(&mut self) -> String {
        let id = format!("__gen{}", self.next_gen_id);
        self.next_gen_id += 1;
        id
    }

    fn reindex_ids(&mut self) {
        self.id_index.clear();
        let order = self.document_order();
        for nid in order {
            if let NodeKind::Element { id, .. } = &self.arena[nid.0 as usize].kind {
                self.id_index.insert(id.clone(), nid);
            }
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = id;
        self.arena[id.0 as usize].parent = None;
    }

    pub fn namespaces(&self) -> &[(Option<String>, String)] {
        &self.namespaces
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.arena[id.0 as usize]
    }

    fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.arena[id.0 as usize]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena[id.0 as usize].parent
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.arena[id.0 as usize].kind {
            NodeKind::Element { name, .. } => Some(name.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn is_named(&self, id: NodeId, name: &str) -> bool {
        self.name(id) == Some(name)
    }

    pub fn element_id(&self, id: NodeId) -> Option<&str> {
        match &self.arena[id.0 as usize].kind {
            NodeKind::Element { id, .. } => Some(id.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        match &self.arena[id.0 as usize].kind {
            NodeKind::Element { attrs, .. } => {
                attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
            }
            NodeKind::Text(_) => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, key: &str, value: impl Into<String>) {
        if let NodeKind::Element { attrs, .. } = &mut self.get_mut(id).kind {
            let value = value.into();
            if let Some(existing) = attrs.iter_mut().find(|(k, _)| k == key) {
                existing.1 = value;
            } else {
                attrs.push((key.to_string(), value));
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, key: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.get_mut(id).kind {
            attrs.retain(|(k, _)| k != key);
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.arena[id.0 as usize].kind {
            NodeKind::Element { children, .. } => children.as_slice(),
            NodeKind::Text(_) => &[],
        }
    }

    /// All element children named `name`, in document order.
    pub fn element_children<'a>(&'a self, id: NodeId, name: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .iter()
            .copied()
            .filter(move |c| self.is_named(*c, name))
    }

    /// Pre-order descendants of `id`, not including `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_descendants(id, &mut out);
        out
    }

    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in self.children(id) {
            out.push(child);
            self.collect_descendants(child, out);
        }
    }

    /// Element descendants (any depth) named `name`, in document order.
    pub fn descendants_by_name(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|d| self.is_named(*d, name))
            .collect()
    }

    /// Full pre-order traversal from the tree root, including the root.
    pub fn document_order(&self) -> Vec<NodeId> {
        let mut out = vec![self.root];
        self.collect_descendants(self.root, &mut out);
        out
    }

    pub fn document_position(&self, id: NodeId) -> Option<usize> {
        self.document_order().into_iter().position(|n| n == id)
    }

    pub fn by_id(&self, id_str: &str) -> Option<NodeId> {
        self.id_index.get(id_str).copied()
    }

    /// The nearest ancestor (not including `id` itself) named `name`.
    pub fn ancestor_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        let mut cur = self.parent(id)?;
        loop {
            if self.is_named(cur, name) {
                return Some(cur);
            }
            cur = self.parent(cur)?;
        }
    }

    /// Siblings of `id` (including `id`) under its parent, in document order.
    pub fn peers(&self, id: NodeId) -> Vec<NodeId> {
        match self.parent(id) {
            Some(p) => self.children(p).to_vec(),
            None => vec![id],
        }
    }

    pub fn position_among_peers(&self, id: NodeId) -> Option<usize> {
        self.peers(id).into_iter().position(|n| n == id)
    }

    pub fn new_text(&mut self, text: impl Into<String>) -> NodeId {
        let id = NodeId(self.arena.len() as u32);
        self.arena.push(Node {
            parent: None,
            kind: NodeKind::Text(text.into()),
        });
        id
    }

    pub fn new_element(&mut self, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.arena.len() as u32);
        let synth = self.synth_id();
        self.arena.push(Node {
            parent: None,
            kind: NodeKind::Element {
                name: name.into(),
                attrs: Vec::new(),
                children: Vec::new(),
                id: synth.clone(),
            },
        });
        self.id_index.insert(synth, id);
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        if let NodeKind::Element { children, .. } = &mut self.get_mut(parent).kind {
            children.push(child);
        }
        self.get_mut(child).parent = Some(parent);
    }

    /// Detach `id` from its parent's child list. The node stays in the
    /// arena (per spec §9: never delete mid-slice, mark as detached).
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            if let NodeKind::Element { children, .. } = &mut self.get_mut(parent).kind {
                children.retain(|c| *c != id);
            }
        }
        self.get_mut(id).parent = None;
    }

    /// Detach `id` and drop it (and its id-index entries) from view.
    pub fn remove_subtree(&mut self, id: NodeId) {
        let descendants = self.descendants(id);
        self.detach(id);
        for d in std::iter::once(id).chain(descendants) {
            if let NodeKind::Element { id: elem_id, .. } = &self.arena[d.0 as usize].kind {
                self.id_index.remove(elem_id);
            }
        }
    }

    /// Replace `old` with `new` in-place among `old`'s former parent's children.
    pub fn replace_child(&mut self, old: NodeId, new: NodeId) {
        let parent = match self.parent(old) {
            Some(p) => p,
            None => return,
        };
        self.detach(new);
        if let NodeKind::Element { children, .. } = &mut self.get_mut(parent).kind {
            if let Some(slot) = children.iter_mut().find(|c| **c == old) {
                *slot = new;
            }
        }
        self.get_mut(old).parent = None;
        self.get_mut(new).parent = Some(parent);
    }

    /// Move `id` to become the last child of `new_parent`.
    pub fn move_to(&mut self, id: NodeId, new_parent: NodeId) {
        self.append_child(new_parent, id);
    }

    /// Insert `new_node` immediately before `sibling` among its parent's
    /// children. No-op if `sibling` is the document root.
    pub fn insert_before(&mut self, sibling: NodeId, new_node: NodeId) {
        let Some(parent) = self.parent(sibling) else {
            return;
        };
        self.detach(new_node);
        if let NodeKind::Element { children, .. } = &mut self.get_mut(parent).kind {
            let pos = children.iter().position(|c| *c == sibling).unwrap_or(children.len());
            children.insert(pos, new_node);
        }
        self.get_mut(new_node).parent = Some(parent);
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        crate::serializer::to_xml_bytes(self)
    }

    pub(crate) fn arena_len(&self) -> usize {
        self.arena.len()
    }

    pub(crate) fn xml_decl(&self) -> Option<&XmlDecl> {
        self.xml_decl.as_ref()
    }
}
