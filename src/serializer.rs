//! Serializes a [`MeiTree`] back to MEI XML bytes.
//!
//! The teacher only ever drives `quick_xml::se::to_string` over its own
//! statically-typed MusicXML structs (`xml_ser.rs`). Our tree is
//! untyped, so we drive `quick_xml::Writer`'s event API directly,
//! walking the arena in document order and preserving attribute order
//! and inter-element text exactly as stored.

use crate::error::Result;
use crate::tree::{MeiTree, NodeId, NodeKind};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

pub fn to_xml_bytes(tree: &MeiTree) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    if let Some(decl) = tree.xml_decl() {
        writer.write_event(Event::Decl(BytesDecl::new(
            &decl.version,
            decl.encoding.as_deref(),
            decl.standalone.as_deref(),
        )))?;
    }

    write_node(&mut writer, tree, tree.root(), true)?;

    Ok(writer.into_inner().into_inner())
}

fn write_node<W: std::io::Write>(
    writer: &mut Writer<W>,
    tree: &MeiTree,
    id: NodeId,
    is_root: bool,
) -> Result<()> {
    match &tree.get(id).kind {
        NodeKind::Text(text) => {
            writer.write_event(Event::Text(BytesText::new(text)))?;
            Ok(())
        }
        NodeKind::Element { name, attrs, children, .. } => {
            let mut start = BytesStart::new(name.as_str());
            if is_root {
                for (prefix, uri) in tree.namespaces() {
                    let key = match prefix {
                        Some(p) => format!("xmlns:{p}"),
                        None => "xmlns".to_string(),
                    };
                    start.push_attribute((key.as_str(), uri.as_str()));
                }
            }
            for (key, value) in attrs {
                start.push_attribute((key.as_str(), value.as_str()));
            }

            if children.is_empty() {
                writer.write_event(Event::Empty(start))?;
            } else {
                writer.write_event(Event::Start(start))?;
                for &child in children {
                    write_node(writer, tree, child, false)?;
                }
                writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_document() {
        let src = r#"<?xml version="1.0" encoding="UTF-8"?>
<mei xmlns="http://www.music-encoding.org/ns/mei"><music><body n="1"/></music></mei>"#;
        let tree = MeiTree::parse(src.as_bytes()).unwrap();
        let out = tree.serialize().unwrap();
        let out_str = String::from_utf8(out).unwrap();
        assert!(out_str.contains("<music>"));
        assert!(out_str.contains(r#"<body n="1"/>"#));
    }
}
