//! Walks an [`MeiTree`] once to derive the facts the expression parser
//! needs: measure count/labels, and the staff-layout and meter maps
//! keyed by "measure index at which the value starts".
//!
//! Ported from `original_source/Omas/omas/meiinfo.py::MusDocInfo`.

use crate::error::{Error, Result};
use crate::tree::{MeiTree, NodeId, NodeKind};
use log::{debug, trace};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterInfo {
    pub count: u32,
    pub unit: u32,
}

#[derive(Debug, Clone)]
pub struct DocInfo {
    pub measure_count: u32,
    pub measure_labels: Vec<String>,
    pub staves: BTreeMap<u32, Vec<String>>,
    pub beats: BTreeMap<u32, MeterInfo>,
}

impl DocInfo {
    /// The staff layout active at (i.e. most recently declared at or
    /// before) 0-based measure index `measure_idx`.
    pub fn staves_at(&self, measure_idx: u32) -> Option<&[String]> {
        self.staves
            .range(..=measure_idx)
            .next_back()
            .map(|(_, v)| v.as_slice())
    }

    /// The meter active at 0-based measure index `measure_idx`.
    pub fn meter_at(&self, measure_idx: u32) -> Option<MeterInfo> {
        self.beats.range(..=measure_idx).next_back().map(|(_, v)| *v)
    }
}

pub fn compute(tree: &MeiTree) -> Result<DocInfo> {
    let music_elems = tree.descendants_by_name(tree.root(), "music");
    let music = match music_elems.as_slice() {
        [one] => *one,
        [] => {
            return Err(Error::MalformedMei(
                "document has no <music> element".to_string(),
            ))
        }
        _ => {
            return Err(Error::MalformedMei(
                "document has more than one <music> element".to_string(),
            ))
        }
    };

    let measures = tree.descendants_by_name(music, "measure");
    let measure_labels = measures
        .iter()
        .map(|m| tree.attr(*m, "n").unwrap_or("").to_string())
        .collect();
    debug!("docinfo: {} measures found", measures.len());

    let mut staves: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    let mut beats: BTreeMap<u32, MeterInfo> = BTreeMap::new();

    for sd in tree.descendants_by_name(music, "scoreDef") {
        let m_pos = measure_pos_after(tree, sd, &measures).ok_or_else(|| {
            Error::MalformedMei(
                "could not locate measure after new score definition (scoreDef)".to_string(),
            )
        })?;

        if let (Some(count), Some(unit)) = (tree.attr(sd, "meter.count"), tree.attr(sd, "meter.unit"))
        {
            beats.insert(
                m_pos as u32,
                MeterInfo {
                    count: count.parse()?,
                    unit: unit.parse()?,
                },
            );
        } else {
            let meter_sigs = tree.descendants_by_name(sd, "meterSig");
            if meter_sigs.len() > 1 {
                return Err(Error::UnsupportedEncoding(
                    "mixed meter within a single scoreDef is not supported".to_string(),
                ));
            }
            if let Some(sig) = meter_sigs.first() {
                let count = tree.attr(*sig, "count");
                let unit = tree.attr(*sig, "unit");
                match (count, unit) {
                    (Some(c), Some(u)) => {
                        beats.insert(
                            m_pos as u32,
                            MeterInfo {
                                count: c.parse()?,
                                unit: u.parse()?,
                            },
                        );
                    }
                    _ => {
                        return Err(Error::MalformedMei(
                            "could not locate meter to compute beats".to_string(),
                        ))
                    }
                }
            }
        }

        if !tree.descendants_by_name(sd, "staffGrp").is_empty() {
            let labels: Vec<String> = tree
                .descendants_by_name(sd, "staffDef")
                .into_iter()
                .map(|sdef| staff_label(tree, sdef))
                .collect();
            trace!("scoreDef at measure {m_pos} declares staff layout {labels:?}");
            staves.insert(m_pos as u32, labels);
        }
    }

    if staves.keys().next().copied() != Some(0) || beats.keys().next().copied() != Some(0) {
        return Err(Error::MalformedMei(
            "document has no initial staff layout and meter at measure 0".to_string(),
        ));
    }

    Ok(DocInfo {
        measure_count: measures.len() as u32,
        measure_labels,
        staves,
        beats,
    })
}

/// The 0-based position (within `measures`) of the nearest element at
/// or after `sd` among its peers that is, or contains, a `<measure>`.
fn measure_pos_after(tree: &MeiTree, sd: NodeId, measures: &[NodeId]) -> Option<usize> {
    let peers = tree.peers(sd);
    let idx = tree.position_among_peers(sd)?;

    for peer in &peers[idx + 1..] {
        if tree.is_named(*peer, "measure") {
            return measures.iter().position(|m| m == peer);
        }
        let descendant_measures = tree.descendants_by_name(*peer, "measure");
        if let Some(first) = descendant_measures.first() {
            return measures.iter().position(|m| m == first);
        }
    }
    None
}

fn staff_label(tree: &MeiTree, staff_def: NodeId) -> String {
    if let Some(v) = tree.attr(staff_def, "label") {
        return v.to_string();
    }

    let label_children: Vec<NodeId> = tree.element_children(staff_def, "label").collect();
    if !label_children.is_empty() {
        let mut parts = Vec::new();
        for lc in &label_children {
            for node in std::iter::once(*lc).chain(tree.descendants(*lc)) {
                if let NodeKind::Text(text) = &tree.get(node).kind {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        parts.push(normalize_space(trimmed));
                    }
                }
            }
        }
        if !parts.is_empty() {
            return parts.join(" ");
        }
    }

    if let Some(v) = tree.attr(staff_def, "label.abbr") {
        return v.to_string();
    }

    String::new()
}

fn normalize_space(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mei xmlns="http://www.music-encoding.org/ns/mei">
  <music>
    <body><mdiv><score>
      <scoreDef meter.count="4" meter.unit="4">
        <staffGrp>
          <staffDef n="1" label="Superius"/>
          <staffDef n="2"><label>Contra<lb/>tenor</label></staffDef>
        </staffGrp>
      </scoreDef>
      <section>
        <measure n="1" xml:id="m1">
          <staff n="1"><layer/></staff>
          <staff n="2"><layer/></staff>
        </measure>
        <measure n="2" xml:id="m2">
          <staff n="1"><layer/></staff>
          <staff n="2"><layer/></staff>
        </measure>
      </section>
    </score></mdiv></body>
  </music>
</mei>"#;

    #[test]
    fn computes_basic_doc_info() {
        let tree = MeiTree::parse(MEI.as_bytes()).unwrap();
        let info = compute(&tree).unwrap();
        assert_eq!(info.measure_count, 2);
        assert_eq!(info.measure_labels, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(info.beats[&0], MeterInfo { count: 4, unit: 4 });
        assert_eq!(info.staves[&0], vec!["Superius".to_string(), "Contra tenor".to_string()]);
    }

    #[test]
    fn rejects_missing_music_element() {
        let tree = MeiTree::parse(
            r#"<mei xmlns="http://www.music-encoding.org/ns/mei"><body/></mei>"#.as_bytes(),
        )
        .unwrap();
        assert!(compute(&tree).is_err());
    }
}
