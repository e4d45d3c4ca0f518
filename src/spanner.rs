//! Builds a lookup from "destination measure" to the control events
//! that originate elsewhere in the document and land in, or cross
//! into, a given measure window.
//!
//! Ported from
//! `original_source/Omas/omas/meislicer.py::getMultiMeasureSpanners`,
//! generalized per spec §4.3 to scan the whole document prefix up to
//! `window_end` rather than only the region preceding a single
//! measure, so that within-range spanners are caught too.

use crate::docinfo::DocInfo;
use crate::error::{Error, Result};
use crate::tree::{MeiTree, NodeId};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SpannerEntry {
    pub origin_measure_id: String,
    /// Signed distance from the window's first measure to the origin
    /// measure. Positive when the event begins before the window.
    pub distance: i64,
    pub startid: Option<String>,
    pub endid: Option<String>,
    pub tstamp: Option<String>,
    pub tstamp2: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SpannerTable {
    by_destination: HashMap<String, HashMap<String, SpannerEntry>>,
}

impl SpannerTable {
    pub fn for_measure(&self, measure_id: &str) -> Option<&HashMap<String, SpannerEntry>> {
        self.by_destination.get(measure_id)
    }

    pub fn is_empty(&self) -> bool {
        self.by_destination.is_empty()
    }
}

/// Builds the spanner table by scanning 0-based measure indices
/// `0..=window_end`. `window_start` is only used to compute `distance`.
pub fn build(
    tree: &MeiTree,
    doc_info: &DocInfo,
    window_start: u32,
    window_end: u32,
) -> Result<SpannerTable> {
    if window_end >= doc_info.measure_count {
        return Err(Error::OutOfBounds(format!(
            "spanner window end {window_end} exceeds measure count {}",
            doc_info.measure_count
        )));
    }

    let music = tree
        .descendants_by_name(tree.root(), "music")
        .into_iter()
        .next()
        .ok_or_else(|| Error::MalformedMei("document has no <music> element".to_string()))?;
    let measures = tree.descendants_by_name(music, "measure");

    let mut table: HashMap<String, HashMap<String, SpannerEntry>> = HashMap::new();

    for (i, &m) in measures.iter().enumerate() {
        if i as u32 > window_end {
            break;
        }
        let m_id = match tree.element_id(m) {
            Some(id) => id.to_string(),
            None => continue,
        };
        let distance = window_start as i64 - i as i64;

        for e in tree.descendants(m) {
            if tree.name(e).is_none() {
                continue; // text node
            }

            if let Some(endid_raw) = tree.attr(e, "endid") {
                let endid = endid_raw.trim_start_matches('#').to_string();
                let Some(target) = tree.by_id(&endid) else {
                    continue;
                };
                let Some(target_measure) = tree.ancestor_named(target, "measure") else {
                    continue;
                };
                if tree.element_id(target_measure) == Some(m_id.as_str()) {
                    continue; // lands in the same measure: not a spanner
                }
                let dest_id = match tree.element_id(target_measure) {
                    Some(id) => id.to_string(),
                    None => continue,
                };
                let event_id = match tree.element_id(e) {
                    Some(id) => id.to_string(),
                    None => continue,
                };
                let startid = tree
                    .attr(e, "startid")
                    .map(|s| s.trim_start_matches('#').to_string());
                table.entry(dest_id).or_default().insert(
                    event_id,
                    SpannerEntry {
                        origin_measure_id: m_id.clone(),
                        distance,
                        startid,
                        endid: Some(endid),
                        tstamp: tree.attr(e, "tstamp").map(str::to_string),
                        tstamp2: None,
                    },
                );
            } else if let Some(t2) = tree.attr(e, "tstamp2") {
                if let Some(offset) = parse_multi_measure_offset(t2) {
                    let dest_idx = i + offset as usize;
                    let Some(&dest_measure) = measures.get(dest_idx) else {
                        continue;
                    };
                    let Some(dest_id) = tree.element_id(dest_measure) else {
                        continue;
                    };
                    let Some(event_id) = tree.element_id(e) else {
                        continue;
                    };
                    table.entry(dest_id.to_string()).or_default().insert(
                        event_id.to_string(),
                        SpannerEntry {
                            origin_measure_id: m_id.clone(),
                            distance,
                            startid: None,
                            endid: None,
                            tstamp: tree.attr(e, "tstamp").map(str::to_string),
                            tstamp2: Some(t2.to_string()),
                        },
                    );
                }
            }
        }
    }

    Ok(SpannerTable {
        by_destination: table,
    })
}

pub(crate) fn is_multi_measure_tstamp2(value: &str) -> bool {
    parse_multi_measure_offset(value).is_some()
}

/// Parses the `Xm+` prefix of a multi-measure `tstamp2` value
/// (spec §4.3: `([1-9]+)m\+…`), returning `X` if it matches.
pub(crate) fn parse_multi_measure_offset(value: &str) -> Option<u32> {
    let first = value.as_bytes().first()?;
    if !(b'1'..=b'9').contains(first) {
        return None;
    }
    let digit_count = value.bytes().take_while(u8::is_ascii_digit).count();
    if !value[digit_count..].starts_with("m+") {
        return None;
    }
    value[..digit_count].parse().ok()
}

#[allow(dead_code)]
pub fn node_is_control_event(tree: &MeiTree, id: NodeId) -> bool {
    tree.attr(id, "tstamp").is_some()
        || tree.attr(id, "tstamp2").is_some()
        || tree.attr(id, "startid").is_some()
        || tree.attr(id, "endid").is_some()
}
