//! The tree-surgery pass: given a parsed set of [`Selection`]s, mutates
//! an [`MeiTree`] in place so only the addressed notation, plus the
//! control events and score context it needs, survives.
//!
//! Ported from `original_source/Omas/omas/meislicer.py::Slicer`. The
//! Python original threads three Python `set`s (`selected`, `space`,
//! `removal`) through a single pass over each measure; here that
//! becomes one [`MarkSet`] committed after both the on-staff and
//! control-event passes agree on every element's fate (spec §9).

use crate::docinfo::{DocInfo, MeterInfo};
use crate::error::{Error, Result};
use crate::expression::{CompletenessOptions, Selection, StaffSelection};
use crate::spanner::{self, SpannerEntry, SpannerTable};
use crate::tree::{MeiTree, NodeId, NodeKind};
use fraction::Fraction;
use log::{debug, trace, warn};
use num_traits::ToPrimitive;
use std::collections::{HashMap, HashSet};

const ALWAYS_KEEP: &[&str] = &["meiHead"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Selected,
    Cut,
    Space,
    Removal,
}

#[derive(Default)]
struct MarkSet {
    marks: HashMap<NodeId, Mark>,
    order: Vec<NodeId>,
}

impl MarkSet {
    fn set(&mut self, id: NodeId, mark: Mark) {
        if !self.marks.contains_key(&id) {
            self.order.push(id);
        }
        self.marks.insert(id, mark);
    }

    fn get(&self, id: NodeId) -> Option<Mark> {
        self.marks.get(&id).copied()
    }
}

struct RangeOutcome {
    preserved_ids: Vec<String>,
    first_measure_id: String,
}

/// Top-level entry point (spec §4.4). Takes ownership of `tree` for the
/// duration of the slice, per spec §5's single-owner mutation model.
pub fn slice(
    mut tree: MeiTree,
    doc_info: &DocInfo,
    selections: &[Selection],
    options: CompletenessOptions,
) -> Result<MeiTree> {
    let music = find_music(&tree)?;
    let measures = tree.descendants_by_name(music, "measure");

    // Capture score-context elements before any mutation: pruning later
    // deletes the originals, so reattachment works from clones made now.
    let initial_scoredef = tree
        .descendants_by_name(music, "scoreDef")
        .first()
        .map(|&sd| deep_clone(&mut tree, sd));

    let mut preceding_scoredefs = Vec::with_capacity(selections.len());
    for selection in selections {
        let first_idx = selection.first_measure() as usize - 1;
        let first_measure = *measures.get(first_idx).ok_or_else(|| {
            Error::OutOfBounds(format!(
                "measure {} not found in document",
                selection.first_measure()
            ))
        })?;
        preceding_scoredefs
            .push(nearest_preceding_scoredef(&tree, first_measure).map(|sd| deep_clone(&mut tree, sd)));
    }

    let mut all_preserved: Vec<String> = Vec::new();
    let mut range_outcomes = Vec::with_capacity(selections.len());
    for selection in selections {
        let outcome = process_contiguous_range(&mut tree, doc_info, &measures, selection, options)?;
        all_preserved.extend(outcome.preserved_ids.iter().cloned());
        range_outcomes.push(outcome);
    }

    prune_unpreserved(&mut tree, music, &all_preserved);

    for (clone, outcome) in preceding_scoredefs.into_iter().zip(range_outcomes.iter()) {
        if let Some(clone) = clone {
            if let Some(anchor) = tree.by_id(&outcome.first_measure_id) {
                tree.insert_before(anchor, clone);
            }
        }
    }

    if options.raw {
        if let (Some(first_outcome), Some(last_outcome)) =
            (range_outcomes.first(), range_outcomes.last())
        {
            let first_id = first_outcome.first_measure_id.clone();
            let last_id = last_outcome
                .preserved_ids
                .last()
                .cloned()
                .ok_or_else(|| Error::MalformedMei("empty selection range".to_string()))?;
            if let (Some(a), Some(b)) = (tree.by_id(&first_id), tree.by_id(&last_id)) {
                let lca = lowest_common_ancestor(&tree, a, b);
                tree.set_root(lca);
            }
            if options.signature {
                if let (Some(sig), Some(first_measure_node)) = (initial_scoredef, tree.by_id(&first_id)) {
                    tree.insert_before(first_measure_node, sig);
                }
            }
        }
    }

    Ok(tree)
}

fn find_music(tree: &MeiTree) -> Result<NodeId> {
    let found = tree.descendants_by_name(tree.root(), "music");
    match found.as_slice() {
        [one] => Ok(*one),
        [] => Err(Error::MalformedMei("document has no <music> element".to_string())),
        _ => Err(Error::MalformedMei(
            "document has more than one <music> element".to_string(),
        )),
    }
}

fn process_contiguous_range(
    tree: &mut MeiTree,
    doc_info: &DocInfo,
    measures: &[NodeId],
    selection: &Selection,
    options: CompletenessOptions,
) -> Result<RangeOutcome> {
    let first_idx0 = selection.first_measure() - 1;
    let last_idx0 = selection.last_measure() - 1;
    debug!(
        "slicing range: measures {}-{}",
        selection.first_measure(),
        selection.last_measure()
    );
    let spanners = spanner::build(tree, doc_info, first_idx0, last_idx0)?;

    let n = selection.measures.len();
    let mut preserved_ids = Vec::with_capacity(n);
    let mut first_measure_id = String::new();
    let mut first_measure_selected: HashMap<u32, Vec<NodeId>> = HashMap::new();
    let mut last_measure_selected: HashMap<u32, Vec<NodeId>> = HashMap::new();

    for (pos, ms) in selection.measures.iter().enumerate() {
        let is_first_m = pos == 0;
        let is_last_m = pos == n - 1;
        let measure = measures[ms.index as usize - 1];
        let measure_id = tree
            .element_id(measure)
            .ok_or_else(|| Error::MalformedMei("measure missing identity".to_string()))?
            .to_string();
        if is_first_m {
            first_measure_id = measure_id.clone();
        }
        preserved_ids.push(measure_id.clone());

        let meter = doc_info
            .meter_at(ms.index - 1)
            .ok_or_else(|| Error::OutOfBounds(format!("no meter defined at measure {}", ms.index)))?;

        let selected_by_number: HashMap<u32, &StaffSelection> =
            ms.staves.iter().map(|s| (s.number, s)).collect();

        let mut marks = MarkSet::default();

        let staff_children: Vec<NodeId> = tree.element_children(measure, "staff").collect();
        for (pos_in_measure, staff) in staff_children.into_iter().enumerate() {
            let staff_no = tree.attr(staff, "n").and_then(|v| v.parse::<u32>().ok()).unwrap_or_else(|| {
                warn!(
                    "measure {} has a <staff> without @n; falling back to positional index {pos_in_measure}",
                    ms.index
                );
                pos_in_measure as u32
            });
            if let Some(staff_sel) = selected_by_number.get(&staff_no) {
                let selected_notes =
                    select_staff_beats(tree, staff, staff_sel, meter, is_last_m, options, &mut marks);
                if is_first_m {
                    first_measure_selected.insert(staff_no, selected_notes.clone());
                }
                if is_last_m {
                    last_measure_selected.insert(staff_no, selected_notes);
                }
            } else {
                marks.set(staff, Mark::Removal);
            }
        }

        process_control_events(tree, measure, &selected_by_number, &mut marks, &spanners, &measure_id)?;

        commit_marks(tree, marks, meter, options);
    }

    rewrite_spanners(
        tree,
        &spanners,
        &preserved_ids,
        &first_measure_id,
        &first_measure_selected,
        &last_measure_selected,
        selection,
        options,
    )?;

    Ok(RangeOutcome {
        preserved_ids,
        first_measure_id,
    })
}

/// Walks every `<layer>` descendant of `staff` in document order,
/// tracking the running beat position, and marks each duration-bearing
/// element selected, cut, spaced, or removed (spec §4.4 "On-staff beat
/// selection"). Returns the elements marked selected, in document order.
fn select_staff_beats(
    tree: &MeiTree,
    staff: NodeId,
    staff_sel: &StaffSelection,
    meter: MeterInfo,
    is_last_m: bool,
    options: CompletenessOptions,
    marks: &mut MarkSet,
) -> Vec<NodeId> {
    // Selection is containment of the element's own start offset in one
    // of the requested ranges (spec §8's "Meter respect" invariant),
    // not the "cur_beat + dur ≥ first and cur_beat < last" span-overlap
    // reading of §4.4 — that wording drops the last beat of any
    // range whose `last` equals a note's own start (e.g. `@1-4` over
    // four quarter notes in 4/4 would silently exclude beat 4). See
    // DESIGN.md.
    let mut selected = Vec::new();
    let max_last = staff_sel
        .beat_ranges
        .iter()
        .map(|r| r.last)
        .fold(f64::MIN, f64::max);

    for layer in tree.element_children(staff, "layer").collect::<Vec<_>>() {
        let mut cur_beat = Fraction::from(1u64);
        for node in tree.descendants(layer) {
            let Some(dur_str) = tree.attr(node, "dur") else {
                continue;
            };
            let Ok(dur) = dur_str.parse::<u32>() else {
                continue;
            };
            if dur == 0 {
                continue;
            }
            let dots = tree
                .attr(node, "dots")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or_else(|| tree.element_children(node, "dot").count() as u32);
            let length = beat_length(meter.unit, dur, dots);

            let cur_f64 = cur_beat.to_f64().unwrap_or(1.0);
            let end_f64 = (cur_beat + length).to_f64().unwrap_or(cur_f64);

            let matched_range = staff_sel
                .beat_ranges
                .iter()
                .find(|r| cur_f64 >= r.first && cur_f64 <= r.last);

            if let Some(range) = matched_range {
                trace!("beat {cur_f64} selected (range {}-{})", range.first, range.last);
                marks.set(node, Mark::Selected);
                selected.push(node);
                if options.cut && end_f64 > range.last {
                    marks.set(node, Mark::Cut);
                }
            } else if cur_f64 > max_last {
                if is_last_m {
                    marks.set(node, Mark::Removal);
                } else {
                    marks.set(node, Mark::Space);
                }
            } else {
                marks.set(node, Mark::Space);
            }

            cur_beat = cur_beat + length;
        }
    }
    selected
}

fn beat_length(unit: u32, dur: u32, dots: u32) -> Fraction {
    let unit = unit as u64;
    let dur = dur as u64;
    let mut len = Fraction::new(unit, dur);
    let mut denom_mult = 1u64;
    for _ in 0..dots {
        denom_mult *= 2;
        len = len + Fraction::new(unit, dur * denom_mult);
    }
    len
}

/// Handles every measure child that is not a `<staff>`: slurs, dirs,
/// dynamics, tempo marks, and the like anchored by `@staff` plus either
/// `@tstamp`/`@tstamp2` or `@startid`/`@endid` (spec §4.4 "Control
/// events"). Events that are incoming multi-measure spanners are left
/// alone here; `rewrite_spanners` handles them once per range.
fn process_control_events(
    tree: &mut MeiTree,
    measure: NodeId,
    selected_by_number: &HashMap<u32, &StaffSelection>,
    marks: &mut MarkSet,
    spanners: &SpannerTable,
    measure_id: &str,
) -> Result<()> {
    let children: Vec<NodeId> = tree.children(measure).to_vec();
    let incoming_here = spanners.for_measure(measure_id);

    for child in children {
        if tree.name(child).is_none() || tree.is_named(child, "staff") {
            continue;
        }
        let Some(staff_attr) = tree.attr(child, "staff").map(str::to_string) else {
            continue;
        };
        let event_id = match tree.element_id(child) {
            Some(id) => id.to_string(),
            None => continue,
        };
        if incoming_here.map(|m| m.contains_key(&event_id)).unwrap_or(false) {
            continue;
        }

        let staff_numbers: Vec<u32> = staff_attr
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        let matching: Vec<&StaffSelection> = staff_numbers
            .iter()
            .filter_map(|n| selected_by_number.get(n).copied())
            .collect();
        if matching.is_empty() {
            marks.set(child, Mark::Removal);
            continue;
        }

        let tstamp = tree.attr(child, "tstamp").and_then(|v| v.parse::<f64>().ok());
        let tstamp2_raw = tree.attr(child, "tstamp2").map(str::to_string);
        if tstamp2_raw
            .as_deref()
            .map(spanner::is_multi_measure_tstamp2)
            .unwrap_or(false)
        {
            continue; // should already be excluded via incoming_here; defensive
        }

        let keep = if let (Some(ts), Some(ts2_raw)) = (tstamp, tstamp2_raw.as_deref()) {
            let ts2: f64 = ts2_raw
                .parse()
                .map_err(|_| Error::BadRequest(format!("invalid tstamp2 '{ts2_raw}'")))?;
            matching
                .iter()
                .any(|s| s.beat_ranges.iter().any(|r| ts2 >= r.first && ts <= r.last))
        } else if let Some(ts) = tstamp {
            matching
                .iter()
                .any(|s| s.beat_ranges.iter().any(|r| ts >= r.first && ts <= r.last))
        } else if let Some(startid_raw) = tree.attr(child, "startid").map(str::to_string) {
            let startid = startid_raw.trim_start_matches('#').to_string();
            let target = tree
                .by_id(&startid)
                .ok_or_else(|| Error::UnsupportedEncoding(format!("startid target '{startid}' not found")))?;
            if tree.ancestor_named(target, "measure") != Some(measure) {
                return Err(Error::UnsupportedEncoding(
                    "startid target is not in the same measure".to_string(),
                ));
            }
            let start_kept = matches!(marks.get(target), Some(Mark::Selected) | Some(Mark::Cut));
            if start_kept {
                true
            } else if let Some(endid_raw) = tree.attr(child, "endid").map(str::to_string) {
                let endid = endid_raw.trim_start_matches('#').to_string();
                tree.by_id(&endid)
                    .map(|end_target| matches!(marks.get(end_target), Some(Mark::Selected) | Some(Mark::Cut)))
                    .unwrap_or(false)
            } else {
                false
            }
        } else {
            true
        };

        if !keep {
            marks.set(child, Mark::Removal);
        }
    }
    Ok(())
}

fn commit_marks(tree: &mut MeiTree, marks: MarkSet, meter: MeterInfo, options: CompletenessOptions) {
    for id in marks.order {
        match marks.marks[&id] {
            Mark::Selected => {}
            Mark::Cut => {
                tree.set_attr(id, "dur", meter.unit.to_string());
                tree.remove_attr(id, "dots");
                for dot in tree.element_children(id, "dot").collect::<Vec<_>>() {
                    tree.remove_subtree(dot);
                }
            }
            Mark::Space => {
                if options.nospace {
                    tree.remove_subtree(id);
                } else {
                    convert_to_space(tree, id);
                }
            }
            Mark::Removal => {
                tree.remove_subtree(id);
            }
        }
    }
}

fn convert_to_space(tree: &mut MeiTree, id: NodeId) {
    let dur = tree.attr(id, "dur").map(str::to_string);
    let dots = tree.attr(id, "dots").map(str::to_string);
    let space = tree.new_element("space");
    if let Some(d) = dur {
        tree.set_attr(space, "dur", d);
    }
    if let Some(d) = dots {
        tree.set_attr(space, "dots", d);
    }
    tree.replace_child(id, space);
}

/// Rewires spanners that originate before this range's first measure
/// and land *anywhere* inside it (spec §4.4 "Multi-measure spanner
/// rewiring") -- the `SpannerTable` is keyed by destination measure,
/// and an incoming spanner's destination can be any measure in the
/// range (e.g. an `endid` landing on the range's last measure), not
/// only the range's first measure.
fn rewrite_spanners(
    tree: &mut MeiTree,
    spanners: &SpannerTable,
    range_measure_ids: &[String],
    first_measure_id: &str,
    first_measure_selected: &HashMap<u32, Vec<NodeId>>,
    last_measure_selected: &HashMap<u32, Vec<NodeId>>,
    selection: &Selection,
    options: CompletenessOptions,
) -> Result<()> {
    let mut incoming: HashMap<String, SpannerEntry> = HashMap::new();
    for mid in range_measure_ids {
        if let Some(map) = spanners.for_measure(mid) {
            for (event_id, entry) in map {
                incoming.entry(event_id.clone()).or_insert_with(|| entry.clone());
            }
        }
    }
    if incoming.is_empty() {
        return Ok(());
    }

    let range_length = selection.measures.len() as i64;
    let first_measure_node = tree
        .by_id(first_measure_id)
        .ok_or_else(|| Error::MalformedMei("first measure of range vanished".to_string()))?;

    let events: Vec<(String, SpannerEntry)> = incoming.into_iter().collect();

    for (event_id, entry) in events {
        debug!("rewiring spanner '{event_id}' into measure '{first_measure_id}' (distance {})", entry.distance);
        let Some(event) = tree.by_id(&event_id) else {
            continue;
        };
        let Some(staff_attr) = tree.attr(event, "staff").map(str::to_string) else {
            continue;
        };
        let Some(staff_no) = staff_attr.split_whitespace().next().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };

        if tree.attr(event, "startid").is_some() {
            let first_note = first_measure_selected
                .get(&staff_no)
                .and_then(|v| v.first())
                .copied()
                .ok_or_else(|| {
                    Error::UnsupportedEncoding(format!(
                        "no surviving note on staff {staff_no} to anchor spanner '{event_id}'"
                    ))
                })?;
            let first_note_id = tree.element_id(first_note).unwrap_or("").to_string();
            tree.set_attr(event, "startid", format!("#{first_note_id}"));
        }

        let first_beat = selection
            .measures
            .first()
            .and_then(|m| m.staves.iter().find(|s| s.number == staff_no))
            .and_then(|s| s.beat_ranges.first())
            .map(|r| r.first)
            .unwrap_or(1.0);
        tree.set_attr(event, "tstamp", format_beat(first_beat));

        if let Some(tstamp2) = entry.tstamp2.as_deref() {
            if let Some(offset) = spanner::parse_multi_measure_offset(tstamp2) {
                let tail = tstamp2.splitn(2, "m+").nth(1).unwrap_or("").to_string();
                let new_offset = if options.cut {
                    range_length - 1
                } else {
                    offset as i64 - entry.distance
                };
                tree.set_attr(event, "tstamp2", format!("{new_offset}m+{tail}"));
            }
        } else if options.cut && entry.distance > 0 && tree.attr(event, "endid").is_some() {
            if let Some(last_note) = last_measure_selected.get(&staff_no).and_then(|v| v.last()) {
                let last_note_id = tree.element_id(*last_note).unwrap_or("").to_string();
                tree.set_attr(event, "endid", format!("#{last_note_id}"));
            }
        }

        tree.move_to(event, first_measure_node);
    }

    Ok(())
}

fn format_beat(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

fn deep_clone(tree: &mut MeiTree, id: NodeId) -> NodeId {
    let kind = tree.get(id).kind.clone();
    match kind {
        NodeKind::Text(text) => tree.new_text(text),
        NodeKind::Element { name, attrs, children, .. } => {
            let new_id = tree.new_element(name);
            for (k, v) in attrs {
                tree.set_attr(new_id, k, v);
            }
            for child in children {
                let cloned = deep_clone(tree, child);
                tree.append_child(new_id, cloned);
            }
            new_id
        }
    }
}

fn nearest_preceding_scoredef(tree: &MeiTree, before: NodeId) -> Option<NodeId> {
    let order = tree.document_order();
    let pos = order.iter().position(|&n| n == before)?;
    order[..pos].iter().rev().copied().find(|&n| tree.is_named(n, "scoreDef"))
}

fn lowest_common_ancestor(tree: &MeiTree, a: NodeId, b: NodeId) -> NodeId {
    let mut ancestors = HashSet::new();
    let mut cur = a;
    ancestors.insert(cur);
    while let Some(p) = tree.parent(cur) {
        ancestors.insert(p);
        cur = p;
    }
    let mut cur = b;
    loop {
        if ancestors.contains(&cur) {
            return cur;
        }
        match tree.parent(cur) {
            Some(p) => cur = p,
            None => return cur,
        }
    }
}

fn prune_unpreserved(tree: &mut MeiTree, music: NodeId, preserved: &[String]) {
    let preserved: HashSet<&str> = preserved.iter().map(String::as_str).collect();
    prune_node(tree, music, &preserved);
}

/// Returns whether `node` (or some descendant of it) must survive.
/// Unifies spec §4.4 steps 3 and 5: both reduce to "keep iff this
/// subtree contains a preserved measure, or it's on the always-kept
/// list" — there is no distinct notion of "between" vs. "outside".
fn prune_node(tree: &mut MeiTree, node: NodeId, preserved: &HashSet<&str>) -> bool {
    if tree.name(node).is_none() {
        return true;
    }
    if let Some(id) = tree.element_id(node) {
        if preserved.contains(id) {
            return true;
        }
    }
    if ALWAYS_KEEP.contains(&tree.name(node).unwrap_or("")) {
        return true;
    }
    let children: Vec<NodeId> = tree.children(node).to_vec();
    let mut keep_self = false;
    for child in children {
        if prune_node(tree, child, preserved) {
            keep_self = true;
        } else {
            tree.remove_subtree(child);
        }
    }
    keep_self
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docinfo;
    use crate::expression;

    const MEI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mei xmlns="http://www.music-encoding.org/ns/mei">
  <music><body><mdiv><score>
    <scoreDef meter.count="4" meter.unit="4">
      <staffGrp>
        <staffDef n="1" label="Violin"/>
        <staffDef n="2" label="Cello"/>
      </staffGrp>
    </scoreDef>
    <section>
      <measure n="1" xml:id="m1">
        <staff n="1"><layer>
          <note dur="4" xml:id="n1a"/>
          <note dur="4" xml:id="n1b"/>
          <note dur="4" xml:id="n1c"/>
          <note dur="4" xml:id="n1d"/>
        </layer></staff>
        <staff n="2"><layer>
          <note dur="1" xml:id="n1e"/>
        </layer></staff>
      </measure>
      <measure n="2" xml:id="m2">
        <staff n="1"><layer>
          <note dur="4" xml:id="n2a"/>
          <note dur="4" xml:id="n2b"/>
          <note dur="4" xml:id="n2c"/>
          <note dur="4" xml:id="n2d"/>
        </layer></staff>
        <staff n="2"><layer>
          <note dur="1" xml:id="n2e"/>
        </layer></staff>
      </measure>
    </section>
  </score></mdiv></body></music>
</mei>"#;

    #[test]
    fn keeps_only_selected_staff_and_beat() {
        let tree = MeiTree::parse(MEI.as_bytes()).unwrap();
        let info = docinfo::compute(&tree).unwrap();
        let parsed = expression::parse(&info, "1", "1,2", "@1-1", None).unwrap();
        let out = slice(tree, &info, &parsed.selections, parsed.completeness).unwrap();

        let music = out.descendants_by_name(out.root(), "music");
        let measures = out.descendants_by_name(music[0], "measure");
        assert_eq!(measures.len(), 1);

        let staves: Vec<NodeId> = out.element_children(measures[0], "staff").collect();
        assert_eq!(staves.len(), 2);
        let numbers: Vec<&str> = staves.iter().filter_map(|&s| out.attr(s, "n")).collect();
        assert_eq!(numbers, vec!["1", "2"]);

        let layer = out.element_children(staves[0], "layer").next().unwrap();
        let kept_notes: Vec<NodeId> = out
            .descendants(layer)
            .into_iter()
            .filter(|&n| out.is_named(n, "note"))
            .collect();
        assert_eq!(kept_notes.len(), 1);
        assert_eq!(out.element_id(kept_notes[0]), Some("n1a"));

        // single measure: it is simultaneously first and last, so the
        // trailing beats 2-4 are removed outright, not spaced.
        let spaces: Vec<NodeId> = out
            .descendants(layer)
            .into_iter()
            .filter(|&n| out.is_named(n, "space"))
            .collect();
        assert!(spaces.is_empty());
    }

    #[test]
    fn intermediate_measure_tail_becomes_space_last_measure_tail_is_removed() {
        let tree = MeiTree::parse(MEI.as_bytes()).unwrap();
        let info = docinfo::compute(&tree).unwrap();
        let parsed = expression::parse(&info, "1-2", "1", "@1-2", None).unwrap();
        let out = slice(tree, &info, &parsed.selections, parsed.completeness).unwrap();

        let music = out.descendants_by_name(out.root(), "music");
        let measures = out.descendants_by_name(music[0], "measure");
        assert_eq!(measures.len(), 2);

        let staff1 = out.element_children(measures[0], "staff").next().unwrap();
        let layer1 = out.element_children(staff1, "layer").next().unwrap();
        let spaces1: Vec<NodeId> = out
            .descendants(layer1)
            .into_iter()
            .filter(|&n| out.is_named(n, "space"))
            .collect();
        assert_eq!(spaces1.len(), 2, "non-last measure pads its tail with <space>");

        let staff2 = out.element_children(measures[1], "staff").next().unwrap();
        let layer2 = out.element_children(staff2, "layer").next().unwrap();
        let notes2: Vec<NodeId> = out
            .descendants(layer2)
            .into_iter()
            .filter(|&n| out.is_named(n, "note"))
            .collect();
        let spaces2: Vec<NodeId> = out
            .descendants(layer2)
            .into_iter()
            .filter(|&n| out.is_named(n, "space"))
            .collect();
        assert_eq!(notes2.len(), 2, "only the two selected beats survive");
        assert!(spaces2.is_empty(), "the tail of the last measure is removed, not spaced");
    }

    #[test]
    fn nospace_removes_padding_instead_of_inserting_space() {
        let tree = MeiTree::parse(MEI.as_bytes()).unwrap();
        let info = docinfo::compute(&tree).unwrap();
        let parsed = expression::parse(&info, "1-2", "1", "@1-2", Some("nospace")).unwrap();
        let out = slice(tree, &info, &parsed.selections, parsed.completeness).unwrap();
        let music = out.descendants_by_name(out.root(), "music");
        let measures = out.descendants_by_name(music[0], "measure");
        let staff = out.element_children(measures[0], "staff").next().unwrap();
        let layer = out.element_children(staff, "layer").next().unwrap();
        let spaces: Vec<NodeId> = out
            .descendants(layer)
            .into_iter()
            .filter(|&n| out.is_named(n, "space"))
            .collect();
        assert!(spaces.is_empty());
    }
}
