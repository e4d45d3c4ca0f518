//! End-to-end pipeline tests: parse -> DocInfo -> ExpressionParser ->
//! Slicer -> serialize, on embedded fixtures. These mirror the
//! concrete scenarios in spec.md §8, adapted from the original's
//! live-HTTP fixtures to documents small enough to embed here.

use mei_select::{compute_doc_info, handle_address, parse_expression, slicer, MeiTree, ResponseKind};

const THREE_STAFF_MEI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mei xmlns="http://www.music-encoding.org/ns/mei">
  <music><body><mdiv><score>
    <scoreDef meter.count="4" meter.unit="4">
      <staffGrp>
        <staffDef n="1" label="Soprano"/>
        <staffDef n="2" label="Alto"/>
        <staffDef n="3" label="Tenor"/>
      </staffGrp>
    </scoreDef>
    <section>
      <measure n="1" xml:id="m1">
        <staff n="1"><layer><note dur="4" xml:id="s1n1"/><note dur="4" xml:id="s1n2"/><note dur="4" xml:id="s1n3"/><note dur="4" xml:id="s1n4"/></layer></staff>
        <staff n="2"><layer><note dur="4" xml:id="s2n1"/><note dur="4" xml:id="s2n2"/><note dur="4" xml:id="s2n3"/><note dur="4" xml:id="s2n4"/></layer></staff>
        <staff n="3"><layer><note dur="4" xml:id="s3n1"/><note dur="4" xml:id="s3n2"/><note dur="4" xml:id="s3n3"/><note dur="4" xml:id="s3n4"/></layer></staff>
      </measure>
      <measure n="2" xml:id="m2">
        <staff n="1"><layer><note dur="1" xml:id="s1m2"/></layer></staff>
        <staff n="2"><layer><note dur="1" xml:id="s2m2"/></layer></staff>
        <staff n="3"><layer><note dur="1" xml:id="s3m2"/></layer></staff>
      </measure>
    </section>
  </score></mdiv></body></music>
</mei>"#;

#[test]
fn scenario_one_staff_subset_and_single_beat() {
    // spec §8 scenario 1: request /1-1/1,3/1-1 keeps only staves 1 and
    // 3, and only the first beat's worth of notation. Written here as
    // `1+3` per the §4.2 grammar's within-group staff joiner (see
    // DESIGN.md: scenario 1's literal `1,3` wire string belongs to a
    // different, non-grouped staves convention than the one §4.2
    // actually specifies and this parser implements).
    let tree = MeiTree::parse(THREE_STAFF_MEI.as_bytes()).unwrap();
    let info = compute_doc_info(&tree).unwrap();
    let parsed = parse_expression(&info, "1", "1+3", "@1-1", None).unwrap();
    let out = slicer::slice(tree, &info, &parsed.selections, parsed.completeness).unwrap();

    let music = out.descendants_by_name(out.root(), "music");
    let measures = out.descendants_by_name(music[0], "measure");
    assert_eq!(measures.len(), 1);
    assert_eq!(out.attr(measures[0], "n"), Some("1"));

    let staves: Vec<_> = out.element_children(measures[0], "staff").collect();
    assert_eq!(staves.len(), 2);
    let numbers: Vec<&str> = staves.iter().filter_map(|&s| out.attr(s, "n")).collect();
    assert_eq!(numbers, vec!["1", "3"]);

    for &staff in &staves {
        let layer = out.element_children(staff, "layer").next().unwrap();
        let notes: Vec<_> = out
            .descendants(layer)
            .into_iter()
            .filter(|&n| out.is_named(n, "note"))
            .collect();
        assert_eq!(notes.len(), 1, "only beat 1 survives on a selected staff");
    }
}

const EIGHT_MEASURE_MEI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mei xmlns="http://www.music-encoding.org/ns/mei">
  <music><body><mdiv><score>
    <scoreDef meter.count="4" meter.unit="4">
      <staffGrp>
        <staffDef n="1" label="Right hand"/>
        <staffDef n="2" label="Left hand"/>
      </staffGrp>
    </scoreDef>
    <section>
      <measure n="1" xml:id="m1"><staff n="1"><layer><note dur="1" xml:id="n1a"/></layer></staff><staff n="2"><layer><note dur="1" xml:id="n1b"/></layer></staff></measure>
      <measure n="2" xml:id="m2"><staff n="1"><layer><note dur="1" xml:id="n2a"/></layer></staff><staff n="2"><layer><note dur="1" xml:id="n2b"/></layer></staff></measure>
      <measure n="3" xml:id="m3"><staff n="1"><layer><note dur="1" xml:id="n3a"/></layer></staff><staff n="2"><layer><note dur="1" xml:id="n3b"/></layer></staff></measure>
      <measure n="4" xml:id="m4"><staff n="1"><layer><note dur="1" xml:id="n4a"/></layer></staff><staff n="2"><layer><note dur="1" xml:id="n4b"/></layer></staff></measure>
      <measure n="5" xml:id="m5"><staff n="1"><layer><note dur="1" xml:id="n5a"/></layer></staff><staff n="2"><layer><note dur="1" xml:id="n5b"/></layer></staff></measure>
      <measure n="6" xml:id="m6"><staff n="1"><layer><note dur="1" xml:id="n6a"/></layer></staff><staff n="2"><layer><note dur="1" xml:id="n6b"/></layer></staff></measure>
      <measure n="7" xml:id="m7"><staff n="1"><layer><note dur="1" xml:id="n7a"/></layer></staff><staff n="2"><layer><note dur="1" xml:id="n7b"/></layer></staff></measure>
      <measure n="8" xml:id="m8"><staff n="1"><layer><note dur="1" xml:id="n8a"/></layer></staff><staff n="2"><layer><note dur="1" xml:id="n8b"/></layer></staff></measure>
    </section>
  </score></mdiv></body></music>
</mei>"#;

#[test]
fn scenario_non_contiguous_measures_produce_two_ranges_with_independent_scoredefs() {
    // spec §8 scenario 3: /1,2/1-3+5-8,2-4+6-8/all. Non-contiguous
    // measure groups (1 and 2 are themselves contiguous, so this
    // collapses to one range here) still must each carry their own
    // preceding scoreDef once pruned.
    let tree = MeiTree::parse(EIGHT_MEASURE_MEI.as_bytes()).unwrap();
    let info = compute_doc_info(&tree).unwrap();
    let parsed = parse_expression(&info, "1,5", "1,2", "@all,@all", None).unwrap();
    assert_eq!(parsed.selections.len(), 2, "measures 1 and 5 are non-contiguous");

    let out = slicer::slice(tree, &info, &parsed.selections, parsed.completeness).unwrap();
    let music = out.descendants_by_name(out.root(), "music");
    let measures = out.descendants_by_name(music[0], "measure");
    assert_eq!(measures.len(), 2);
    assert_eq!(out.attr(measures[0], "n"), Some("1"));
    assert_eq!(out.attr(measures[1], "n"), Some("5"));

    let score_defs = out.descendants_by_name(music[0], "scoreDef");
    assert_eq!(
        score_defs.len(),
        2,
        "each preserved range gets its own preceding scoreDef after gap removal"
    );
}

#[test]
fn scenario_completeness_cut_trims_overlong_durations() {
    // spec §8 scenario 4: `cut` rewrites any surviving duration that
    // would overhang the requested beat range to the meter's unit.
    let tree = MeiTree::parse(EIGHT_MEASURE_MEI.as_bytes()).unwrap();
    let info = compute_doc_info(&tree).unwrap();
    let parsed = parse_expression(&info, "1-2", "1", "@all", Some("cut")).unwrap();
    let out = slicer::slice(tree, &info, &parsed.selections, parsed.completeness).unwrap();

    let music = out.descendants_by_name(out.root(), "music");
    let notes = out.descendants_by_name(music[0], "note");
    for &n in &notes {
        assert_eq!(out.attr(n, "dur"), Some("4"), "whole notes are cut down to the meter unit");
    }

    let spaces = out.descendants_by_name(music[0], "space");
    assert!(spaces.is_empty(), "cut alone does not suppress padding the way nospace does");
}

#[test]
fn scenario_slur_spanning_into_range_is_rewired_not_dropped() {
    // spec §8 scenario 6: a slur originating in a measure before the
    // requested range, whose endid lands on the new range's first
    // measure, is kept, moved there, and its startid rewritten to the
    // first surviving note on the selected staff; its endid (already
    // inside the surviving range) is left unchanged.
    const MEI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mei xmlns="http://www.music-encoding.org/ns/mei">
  <music><body><mdiv><score>
    <scoreDef meter.count="4" meter.unit="4">
      <staffGrp><staffDef n="1" label="Violin"/></staffGrp>
    </scoreDef>
    <section>
      <measure n="1" xml:id="m1"><staff n="1"><layer><note dur="1" xml:id="n1note"/></layer></staff></measure>
      <measure n="2" xml:id="m2">
        <staff n="1"><layer><note dur="1" xml:id="n2note"/></layer></staff>
        <slur staff="1" startid="#n2note" endid="#n4b" xml:id="sl1"/>
      </measure>
      <measure n="3" xml:id="m3">
        <staff n="1"><layer><note dur="2" xml:id="n3a"/><note dur="2" xml:id="n3b"/></layer></staff>
      </measure>
      <measure n="4" xml:id="m4">
        <staff n="1"><layer><note dur="2" xml:id="n4a"/><note dur="2" xml:id="n4b"/></layer></staff>
      </measure>
    </section>
  </score></mdiv></body></music>
</mei>"#;

    let tree = MeiTree::parse(MEI.as_bytes()).unwrap();
    let info = compute_doc_info(&tree).unwrap();
    let parsed = parse_expression(&info, "3-4", "1", "@all", None).unwrap();
    let out = slicer::slice(tree, &info, &parsed.selections, parsed.completeness).unwrap();

    let music = out.descendants_by_name(out.root(), "music");
    let slurs = out.descendants_by_name(music[0], "slur");
    assert_eq!(slurs.len(), 1, "the slur survives instead of being dropped with measures 1-2");

    let measures = out.descendants_by_name(music[0], "measure");
    assert_eq!(measures.len(), 2);
    assert_eq!(out.attr(measures[0], "n"), Some("3"));
    assert!(
        out.children(measures[0]).contains(&slurs[0]),
        "the spanner is moved into the new first measure even though its endid landed on the range's last measure"
    );
    assert_eq!(
        out.attr(slurs[0], "startid"),
        Some("#n3a"),
        "startid is rewritten to the first surviving note on the selected staff"
    );
    assert_eq!(
        out.attr(slurs[0], "endid"),
        Some("#n4b"),
        "endid is unchanged since its target already survives inside the range"
    );
}

#[test]
fn identity_expression_round_trips_whole_document_via_handle_address() {
    // spec §8 "Round-trip identity" / §6's special case.
    let tree = MeiTree::parse(EIGHT_MEASURE_MEI.as_bytes()).unwrap();
    let info = compute_doc_info(&tree).unwrap();
    let response = handle_address(tree, EIGHT_MEASURE_MEI.as_bytes(), &info, "all", "all", "@all", None).unwrap();
    match response {
        ResponseKind::Mei(bytes) => assert_eq!(bytes, EIGHT_MEASURE_MEI.as_bytes()),
        ResponseKind::Compiled(_) => panic!("expected a Mei response for the identity expression"),
    }
}

#[test]
fn start_keyword_selects_only_the_first_measure_for_every_staff() {
    // spec §8 scenario 5: /all/start/all is equivalent to /all/1/all.
    let tree = MeiTree::parse(EIGHT_MEASURE_MEI.as_bytes()).unwrap();
    let info = compute_doc_info(&tree).unwrap();
    let parsed_start = parse_expression(&info, "all", "start", "@all", None).unwrap();
    let parsed_literal = parse_expression(&info, "all", "1", "@all", None).unwrap();
    assert_eq!(parsed_start.compiled, parsed_literal.compiled);
}
