//! Parses the raw measures/staves/beats/completeness strings from an
//! EMA-style address into a materialized list of [`Selection`]s.
//!
//! Ported from `original_source/Omas/omas/emaexpression.py`, with one
//! deliberate departure noted in `DESIGN.md`: the Python original
//! recomputes `staves`/`beats` lazily via coupled properties; here the
//! whole `Selection` tree is built eagerly, up front, per spec §9's
//! explicit instruction to avoid hidden cross-property coupling.

use crate::docinfo::DocInfo;
use crate::error::{Error, Result};
use log::debug;
use nom::branch::alt;
use nom::bytes::complete::is_not;
use nom::character::complete::{alpha1, char, digit1};
use nom::combinator::{map, map_res, opt, recognize};
use nom::multi::many1;
use nom::sequence::{pair, preceded, separated_pair};
use nom::IResult;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatRange {
    pub first: f64,
    pub last: f64,
}

#[derive(Debug, Clone)]
pub struct StaffSelection {
    pub number: u32,
    pub beat_ranges: Vec<BeatRange>,
}

#[derive(Debug, Clone)]
pub struct MeasureSelection {
    /// 1-based measure index, matching spec §3.
    pub index: u32,
    pub staves: Vec<StaffSelection>,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub measures: Vec<MeasureSelection>,
    /// Canonical re-serialization of this contiguous range, usable as
    /// a stable identifier (spec §4.2 point 7).
    pub compiled: String,
}

impl Selection {
    pub fn first_measure(&self) -> u32 {
        self.measures.first().map(|m| m.index).unwrap_or(0)
    }

    pub fn last_measure(&self) -> u32 {
        self.measures.last().map(|m| m.index).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletenessOptions {
    pub raw: bool,
    pub signature: bool,
    pub cut: bool,
    pub nospace: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
enum CompletenessToken {
    Raw,
    Signature,
    Cut,
    NoSpace,
}

impl CompletenessOptions {
    pub fn parse(s: Option<&str>) -> Result<CompletenessOptions> {
        let mut opts = CompletenessOptions::default();
        let Some(s) = s else { return Ok(opts) };
        for tok in s.split(',') {
            let tok = tok.trim();
            if tok.is_empty() {
                continue;
            }
            let parsed = CompletenessToken::from_str(tok)
                .map_err(|_| Error::BadRequest(format!("unknown completeness option '{tok}'")))?;
            match parsed {
                CompletenessToken::Raw => opts.raw = true,
                CompletenessToken::Signature => opts.signature = true,
                CompletenessToken::Cut => opts.cut = true,
                CompletenessToken::NoSpace => opts.nospace = true,
            }
        }
        Ok(opts)
    }
}

#[derive(Debug, Clone)]
pub struct ParsedExpression {
    pub selections: Vec<Selection>,
    pub completeness: CompletenessOptions,
    /// All selections' compiled forms, comma-joined.
    pub compiled: String,
}

pub fn parse(
    doc_info: &DocInfo,
    measures_str: &str,
    staves_str: &str,
    beats_str: &str,
    completeness_str: Option<&str>,
) -> Result<ParsedExpression> {
    let completeness = CompletenessOptions::parse(completeness_str)?;

    let measure_count = doc_info.measure_count;
    let measures_sub = substitute_keywords(
        measures_str,
        "1",
        &measure_count.to_string(),
        &format!("1-{measure_count}"),
    );
    debug!("measures '{measures_str}' resolved to '{measures_sub}'");

    let mut expanded_groups: Vec<Vec<u32>> = Vec::new();
    for tok in measures_sub.split(',') {
        let (a, b) = expand_int_range(tok)?;
        if a < 1 || b < a {
            return Err(Error::BadRequest(format!("invalid measure range '{tok}'")));
        }
        if b > measure_count {
            return Err(Error::OutOfBounds(format!(
                "measure {b} exceeds measure count {measure_count}"
            )));
        }
        expanded_groups.push((a..=b).collect());
    }

    // Merge groups that are textually adjacent in the request and
    // numerically contiguous (spec §4.2 point 2).
    let mut merged: Vec<Vec<u32>> = Vec::new();
    for group in expanded_groups {
        let merge = match (
            merged.last().and_then(|last: &Vec<u32>| last.last().copied()),
            group.first().copied(),
        ) {
            (Some(last_val), Some(first_val)) => last_val + 1 == first_val,
            _ => false,
        };
        if merge {
            merged.last_mut().unwrap().extend(group);
        } else {
            merged.push(group);
        }
    }

    let flat_len: usize = merged.iter().map(|g| g.len()).sum();

    let mut staves_by_m: Vec<String> = staves_str.split(',').map(str::to_string).collect();
    if staves_by_m.len() == 1 {
        staves_by_m = std::iter::repeat(staves_by_m[0].clone()).take(flat_len).collect();
    }
    if staves_by_m.len() != flat_len {
        return Err(Error::BadRequest(
            "requested staff ranges do not match measure ranges".to_string(),
        ));
    }

    let mut beats_by_m: Vec<String> = beats_str.split(',').map(str::to_string).collect();
    if beats_by_m.len() == 1 {
        beats_by_m = std::iter::repeat(beats_by_m[0].clone()).take(flat_len).collect();
    }
    if beats_by_m.len() != flat_len {
        return Err(Error::BadRequest(
            "requested beat ranges do not match measure ranges".to_string(),
        ));
    }

    let mut selections = Vec::new();
    let mut compiled_parts = Vec::new();
    let mut cursor = 0usize;

    for range in &merged {
        let len = range.len();
        let staves_slice = &staves_by_m[cursor..cursor + len];
        let beats_slice = &beats_by_m[cursor..cursor + len];
        cursor += len;

        let m0 = range[0] - 1;
        let staff_layout = doc_info.staves_at(m0).ok_or_else(|| {
            Error::OutOfBounds(format!("no staff layout defined at or before measure {m0}"))
        })?;
        let staff_count = staff_layout.len() as u32;

        let mut measure_selections = Vec::new();
        let mut compiled_staff_tokens = Vec::new();
        let mut compiled_beat_tokens = Vec::new();

        for (i, &midx) in range.iter().enumerate() {
            let raw_staff = staves_slice[i].trim();
            let sub_staff = substitute_keywords(
                raw_staff,
                "1",
                &staff_count.to_string(),
                &format!("1-{staff_count}"),
            );
            debug!("measure {midx}: staves '{raw_staff}' resolved to '{sub_staff}'");
            compiled_staff_tokens.push(sub_staff.clone());

            let mut staff_numbers: Vec<u32> = Vec::new();
            for part in sub_staff.split('+') {
                let (a, b) = expand_int_range(part)?;
                if a < 1 || b < a {
                    return Err(Error::BadRequest(format!("invalid staff range '{part}'")));
                }
                if b > staff_count {
                    return Err(Error::OutOfBounds(format!(
                        "staff {b} exceeds staff count {staff_count} at measure {midx}"
                    )));
                }
                staff_numbers.extend(a..=b);
            }

            let meter = doc_info.meter_at(midx - 1).ok_or_else(|| {
                Error::OutOfBounds(format!("no meter defined at or before measure {midx}"))
            })?;
            let raw_beat = beats_slice[i].trim();
            let sub_beat = substitute_keywords(
                raw_beat,
                "1",
                &meter.count.to_string(),
                &format!("1-{}", meter.count),
            );

            let mut staff_beat_groups: Vec<&str> = sub_beat.split('+').collect();
            if staff_beat_groups.len() == 1 && staff_numbers.len() > 1 {
                let only = staff_beat_groups[0];
                staff_beat_groups = std::iter::repeat(only).take(staff_numbers.len()).collect();
            }
            if staff_beat_groups.len() != staff_numbers.len() {
                return Err(Error::BadRequest(format!(
                    "requested beat range does not match requested staff range at measure {midx}"
                )));
            }
            compiled_beat_tokens.push(staff_beat_groups.join("+"));

            let mut staff_selections = Vec::new();
            for (&staff_no, group) in staff_numbers.iter().zip(staff_beat_groups.iter()) {
                let beat_ranges = parse_beat_group(group, meter.count as f64)?;
                staff_selections.push(StaffSelection {
                    number: staff_no,
                    beat_ranges,
                });
            }

            measure_selections.push(MeasureSelection {
                index: midx,
                staves: staff_selections,
            });
        }

        let measures_compact = if range.len() == 1 {
            range[0].to_string()
        } else {
            format!("{}-{}", range[0], range[range.len() - 1])
        };
        let compiled = format!(
            "{}/{}/{}",
            measures_compact,
            compiled_staff_tokens.join(","),
            compiled_beat_tokens.join(",")
        );
        compiled_parts.push(compiled.clone());

        selections.push(Selection {
            measures: measure_selections,
            compiled,
        });
    }

    Ok(ParsedExpression {
        selections,
        completeness,
        compiled: compiled_parts.join(","),
    })
}

/// One maximal run of letters, or one maximal run of non-letters
/// (spec §4.2's `keyword` token vs. everything else: digits and the
/// delimiters `,-+@`). Chunking this way rather than a char-by-char
/// state machine means the keyword/non-keyword boundary is exactly the
/// alpha/non-alpha boundary -- numeric tokens never collide with
/// `start`/`end`/`all`.
fn chunk(input: &str) -> IResult<&str, &str> {
    alt((alpha1, is_not("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ")))(input)
}

/// Replaces the standalone word tokens `start`/`end`/`all` anywhere in
/// `s` with their resolved values, leaving digits and delimiters
/// untouched (spec §4.2 "Keyword substitution").
fn substitute_keywords(s: &str, start_val: &str, end_val: &str, all_val: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while !rest.is_empty() {
        let Ok((tail, piece)) = chunk(rest) else {
            break;
        };
        match piece {
            "start" => out.push_str(start_val),
            "end" => out.push_str(end_val),
            "all" => out.push_str(all_val),
            other => out.push_str(other),
        }
        rest = tail;
    }
    out
}

fn uint(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse)(input)
}

/// `range := lhs '-' rhs` over `int`, falling back to a single `int`
/// (spec §4.2 grammar).
fn int_range(input: &str) -> IResult<&str, (u32, u32)> {
    alt((
        map(separated_pair(uint, char('-'), uint), |(a, b)| (a, b)),
        map(uint, |v| (v, v)),
    ))(input)
}

fn expand_int_range(tok: &str) -> Result<(u32, u32)> {
    let tok = tok.trim();
    match nom::combinator::all_consuming(int_range)(tok) {
        Ok((_, pair)) => Ok(pair),
        Err(_) => Err(Error::BadRequest(format!("invalid integer range '{tok}'"))),
    }
}

fn float_num(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(pair(digit1, opt(pair(char('.'), digit1)))),
        str::parse,
    )(input)
}

/// `beat_range := lhs '-' rhs` over `number` (decimals permitted).
fn float_range(input: &str) -> IResult<&str, (f64, f64)> {
    alt((
        map(separated_pair(float_num, char('-'), float_num), |(a, b)| (a, b)),
        map(float_num, |v| (v, v)),
    ))(input)
}

/// One `@`-prefixed beat atom, e.g. `@1-2` or `@3.5`.
fn beat_token(input: &str) -> IResult<&str, (f64, f64)> {
    preceded(char('@'), float_range)(input)
}

/// Parses one `@`-prefixed beat group, e.g. `@1-2` or `@1-2@3.5`
/// (multiple ranges for the same staff, spec §3's `BeatRange` list).
fn parse_beat_group(group: &str, meter_count: f64) -> Result<Vec<BeatRange>> {
    let (rest, atoms) = many1(beat_token)(group)
        .map_err(|_| Error::BadRequest(format!("beat expression '{group}' must start with '@'")))?;
    if !rest.is_empty() {
        return Err(Error::BadRequest(format!("invalid beat expression '{group}'")));
    }

    let mut ranges = Vec::with_capacity(atoms.len());
    for (first, last) in atoms {
        if first < 1.0 || last < first {
            return Err(Error::BadRequest(format!("invalid beat range in '{group}'")));
        }
        if first > meter_count || last > meter_count {
            return Err(Error::BadRequest(format!(
                "beat range in '{group}' exceeds meter count {meter_count}"
            )));
        }
        ranges.push(BeatRange { first, last });
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docinfo::MeterInfo;
    use std::collections::BTreeMap;

    fn doc_info(measure_count: u32, staves: usize, meter_count: u32, meter_unit: u32) -> DocInfo {
        let mut staves_map = BTreeMap::new();
        staves_map.insert(0, (1..=staves as u32).map(|n| n.to_string()).collect());
        let mut beats_map = BTreeMap::new();
        beats_map.insert(
            0,
            MeterInfo {
                count: meter_count,
                unit: meter_unit,
            },
        );
        DocInfo {
            measure_count,
            measure_labels: (1..=measure_count).map(|n| n.to_string()).collect(),
            staves: staves_map,
            beats: beats_map,
        }
    }

    #[test]
    fn single_measure_single_staff_single_beat() {
        let info = doc_info(4, 2, 4, 4);
        let parsed = parse(&info, "1", "1", "@1-1", None).unwrap();
        assert_eq!(parsed.selections.len(), 1);
        let sel = &parsed.selections[0];
        assert_eq!(sel.measures.len(), 1);
        assert_eq!(sel.measures[0].index, 1);
        assert_eq!(sel.measures[0].staves.len(), 1);
        assert_eq!(sel.measures[0].staves[0].number, 1);
        assert_eq!(sel.measures[0].staves[0].beat_ranges[0].first, 1.0);
    }

    #[test]
    fn all_keyword_expands_full_range() {
        let info = doc_info(4, 2, 4, 4);
        let parsed = parse(&info, "all", "all", "@all", None).unwrap();
        assert_eq!(parsed.selections.len(), 1);
        assert_eq!(parsed.selections[0].measures.len(), 4);
        assert_eq!(parsed.selections[0].measures[0].staves.len(), 2);
    }

    #[test]
    fn non_contiguous_measures_yield_multiple_selections() {
        let info = doc_info(8, 2, 4, 4);
        let parsed = parse(&info, "1,3", "1,1", "@all,@all", None).unwrap();
        assert_eq!(parsed.selections.len(), 2);
        assert_eq!(parsed.selections[0].first_measure(), 1);
        assert_eq!(parsed.selections[1].first_measure(), 3);
    }

    #[test]
    fn adjacent_groups_merge_into_one_selection() {
        let info = doc_info(8, 2, 4, 4);
        let parsed = parse(&info, "1-2,3", "1", "@all", None).unwrap();
        assert_eq!(parsed.selections.len(), 1);
        assert_eq!(parsed.selections[0].measures.len(), 3);
    }

    #[test]
    fn plus_joins_staff_number_ranges() {
        let info = doc_info(2, 8, 4, 4);
        let parsed = parse(&info, "1", "1-3+5-8", "@all", None).unwrap();
        let staff_numbers: Vec<u32> = parsed.selections[0].measures[0]
            .staves
            .iter()
            .map(|s| s.number)
            .collect();
        assert_eq!(staff_numbers, vec![1, 2, 3, 5, 6, 7, 8]);
    }

    #[test]
    fn mismatched_staff_count_is_bad_request() {
        let info = doc_info(2, 2, 4, 4);
        let err = parse(&info, "1,2", "1,1,1", "@all", None).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn out_of_range_measure_is_out_of_bounds() {
        let info = doc_info(2, 2, 4, 4);
        let err = parse(&info, "5", "1", "@all", None).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds(_)));
    }

    #[test]
    fn beat_beyond_meter_count_is_bad_request() {
        let info = doc_info(2, 2, 4, 4);
        let err = parse(&info, "1", "1", "@1-9", None).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn compiled_expression_is_idempotent() {
        let info = doc_info(4, 2, 4, 4);
        let parsed = parse(&info, "1-2", "1,2", "@1-2,@1-4", None).unwrap();
        let compiled = parsed.selections[0].compiled.clone();
        let parts: Vec<&str> = compiled.splitn(3, '/').collect();
        let reparsed = parse(&info, parts[0], parts[1], parts[2], None).unwrap();
        assert_eq!(reparsed.selections[0].compiled, compiled);
    }

    #[test]
    fn completeness_parses_multiple_options() {
        let opts = CompletenessOptions::parse(Some("cut,nospace")).unwrap();
        assert!(opts.cut);
        assert!(opts.nospace);
        assert!(!opts.raw);
        assert!(!opts.signature);
    }
}
