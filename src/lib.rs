//! A musical-notation addressing engine over MEI (Music Encoding
//! Initiative) XML documents.
//!
//! Given an MEI document and an address expression naming measures,
//! staves, and beats (plus an optional completeness modifier), this
//! crate returns a new, well-formed MEI document containing exactly
//! the addressed notation -- with correct handling of elements that
//! span beyond the selection (slurs, ties, hairpins, tempo directives)
//! and optional truncation/padding to preserve rhythmic bar lengths.
//!
//! This is the selection engine only: expression parsing, document
//! inspection, and the tree surgery that produces the sliced
//! document. An HTTP front end, URL decoding, and file fetching are
//! external collaborators that call into this library; none of that
//! lives here.
//!
//! ```text
//! raw MEI bytes -> MeiTree::parse -> docinfo::compute -> expression::parse
//!               -> slicer::slice -> MeiTree::serialize
//! ```

pub mod docinfo;
pub mod error;
pub mod expression;
pub mod serializer;
pub mod slicer;
pub mod spanner;
pub mod tree;

use std::collections::BTreeMap;

pub use docinfo::{compute as compute_doc_info, DocInfo, MeterInfo};
pub use error::{Error, Result};
pub use expression::{parse as parse_expression, CompletenessOptions, ParsedExpression, Selection};
pub use tree::MeiTree;

/// Special-case measures/staves/beats expression that returns the
/// document unchanged, bypassing the selection engine entirely
/// (spec §6).
pub const IDENTITY_MEASURES: &str = "all";
pub const IDENTITY_STAVES: &str = "all";
pub const IDENTITY_BEATS: &str = "@all";

/// The literal `completeness` value that asks for the canonical
/// expression instead of a sliced document (spec §6).
pub const COMPILE_SENTINEL: &str = "compile";

/// What a hosting address handler should do with a request, once the
/// `completeness` field has been inspected: produce a sliced MEI
/// document, or just report the canonical form of the expression
/// without touching the tree. Parsing `compile` changes the *response
/// kind*, not a processing option, so it is not a `CompletenessOptions`
/// bit (spec §6, §4.2 point 7).
#[derive(Debug, Clone)]
pub enum ResponseKind {
    Mei(Vec<u8>),
    Compiled(String),
}

/// Runs the full pipeline (spec §2's data flow) on already-parsed
/// `doc_info` and a raw measures/staves/beats/completeness request,
/// returning the response a hosting HTTP handler would serialize.
///
/// `original_bytes` is the exact input the caller parsed `tree` from.
/// It is needed verbatim (not re-derived from `tree`) for spec §6's
/// identity special case, which returns the original MEI bytes
/// unmodified -- re-serializing the parsed tree is not byte-identical
/// (it normalizes the XML declaration and drops comments/PIs that
/// `MeiTree::parse` never retains), so that path must short-circuit
/// before the tree is touched at all.
///
/// `completeness_str` may be the literal `"compile"`, in which case no
/// mutation happens and the canonical expression is returned instead.
pub fn handle_address(
    tree: MeiTree,
    original_bytes: &[u8],
    doc_info: &DocInfo,
    measures_str: &str,
    staves_str: &str,
    beats_str: &str,
    completeness_str: Option<&str>,
) -> Result<ResponseKind> {
    if measures_str == IDENTITY_MEASURES && staves_str == IDENTITY_STAVES && beats_str == IDENTITY_BEATS
    {
        return Ok(ResponseKind::Mei(original_bytes.to_vec()));
    }

    let want_compile = completeness_str == Some(COMPILE_SENTINEL);
    let completeness_arg = if want_compile { None } else { completeness_str };

    let parsed = expression::parse(doc_info, measures_str, staves_str, beats_str, completeness_arg)?;

    if want_compile {
        return Ok(ResponseKind::Compiled(parsed.compiled));
    }

    let sliced = slicer::slice(tree, doc_info, &parsed.selections, parsed.completeness)?;
    Ok(ResponseKind::Mei(sliced.serialize()?))
}

/// A plain (`serde`-free) mirror of [`DocInfo`], shaped like spec §6's
/// `info.json` body. Spec places the HTTP/JSON surface itself on an
/// external collaborator; this struct is the data a host would encode,
/// not the encoding.
#[derive(Debug, Clone)]
pub struct DocInfoSummary {
    pub measures: u32,
    pub measure_labels: Vec<String>,
    pub staves: BTreeMap<u32, Vec<String>>,
    pub beats: BTreeMap<u32, MeterInfo>,
    pub completeness: [&'static str; 4],
}

impl From<&DocInfo> for DocInfoSummary {
    fn from(info: &DocInfo) -> Self {
        DocInfoSummary {
            measures: info.measure_count,
            measure_labels: info.measure_labels.clone(),
            staves: info.staves.clone(),
            beats: info.beats.clone(),
            completeness: ["raw", "signature", "nospace", "cut"],
        }
    }
}
