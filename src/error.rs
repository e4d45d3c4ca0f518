use core::result;
use thiserror::Error;

pub type Result<T> = result::Result<T, Error>;

/// The four public failure kinds an EMA selection request can raise,
/// plus the internal causes that get folded into them at a boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed MEI document: {0}")]
    MalformedMei(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("out of bounds: {0}")]
    OutOfBounds(String),
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("integer parse error: {0}")]
    ParseInt(#[from] std::num::ParseIntError),
    #[error("float parse error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),
    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The status code a hosting HTTP layer should surface for this
    /// error, per spec §7. This is the entire extent of this crate's
    /// "HTTP support" -- no server lives here.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::BadRequest(_) | Error::OutOfBounds(_) => 400,
            Error::MalformedMei(_)
            | Error::UnsupportedEncoding(_)
            | Error::Xml(_)
            | Error::XmlWrite(_)
            | Error::Io(_)
            // Only reachable from a malformed meter declaration
            // (docinfo's meter.count/meter.unit parse) -- a document
            // defect, not a caller-supplied expression defect.
            | Error::ParseInt(_)
            | Error::ParseFloat(_) => 500,
        }
    }
}
