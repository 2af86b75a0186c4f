//! Sales order and purchase order identifiers
//!
//! Formats consumed by reporting and receiving:
//! - `SO-YYYYMMDD-<n>` where `n` restarts at 1 every UTC day
//! - `PO-YYYYMMDD-<n>-<SupplierCode>` derived from the owning SO number

use chrono::NaiveDate;
use thiserror::Error;

const SO_PREFIX: &str = "SO";
const PO_PREFIX: &str = "PO";
const DATE_FORMAT: &str = "%Y%m%d";

/// Errors raised while parsing or deriving identifiers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("malformed SO number: {0}")]
    MalformedSoNumber(String),

    #[error("invalid supplier code: {0:?}")]
    InvalidSupplierCode(String),

    #[error("sequence number must be positive")]
    ZeroSequence,
}

/// A parsed SO number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SoNumber {
    pub date: NaiveDate,
    pub sequence: u32,
}

impl SoNumber {
    pub fn new(date: NaiveDate, sequence: u32) -> Result<Self, IdentifierError> {
        if sequence == 0 {
            return Err(IdentifierError::ZeroSequence);
        }
        Ok(Self { date, sequence })
    }
}

impl std::fmt::Display for SoNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            SO_PREFIX,
            self.date.format(DATE_FORMAT),
            self.sequence
        )
    }
}

impl std::str::FromStr for SoNumber {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_so_number(s)
    }
}

/// Format an SO number for the given UTC day and sequence
pub fn format_so_number(date: NaiveDate, sequence: u32) -> Result<String, IdentifierError> {
    Ok(SoNumber::new(date, sequence)?.to_string())
}

/// Parse `SO-YYYYMMDD-n`
pub fn parse_so_number(value: &str) -> Result<SoNumber, IdentifierError> {
    let malformed = || IdentifierError::MalformedSoNumber(value.to_string());

    let mut parts = value.trim().splitn(3, '-');
    let (prefix, date_part, seq_part) = match (parts.next(), parts.next(), parts.next()) {
        (Some(p), Some(d), Some(s)) => (p, d, s),
        _ => return Err(malformed()),
    };

    if prefix != SO_PREFIX || date_part.len() != 8 || seq_part.is_empty() {
        return Err(malformed());
    }
    if !seq_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed());
    }

    let date = NaiveDate::parse_from_str(date_part, DATE_FORMAT).map_err(|_| malformed())?;
    let sequence: u32 = seq_part.parse().map_err(|_| malformed())?;

    SoNumber::new(date, sequence).map_err(|_| malformed())
}

/// Derive the PO number for one supplier's share of a sales order.
///
/// Pure string transform: the same SO number and supplier code always
/// yield the same PO number.
pub fn generate_po_number(so_number: &str, supplier_code: &str) -> Result<String, IdentifierError> {
    validate_supplier_code(supplier_code)?;
    let so = parse_so_number(so_number)?;

    Ok(format!(
        "{}-{}-{}-{}",
        PO_PREFIX,
        so.date.format(DATE_FORMAT),
        so.sequence,
        supplier_code
    ))
}

/// Supplier codes are the trailing segment of a PO number and must not contain separators
pub fn validate_supplier_code(code: &str) -> Result<(), IdentifierError> {
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(IdentifierError::InvalidSupplierCode(code.to_string()));
    }
    Ok(())
}
