//! Streaming CSV reader
//!
//! Reads a provider export one record at a time. The first record is the
//! header row; its fields are normalized (trimmed, lowercased, whitespace runs
//! collapsed) so formatters can look columns up by name regardless of how the
//! provider capitalised or padded them. Every data row is zipped positionally
//! with the header into a [`RawRow`].

use csv::{ReaderBuilder, StringRecord};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

const BOM: char = '\u{feff}';

/// Normalize a header name: trim, lowercase, collapse internal whitespace
pub fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches(BOM)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalize a list of header names
pub fn normalize_headers<S: AsRef<str>>(headers: &[S]) -> Vec<String> {
    headers.iter().map(|h| normalize_header(h.as_ref())).collect()
}

/// Check that every required header (normalized) is present in `actual`
///
/// `actual` is expected to be already normalized, as returned by
/// [`CsvStream::read_header`].
pub fn validate_headers<S: AsRef<str>>(required: &[S], actual: &[String]) -> Result<()> {
    let missing: Vec<String> = normalize_headers(required)
        .into_iter()
        .filter(|r| !actual.contains(r))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidHeaders { missing })
    }
}

/// One data row keyed by normalized header name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    line: u64,
    fields: Vec<(String, String)>,
}

impl RawRow {
    /// Build a row from headers and values of equal length
    pub fn new(line: u64, headers: &[String], values: &[&str]) -> Self {
        let fields = headers
            .iter()
            .zip(values)
            .map(|(h, v)| (h.clone(), v.trim().to_string()))
            .collect();
        Self { line, fields }
    }

    /// Source line number (1-based, header is line 1)
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Value for a column, if the column exists
    pub fn get(&self, name: &str) -> Option<&str> {
        let key = normalize_header(name);
        self.fields
            .iter()
            .find(|(h, _)| *h == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value for a column, treating an empty string as absent
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The row as a JSON object, kept with the transaction for audit
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (header, value) in &self.fields {
            map.insert(header.clone(), Value::String(value.clone()));
        }
        Value::Object(map)
    }
}

/// A CSV source read record by record
///
/// The underlying reader (usually a [`File`]) is owned by the stream and
/// released when the stream is dropped.
pub struct CsvStream<R: Read> {
    reader: csv::Reader<R>,
    headers: Option<Vec<String>>,
    record: StringRecord,
}

impl CsvStream<File> {
    /// Open a CSV file for streaming
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> CsvStream<R> {
    pub fn from_reader(reader: R) -> Self {
        // Headers are handled here rather than by the csv crate so that
        // field-count mismatches surface as InvalidRow with a line number.
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        Self {
            reader,
            headers: None,
            record: StringRecord::new(),
        }
    }

    /// Read and normalize the header row
    ///
    /// Returns an empty list for an empty file. Calling this again returns
    /// the headers read the first time.
    pub fn read_header(&mut self) -> Result<Vec<String>> {
        if let Some(headers) = &self.headers {
            return Ok(headers.clone());
        }

        let headers = if self.reader.read_record(&mut self.record)? {
            self.record.iter().map(normalize_header).collect()
        } else {
            Vec::new()
        };

        self.headers = Some(headers.clone());
        Ok(headers)
    }

    /// Normalized headers, if the header row has been read
    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    /// Read the next data row, or `None` at end of stream
    pub fn read_row(&mut self) -> Result<Option<RawRow>> {
        if self.headers.is_none() {
            self.read_header()?;
        }

        if !self.reader.read_record(&mut self.record)? {
            return Ok(None);
        }

        let headers = self.headers.as_deref().unwrap_or_default();
        let line = self.record.position().map(|p| p.line()).unwrap_or(0);

        if self.record.len() != headers.len() {
            return Err(Error::InvalidRow {
                line,
                expected: headers.len(),
                found: self.record.len(),
            });
        }

        let values: Vec<&str> = self.record.iter().collect();
        Ok(Some(RawRow::new(line, headers, &values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn stream(data: &str) -> CsvStream<&[u8]> {
        CsvStream::from_reader(data.as_bytes())
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header(" Date "), "date");
        assert_eq!(normalize_header("AMOUNT"), "amount");
        assert_eq!(
            normalize_header("Appears  On Your\tStatement As"),
            "appears on your statement as"
        );
        assert_eq!(normalize_header("\u{feff}Date"), "date");
    }

    #[test]
    fn test_messy_headers_validate() {
        let mut s = stream(" Date , description ,AMOUNT, Reference \n");
        let headers = s.read_header().unwrap();
        assert_eq!(headers, vec!["date", "description", "amount", "reference"]);
        validate_headers(&["Date", "Description", "Amount", "Reference"], &headers).unwrap();
    }

    #[test]
    fn test_missing_header_reported() {
        let headers = normalize_headers(&["Date", "Description", "Amount"]);
        let err = validate_headers(&["Date", "Amount", "Reference"], &headers).unwrap_err();
        match err {
            Error::InvalidHeaders { missing } => assert_eq!(missing, vec!["reference"]),
            other => panic!("expected InvalidHeaders, got {:?}", other),
        }
    }

    #[test]
    fn test_read_rows_trims_and_zips() {
        let mut s = stream("Date,Description,Amount\n02/11/2025,  ACME STORE  , 42.50\n");
        s.read_header().unwrap();

        let row = s.read_row().unwrap().unwrap();
        assert_eq!(row.get("date"), Some("02/11/2025"));
        assert_eq!(row.get("Description"), Some("ACME STORE"));
        assert_eq!(row.get("amount"), Some("42.50"));
        assert_eq!(row.get("category"), None);
        assert_eq!(row.line(), 2);

        assert!(s.read_row().unwrap().is_none());
    }

    #[test]
    fn test_read_row_reads_header_lazily() {
        let mut s = stream("A,B\n1,2\n");
        let row = s.read_row().unwrap().unwrap();
        assert_eq!(row.get("b"), Some("2"));
        assert_eq!(s.headers().unwrap(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_field_count_mismatch() {
        let mut s = stream("A,B,C\n1,2,3\n1,2\n");
        s.read_header().unwrap();
        assert!(s.read_row().unwrap().is_some());

        match s.read_row().unwrap_err() {
            Error::InvalidRow {
                line,
                expected,
                found,
            } => {
                assert_eq!(line, 3);
                assert_eq!(expected, 3);
                assert_eq!(found, 2);
            }
            other => panic!("expected InvalidRow, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_file() {
        let mut s = stream("");
        assert!(s.read_header().unwrap().is_empty());
        assert!(s.read_row().unwrap().is_none());
    }

    #[test]
    fn test_get_non_empty() {
        let mut s = stream("Town/City,Postcode\nLONDON,\n");
        let row = s.read_row().unwrap().unwrap();
        assert_eq!(row.get_non_empty("town/city"), Some("LONDON"));
        assert_eq!(row.get("postcode"), Some(""));
        assert_eq!(row.get_non_empty("postcode"), None);
    }

    #[test]
    fn test_to_json() {
        let mut s = stream("Date,Amount\n01/01/2025,1.00\n");
        let row = s.read_row().unwrap().unwrap();
        let json = row.to_json();
        assert_eq!(json["date"], "01/01/2025");
        assert_eq!(json["amount"], "1.00");
    }

    #[test]
    fn test_open_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "\u{feff}Date,Reference\n01/01/2025,'TX1'\n").unwrap();

        let mut s = CsvStream::open(file.path()).unwrap();
        assert_eq!(s.read_header().unwrap(), vec!["date", "reference"]);
        let row = s.read_row().unwrap().unwrap();
        assert_eq!(row.get("reference"), Some("'TX1'"));
    }

    #[test]
    fn test_open_missing_file() {
        let result = CsvStream::open("/nonexistent/tally/file.csv");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
