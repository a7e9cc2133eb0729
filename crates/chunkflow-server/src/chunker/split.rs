//! Record-preserving splitters for CSV and JSON sources
//!
//! Both splitters are synchronous and meant to run on a blocking thread over a
//! bridged object-store stream. They read the whole source before returning,
//! so a malformed document yields an error and no chunks at all.

use serde::de::{Error as _, SeqAccess, Visitor};
use serde::Deserializer as _;
use serde_json::value::RawValue;
use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
}

impl FileFormat {
    /// Format from the key's extension, ignoring case
    pub fn detect(file_key: &str) -> Option<Self> {
        let ext = Path::new(file_key).extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("csv") {
            Some(FileFormat::Csv)
        } else if ext.eq_ignore_ascii_case("json") {
            Some(FileFormat::Json)
        } else {
            None
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            FileFormat::Csv => "text/csv",
            FileFormat::Json => "application/json",
        }
    }

    pub fn split<R: Read>(&self, reader: R, chunk_size: usize) -> Result<Vec<Vec<u8>>, SplitError> {
        match self {
            FileFormat::Csv => split_csv(reader, chunk_size),
            FileFormat::Json => split_json(reader, chunk_size),
        }
    }
}

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("Chunk size must be at least 1")]
    ZeroChunkSize,

    #[error("Malformed CSV: {0}")]
    Csv(csv::Error),

    #[error("Malformed JSON: {0}")]
    Json(serde_json::Error),

    /// The underlying stream failed; the document itself may be fine
    #[error("Failed to read source: {0}")]
    Io(#[from] io::Error),
}

impl SplitError {
    pub fn is_io(&self) -> bool {
        matches!(self, SplitError::Io(_))
    }
}

impl From<csv::Error> for SplitError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            SplitError::Io(err.into())
        } else {
            SplitError::Csv(err)
        }
    }
}

impl From<serde_json::Error> for SplitError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            SplitError::Io(err.into())
        } else {
            SplitError::Json(err)
        }
    }
}

/// Group CSV records `chunk_size` at a time.
///
/// Every line is a record (there is no header handling) and all records must
/// have the same number of fields. Blank lines are skipped. Each chunk is
/// re-serialized as standalone CSV.
pub fn split_csv<R: Read>(reader: R, chunk_size: usize) -> Result<Vec<Vec<u8>>, SplitError> {
    if chunk_size == 0 {
        return Err(SplitError::ZeroChunkSize);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(reader);

    let mut chunks = Vec::new();
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut in_chunk = 0;
    let mut record = csv::ByteRecord::new();

    while reader.read_byte_record(&mut record)? {
        writer.write_byte_record(&record)?;
        in_chunk += 1;

        if in_chunk == chunk_size {
            let full = std::mem::replace(&mut writer, csv::Writer::from_writer(Vec::new()));
            chunks.push(finish_csv(full)?);
            in_chunk = 0;
        }
    }

    if in_chunk > 0 {
        chunks.push(finish_csv(writer)?);
    }

    Ok(chunks)
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, SplitError> {
    writer
        .into_inner()
        .map_err(|e| SplitError::Io(io::Error::new(e.error().kind(), e.error().to_string())))
}

/// Slice a top-level JSON array into sub-arrays of at most `chunk_size`
/// elements. Elements keep their original bytes; anything other than a single
/// array (including trailing content) is an error.
pub fn split_json<R: Read>(reader: R, chunk_size: usize) -> Result<Vec<Vec<u8>>, SplitError> {
    if chunk_size == 0 {
        return Err(SplitError::ZeroChunkSize);
    }

    let mut de = serde_json::Deserializer::from_reader(io::BufReader::new(reader));
    let chunks = (&mut de).deserialize_seq(ArrayChunker { chunk_size })?;
    de.end()?;

    Ok(chunks)
}

struct ArrayChunker {
    chunk_size: usize,
}

impl<'de> Visitor<'de> for ArrayChunker {
    type Value = Vec<Vec<u8>>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a top-level JSON array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut chunks = Vec::new();
        let mut pending: Vec<Box<RawValue>> = Vec::with_capacity(self.chunk_size.min(1024));

        while let Some(element) = seq.next_element::<Box<RawValue>>()? {
            pending.push(element);
            if pending.len() == self.chunk_size {
                chunks.push(serde_json::to_vec(&pending).map_err(A::Error::custom)?);
                pending.clear();
            }
        }

        if !pending.is_empty() {
            chunks.push(serde_json::to_vec(&pending).map_err(A::Error::custom)?);
        }

        Ok(chunks)
    }
}
