//! JSON and JSON Lines output for caption records.

use serde::Serialize;
use std::io::{self, Write};
use std::str::FromStr;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// A single JSON value; batches become an array
    #[default]
    Json,
    /// One JSON object per line
    JsonLines,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "jsonl" | "ndjson" => Ok(Self::JsonLines),
            other => Err(format!("Unknown output format '{other}' (expected json or jsonl)")),
        }
    }
}

/// Serializes records to a writer.
///
/// In JSON mode a batch is buffered by the caller and written once with
/// [`OutputWriter::write_all`]; JSONL can be streamed record by record.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
}

impl<W: Write> OutputWriter<W> {
    /// `pretty` only affects JSON mode.
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Write one record followed by a newline.
    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        if self.pretty && self.format == OutputFormat::Json {
            serde_json::to_writer_pretty(&mut self.writer, item)
        } else {
            serde_json::to_writer(&mut self.writer, item)
        }
        .map_err(io::Error::other)?;
        writeln!(self.writer)
    }

    /// Write a batch: a JSON array, or one line per record.
    pub fn write_all<T: Serialize>(&mut self, items: &[T]) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => self.write(&items),
            OutputFormat::JsonLines => items.iter().try_for_each(|item| self.write(item)),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CaptionRecord;
    use std::path::PathBuf;

    fn record(name: &str, caption: &str) -> CaptionRecord {
        CaptionRecord {
            file_path: PathBuf::from(format!("/data/{name}")),
            file_name: name.to_string(),
            width: 8,
            height: 8,
            format: "png".to_string(),
            caption: caption.to_string(),
            sidecar_path: None,
        }
    }

    #[test]
    fn test_write_json_array() {
        let mut buffer = Vec::new();
        let mut writer = OutputWriter::new(&mut buffer, OutputFormat::Json, false);
        writer
            .write_all(&[record("a.png", "a cat"), record("b.png", "a dog")])
            .unwrap();

        let output = String::from_utf8(buffer).unwrap();
        let parsed: Vec<CaptionRecord> = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].caption, "a dog");
    }

    #[test]
    fn test_write_jsonl_ignores_pretty() {
        let mut buffer = Vec::new();
        let mut writer = OutputWriter::new(&mut buffer, OutputFormat::JsonLines, true);
        writer
            .write_all(&[record("a.png", "a cat"), record("b.png", "a dog")])
            .unwrap();

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: CaptionRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.file_name, "a.png");
    }

    #[test]
    fn test_pretty_json_single_record() {
        let mut buffer = Vec::new();
        let mut writer = OutputWriter::new(&mut buffer, OutputFormat::Json, true);
        writer.write(&record("a.png", "a cat")).unwrap();

        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("\n  \"caption\": \"a cat\""));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("json".parse(), Ok(OutputFormat::Json));
        assert_eq!("JSONL".parse(), Ok(OutputFormat::JsonLines));
        assert!("csv".parse::<OutputFormat>().is_err());
    }
}
