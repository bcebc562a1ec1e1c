//! Compact JSON serialization for report files.

use serde::Serialize;
use std::io::{self, Write};

/// Writes each item as one line of compact JSON.
///
/// A snapshot is a single item; the flush history is one item per flush.
pub struct OutputWriter<W: Write> {
    writer: W,
}

impl<W: Write> OutputWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a single item followed by a newline.
    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
        writeln!(self.writer)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        text: String,
        score: f32,
    }

    #[test]
    fn test_document_is_compact() {
        let mut buffer = Vec::new();
        let mut writer = OutputWriter::new(&mut buffer);
        writer
            .write(&vec![Row {
                text: "red car".to_string(),
                score: 0.5,
            }])
            .unwrap();
        drop(writer);

        let output = String::from_utf8(buffer).unwrap();
        assert_eq!(output, "[{\"text\":\"red car\",\"score\":0.5}]\n");
    }

    #[test]
    fn test_one_line_per_item() {
        let mut buffer = Vec::new();
        let mut writer = OutputWriter::new(&mut buffer);
        for i in 0..3 {
            writer
                .write(&Row {
                    text: format!("t{i}"),
                    score: 0.1,
                })
                .unwrap();
        }
        drop(writer);

        let output = String::from_utf8(buffer).unwrap();
        assert_eq!(output.lines().count(), 3);
    }
}
