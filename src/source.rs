//! Line sources for raw event logs
//!
//! Plain text, gzip and zstd files all come back as a `BufRead`, so the
//! ingestion phase only ever iterates lines.

use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// Encoding of an input log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Text,
    Gzip,
    Zstd,
}

impl FileType {
    /// Guess from the file extension, defaulting to plain text
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") | Some("gzip") => FileType::Gzip,
            Some("zst") | Some("zstd") => FileType::Zstd,
            _ => FileType::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Text => "text",
            FileType::Gzip => "gzip",
            FileType::Zstd => "zstd",
        }
    }
}

impl FromStr for FileType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(FileType::Text),
            "gz" | "gzip" => Ok(FileType::Gzip),
            "zst" | "zstd" => Ok(FileType::Zstd),
            other => bail!("unknown file type '{}' (expected text, gzip or zstd)", other),
        }
    }
}

/// Open `path` as a buffered line reader, decompressing as needed
pub fn open_lines(path: &Path, file_type: FileType) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open input file {}", path.display()))?;

    let reader: Box<dyn BufRead> = match file_type {
        FileType::Text => Box::new(BufReader::new(file)),
        FileType::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(file))),
        FileType::Zstd => Box::new(BufReader::new(
            zstd::Decoder::new(file).context("Failed to start zstd decoder")?,
        )),
    };

    Ok(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(FileType::detect(Path::new("logs.gz")), FileType::Gzip);
        assert_eq!(FileType::detect(Path::new("logs.jsonl.zst")), FileType::Zstd);
        assert_eq!(FileType::detect(Path::new("logs.jsonl")), FileType::Text);
        assert_eq!(FileType::detect(Path::new("logs")), FileType::Text);
    }

    #[test]
    fn test_parse_file_type() {
        assert_eq!("txt".parse::<FileType>().unwrap(), FileType::Text);
        assert_eq!("GZIP".parse::<FileType>().unwrap(), FileType::Gzip);
        assert!("bz2".parse::<FileType>().is_err());
    }

    #[test]
    fn test_reads_gzip_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.gz");

        let mut encoder = flate2::write::GzEncoder::new(
            File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        encoder.write_all(b"first\nsecond\n").unwrap();
        encoder.finish().unwrap();

        let lines: Vec<String> = open_lines(&path, FileType::Gzip)
            .unwrap()
            .lines()
            .collect::<std::io::Result<_>>()
            .unwrap();
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn test_reads_zstd_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.zst");

        let compressed = zstd::encode_all(&b"only line\n"[..], 0).unwrap();
        std::fs::write(&path, compressed).unwrap();

        let lines: Vec<String> = open_lines(&path, FileType::Zstd)
            .unwrap()
            .lines()
            .collect::<std::io::Result<_>>()
            .unwrap();
        assert_eq!(lines, vec!["only line"]);
    }
}
