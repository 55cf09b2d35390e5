//! Sources of raw document text.

use crate::error::Result;
use crate::schema::TextSegment;
use log::info;
use std::path::{Path, PathBuf};

/// Yields the ordered text segments of one document. Segments may be empty.
pub trait SegmentProducer {
    fn extract(&self) -> Result<Vec<TextSegment>>;
}

/// Segments already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySegments {
    segments: Vec<TextSegment>,
}

impl InMemorySegments {
    pub fn new(segments: Vec<TextSegment>) -> Self {
        Self { segments }
    }
}

impl SegmentProducer for InMemorySegments {
    fn extract(&self) -> Result<Vec<TextSegment>> {
        Ok(self.segments.clone())
    }
}

/// A UTF-8 text file, one segment per page. Pages are separated by form feeds,
/// as written by `pdftotext` and similar tools.
#[derive(Debug, Clone)]
pub struct TextFileProducer {
    path: PathBuf,
}

impl TextFileProducer {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

pub fn split_pages(text: &str) -> Vec<TextSegment> {
    text.split('\x0c').map(str::to_string).collect()
}

impl SegmentProducer for TextFileProducer {
    fn extract(&self) -> Result<Vec<TextSegment>> {
        let text = std::fs::read_to_string(&self.path)?;
        let pages = split_pages(&text);
        info!("Read {} pages from {}", pages.len(), self.path.display());
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;

    #[test]
    fn test_split_pages() {
        let pages = split_pages("page one\x0cpage two\x0c");
        assert_eq!(pages, vec!["page one", "page two", ""]);
        assert_eq!(split_pages(""), vec![""]);
    }

    #[test]
    fn test_text_file_producer() {
        let path = std::env::temp_dir().join(format!(
            "income-statement-reconciler-{}.txt",
            std::process::id()
        ));
        std::fs::write(&path, "Statement of Profit and Loss\x0cBalance Sheet").unwrap();

        let segments = TextFileProducer::new(&path).extract().unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1], "Balance Sheet");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = TextFileProducer::new("/definitely/not/here.txt").extract();
        assert!(matches!(result, Err(ReconcileError::IoError(_))));
    }
}
