use memmap::Mmap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SPACE: u8 = b' ';
pub const TAB: u8 = b'\t';
pub const LINE_FEED: u8 = b'\n';

#[derive(Debug, Error)]
pub enum TokenizeError {
    #[error("failed to open {path:?}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to read metadata of {path:?}: {source}")]
    Metadata { path: PathBuf, source: io::Error },

    #[error("failed to memory map {path:?}: {source}")]
    Map { path: PathBuf, source: io::Error },
}

/// Maps whitespace source to the symbol stream the decoder consumes: space becomes `A`, tab `B`
/// and line feed `C`. Every other byte is a comment and dropped.
pub fn tokenize(source: &[u8]) -> String {
    source
        .iter()
        .filter_map(|byte| match *byte {
            SPACE => Some('A'),
            TAB => Some('B'),
            LINE_FEED => Some('C'),
            _ => None,
        })
        .collect()
}

/// Reads and tokenizes a whitespace source file from disk
pub fn load(path: impl AsRef<Path>) -> Result<String, TokenizeError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| TokenizeError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    // mapping a zero length file fails on some platforms
    let metadata = file.metadata().map_err(|source| TokenizeError::Metadata {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.len() == 0 {
        return Ok(String::new());
    }
    let source = unsafe {
        Mmap::map(&file).map_err(|source| TokenizeError::Map {
            path: path.to_path_buf(),
            source,
        })?
    };

    Ok(tokenize(&source))
}
