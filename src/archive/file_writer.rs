//! Single day-scoped append-only event file.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::codec::{CodecError, EventReader, EventWriter};
use crate::model::LogEvent;

#[derive(Debug, Error)]
pub enum FileWriterError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt record while recovering line count in {path}: {source}")]
    Recovery {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Appends encoded events to one file, tracking `current_line` and `bytes`.
pub struct FileWriter {
    path: PathBuf,
    writer: EventWriter<BufWriter<File>>,
    current_line: u64,
    bytes: u64,
}

impl FileWriter {
    /// Opens `path` for append, recovering `current_line` by replaying any
    /// existing records with [`EventReader::skip`]. A fresh path starts at
    /// line 0.
    pub fn open(path: &Path) -> Result<Self, FileWriterError> {
        let (current_line, bytes) = if path.exists() {
            Self::recover(path)?
        } else {
            (0, 0)
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| FileWriterError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if current_line > 0 {
            info!(path = %path.display(), current_line, "recovered day file");
        }

        Ok(Self {
            path: path.to_path_buf(),
            writer: EventWriter::new(BufWriter::new(file)),
            current_line,
            bytes,
        })
    }

    fn recover(path: &Path) -> Result<(u64, u64), FileWriterError> {
        let file = File::open(path).map_err(|source| FileWriterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = EventReader::new(BufReader::new(file));
        let mut lines = 0u64;
        loop {
            match reader.skip() {
                Ok(true) => lines += 1,
                Ok(false) => break,
                Err(source) => {
                    return Err(FileWriterError::Recovery {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }
        let bytes = std::fs::metadata(path)
            .map_err(|source| FileWriterError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        Ok((lines, bytes))
    }

    /// Appends `event`, returning its new line ordinal (the value
    /// `current_line` held before this write).
    pub fn write(&mut self, event: &LogEvent) -> Result<u64, FileWriterError> {
        let line = self.current_line;
        let n = self.writer.write(event)?;
        self.current_line += 1;
        self.bytes += n;
        Ok(line)
    }

    pub fn current_line(&self) -> u64 {
        self.current_line
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
