//! The archive: day-rolled append-only event files, tee'd to a live pipe.

pub mod file_writer;
pub mod pipe_server;
pub mod writer;

pub use file_writer::{FileWriter, FileWriterError};
pub use pipe_server::{PipeClient, PipeServer};
pub use writer::{Writer, WriterError, WriterMetrics};
