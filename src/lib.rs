#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! esologs library — archive writer, index, formatter, stalker, and router.
//!
//! This library re-exports the key building blocks:
//! - `archive` — day-rolled append-only event files and the live tee pipe
//! - `codec` — framed on-disk event encoding
//! - `clock` — testable time source
//! - `config` — configuration loading
//! - `index` — directory scan and neighbor lookup over the archive
//! - `format` — HTML/text/raw rendering
//! - `stalker` — reconnecting pipe client, ring buffer, websocket fan-out
//! - `router` — HTTP routing and conditional GET
//! - `state` — process-wide metrics and health state

pub mod archive;
pub mod clock;
pub mod codec;
pub mod config;
pub mod format;
pub mod index;
pub mod model;
pub mod router;
pub mod stalker;
pub mod state;

// Re-export key types at crate root for convenience.
pub use config::Config;
pub use model::{Direction, EventId, FileInfo, LogEvent, Ymd};
