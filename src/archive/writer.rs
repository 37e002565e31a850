//! Day-rolling front-end over [`FileWriter`]; time assignment; tee to pipe.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::archive::file_writer::{FileWriter, FileWriterError};
use crate::archive::pipe_server::PipeServer;
use crate::clock::{floor_days, Clock};
use crate::model::{EventId, LogEvent, Ymd};

#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error(transparent)]
    File(#[from] FileWriterError),
}

/// Optional hot-path metrics the writer stamps on every successful write.
/// Kept as a trait so the `metrics` feature can be compiled out entirely.
pub trait WriterMetrics: Send + Sync {
    fn record_write(&self, now_unix_secs: i64);
}

fn day_path(root: &std::path::Path, ymd: Ymd) -> PathBuf {
    root.join(ymd.year.to_string())
        .join(ymd.month.to_string())
        .join(format!("{}.pb", ymd.day))
}

/// Owns one [`FileWriter`] at a time for a single target, rolling to a new
/// day file as wall-clock time crosses a UTC day boundary.
pub struct Writer {
    target: String,
    root: PathBuf,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<dyn WriterMetrics>>,
    current_day: Option<i64>,
    file: Option<FileWriter>,
}

impl Writer {
    pub fn new(target: impl Into<String>, root: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            target: target.into(),
            root,
            clock,
            metrics: None,
            current_day: None,
            file: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn WriterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Assigns `time_us`, rolls the day file if needed, appends the event,
    /// and — if `pipe` is supplied — stamps `event_id` and tees a copy to it.
    pub async fn write(
        &mut self,
        mut event: LogEvent,
        pipe: Option<&PipeServer>,
    ) -> Result<(), WriterError> {
        let now_us = self.clock.now_us();
        let (day, time_us) = floor_days(now_us);

        if self.current_day != Some(day) {
            self.roll_to(day)?;
        }

        event.time_us = time_us;
        let file = self.file.as_mut().expect("rolled above");
        let line = file.write(&event)?;

        if let Some(pipe) = pipe {
            event.event_id = Some(EventId {
                target: self.target.clone(),
                day,
                line,
            });
            pipe.write(&event).await;
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_write(self.clock.now_unix_secs());
        }

        Ok(())
    }

    fn roll_to(&mut self, day: i64) -> Result<(), WriterError> {
        let ymd = Ymd::from_day_number(day);
        let path = day_path(&self.root, ymd);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| {
                WriterError::File(FileWriterError::Io {
                    path: path.clone(),
                    source,
                })
            })?;
        }
        info!(target = %self.target, day = %format!("{}-{}-{}", ymd.year, ymd.month, ymd.day), "rolling to new day file");
        self.file = Some(FileWriter::open(&path)?);
        self.current_day = Some(day);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::clock::US_PER_DAY;

    fn event() -> LogEvent {
        LogEvent::new(Some("alice!u@h".into()), "PRIVMSG", vec!["#c".into(), "hi".into()])
    }

    #[tokio::test]
    async fn writes_land_in_day_file() {
        let dir = tempfile::tempdir().unwrap();
        let day_number = Ymd::new(2024, 1, 15).day_number();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(day_number * US_PER_DAY + 43_200_250_000));
        let mut writer = Writer::new("t", dir.path().to_path_buf(), clock);

        writer.write(event(), None).await.unwrap();

        let path = dir.path().join("2024").join("1").join("15.pb");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn day_rollover_starts_new_file_at_line_zero() {
        let dir = tempfile::tempdir().unwrap();
        let day_number = Ymd::new(2024, 1, 15).day_number();
        let clock = Arc::new(FixedClock::new(day_number * US_PER_DAY));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let mut writer = Writer::new("t", dir.path().to_path_buf(), dyn_clock);

        writer.write(event(), None).await.unwrap();
        writer.write(event(), None).await.unwrap();

        clock.advance(US_PER_DAY);
        writer.write(event(), None).await.unwrap();

        let day16 = dir.path().join("2024").join("1").join("16.pb");
        assert!(day16.exists());
        let mut reader =
            crate::codec::EventReader::new(std::io::BufReader::new(std::fs::File::open(&day16).unwrap()));
        let mut count = 0;
        while reader.skip().unwrap() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn pipe_tee_stamps_event_id() {
        let dir = tempfile::tempdir().unwrap();
        let day_number = Ymd::new(2024, 1, 15).day_number();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(day_number * US_PER_DAY));
        let mut writer = Writer::new("t", dir.path().to_path_buf(), clock);
        let pipe = PipeServer::new();

        writer.write(event(), Some(&pipe)).await.unwrap();
        writer.write(event(), Some(&pipe)).await.unwrap();
    }
}
