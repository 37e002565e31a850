//! Directory scan, in-memory sorted day list, neighbor lookup, stat.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

use crate::clock::Clock;
use crate::model::{FileInfo, Ymd};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("i/o error scanning {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o error opening day file: {0}")]
    Open(#[from] std::io::Error),
}

const RESCAN_INTERVAL_SECS: i64 = 30;
const FREEZE_GRACE_SECS: i64 = 24 * 3600 + 5 * 60;

struct State {
    days: Vec<Ymd>,
    last_scan_secs: Option<i64>,
}

/// One target's view of its archive root: a sorted list of known day files,
/// refreshed incrementally.
pub struct Index {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl Index {
    /// Constructs the index, performing an initial full scan.
    pub async fn new(root: PathBuf, clock: Arc<dyn Clock>) -> Result<Self, IndexError> {
        let index = Self {
            root,
            clock,
            state: Mutex::new(State {
                days: Vec::new(),
                last_scan_secs: None,
            }),
        };
        index.scan(true).await?;
        Ok(index)
    }

    /// Rescans if more than 30s have passed since the last scan.
    pub async fn refresh(&self) -> Result<(), IndexError> {
        let should_scan = {
            let state = self.state.lock().await;
            match state.last_scan_secs {
                None => true,
                Some(last) => self.clock.now_unix_secs() - last >= RESCAN_INTERVAL_SECS,
            }
        };
        if should_scan {
            self.scan(false).await?;
        }
        Ok(())
    }

    async fn scan(&self, full: bool) -> Result<(), IndexError> {
        let mut state = self.state.lock().await;
        state.last_scan_secs = Some(self.clock.now_unix_secs());
        if full {
            state.days.clear();
        }

        let lower = state.days.last().copied().unwrap_or(Ymd::new(0, 0, 0));

        let mut years = read_numeric_entries(&self.root).await?;
        years.retain(|&y| y >= lower.year);
        years.sort_unstable();

        let mut found = Vec::new();
        for year in years {
            let y_dir = self.root.join(year.to_string());
            let mut months = read_numeric_entries(&y_dir).await?;
            months.retain(|&m| year > lower.year || m >= lower.month);
            months.sort_unstable();

            for month in months {
                let m_dir = y_dir.join(month.to_string());
                let mut days = read_day_file_entries(&m_dir).await?;
                days.retain(|&d| year > lower.year || month > lower.month || d > lower.day);
                days.sort_unstable();

                for day in days {
                    found.push(Ymd::new(year, month, day));
                }
            }
        }

        state.days.extend(found);
        Ok(())
    }

    /// Iterates known days of `year`, most recent first.
    pub async fn for_year(&self, year: i32) -> Vec<Ymd> {
        let state = self.state.lock().await;
        let mut days: Vec<Ymd> = state.days.iter().copied().filter(|d| d.year == year).collect();
        days.reverse();
        days
    }

    /// Every known day, most recent first.
    pub async fn all_days(&self) -> Vec<Ymd> {
        let state = self.state.lock().await;
        let mut days = state.days.clone();
        days.reverse();
        days
    }

    /// The year a "current" link (e.g. the stalker live view's `\u{2191}year`
    /// nav) should point at: the most recently archived day's year, or the
    /// clock's current year if nothing has been archived yet.
    pub async fn default_year(&self) -> i32 {
        let state = self.state.lock().await;
        match state.days.last() {
            Some(day) => day.year,
            None => Ymd::from_day_number(self.clock.now_us().div_euclid(crate::clock::US_PER_DAY)).year,
        }
    }

    /// Known days within one `(year, month)`, ascending.
    pub async fn days_in_month(&self, year: i32, month: u32) -> Vec<Ymd> {
        let state = self.state.lock().await;
        state
            .days
            .iter()
            .copied()
            .filter(|d| d.year == year && d.month == month)
            .collect()
    }

    /// Binary-search lookup. `Some((prev, next))` if `date` matches a known
    /// entry (exact day, or any day within the queried month); `None`
    /// otherwise.
    pub async fn lookup(&self, date: Ymd) -> Option<(Option<Ymd>, Option<Ymd>)> {
        let state = self.state.lock().await;
        let days = &state.days;
        let monthly = date.is_month_query();

        let pos = days.partition_point(|d| *d < date);
        days.get(pos).filter(|d| {
            d.year == date.year && d.month == date.month && (monthly || d.day == date.day)
        })?;

        let prev = if pos > 0 {
            let mut p = days[pos - 1];
            if monthly {
                p.day = 0;
            }
            Some(p)
        } else {
            None
        };

        let mut next_pos = pos + 1;
        if monthly {
            while next_pos < days.len()
                && days[next_pos].year == date.year
                && days[next_pos].month == date.month
            {
                next_pos += 1;
            }
        }
        let next = days.get(next_pos).map(|d| {
            let mut n = *d;
            if monthly {
                n.day = 0;
            }
            n
        });

        Some((prev, next))
    }

    /// Synthesizes cacheable [`FileInfo`] for `date`.
    pub async fn stat(&self, date: Ymd) -> Option<FileInfo> {
        {
            let state = self.state.lock().await;
            if state.days.is_empty() {
                return None;
            }
        }

        let monthly = date.is_month_query();
        let now = self.clock.now_unix_secs();

        let last_date = if monthly { date.last_of_month() } else { date };
        let frozen_time = day_end_unix(last_date) + FREEZE_GRACE_SECS;
        if frozen_time <= now {
            return Some(FileInfo::Frozen {
                last_write_unix: frozen_time,
            });
        }

        let mut logdate = date;
        if monthly {
            let mut matched_day = None;
            for d in (1..=31u32).rev() {
                let candidate = Ymd::new(date.year, date.month, d);
                let end_time = day_end_unix(candidate);
                if end_time <= now {
                    return Some(FileInfo::Liquid {
                        last_write_unix: end_time,
                        size_day: d + 1,
                        size: 0,
                    });
                }
                if self.day_file_exists(date.year, date.month, d).await {
                    matched_day = Some(d);
                    break;
                }
            }
            logdate.day = matched_day?;
        }

        let path = self.day_path(logdate.year, logdate.month, logdate.day);
        let meta = fs::metadata(&path).await.ok()?;
        let last_write_unix = meta
            .modified()
            .ok()?
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs() as i64;
        Some(FileInfo::Liquid {
            last_write_unix,
            size_day: logdate.day,
            size: meta.len(),
        })
    }

    async fn day_file_exists(&self, y: i32, m: u32, d: u32) -> bool {
        fs::metadata(self.day_path(y, m, d)).await.is_ok()
    }

    fn day_path(&self, y: i32, m: u32, d: u32) -> PathBuf {
        self.root.join(y.to_string()).join(m.to_string()).join(format!("{d}.pb"))
    }

    /// Opens a framed reader for `(y, m, d)`. Prefers the uncompressed `.pb`
    /// file, falling back to a brotli-decompressed `.pb.br`. `None` if
    /// neither exists.
    pub async fn open(
        &self,
        y: i32,
        m: u32,
        d: u32,
    ) -> Result<Option<Box<dyn std::io::Read + Send>>, IndexError> {
        let plain = self.day_path(y, m, d);
        if fs::metadata(&plain).await.is_ok() {
            let file = std::fs::File::open(&plain)?;
            return Ok(Some(Box::new(std::io::BufReader::new(file))));
        }

        let compressed = plain.with_extension("pb.br");
        if fs::metadata(&compressed).await.is_ok() {
            let file = std::fs::File::open(&compressed)?;
            let decoder = brotli::Decompressor::new(file, 4096);
            return Ok(Some(Box::new(std::io::BufReader::new(decoder))));
        }

        Ok(None)
    }
}

fn day_end_unix(date: Ymd) -> i64 {
    (date.day_number() + 1) * 86_400
}

async fn read_numeric_entries(dir: &Path) -> Result<Vec<i32>, IndexError> {
    let mut entries = Vec::new();
    let mut read_dir = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(source) => {
            return Err(IndexError::Scan {
                path: dir.to_path_buf(),
                source,
            })
        }
    };
    while let Some(entry) = read_dir.next_entry().await.map_err(|source| IndexError::Scan {
        path: dir.to_path_buf(),
        source,
    })? {
        if let Some(name) = entry.file_name().to_str() {
            if let Ok(n) = name.parse::<i32>() {
                entries.push(n);
            }
        }
    }
    Ok(entries)
}

async fn read_day_file_entries(dir: &Path) -> Result<Vec<u32>, IndexError> {
    let mut entries = Vec::new();
    let mut read_dir = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(source) => {
            return Err(IndexError::Scan {
                path: dir.to_path_buf(),
                source,
            })
        }
    };
    while let Some(entry) = read_dir.next_entry().await.map_err(|source| IndexError::Scan {
        path: dir.to_path_buf(),
        source,
    })? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name.strip_suffix(".pb").or_else(|| name.strip_suffix(".pb.br")) else {
            continue;
        };
        if let Ok(day) = stem.parse::<u32>() {
            entries.push(day);
        } else {
            warn!(entry = name, "unexpected file name in day directory");
        }
    }
    Ok(entries)
}
