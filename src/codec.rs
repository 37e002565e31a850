//! Length-delimited, self-describing [`LogEvent`] record encoding.
//!
//! On-disk framing is `[u32_le length][event body]`. The body format is a
//! small hand-rolled tagged encoding (not a generic serde format) since the
//! record shape is small, fixed, and needs byte-for-byte control over framing
//! for the line-count recovery pass in [`crate::archive::file_writer`].
//!
//! EOF between records is a clean end of stream. A truncated tail — a length
//! prefix with fewer than `length` bytes following, or a body that doesn't
//! parse — is a [`CodecError`], never a silent truncation.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::model::{Direction, EventId, LogEvent};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("truncated record: expected {expected} bytes, got {got}")]
    Truncated { expected: u32, got: usize },
    #[error("malformed record: {0}")]
    Decode(String),
}

const FLAG_HAS_PREFIX: u8 = 0b001;
const FLAG_HAS_EVENT_ID: u8 = 0b010;
const FLAG_SENT: u8 = 0b100;

/// Encode one event's body (no length prefix) into `out`.
fn encode_body(event: &LogEvent, out: &mut Vec<u8>) {
    let mut flags = 0u8;
    if event.prefix.is_some() {
        flags |= FLAG_HAS_PREFIX;
    }
    if event.event_id.is_some() {
        flags |= FLAG_HAS_EVENT_ID;
    }
    if event.direction == Direction::Sent {
        flags |= FLAG_SENT;
    }
    out.push(flags);

    if let Some(prefix) = &event.prefix {
        write_str(out, prefix);
    }
    write_str(out, &event.command);

    let arg_count: u8 = event
        .args
        .len()
        .try_into()
        .expect("events carry at most 255 args");
    out.push(arg_count);
    for arg in &event.args {
        write_str(out, arg);
    }

    out.extend_from_slice(&event.time_us.to_le_bytes());

    if let Some(id) = &event.event_id {
        write_str(out, &id.target);
        out.extend_from_slice(&id.day.to_le_bytes());
        out.extend_from_slice(&id.line.to_le_bytes());
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    let len: u16 = s.len().try_into().expect("string fields are under 64KiB");
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn decode_body(body: &[u8]) -> Result<LogEvent, CodecError> {
    let mut cur = Cursor { buf: body, pos: 0 };

    let flags = cur.u8()?;
    let prefix = if flags & FLAG_HAS_PREFIX != 0 {
        Some(cur.string()?)
    } else {
        None
    };
    let command = cur.string()?;

    let arg_count = cur.u8()?;
    let mut args = Vec::with_capacity(arg_count as usize);
    for _ in 0..arg_count {
        args.push(cur.string()?);
    }

    let time_us = cur.u64()?;

    let event_id = if flags & FLAG_HAS_EVENT_ID != 0 {
        let target = cur.string()?;
        let day = cur.i64()?;
        let line = cur.u64()?;
        Some(EventId { target, day, line })
    } else {
        None
    };

    Ok(LogEvent {
        prefix,
        command,
        args,
        direction: if flags & FLAG_SENT != 0 {
            Direction::Sent
        } else {
            Direction::Received
        },
        time_us,
        event_id,
    })
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + n > self.buf.len() {
            return Err(CodecError::Decode("record body too short".to_string()));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = u16::from_le_bytes(self.take(2)?.try_into().unwrap()) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CodecError::Decode(format!("invalid utf-8: {e}")))
    }
}

/// Writes framed [`LogEvent`] records to an underlying [`Write`] sink,
/// flushing after every write so a crash leaves a consistent prefix of the
/// file.
pub struct EventWriter<W> {
    inner: W,
}

impl<W: Write> EventWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Encode and append `event`, flushing the sink. Returns the number of
    /// bytes written (length prefix + body), for byte-offset accounting.
    pub fn write(&mut self, event: &LogEvent) -> Result<u64, CodecError> {
        let mut body = Vec::new();
        encode_body(event, &mut body);

        let len: u32 = body
            .len()
            .try_into()
            .map_err(|_| CodecError::Decode("record too large".to_string()))?;

        self.inner.write_all(&len.to_le_bytes())?;
        self.inner.write_all(&body)?;
        self.inner.flush()?;

        Ok(4 + body.len() as u64)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads framed [`LogEvent`] records from an underlying [`Read`] source.
pub struct EventReader<R> {
    inner: R,
}

impl<R: Read> EventReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read one length prefix and body. Returns `Ok(None)` at a clean EOF
    /// (zero bytes read for the length prefix). A partial length prefix or a
    /// body shorter than declared is a [`CodecError::Truncated`].
    pub fn read(&mut self) -> Result<Option<LogEvent>, CodecError> {
        match self.read_len()? {
            None => Ok(None),
            Some(len) => {
                let body = self.read_body(len)?;
                Some(decode_body(&body)).transpose()
            }
        }
    }

    /// Identical framing to [`EventReader::read`] but discards the body
    /// without parsing — used to count prior records on writer restart.
    pub fn skip(&mut self) -> Result<bool, CodecError> {
        match self.read_len()? {
            None => Ok(false),
            Some(len) => {
                self.read_body(len)?;
                Ok(true)
            }
        }
    }

    fn read_len(&mut self) -> Result<Option<u32>, CodecError> {
        let mut len_buf = [0u8; 4];
        let mut read_total = 0;
        loop {
            let n = self.inner.read(&mut len_buf[read_total..])?;
            if n == 0 {
                break;
            }
            read_total += n;
            if read_total == 4 {
                break;
            }
        }
        if read_total == 0 {
            return Ok(None);
        }
        if read_total < 4 {
            return Err(CodecError::Truncated {
                expected: 4,
                got: read_total,
            });
        }
        Ok(Some(u32::from_le_bytes(len_buf)))
    }

    fn read_body(&mut self, len: u32) -> Result<Vec<u8>, CodecError> {
        let mut body = vec![0u8; len as usize];
        self.inner.read_exact(&mut body).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                CodecError::Truncated {
                    expected: len,
                    got: 0,
                }
            } else {
                CodecError::Io(e)
            }
        })?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> LogEvent {
        let mut e = LogEvent::new(Some("alice!u@h".to_string()), "PRIVMSG", vec![
            "#c".to_string(),
            "hi there".to_string(),
        ]);
        e.time_us = 43_200_250_000;
        e
    }

    #[test]
    fn round_trip() {
        let event = sample_event();
        let mut buf = Vec::new();
        EventWriter::new(&mut buf).write(&event).unwrap();

        let mut reader = EventReader::new(&buf[..]);
        let decoded = reader.read().unwrap().unwrap();
        assert_eq!(decoded, event);
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn round_trip_with_event_id() {
        let mut event = sample_event();
        event.event_id = Some(EventId {
            target: "t".to_string(),
            day: 19737,
            line: 3,
        });

        let mut buf = Vec::new();
        EventWriter::new(&mut buf).write(&event).unwrap();

        let mut reader = EventReader::new(&buf[..]);
        let decoded = reader.read().unwrap().unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn multi_record_stream() {
        let events = vec![sample_event(), sample_event().sent()];
        let mut buf = Vec::new();
        {
            let mut w = EventWriter::new(&mut buf);
            for e in &events {
                w.write(e).unwrap();
            }
        }

        let mut reader = EventReader::new(&buf[..]);
        for e in &events {
            assert_eq!(&reader.read().unwrap().unwrap(), e);
        }
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn truncated_tail_is_error() {
        let event = sample_event();
        let mut buf = Vec::new();
        EventWriter::new(&mut buf).write(&event).unwrap();
        buf.truncate(buf.len() - 3); // chop the tail mid-body

        let mut reader = EventReader::new(&buf[..]);
        match reader.read() {
            Err(CodecError::Truncated { .. }) => {}
            other => panic!("expected Truncated error, got {other:?}"),
        }
    }

    #[test]
    fn skip_counts_match_read_counts() {
        let events = vec![sample_event(), sample_event(), sample_event()];
        let mut buf = Vec::new();
        {
            let mut w = EventWriter::new(&mut buf);
            for e in &events {
                w.write(e).unwrap();
            }
        }

        let mut reader = EventReader::new(&buf[..]);
        let mut count = 0;
        while reader.skip().unwrap() {
            count += 1;
        }
        assert_eq!(count, events.len());
    }
}
