//! Buffer-owning incremental parser for the event-stream grammar.
//!
//! Lines end at LF, CR or CRLF. A CR completes its line immediately and arms
//! `discard_trailing_newline`, so the LF of a CRLF is swallowed even when it
//! arrives in the next chunk. A line without a terminator stays in the
//! working buffer together with how far it has already been scanned; the next
//! [`feed`](EventStreamParser::feed) resumes from that point.

use core::time::Duration;

use super::{
    constants::{BOM, COLON, CR, LF, MAX_OVER_ALLOCATION, MESSAGE_TYPE, SPACE},
    event::{MessageEvent, ParseOutput},
};
use crate::capacity::plan_capacity;

/// Field names recognised when
/// [interpreting an event stream](https://html.spec.whatwg.org/multipage/server-sent-events.html#event-stream-interpretation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldName {
    Event,
    Data,
    Id,
    Retry,
    Ignored,
}

impl FieldName {
    fn from_bytes(name: &[u8]) -> Self {
        match name {
            b"event" => Self::Event,
            b"data" => Self::Data,
            b"id" => Self::Id,
            b"retry" => Self::Retry,
            _ => Self::Ignored,
        }
    }
}

/// Growable byte arena with a logical length distinct from its capacity.
///
/// `storage.len()` is the allocated capacity; only `storage[..used]` holds
/// body bytes.
#[derive(Debug, Default)]
struct WorkingBuffer {
    storage: Vec<u8>,
    used: usize,
}

impl WorkingBuffer {
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn filled(&self) -> &[u8] {
        &self.storage[..self.used]
    }

    fn append(&mut self, chunk: &[u8], max_over_allocation: usize) {
        let required = self.used + chunk.len();
        if let Some(capacity) = plan_capacity(self.capacity(), required, max_over_allocation) {
            let mut grown = vec![0; capacity];
            grown[..self.used].copy_from_slice(self.filled());
            self.storage = grown;
        }
        self.storage[self.used..required].copy_from_slice(chunk);
        self.used = required;
    }

    /// Drops the first `consumed` bytes. Releases the allocation when nothing
    /// is left, otherwise moves the remainder to the front.
    fn consume(&mut self, consumed: usize) {
        if consumed >= self.used {
            *self = Self::default();
        } else if consumed > 0 {
            self.storage.copy_within(consumed..self.used, 0);
            self.used -= consumed;
        }
    }
}

/// Progress through a line whose terminator has not arrived yet.
///
/// Both offsets are relative to the start of the pending line.
#[derive(Debug, Default, Clone, Copy)]
struct LineScan {
    cursor: usize,
    field_len: Option<usize>,
}

/// Fields collected since the last blank line.
#[derive(Debug, Default)]
struct PendingEvent {
    data: String,
    event: Option<String>,
    id: Option<String>,
}

impl PendingEvent {
    fn process_line<F>(
        &mut self,
        line: &[u8],
        field_len: Option<usize>,
        last_event_id: &mut String,
        origin: &str,
        emit: &mut F,
    ) where
        F: FnMut(ParseOutput),
    {
        if line.is_empty() {
            if let Some(message) = self.dispatch(last_event_id, origin) {
                emit(ParseOutput::Message(message));
            }
            return;
        }

        let (name, value) = split_field(line, field_len);
        match FieldName::from_bytes(name) {
            FieldName::Data => {
                self.data.push_str(&String::from_utf8_lossy(value));
                self.data.push('\n');
            }
            FieldName::Event => {
                self.event = Some(String::from_utf8_lossy(value).into_owned());
            }
            FieldName::Id => {
                if memchr::memchr(0, value).is_none() {
                    self.id = Some(String::from_utf8_lossy(value).into_owned());
                }
            }
            FieldName::Retry => {
                if let Some(millis) = parse_retry(value) {
                    emit(ParseOutput::Retry(Duration::from_millis(millis)));
                }
            }
            FieldName::Ignored => {}
        }
    }

    /// Blank line: build an event if any data was collected.
    ///
    /// The event type is cleared either way; the candidate id is only
    /// consumed by an actual dispatch.
    fn dispatch(&mut self, last_event_id: &mut String, origin: &str) -> Option<MessageEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        if let Some(id) = self.id.take() {
            *last_event_id = id;
        }

        let mut data = core::mem::take(&mut self.data);
        data.pop();

        Some(MessageEvent {
            event: event
                .filter(|event| !event.is_empty())
                .unwrap_or_else(|| MESSAGE_TYPE.to_owned()),
            data,
            last_event_id: last_event_id.clone(),
            origin: origin.to_owned(),
        })
    }
}

/// Splits a line at its first colon, dropping one optional leading space from
/// the value. Without a colon the whole line is the field name.
fn split_field(line: &[u8], field_len: Option<usize>) -> (&[u8], &[u8]) {
    match field_len {
        None => (line, &[][..]),
        Some(colon) => {
            let value = &line[colon + 1..];
            let value = match value {
                [SPACE, rest @ ..] => rest,
                _ => value,
            };
            (&line[..colon], value)
        }
    }
}

/// Leading decimal digits of a `retry:` value; trailing bytes are ignored.
fn parse_retry(value: &[u8]) -> Option<u64> {
    let value = value.trim_ascii_start();
    let digits = value
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(value.len());
    if digits == 0 {
        return None;
    }
    core::str::from_utf8(&value[..digits]).ok()?.parse().ok()
}

/// `None` while the buffered bytes are still a proper prefix of the BOM.
fn starts_with_bom(buf: &[u8]) -> Option<bool> {
    let n = buf.len().min(BOM.len());
    if buf[..n] != BOM[..n] {
        Some(false)
    } else if n < BOM.len() {
        None
    } else {
        Some(true)
    }
}

/// Incremental `text/event-stream` parser for one response body.
///
/// Owns its working buffer and the event being assembled; a reconnect should
/// start from a fresh parser seeded with the connection's last event id.
///
/// # Examples
///
/// ```
/// use hpx_eventsource::parse::{EventStreamParser, ParseOutput};
///
/// let mut parser = EventStreamParser::new("", "https://example.com");
/// let mut out = Vec::new();
/// parser.feed(b"event: tick\nda", |o| out.push(o));
/// parser.feed(b"ta: 1\n\n", |o| out.push(o));
///
/// let ParseOutput::Message(message) = &out[0] else {
///     panic!("expected a message");
/// };
/// assert_eq!(message.event, "tick");
/// assert_eq!(message.data, "1");
/// ```
#[derive(Debug)]
pub struct EventStreamParser {
    buffer: WorkingBuffer,
    scan: LineScan,
    discard_trailing_newline: bool,
    bom_checked: bool,
    pending: PendingEvent,
    last_event_id: String,
    origin: String,
    max_over_allocation: usize,
}

impl EventStreamParser {
    /// Create a parser for a stream opened from `origin`, resuming after
    /// `last_event_id` (empty if none is known).
    pub fn new(last_event_id: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            buffer: WorkingBuffer::default(),
            scan: LineScan::default(),
            discard_trailing_newline: false,
            bom_checked: false,
            pending: PendingEvent::default(),
            last_event_id: last_event_id.into(),
            origin: origin.into(),
            max_over_allocation: MAX_OVER_ALLOCATION,
        }
    }

    /// Override how much slack the working buffer may carry past what it
    /// needs (defaults to [`MAX_OVER_ALLOCATION`]).
    #[must_use]
    pub fn with_max_over_allocation(mut self, bytes: usize) -> Self {
        self.max_over_allocation = bytes;
        self
    }

    /// The id attached to the most recently dispatched event.
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }

    /// Bytes held back waiting for a line terminator.
    pub fn buffered_len(&self) -> usize {
        self.buffer.used
    }

    /// Allocated size of the working buffer.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Append a chunk of the response body and emit everything it completes.
    pub fn feed<F>(&mut self, chunk: &[u8], mut emit: F)
    where
        F: FnMut(ParseOutput),
    {
        if chunk.is_empty() {
            return;
        }

        self.buffer.append(chunk, self.max_over_allocation);

        if !self.bom_checked {
            match starts_with_bom(self.buffer.filled()) {
                Some(true) => {
                    self.buffer.consume(BOM.len());
                    self.bom_checked = true;
                }
                Some(false) => self.bom_checked = true,
                None => return,
            }
        }

        let consumed = self.scan_lines(&mut emit);
        self.buffer.consume(consumed);
    }

    /// Processes every complete line in the buffer and returns how many bytes
    /// they occupied.
    fn scan_lines<F>(&mut self, emit: &mut F) -> usize
    where
        F: FnMut(ParseOutput),
    {
        let Self {
            buffer,
            scan,
            discard_trailing_newline,
            pending,
            last_event_id,
            origin,
            ..
        } = self;
        let bytes = buffer.filled();
        let mut pos = 0;

        while pos < bytes.len() {
            if *discard_trailing_newline {
                if bytes[pos] == LF {
                    pos += 1;
                }
                *discard_trailing_newline = false;
                continue;
            }

            let line = &bytes[pos..];
            let Some(offset) = memchr::memchr2(CR, LF, &line[scan.cursor..]) else {
                if scan.field_len.is_none() {
                    scan.field_len =
                        memchr::memchr(COLON, &line[scan.cursor..]).map(|i| scan.cursor + i);
                }
                scan.cursor = line.len();
                break;
            };

            let eol = scan.cursor + offset;
            let field_len = scan
                .field_len
                .or_else(|| memchr::memchr(COLON, &line[scan.cursor..eol]).map(|i| scan.cursor + i));
            *discard_trailing_newline = line[eol] == CR;
            *scan = LineScan::default();

            pending.process_line(&line[..eol], field_len, last_event_id, origin, emit);
            pos += eol + 1;
        }

        pos
    }
}
