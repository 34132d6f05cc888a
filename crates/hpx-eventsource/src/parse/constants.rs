//! Common constants used across the SSE parser.

use http::HeaderName;

/// Newline byte
pub(crate) const LF: u8 = b'\n';
/// Carriage return byte
pub(crate) const CR: u8 = b'\r';
/// Field/value separator
pub(crate) const COLON: u8 = b':';
/// Optional single space after the colon
pub(crate) const SPACE: u8 = b' ';

/// Byte Order Mark as char
const BOM_CHAR: char = '\u{FEFF}';
const BOM_LEN: usize = BOM_CHAR.len_utf8();
// bom           = %xFEFF ; U+FEFF BYTE ORDER MARK
/// Byte representation of the BOM [`char`]
pub(crate) const BOM: &[u8; BOM_LEN] = &{
    let mut buf = [0u8; BOM_LEN];
    BOM_CHAR.encode_utf8(&mut buf);
    buf
};

/// Default event type (`"message"`)
pub(crate) const MESSAGE_TYPE: &str = "message";

/// Largest amount of slack the working buffer may carry past what it needs.
pub const MAX_OVER_ALLOCATION: usize = 1024 * 1024;

/// Resumption header sent on every (re)connect once an event id is known.
pub const LAST_EVENT_ID: HeaderName = HeaderName::from_static("last-event-id");

/// MIME type of an SSE response body.
pub(crate) const EVENT_STREAM_MIME: &str = "text/event-stream";
