//! [`Stream`] that converts a stream of byte chunks into [`ParseOutput`]s.

use core::{
    pin::Pin,
    task::{Context, Poll, ready},
};
use std::collections::VecDeque;

use futures_core::Stream;

use super::{event::ParseOutput, parser::EventStreamParser};

pin_project_lite::pin_project! {
    /// A [`Stream`] that feeds every chunk of an underlying byte stream into
    /// an [`EventStreamParser`] and yields what it produces.
    ///
    /// Transport errors are passed through unchanged; the parser itself never
    /// fails. The stream ends when the underlying stream ends, discarding any
    /// incomplete trailing event.
    #[project = EventStreamProjection]
    #[derive(Debug)]
    pub struct EventStream<S> {
        #[pin]
        stream: S,
        parser: EventStreamParser,
        ready: VecDeque<ParseOutput>,
        terminated: bool,
    }
}

impl<S> EventStream<S> {
    /// Create a new [`EventStream`] with a parser that knows no prior event id.
    pub fn new(stream: S) -> Self {
        Self::with_parser(stream, EventStreamParser::new("", ""))
    }

    /// Create a new [`EventStream`] around a preconfigured parser.
    pub fn with_parser(stream: S, parser: EventStreamParser) -> Self {
        Self {
            stream,
            parser,
            ready: VecDeque::new(),
            terminated: false,
        }
    }

    /// The id attached to the most recently dispatched event.
    pub fn last_event_id(&self) -> &str {
        self.parser.last_event_id()
    }
}

impl<S, E, B> Stream for EventStream<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    type Item = Result<ParseOutput, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(output) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(output)));
            }
            if *this.terminated {
                return Poll::Ready(None);
            }

            match ready!(this.stream.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    let ready = &mut *this.ready;
                    this.parser.feed(chunk.as_ref(), |output| ready.push_back(output));
                }
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => *this.terminated = true,
            }
        }
    }
}
