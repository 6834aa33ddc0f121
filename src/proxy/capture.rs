//! Bounded response body capture
//!
//! Tees a response stream: every chunk is forwarded to the client as it
//! arrives, while a copy accumulates in a buffer for caching and logging.
//! Once the accumulated length exceeds the limit the buffer is released and
//! capture is abandoned, but forwarding continues unaffected, so an oversized
//! response still reaches the client byte-complete.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::sync::oneshot;

/// Outcome of a completed capture
#[derive(Debug)]
pub struct BodyCapture {
    /// True total length of the stream, regardless of truncation
    pub length: usize,
    /// Captured body, absent when the stream exceeded the limit
    pub text: Option<String>,
}

pin_project! {
    /// Stream adapter that forwards chunks while capturing up to a limit
    pub struct CaptureStream<S> {
        #[pin]
        inner: S,
        limit: usize,
        length: usize,
        buffer: BytesMut,
        over_limit: bool,
        capture_tx: Option<oneshot::Sender<BodyCapture>>,
    }
}

impl<S> CaptureStream<S> {
    /// Wrap `inner`, returning the tee and a receiver that resolves with the
    /// capture once the stream completes. The receiver fails if the stream
    /// errors or is dropped before completion, in which case nothing may be
    /// cached.
    pub fn new(inner: S, limit: usize) -> (Self, oneshot::Receiver<BodyCapture>) {
        let (capture_tx, capture_rx) = oneshot::channel();
        (
            Self {
                inner,
                limit,
                length: 0,
                buffer: BytesMut::new(),
                over_limit: false,
                capture_tx: Some(capture_tx),
            },
            capture_rx,
        )
    }
}

impl<S, E> Stream for CaptureStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                *this.length += chunk.len();
                if !*this.over_limit {
                    if *this.length > *this.limit {
                        *this.over_limit = true;
                        *this.buffer = BytesMut::new();
                    } else {
                        this.buffer.extend_from_slice(&chunk);
                    }
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(error))) => {
                // a failed stream must never be cached
                this.capture_tx.take();
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                if let Some(tx) = this.capture_tx.take() {
                    let text = if *this.over_limit {
                        None
                    } else {
                        Some(String::from_utf8_lossy(&this.buffer[..]).into_owned())
                    };
                    let _ = tx.send(BodyCapture {
                        length: *this.length,
                        text,
                    });
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
