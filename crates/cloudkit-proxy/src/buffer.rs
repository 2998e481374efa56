//! The bounded producer/consumer buffer backing a streamed download.
//!
//! A `Mutex<VecDeque<Bytes>>` plus a `tokio::sync::Notify` stand in for a
//! condvar-blocked queue; `Stream::poll_next`'s `Poll::Pending` and
//! stream-end already express "nothing ready yet" and "done or aborted",
//! so no separate outcome enum needs to cross the `Stream` boundary —
//! only `push`/`finish`/`abort` do.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::Notify;

enum State {
    Open,
    Done,
    Aborted(String),
}

struct Inner {
    queue: VecDeque<Bytes>,
    state: State,
}

/// Shared handle the producer (a provider's `download_file`, driven as a
/// [`crate::sink::BufferSink`]) and the consumer (the HTTP response body
/// stream) both hold.
pub struct ProxyBuffer {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl ProxyBuffer {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                state: State::Open,
            }),
            notify: Notify::new(),
        })
    }

    /// `Buffer::put` — append producer data and wake a parked reader.
    pub fn push(&self, data: Bytes) {
        self.inner.lock().expect("proxy buffer mutex poisoned").queue.push_back(data);
        self.notify.notify_one();
    }

    /// `Buffer::done` — the producer finished successfully.
    pub fn finish(&self) {
        self.inner.lock().expect("proxy buffer mutex poisoned").state = State::Done;
        self.notify.notify_one();
    }

    /// The producer failed; the remaining read drains what's queued, then
    /// reports this error instead of ending cleanly.
    pub fn abort(&self, message: impl Into<String>) {
        self.inner.lock().expect("proxy buffer mutex poisoned").state = State::Aborted(message.into());
        self.notify.notify_one();
    }

    #[must_use]
    pub fn stream(self: &Arc<Self>) -> ProxyBufferStream {
        ProxyBufferStream { buffer: self.clone() }
    }
}

/// The consumer side: a `Stream` whose `Poll::Pending` is `Buffer::read`'s
/// `Suspend` outcome and whose `None` is `Abort`/clean completion.
pub struct ProxyBufferStream {
    buffer: Arc<ProxyBuffer>,
}

impl Stream for ProxyBufferStream {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            {
                let mut inner = self.buffer.inner.lock().expect("proxy buffer mutex poisoned");
                if let Some(chunk) = inner.queue.pop_front() {
                    return Poll::Ready(Some(Ok(chunk)));
                }
                match &inner.state {
                    State::Done => return Poll::Ready(None),
                    State::Aborted(message) => {
                        let message = message.clone();
                        inner.state = State::Done;
                        return Poll::Ready(Some(Err(io::Error::other(message))));
                    }
                    State::Open => {}
                }
            }

            // Queue empty, still open: park on the notifier. A fresh
            // `notified()` future is safe to create on every poll because
            // `notify_one` stores at most one permit when nothing is
            // waiting yet, and a just-created `Notified` consumes a
            // pending permit immediately rather than missing it.
            let notified = self.buffer.notify.notified();
            tokio::pin!(notified);
            match notified.poll(cx) {
                Poll::Ready(()) => continue,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn yields_pushed_chunks_in_order() {
        let buffer = ProxyBuffer::new();
        buffer.push(Bytes::from_static(b"hello"));
        buffer.push(Bytes::from_static(b" world"));
        buffer.finish();

        let mut stream = buffer.stream();
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b" world"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn suspends_until_data_arrives() {
        let buffer = ProxyBuffer::new();
        let mut stream = buffer.stream();

        let producer = buffer.clone();
        let reader = tokio::spawn(async move { stream.next().await });

        tokio::task::yield_now().await;
        producer.push(Bytes::from_static(b"late"));
        producer.finish();

        assert_eq!(reader.await.unwrap().unwrap().unwrap(), Bytes::from_static(b"late"));
    }

    #[tokio::test]
    async fn abort_surfaces_as_a_stream_error_after_draining_queued_data() {
        let buffer = ProxyBuffer::new();
        buffer.push(Bytes::from_static(b"partial"));
        buffer.abort("upstream connection reset");

        let mut stream = buffer.stream();
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"partial"));
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("upstream connection reset"));
    }
}
