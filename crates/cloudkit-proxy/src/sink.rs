//! The producer side of a [`ProxyBuffer`]: a [`DownloadSink`] a provider's
//! `download_file` writes into, grounded on `HttpDataCallback`
//! (`receivedData` -> `buffer_->put` + `resume`; `done` -> `buffer_->done`
//! + `resume`).

use std::sync::Arc;

use bytes::Bytes;
use cloudkit_core::ports::DownloadSink;

use crate::buffer::ProxyBuffer;

pub struct BufferDownloadSink {
    buffer: Arc<ProxyBuffer>,
}

impl BufferDownloadSink {
    #[must_use]
    pub fn new(buffer: Arc<ProxyBuffer>) -> Self {
        Self { buffer }
    }
}

impl DownloadSink for BufferDownloadSink {
    fn receive_data(&mut self, data: &[u8]) {
        self.buffer.push(Bytes::copy_from_slice(data));
    }

    fn progress(&mut self, _total: u64, _now: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn received_data_reaches_the_stream_side() {
        let buffer = ProxyBuffer::new();
        let mut sink = BufferDownloadSink::new(buffer.clone());
        sink.receive_data(b"chunk-1");
        buffer.finish();

        let mut stream = buffer.stream();
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"chunk-1"));
    }
}
