//! Wraps any [`CloudProvider`]'s push-style `download_file` as a
//! [`FileProviderHandler`]: state/authorization is already checked by
//! `FileProviderServer`'s dispatch before `serve` is called, so this
//! handler only resolves the item, validates the range, and drives the
//! download into a [`ProxyBuffer`] on a background task while returning
//! the buffer's read side as the response body immediately — spawn a
//! transfer, stream whatever arrives.

use std::sync::Arc;

use async_trait::async_trait;
use cloudkit_core::domain::{code, RemoteId};
use cloudkit_core::ports::{ByteRange, CloudProvider};
use cloudkit_server::{parse_range, FileProviderHandler, ProxyResponse};
use tracing::warn;

use crate::buffer::ProxyBuffer;
use crate::sink::BufferDownloadSink;

pub struct StreamingProxyHandler {
    provider: Arc<dyn CloudProvider>,
}

impl StreamingProxyHandler {
    #[must_use]
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl FileProviderHandler for StreamingProxyHandler {
    async fn serve(&self, file_id: &str, range: Option<&str>) -> ProxyResponse {
        let Ok(id) = RemoteId::new(file_id.to_string()) else {
            return ProxyResponse::NotFound;
        };
        let item = match self.provider.get_item_data(&id).await {
            Ok(item) if !item.is_directory() => item,
            _ => return ProxyResponse::NotFound,
        };

        let total = item.size.unwrap_or(0);
        let byte_range: Option<ByteRange> = range.and_then(|h| parse_range(h, total));
        if let Some(r) = byte_range {
            if !r.fits_within(total) {
                return ProxyResponse::RangeInvalid { total_size: total };
            }
        }

        let buffer = ProxyBuffer::new();
        let producer_buffer = buffer.clone();
        let provider = self.provider.clone();
        let download_item = item.clone();
        tokio::spawn(async move {
            let mut sink = BufferDownloadSink::new(producer_buffer.clone());
            match provider.download_file(&download_item, byte_range, &mut sink).await {
                Ok(()) => producer_buffer.finish(),
                Err(e) => {
                    warn!(item = download_item.id.as_str(), error = %e, "streaming download failed");
                    producer_buffer.abort(e.message);
                }
            }
        });

        let (status, content_length, content_range) = match byte_range {
            Some(r) => (code::PARTIAL, r.len(), Some(format!("bytes {}-{}/{total}", r.start, r.end))),
            None => (code::OK, total, None),
        };

        ProxyResponse::Data {
            status,
            content_type: content_type_for(&item.name),
            content_length,
            content_range,
            body: Box::pin(buffer.stream()),
        }
    }
}

/// A minimal extension-to-mime table, standing in for `util::to_mime_type`.
fn content_type_for(name: &str) -> String {
    let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as at;
    use cloudkit_core::domain::{CloudError, Item, ItemType};
    use cloudkit_core::ports::DownloadSink;
    use futures_util::StreamExt;

    struct StubProvider {
        item: Item,
        content: Vec<u8>,
    }

    #[at]
    impl CloudProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn root_directory(&self) -> Item {
            Item::root(RemoteId::new("root".to_string()).unwrap())
        }

        async fn get_item_data(&self, id: &RemoteId) -> Result<Item, CloudError> {
            if *id == self.item.id {
                Ok(self.item.clone())
            } else {
                Err(CloudError::new(code::NOT_FOUND, "no such item"))
            }
        }

        async fn download_file(
            &self,
            _item: &Item,
            range: Option<ByteRange>,
            sink: &mut dyn DownloadSink,
        ) -> Result<(), CloudError> {
            let slice = match range {
                Some(r) => &self.content[r.start as usize..=r.end as usize],
                None => &self.content[..],
            };
            sink.receive_data(slice);
            Ok(())
        }
    }

    fn stub(content: &[u8]) -> Arc<dyn CloudProvider> {
        let mut item = Item::new(RemoteId::new("f1".to_string()).unwrap(), "clip.mp4", ItemType::Video);
        item.size = Some(content.len() as u64);
        Arc::new(StubProvider { item, content: content.to_vec() })
    }

    #[tokio::test]
    async fn serves_the_whole_file_when_no_range_is_requested() {
        let handler = StreamingProxyHandler::new(stub(b"hello world"));
        match handler.serve("f1", None).await {
            ProxyResponse::Data { status, content_type, content_length, body, .. } => {
                assert_eq!(status, code::OK);
                assert_eq!(content_type, "video/mp4");
                assert_eq!(content_length, 11);
                let collected: Vec<_> = body.collect().await;
                let bytes: Vec<u8> = collected.into_iter().flat_map(|c| c.unwrap().to_vec()).collect();
                assert_eq!(bytes, b"hello world");
            }
            _ => panic!("expected Data"),
        }
    }

    #[tokio::test]
    async fn serves_a_partial_range() {
        let handler = StreamingProxyHandler::new(stub(b"0123456789"));
        match handler.serve("f1", Some("bytes=2-4")).await {
            ProxyResponse::Data { status, content_length, content_range, .. } => {
                assert_eq!(status, code::PARTIAL);
                assert_eq!(content_length, 3);
                assert_eq!(content_range.unwrap(), "bytes 2-4/10");
            }
            _ => panic!("expected Data"),
        }
    }

    #[tokio::test]
    async fn out_of_bounds_range_is_rejected_before_spawning_a_download() {
        let handler = StreamingProxyHandler::new(stub(b"short"));
        match handler.serve("f1", Some("bytes=2-100")).await {
            ProxyResponse::RangeInvalid { total_size } => assert_eq!(total_size, 5),
            _ => panic!("expected RangeInvalid"),
        }
    }

    #[tokio::test]
    async fn unknown_file_id_is_not_found() {
        let handler = StreamingProxyHandler::new(stub(b"x"));
        matches!(handler.serve("missing", None).await, ProxyResponse::NotFound);
    }
}
