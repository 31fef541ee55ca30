//! Chunked-HTTP transport client

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, TryStreamExt};
use reqwest::Method;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

use crate::auth::RequestPipeline;
use crate::error::Result;
use crate::types::events::{ChatStreamEvent, ChatStreamRequest};

use super::decoder::ChunkDecoder;

/// Stream of decoded chat events
///
/// Ends after the body is exhausted. A transport-level failure surfaces as an
/// `Err` item, distinct from the `Complete`/`Done` terminators.
pub type ChatEventStream = Pin<Box<dyn Stream<Item = Result<ChatStreamEvent>> + Send>>;

/// Posts chat requests and decodes the chunked reply
#[derive(Clone)]
pub struct HttpStreamTransport {
    pipeline: Arc<RequestPipeline>,
    path: String,
    max_line_size: usize,
}

impl HttpStreamTransport {
    /// Create a transport posting to `path` through `pipeline`
    pub fn new(pipeline: Arc<RequestPipeline>, path: impl Into<String>, max_line_size: usize) -> Self {
        Self {
            pipeline,
            path: path.into(),
            max_line_size,
        }
    }

    /// Send a chat request and return the decoded reply stream
    ///
    /// Authorization failures are renewed and retried by the pipeline before
    /// any body is read. No total timeout is applied; callers bound the time
    /// between events instead.
    ///
    /// # Errors
    /// Returns `LinkError::Status` for a non-success reply and the pipeline's
    /// errors for transport or authorization failures
    pub async fn open(&self, request: &ChatStreamRequest) -> Result<ChatEventStream> {
        let http_request = self
            .pipeline
            .request(Method::POST, &self.path)?
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .build()?;

        let response = self.pipeline.execute_with_timeout(http_request, None).await?;
        let response = RequestPipeline::ensure_success(response).await?;

        log::debug!("Chat stream opened: status={}", response.status());

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let reader = StreamReader::new(body);
        let events = FramedRead::new(reader, ChunkDecoder::with_max_line_size(self.max_line_size));

        Ok(Box::pin(events))
    }
}

impl std::fmt::Debug for HttpStreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStreamTransport")
            .field("path", &self.path)
            .field("max_line_size", &self.max_line_size)
            .finish_non_exhaustive()
    }
}
