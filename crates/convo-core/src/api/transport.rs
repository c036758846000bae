use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt};

use super::types::ChatRequest;
use crate::constants::endpoints;
use crate::error::ConvoError;

/// Lines of a streamed response, in arrival order, without line terminators.
pub type LineStream = BoxStream<'static, Result<String, ConvoError>>;

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// A response whose body is still arriving.
pub struct StreamingResponse {
    pub status: u16,
    pub lines: LineStream,
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Issues chat requests. Retries and timeouts, if any, belong here rather than in the engine.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// POST the request and buffer the whole body.
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse, ConvoError>;

    /// POST the request and hand back the body as a line stream.
    async fn send_streaming(&self, request: &ChatRequest) -> Result<StreamingResponse, ConvoError>;
}

/// `ChatTransport` over HTTPS with bearer authentication.
pub struct HttpTransport {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl HttpTransport {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: endpoints::OPENAI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            endpoints::CHAT_COMPLETIONS_PATH
        )
    }

    async fn post(&self, request: &ChatRequest) -> Result<reqwest::Response, ConvoError> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "POST {}",
            self.url()
        );
        let response = self
            .client
            .post(self.url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        Ok(response)
    }
}

/// Failures of the exchange itself (connect, timeout, body read) become
/// `ConvoError::Transport`; request-building errors stay `Http`.
fn transport_error(e: reqwest::Error) -> ConvoError {
    if e.is_builder() {
        ConvoError::Http(e)
    } else {
        ConvoError::Transport(e.to_string())
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse, ConvoError> {
        let response = self.post(request).await?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        Ok(TransportResponse { status, body })
    }

    async fn send_streaming(&self, request: &ChatRequest) -> Result<StreamingResponse, ConvoError> {
        let response = self.post(request).await?;
        let status = response.status().as_u16();
        Ok(StreamingResponse {
            status,
            lines: split_lines(response.bytes_stream().map_err(transport_error)),
        })
    }
}

/// Re-chunk a byte stream into lines. Bytes are buffered until a newline so that
/// multi-byte characters split across chunks decode intact; a trailing partial
/// line is emitted when the stream ends. A chunk error ends the stream after
/// being yielded.
pub fn split_lines<S, B, E>(chunks: S) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ConvoError> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut chunks = Box::pin(chunks);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    buffer.extend_from_slice(bytes.as_ref());
                    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        yield Ok(decode_line(&line));
                    }
                }
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            }
        }

        if !buffer.is_empty() {
            yield Ok(decode_line(&buffer));
        }
    };
    Box::pin(stream)
}

fn decode_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.trim_end_matches(['\n', '\r']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_split_lines_across_chunks() {
        let chunks: Vec<Result<Vec<u8>, ConvoError>> = vec![
            Ok(b"data: {\"a\"".to_vec()),
            Ok(b":1}\r\n\ndata: caf".to_vec()),
            Ok(vec![0xC3]),
            Ok(vec![0xA9, b'\n']),
            Ok(b"tail".to_vec()),
        ];
        let lines: Vec<String> = split_lines(stream::iter(chunks))
            .map(|l| l.unwrap())
            .collect()
            .await;

        assert_eq!(lines, vec!["data: {\"a\":1}", "", "data: café", "tail"]);
    }

    #[test]
    fn test_builder_errors_are_not_transport_failures() {
        let err = reqwest::Client::new()
            .post("not a url")
            .build()
            .unwrap_err();
        assert!(matches!(transport_error(err), ConvoError::Http(_)));
    }

    #[tokio::test]
    async fn test_split_lines_stops_on_error() {
        let chunks: Vec<Result<Vec<u8>, ConvoError>> = vec![
            Ok(b"one\n".to_vec()),
            Err(ConvoError::Transport("reset".into())),
            Ok(b"two\n".to_vec()),
        ];
        let items: Vec<Result<String, ConvoError>> =
            split_lines(stream::iter(chunks)).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "one");
        assert!(matches!(items[1], Err(ConvoError::Transport(_))));
    }
}
