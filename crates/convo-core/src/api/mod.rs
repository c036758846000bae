mod transport;
mod types;

pub use transport::{
    is_success, split_lines, ChatTransport, HttpTransport, LineStream, StreamingResponse,
    TransportResponse,
};
pub use types::{
    error_message, ChatRequest, Choice, CompletionResponse, Delta, ErrorBody, ErrorRoot,
    RequestOptions, ResponseMessage, StreamChoice, StreamChunk, Usage, WireMessage,
};
