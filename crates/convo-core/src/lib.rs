pub mod api;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod model;
pub mod storage;
pub mod stream;
pub mod truncation;

// Re-export key types
pub use api::{ChatTransport, HttpTransport, RequestOptions};
pub use config::Settings;
pub use engine::{ChatEngine, ResponseStream, SendOptions};
pub use error::{ConvoError, Result};
pub use model::{ChatModel, Conversation, Message, Role};
pub use storage::{ChatStorage, JsonFileStore, MemoryStore};
pub use truncation::{HistoryTruncator, SizeEstimator};
