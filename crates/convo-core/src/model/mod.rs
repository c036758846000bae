mod chat_model;
mod conversation;
mod message;

pub use chat_model::ChatModel;
pub use conversation::Conversation;
pub use message::{Message, Role};
