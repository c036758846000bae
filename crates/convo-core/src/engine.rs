//! The conversation engine: one live chat session plus the operations that
//! send turns, rewrite history and switch between stored conversations.

use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use uuid::Uuid;

use crate::api::{
    error_message, is_success, ChatRequest, ChatTransport, CompletionResponse, HttpTransport,
    RequestOptions,
};
use crate::config::Settings;
use crate::constants::defaults;
use crate::error::{ConvoError, Result};
use crate::model::{ChatModel, Conversation, Message};
use crate::storage::ChatStorage;
use crate::stream::{drain_error_message, StreamAccumulator};
use crate::truncation::HistoryTruncator;

/// Fragments of a streamed reply. Dropping it before the end commits nothing.
pub type ResponseStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// Per-send knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Discard history from this index before sending.
    pub overwrite_from_index: Option<usize>,
    /// Persist the session once the reply is committed.
    pub save_on_completion: bool,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overwrite_from(mut self, index: usize) -> Self {
        self.overwrite_from_index = Some(index);
        self
    }

    pub fn without_save(mut self) -> Self {
        self.save_on_completion = false;
        self
    }
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            overwrite_from_index: None,
            save_on_completion: true,
        }
    }
}

fn clamp_temperature(value: f64) -> f64 {
    if value.is_nan() {
        return defaults::TEMPERATURE;
    }
    value.clamp(defaults::MIN_TEMPERATURE, defaults::MAX_TEMPERATURE)
}

/// A single chat session against a chat-completions endpoint.
///
/// Mutating operations take `&mut self`; callers sharing an engine across
/// tasks must serialize access themselves.
pub struct ChatEngine {
    transport: Arc<dyn ChatTransport>,
    storage: Option<Arc<dyn ChatStorage>>,
    model: ChatModel,
    temperature: f64,
    options: RequestOptions,
    truncator: HistoryTruncator,
    default_system: Message,
    system_message: Message,
    history: Vec<Message>,
    conversation_id: Option<Uuid>,
    last_interaction: DateTime<Utc>,
}

impl ChatEngine {
    /// Engine talking to the default endpoint with `api_key`.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_transport(Arc::new(HttpTransport::new(api_key)))
    }

    pub fn with_transport(transport: Arc<dyn ChatTransport>) -> Self {
        let system = Message::system(defaults::SYSTEM_PROMPT);
        Self {
            transport,
            storage: None,
            model: ChatModel::default(),
            temperature: defaults::TEMPERATURE,
            options: RequestOptions::default(),
            truncator: HistoryTruncator::default(),
            default_system: system.clone(),
            system_message: system,
            history: Vec::new(),
            conversation_id: None,
            last_interaction: Utc::now(),
        }
    }

    pub fn with_model(mut self, model: impl Into<ChatModel>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = clamp_temperature(temperature);
        self
    }

    /// Becomes both the current and the default system prompt. Empty text keeps
    /// the built-in default.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        if !prompt.is_empty() {
            self.default_system = Message::system(prompt);
            self.system_message = self.default_system.clone();
        }
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn ChatStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_truncator(mut self, truncator: HistoryTruncator) -> Self {
        self.truncator = truncator;
        self
    }

    pub fn with_request_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Engine, transport and storage as described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.build_engine(settings.build_storage()?)
    }

    // ── Views ────────────────────────────────────────────────────────────────

    pub fn system_message(&self) -> &Message {
        &self.system_message
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn conversation_id(&self) -> Option<Uuid> {
        self.conversation_id
    }

    pub fn last_interaction(&self) -> DateTime<Utc> {
        self.last_interaction
    }

    pub fn model(&self) -> &ChatModel {
        &self.model
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    /// `[system] + history`.
    pub fn full_message_history(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(self.system_message.clone());
        messages.extend(self.history.iter().cloned());
        messages
    }

    /// Snapshot of the live session. Without an assigned id the snapshot carries a fresh one.
    pub fn current_conversation(&self) -> Conversation {
        Conversation::new(
            self.full_message_history(),
            self.conversation_id,
            Some(self.last_interaction),
        )
    }

    /// No id yet and nothing but seeded examples in history.
    fn is_untouched(&self) -> bool {
        self.conversation_id.is_none() && self.history.iter().all(|m| m.is_example())
    }

    // ── Configuration ────────────────────────────────────────────────────────

    pub fn set_temperature(&mut self, temperature: f64) {
        self.temperature = clamp_temperature(temperature);
    }

    pub fn set_model(&mut self, model: impl Into<ChatModel>) {
        self.model = model.into();
    }

    /// Replace the system prompt and persist.
    pub async fn set_system_prompt(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Err(ConvoError::InvalidArgument(
                "system prompt must not be empty".to_string(),
            ));
        }
        self.system_message = Message::system(text);
        self.last_interaction = Utc::now();
        self.persist().await;
        Ok(())
    }

    /// Append a seeded user/assistant pair.
    pub fn add_example_interaction(&mut self, user_text: &str, assistant_text: &str) {
        self.history.push(Message::user(user_text).into_example());
        self.history.push(Message::assistant(assistant_text).into_example());
    }

    /// Replace history with seed messages and set the system message (the default when `None`).
    /// System-role entries in `messages` are ignored.
    pub fn set_chat_history_examples(&mut self, messages: Vec<Message>, system: Option<Message>) {
        self.system_message = system
            .filter(|m| m.is_system())
            .unwrap_or_else(|| self.default_system.clone());
        self.history = messages
            .into_iter()
            .filter(|m| !m.is_system())
            .map(Message::into_example)
            .collect();
    }

    // ── History mutation ─────────────────────────────────────────────────────

    fn check_history_index(&self, index: usize) -> Result<()> {
        if index >= self.history.len() {
            return Err(ConvoError::OutOfRange {
                index,
                len: self.history.len(),
            });
        }
        Ok(())
    }

    /// Keep history strictly before `index`, then persist.
    pub async fn remove_messages_from(&mut self, index: usize) -> Result<()> {
        self.check_history_index(index)?;
        self.history.truncate(index);
        self.last_interaction = Utc::now();
        self.persist().await;
        Ok(())
    }

    /// Clear every non-system message. The system message and conversation id stay.
    pub fn delete_history(&mut self) {
        self.history.clear();
    }

    // ── Sending ──────────────────────────────────────────────────────────────

    /// Validate the input, apply any overwrite and build the outgoing request.
    fn prepare(
        &mut self,
        text: &str,
        options: SendOptions,
        stream: bool,
    ) -> Result<(Message, ChatRequest)> {
        if text.is_empty() {
            return Err(ConvoError::InvalidArgument(
                "message text must not be empty".to_string(),
            ));
        }
        if let Some(index) = options.overwrite_from_index {
            self.check_history_index(index)?;
            tracing::debug!(index, "Overwriting history before send");
            self.history.truncate(index);
        }

        let user = Message::user(text);
        let messages = self.truncator.build(&self.system_message, &self.history, &user);
        let request = ChatRequest::new(
            self.model.clone(),
            self.temperature,
            &messages,
            stream,
            self.options.clone(),
        );
        Ok((user, request))
    }

    /// Append the finished exchange and optionally persist. An empty reply commits nothing.
    async fn commit_turn(&mut self, user: Message, reply: String, save: bool) {
        if reply.is_empty() {
            tracing::warn!("Assistant returned no content; the exchange was not recorded");
            return;
        }
        self.history.push(user);
        self.history.push(Message::assistant(reply));
        self.last_interaction = Utc::now();
        if save {
            self.persist().await;
        }
    }

    /// Send `text` and wait for the complete reply.
    pub async fn send_message(&mut self, text: &str, options: SendOptions) -> Result<String> {
        let (user, request) = self.prepare(text, options, false)?;
        let response = self.transport.send(&request).await?;

        if !is_success(response.status) {
            let message = error_message(&response.body);
            tracing::warn!(status = response.status, "Chat request failed: {}", message);
            return Err(ConvoError::bad_response(response.status, message));
        }

        let completion: CompletionResponse = serde_json::from_str(&response.body)?;
        let reply = completion.into_text();
        self.commit_turn(user, reply.clone(), options.save_on_completion)
            .await;
        Ok(reply)
    }

    /// Send `text` and receive the reply as it is generated.
    ///
    /// A non-2xx status fails here, before any fragment. Once the returned
    /// stream ends cleanly the exchange is in history (and the save issued when
    /// requested). A transport error ends the stream with that error and
    /// commits nothing; so does dropping the stream early.
    pub async fn send_message_stream(
        &mut self,
        text: &str,
        options: SendOptions,
    ) -> Result<ResponseStream<'_>> {
        let (user, request) = self.prepare(text, options, true)?;
        let response = self.transport.send_streaming(&request).await?;

        if !is_success(response.status) {
            let message = drain_error_message(response.lines).await;
            tracing::warn!(status = response.status, "Chat stream failed: {}", message);
            return Err(ConvoError::bad_response(response.status, message));
        }

        let mut lines = response.lines;
        let engine = self;
        let stream = async_stream::stream! {
            let mut accumulator = StreamAccumulator::new();
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(
                            fragments = accumulator.fragment_count(),
                            "Stream aborted, discarding partial reply: {}",
                            e
                        );
                        yield Err(e);
                        return;
                    }
                };
                if let Some(fragment) = accumulator.push_line(&line) {
                    yield Ok(fragment);
                }
                if accumulator.is_done() {
                    break;
                }
            }
            tracing::debug!(fragments = accumulator.fragment_count(), "Stream complete");
            engine
                .commit_turn(user, accumulator.into_text(), options.save_on_completion)
                .await;
        };
        Ok(Box::pin(stream))
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    /// Save a snapshot of the session, assigning an id on first save.
    ///
    /// Returns `Ok(None)` without touching storage while the session is still the
    /// untouched default.
    pub async fn save_conversation(&mut self) -> Result<Option<Uuid>> {
        if self.is_untouched() {
            tracing::debug!("Nothing to save yet");
            return Ok(None);
        }
        let storage = self.storage.clone().ok_or(ConvoError::NoStorage)?;
        let id = *self.conversation_id.get_or_insert_with(Uuid::new_v4);
        storage.save(self.current_conversation()).await?;
        tracing::debug!(%id, "Conversation saved");
        Ok(Some(id))
    }

    /// Engine-initiated save: skipped without storage, failures logged.
    async fn persist(&mut self) {
        if self.storage.is_none() {
            return;
        }
        if let Err(e) = self.save_conversation().await {
            tracing::warn!("Failed to save conversation: {}", e);
        }
    }

    /// Switch to a stored conversation. On failure the live session is left as it
    /// was; nothing is saved and no id is assigned.
    pub async fn load_conversation(&mut self, id: Uuid, save_existing: bool) -> Result<()> {
        let storage = self.storage.clone().ok_or(ConvoError::NoStorage)?;
        let conversation = storage.load(id).await?;

        if save_existing {
            self.persist().await;
            if self.conversation_id == Some(id) {
                // Reloading the live conversation: the snapshot just written is newer.
                tracing::debug!(%id, "Conversation already loaded");
                return Ok(());
            }
        }

        self.system_message = conversation
            .system_message()
            .cloned()
            .unwrap_or_else(|| self.default_system.clone());
        self.history = conversation.history_list();
        self.conversation_id = Some(conversation.id());
        self.last_interaction = conversation.last_interaction();
        tracing::info!(%id, messages = self.history.len(), "Loaded conversation");
        Ok(())
    }

    /// Leave the current conversation and start an empty one with the default system prompt.
    pub async fn start_new_conversation(&mut self, save_existing: bool) {
        if save_existing {
            self.persist().await;
        }
        self.system_message = self.default_system.clone();
        self.history.clear();
        self.conversation_id = None;
        self.last_interaction = Utc::now();
    }
}
