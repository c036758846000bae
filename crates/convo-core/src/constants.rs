/// Convo centralized constants.
/// Defaults, endpoints and protocol markers live here.

// ─── API Endpoints ────────────────────────────────────────────────────────────

pub mod endpoints {
    pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
    pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
}

// ─── Default Settings ─────────────────────────────────────────────────────────

pub mod defaults {
    pub const SYSTEM_PROMPT: &str = "You are a helpful assistant";
    pub const TEMPERATURE: f64 = 0.8;
    pub const MIN_TEMPERATURE: f64 = 0.0;
    pub const MAX_TEMPERATURE: f64 = 2.0;
    pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
    pub const TOKEN_LIMIT: usize = crate::truncation::DEFAULT_TOKEN_LIMIT;
    pub const CHARS_PER_TOKEN: usize = crate::truncation::DEFAULT_CHARS_PER_TOKEN;
}

// ─── Streaming Protocol ───────────────────────────────────────────────────────

pub mod protocol {
    /// Prefix of data-bearing server-sent event lines.
    pub const DATA_PREFIX: &str = "data: ";
    /// Payload marking the end of a streamed completion.
    pub const DONE_SENTINEL: &str = "[DONE]";
}
