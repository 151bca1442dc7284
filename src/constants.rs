// Fixed request parameters for the chat completion API, plus the few
// deployment settings that may come from the environment.

use std::env;

/// Model used for every feedback request.
pub const CHAT_MODEL: &str = "gpt-4o";
/// Sampling temperature sent with every request.
pub const TEMPERATURE: f64 = 0.7;
/// Output-length cap sent with every request.
pub const MAX_OUTPUT_TOKENS: u32 = 1500;

pub const DEFAULT_PORT: u16 = 9900;

// The API credential is never read here; it is supplied per session.
lazy_static::lazy_static! {
    pub static ref API_BASE_URL: String = env::var("REVIEWBOT_API_BASE")
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
}
