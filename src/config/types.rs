use std::time::Duration;

use crate::context::DEFAULT_WINDOW_SIZE;

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";
pub const DEFAULT_REFERER: &str = "http://localhost";

/// The two chat front-ends served by this binary. A profile supplies the
/// route, field names, title and error wording each front-end expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum GatewayProfile {
    Chatbot,
    Voice,
}

impl GatewayProfile {
    pub fn route(&self) -> &'static str {
        match self {
            GatewayProfile::Chatbot => "/chat",
            GatewayProfile::Voice => "/api/voice",
        }
    }

    pub fn request_field(&self) -> &'static str {
        match self {
            GatewayProfile::Chatbot => "message",
            GatewayProfile::Voice => "text",
        }
    }

    pub fn response_field(&self) -> &'static str {
        match self {
            GatewayProfile::Chatbot => "reply",
            GatewayProfile::Voice => "response",
        }
    }

    pub fn app_title(&self) -> &'static str {
        match self {
            GatewayProfile::Chatbot => "Lurnix Chatbot",
            GatewayProfile::Voice => "Lurnix Voice Chat",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            GatewayProfile::Chatbot => 5000,
            GatewayProfile::Voice => 7002,
        }
    }

    pub fn missing_input_message(&self) -> &'static str {
        match self {
            GatewayProfile::Chatbot => "Message is required",
            GatewayProfile::Voice => "Text is required",
        }
    }

    pub fn upstream_failure_message(&self) -> &'static str {
        match self {
            GatewayProfile::Chatbot => "Something went wrong",
            GatewayProfile::Voice => "Error processing your request with OpenRouter AI",
        }
    }
}

/// Everything the completion client needs to reach the provider.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Sent as `HTTP-Referer`
    pub referer: String,
    /// Sent as `X-Title`
    pub app_title: String,
    /// Optional preamble sent ahead of the conversation as a system message
    pub system_prompt: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum turns kept per conversation
    pub window_size: usize,
    /// Idle time after which a conversation is dropped
    pub ttl: Duration,
    /// Upper bound on live conversations; least recently used go first
    pub max_sessions: usize,
    /// How often the idle sweeper runs
    pub eviction_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            ttl: Duration::from_secs(30 * 60),
            max_sessions: 10_000,
            eviction_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub profile: GatewayProfile,
    pub host: String,
    pub port: u16,
    /// Path of the chat endpoint
    pub route: String,
    /// JSON field carrying the user's message
    pub request_field: String,
    /// JSON field carrying the reply
    pub response_field: String,
    pub upstream: UpstreamConfig,
    pub session: SessionConfig,
    pub max_payload_size: usize,
    pub cors_allow_origin: String,
    pub log_dir: Option<String>,
    pub log_level: String,
    pub log_json: bool,
}

impl GatewayConfig {
    /// Profile defaults with the given credential; callers override fields as needed.
    pub fn for_profile(profile: GatewayProfile, api_key: impl Into<String>) -> Self {
        Self {
            profile,
            host: "0.0.0.0".to_string(),
            port: profile.default_port(),
            route: profile.route().to_string(),
            request_field: profile.request_field().to_string(),
            response_field: profile.response_field().to_string(),
            upstream: UpstreamConfig {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                api_key: api_key.into(),
                model: DEFAULT_MODEL.to_string(),
                referer: DEFAULT_REFERER.to_string(),
                app_title: profile.app_title().to_string(),
                system_prompt: None,
                timeout: Duration::from_secs(60),
            },
            session: SessionConfig::default(),
            max_payload_size: 1024 * 1024,
            cors_allow_origin: "*".to_string(),
            log_dir: None,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}
