use std::time::Duration;

use clap::Parser;
use lurnix_gateway::config::{
    ConfigValidator, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_REFERER, GatewayConfig,
    GatewayProfile,
};
use lurnix_gateway::context::DEFAULT_WINDOW_SIZE;
use lurnix_gateway::server;

#[derive(Parser, Debug)]
#[command(name = "lurnix-gateway", version)]
#[command(about = "Chat gateway that keeps a rolling conversation window in front of an LLM API")]
struct CliArgs {
    /// Front-end profile: sets the route, field names, title and default port
    #[arg(long, value_enum, default_value_t = GatewayProfile::Chatbot, env = "GATEWAY_PROFILE")]
    profile: GatewayProfile,

    /// Host address to bind the gateway to
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    host: String,

    /// Port to listen on (profile default when unset)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Bearer credential for the completion API
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Chat completion endpoint
    #[arg(long, default_value = DEFAULT_ENDPOINT, env = "OPENROUTER_ENDPOINT")]
    endpoint: String,

    /// Model identifier sent with every request
    #[arg(long, default_value = DEFAULT_MODEL, env = "OPENROUTER_MODEL")]
    model: String,

    /// Value of the HTTP-Referer header sent upstream
    #[arg(long, default_value = DEFAULT_REFERER, env = "GATEWAY_REFERER")]
    referer: String,

    /// Value of the X-Title header sent upstream (profile default when unset)
    #[arg(long, env = "GATEWAY_APP_TITLE")]
    app_title: Option<String>,

    /// Optional system message sent ahead of every conversation
    #[arg(long, env = "GATEWAY_SYSTEM_PROMPT")]
    system_prompt: Option<String>,

    /// Path of the chat endpoint (profile default when unset)
    #[arg(long)]
    route: Option<String>,

    /// JSON field holding the user's message (profile default when unset)
    #[arg(long)]
    request_field: Option<String>,

    /// JSON field holding the reply (profile default when unset)
    #[arg(long)]
    response_field: Option<String>,

    /// Maximum number of turns kept per conversation (1 to 1000)
    #[arg(long, default_value_t = DEFAULT_WINDOW_SIZE, env = "WINDOW_SIZE")]
    window_size: usize,

    /// Upstream request timeout in seconds
    #[arg(long, default_value_t = 60, env = "REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: u64,

    /// Idle time in seconds after which a conversation is dropped
    #[arg(long, default_value_t = 1800)]
    session_ttl_secs: u64,

    /// Maximum number of live conversations
    #[arg(long, default_value_t = 10000)]
    max_sessions: usize,

    /// Interval in seconds between idle conversation sweeps
    #[arg(long, default_value_t = 60)]
    eviction_interval_secs: u64,

    /// Maximum request payload size in bytes
    #[arg(long, default_value_t = 1048576)] // 1MB
    max_payload_size: usize,

    /// Value of Access-Control-Allow-Origin on every response
    #[arg(long, default_value = "*")]
    cors_allow_origin: String,

    /// Directory to store log files
    #[arg(long)]
    log_dir: Option<String>,

    /// Set the logging level
    #[arg(long, default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

impl CliArgs {
    fn to_gateway_config(&self) -> GatewayConfig {
        let mut config =
            GatewayConfig::for_profile(self.profile, self.api_key.clone().unwrap_or_default());

        config.host = self.host.clone();
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(route) = &self.route {
            config.route = route.clone();
        }
        if let Some(field) = &self.request_field {
            config.request_field = field.clone();
        }
        if let Some(field) = &self.response_field {
            config.response_field = field.clone();
        }

        config.upstream.endpoint = self.endpoint.clone();
        config.upstream.model = self.model.clone();
        config.upstream.referer = self.referer.clone();
        if let Some(title) = &self.app_title {
            config.upstream.app_title = title.clone();
        }
        config.upstream.system_prompt = self.system_prompt.clone();
        config.upstream.timeout = Duration::from_secs(self.request_timeout_secs);

        config.session.window_size = self.window_size;
        config.session.ttl = Duration::from_secs(self.session_ttl_secs);
        config.session.max_sessions = self.max_sessions;
        config.session.eviction_interval = Duration::from_secs(self.eviction_interval_secs);

        config.max_payload_size = self.max_payload_size;
        config.cors_allow_origin = self.cors_allow_origin.clone();
        config.log_dir = self.log_dir.clone();
        config.log_level = self.log_level.clone();
        config.log_json = self.log_json;
        config
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may already be set
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    let config = args.to_gateway_config();
    ConfigValidator::validate(&config)?;

    server::startup(config).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_profile_from_cli() {
        let args = CliArgs::try_parse_from([
            "lurnix-gateway",
            "--profile",
            "voice",
            "--api-key",
            "sk-test",
            "--window-size",
            "6",
        ])
        .unwrap();
        let config = args.to_gateway_config();

        assert_eq!(config.profile, GatewayProfile::Voice);
        assert_eq!(config.route, "/api/voice");
        assert_eq!(config.request_field, "text");
        assert_eq!(config.session.window_size, 6);
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_overrides_replace_profile_defaults() {
        let args = CliArgs::try_parse_from([
            "lurnix-gateway",
            "--api-key",
            "sk-test",
            "--port",
            "9000",
            "--route",
            "/v2/chat",
            "--response-field",
            "answer",
            "--request-timeout-secs",
            "5",
        ])
        .unwrap();
        let config = args.to_gateway_config();

        assert_eq!(config.port, 9000);
        assert_eq!(config.route, "/v2/chat");
        assert_eq!(config.response_field, "answer");
        assert_eq!(config.upstream.timeout, Duration::from_secs(5));
    }
}
