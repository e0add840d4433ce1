use super::*;
use crate::context::MAX_WINDOW_SIZE;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &GatewayConfig) -> ConfigResult<()> {
        Self::validate_server_settings(config)?;
        Self::validate_upstream(&config.upstream)?;
        Self::validate_session(&config.session)?;
        Ok(())
    }

    fn validate_server_settings(config: &GatewayConfig) -> ConfigResult<()> {
        if config.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port".to_string(),
                value: config.port.to_string(),
                reason: "Port cannot be 0".to_string(),
            });
        }

        if !config.route.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "route".to_string(),
                value: config.route.clone(),
                reason: "Must start with '/'".to_string(),
            });
        }

        if config.request_field.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "request_field".to_string(),
            });
        }

        if config.response_field.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "response_field".to_string(),
            });
        }

        if config.max_payload_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_payload_size".to_string(),
                value: config.max_payload_size.to_string(),
                reason: "Must be > 0".to_string(),
            });
        }

        if !matches!(
            config.log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigError::InvalidValue {
                field: "log_level".to_string(),
                value: config.log_level.clone(),
                reason: "Must be one of trace, debug, info, warn, error".to_string(),
            });
        }

        Ok(())
    }

    fn validate_upstream(upstream: &UpstreamConfig) -> ConfigResult<()> {
        if upstream.api_key.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "api_key".to_string(),
            });
        }

        if !upstream.endpoint.starts_with("http://") && !upstream.endpoint.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "endpoint".to_string(),
                value: upstream.endpoint.clone(),
                reason: "URL must start with http:// or https://".to_string(),
            });
        }

        if upstream.model.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "model".to_string(),
            });
        }

        if upstream.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs".to_string(),
                value: "0".to_string(),
                reason: "Must be > 0".to_string(),
            });
        }

        Ok(())
    }

    fn validate_session(session: &SessionConfig) -> ConfigResult<()> {
        if session.window_size == 0 || session.window_size > MAX_WINDOW_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "window_size".to_string(),
                value: session.window_size.to_string(),
                reason: format!("Must be between 1 and {}", MAX_WINDOW_SIZE),
            });
        }

        if session.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_sessions".to_string(),
                value: session.max_sessions.to_string(),
                reason: "Must be >= 1".to_string(),
            });
        }

        if session.eviction_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "eviction_interval_secs".to_string(),
                value: "0".to_string(),
                reason: "Must be > 0".to_string(),
            });
        }

        if session.ttl.is_zero() {
            return Err(ConfigError::ValidationFailed {
                reason: "session_ttl_secs must be > 0".to_string(),
            });
        }

        Ok(())
    }
}
