// These modules are used by integration tests
#![allow(dead_code)]

pub mod mock_upstream;

use std::time::Duration;

use lurnix_gateway::completion::CompletionClient;
use lurnix_gateway::config::{GatewayConfig, GatewayProfile};
use lurnix_gateway::gateway::Gateway;
use lurnix_gateway::session::SessionStore;

/// Profile defaults pointed at `endpoint`, with a short timeout.
pub fn test_config(profile: GatewayProfile, endpoint: &str) -> GatewayConfig {
    let mut config = GatewayConfig::for_profile(profile, "sk-test");
    config.upstream.endpoint = endpoint.to_string();
    config.upstream.timeout = Duration::from_secs(5);
    config
}

pub fn test_gateway(config: &GatewayConfig) -> Gateway {
    Gateway::new(
        SessionStore::new(config.session.clone()),
        CompletionClient::new(config.upstream.clone()).expect("Failed to build completion client"),
    )
}
