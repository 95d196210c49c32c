//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, parseable addresses)
//! - Check the outbound proxy URL and CORS origin entries
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before the config is accepted into the system

use crate::config::schema::GatewayConfig;

/// A single semantic configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError {
            field: "listener.bind_address",
            message: format!("not a valid socket address: {}", config.listener.bind_address),
        });
    }

    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError {
            field: "listener.max_body_bytes",
            message: "must be greater than zero".into(),
        });
    }

    if config.engine.timeout_secs == 0 {
        errors.push(ValidationError {
            field: "engine.timeout_secs",
            message: "must be greater than zero".into(),
        });
    }

    if config.engine.media_timeout_secs < config.engine.timeout_secs {
        errors.push(ValidationError {
            field: "engine.media_timeout_secs",
            message: "must not be shorter than engine.timeout_secs".into(),
        });
    }

    if config.engine.browser.navigation_timeout_secs == 0 {
        errors.push(ValidationError {
            field: "engine.browser.navigation_timeout_secs",
            message: "must be greater than zero".into(),
        });
    }

    if let Some(proxy) = &config.engine.outbound_proxy {
        match url::Url::parse(proxy) {
            Ok(parsed) => {
                if !matches!(parsed.scheme(), "http" | "https" | "socks5" | "socks5h") {
                    errors.push(ValidationError {
                        field: "engine.outbound_proxy",
                        message: format!("unsupported proxy scheme: {}", parsed.scheme()),
                    });
                }
            }
            Err(e) => errors.push(ValidationError {
                field: "engine.outbound_proxy",
                message: format!("not a valid URL: {e}"),
            }),
        }
    }

    if url::Url::parse(&config.engine.browser.devtools_url).is_err() {
        errors.push(ValidationError {
            field: "engine.browser.devtools_url",
            message: format!("not a valid URL: {}", config.engine.browser.devtools_url),
        });
    }

    for origin in &config.cors.allowed_origins {
        if origin.trim().is_empty() {
            errors.push(ValidationError {
                field: "cors.allowed_origins",
                message: "entries must be non-empty".into(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
