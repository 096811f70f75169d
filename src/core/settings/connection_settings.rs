use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_DATABASE: &str = "_all";
pub const DEFAULT_TIME_FIELD: &str = "_timesinceepoch";
pub const DEFAULT_LOGS_LIMIT: usize = 500;

/// Read-only backend settings shared by every query of a batch.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Base URL of the search backend.
    #[validate(url)]
    pub url: String,

    /// Index (or index pattern) searched when a query names none.
    #[validate(length(min = 1))]
    pub database: String,

    #[validate(length(min = 1))]
    pub time_field: String,

    pub log_message_field: Option<String>,

    pub log_level_field: Option<String>,

    pub basic_auth_user: Option<String>,

    #[serde(skip_serializing)]
    pub basic_auth_password: Option<String>,

    /// Per backend call HTTP timeout.
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    #[validate(range(min = 1))]
    pub max_concurrent_shard_requests: u32,

    /// Hits fetched by a logs query that sets no limit of its own.
    #[validate(range(min = 1, max = 10000))]
    pub logs_limit: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            database: DEFAULT_DATABASE.to_string(),
            time_field: DEFAULT_TIME_FIELD.to_string(),
            log_message_field: None,
            log_level_field: None,
            basic_auth_user: None,
            basic_auth_password: None,
            timeout_ms: 30_000,
            max_concurrent_shard_requests: 5,
            logs_limit: DEFAULT_LOGS_LIMIT,
        }
    }
}

impl ConnectionSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ConnectionSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_url_and_empty_time_field() {
        let mut s = ConnectionSettings::new("not a url");
        s.time_field = String::new();
        let errs = s.validate().unwrap_err();
        let fields = errs.field_errors();
        assert!(fields.contains_key("url"));
        assert!(fields.contains_key("time_field"));
    }

    #[test]
    fn password_is_never_serialized() {
        let mut s = ConnectionSettings::default();
        s.basic_auth_password = Some("secret".into());
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("secret"));
    }
}
