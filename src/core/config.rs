use std::env;

use crate::completion::DEFAULT_COMPLETION_URL;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage_path: String,
    pub db_path: String,
    pub completion_url: String,
    pub assistant_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let storage_path =
            env::var("THREADCHAT_STORAGE_PATH").unwrap_or_else(|_| "./".to_string());
        let db_path = format!("{}/threadchat.db", storage_path.trim_end_matches('/'));
        let completion_url = env::var("THREADCHAT_COMPLETION_URL")
            .unwrap_or_else(|_| DEFAULT_COMPLETION_URL.to_string());
        let assistant_name =
            env::var("THREADCHAT_ASSISTANT_NAME").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        Self {
            storage_path,
            db_path,
            completion_url,
            assistant_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn it_uses_defaults_without_env() {
        unsafe {
            env::remove_var("THREADCHAT_STORAGE_PATH");
            env::remove_var("THREADCHAT_COMPLETION_URL");
            env::remove_var("THREADCHAT_ASSISTANT_NAME");
        }

        let config = AppConfig::default();
        assert_eq!(config.storage_path, "./");
        assert_eq!(config.db_path, "./threadchat.db");
        assert_eq!(config.completion_url, DEFAULT_COMPLETION_URL);
        assert_eq!(config.assistant_name, "gpt-4o-mini");
    }

    #[test]
    #[serial]
    fn it_reads_overrides_from_env() {
        unsafe {
            env::set_var("THREADCHAT_STORAGE_PATH", "/tmp/threadchat/");
            env::set_var("THREADCHAT_COMPLETION_URL", "http://localhost:9999/complete");
            env::set_var("THREADCHAT_ASSISTANT_NAME", "local-model");
        }

        let config = AppConfig::default();
        assert_eq!(config.db_path, "/tmp/threadchat/threadchat.db");
        assert_eq!(config.completion_url, "http://localhost:9999/complete");
        assert_eq!(config.assistant_name, "local-model");

        unsafe {
            env::remove_var("THREADCHAT_STORAGE_PATH");
            env::remove_var("THREADCHAT_COMPLETION_URL");
            env::remove_var("THREADCHAT_ASSISTANT_NAME");
        }
    }
}
