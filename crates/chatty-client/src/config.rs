use std::path::PathBuf;

/// Client settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the relay server, e.g. `http://localhost:5001`.
    pub server_url: String,
    /// SQLite file holding this device's key pairs.
    pub key_store_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5001".into(),
            key_store_path: PathBuf::from("chatty_keys.db"),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        Self {
            server_url: std::env::var("CHATTY_SERVER_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.server_url),
            key_store_path: std::env::var("CHATTY_KEY_STORE")
                .map(PathBuf::from)
                .unwrap_or(defaults.key_store_path),
        }
    }

    /// WebSocket endpoint of the gateway on the same server.
    pub fn gateway_url(&self) -> String {
        let base = if let Some(rest) = self.server_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.server_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.server_url.clone()
        };
        format!("{}/gateway", base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_url_follows_scheme() {
        let mut config = ClientConfig::default();
        assert_eq!(config.gateway_url(), "ws://localhost:5001/gateway");

        config.server_url = "https://chat.example.org".into();
        assert_eq!(config.gateway_url(), "wss://chat.example.org/gateway");
    }
}
