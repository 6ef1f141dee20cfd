use serde::Deserialize;

/// Which provisioning handlers service the five lifecycle events.
#[derive(Debug, Deserialize)]
pub struct HandlersConfig {
    /// `"reference"` for the built-in stubs, `"webhook"` to call out over
    /// HTTP.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Login URL reported by the reference handlers.
    #[serde(default = "default_login_url")]
    pub login_url: String,
    /// Base URL for webhook mode. Each event is POSTed to
    /// `{webhook_url}/{event}` with the event in lowercase.
    pub webhook_url: Option<String>,
}

impl Default for HandlersConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            login_url: default_login_url(),
            webhook_url: None,
        }
    }
}

fn default_mode() -> String {
    "reference".to_owned()
}

fn default_login_url() -> String {
    "https://localhost/login".to_owned()
}
