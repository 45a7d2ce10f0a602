use std::path::PathBuf;

/// Global configuration for the tether client.
///
/// Centralizes API URL, token, home directory, and path configuration.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub api_url: String,
    pub api_token: String,
    pub home_dir: PathBuf,
    pub settings_file: PathBuf,
}

impl Configuration {
    /// Create configuration from environment variables and defaults.
    pub fn create() -> anyhow::Result<Self> {
        let api_url =
            std::env::var("TETHER_API_URL").unwrap_or_else(|_| "http://localhost:8787".into());
        let api_token = std::env::var("TETHER_API_TOKEN").unwrap_or_default();

        // Home directory: TETHER_HOME env > ~/.tether
        let home_dir = if let Ok(home) = std::env::var("TETHER_HOME") {
            if home.starts_with('~') {
                if let Some(user_home) = dirs_next::home_dir() {
                    user_home.join(home.trim_start_matches(['~', '/']))
                } else {
                    PathBuf::from(home)
                }
            } else {
                PathBuf::from(home)
            }
        } else {
            let user_home = dirs_next::home_dir()
                .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
            user_home.join(".tether")
        };

        std::fs::create_dir_all(&home_dir)?;

        let settings_file = home_dir.join("settings.json");

        Ok(Self {
            api_url,
            api_token,
            home_dir,
            settings_file,
        })
    }

    /// Load settings from file and merge with env-based config.
    ///
    /// Priority: env > settings file > default.
    pub fn load_with_settings(&mut self) -> anyhow::Result<()> {
        let settings = crate::persistence::read_settings(&self.settings_file)?;

        if self.api_token.is_empty() {
            if let Some(ref token) = settings.api_token {
                tracing::debug!("API token loaded from settings file");
                self.api_token = token.clone();
            }
        } else {
            tracing::debug!("API token loaded from environment variable");
        }

        if std::env::var("TETHER_API_URL").is_err()
            && let Some(ref url) = settings.api_url
        {
            self.api_url = url.clone();
        }

        Ok(())
    }
}
