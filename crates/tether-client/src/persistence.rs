use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Client settings stored in settings.json.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Session the CLI attached to most recently.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_session_id: Option<String>,
}

pub fn read_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content).unwrap_or_default())
}

pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Atomically update settings with file locking for multi-process safety.
pub fn update_settings(path: &Path, updater: impl FnOnce(&mut Settings)) -> Result<Settings> {
    const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);
    const MAX_LOCK_ATTEMPTS: u32 = 50;
    const STALE_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let lock_path = path.with_extension("json.lock");
    let tmp_path = path.with_extension("json.tmp");

    // Acquire exclusive lock with retries
    let mut attempts = 0;
    loop {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(_file) => break,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                attempts += 1;
                if attempts >= MAX_LOCK_ATTEMPTS {
                    bail!("failed to acquire settings lock after 5 seconds");
                }

                // Check for stale lock
                if let Ok(meta) = std::fs::metadata(&lock_path)
                    && let Ok(modified) = meta.modified()
                    && SystemTime::now()
                        .duration_since(modified)
                        .unwrap_or(Duration::ZERO)
                        > STALE_LOCK_TIMEOUT
                {
                    let _ = std::fs::remove_file(&lock_path);
                    continue;
                }

                std::thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let result = (|| -> Result<Settings> {
        let mut settings = read_settings(path)?;
        updater(&mut settings);

        // Write atomically via rename
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&tmp_path, &content)?;
        std::fs::rename(&tmp_path, path)?;

        Ok(settings)
    })();

    // Always release lock
    let _ = std::fs::remove_file(&lock_path);

    result
}
