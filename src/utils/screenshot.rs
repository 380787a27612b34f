use crate::core::BrowserDriver;
use crate::errors::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};

pub struct ScreenshotManager;

impl ScreenshotManager {
    /// `<dir>/<session>_<label>_<timestamp>.png`, with anything outside
    /// `[A-Za-z0-9_-]` in the name parts replaced.
    pub fn file_path(dir: &Path, session_name: &str, label: &str) -> PathBuf {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%3f");
        dir.join(format!(
            "{}_{}_{}.png",
            sanitize(session_name),
            sanitize(label),
            timestamp
        ))
    }

    pub async fn save_to_file(
        driver: &dyn BrowserDriver,
        dir: &Path,
        session_name: &str,
        label: &str,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = Self::file_path(dir, session_name, label);
        driver.screenshot(&path).await?;
        Ok(path)
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_path_sanitizes_parts() {
        let path = ScreenshotManager::file_path(Path::new("/tmp/shots"), "job board", "#email");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("job_board__email_"));
        assert!(name.ends_with(".png"));
        assert_eq!(path.parent().unwrap(), Path::new("/tmp/shots"));
    }
}
