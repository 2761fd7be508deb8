//! Screen capture adapter
//!
//! Shells out to the platform screenshot utility (`screencapture` on macOS,
//! `scrot` on Linux) and writes timestamped PNG files into a directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use sdk::errors::EngineError;
use sdk::ports::ScreenshotService;

#[derive(Debug, Clone)]
pub struct ScreenCapture {
    output_dir: PathBuf,
}

impl ScreenCapture {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path for the next capture
    fn next_path(&self) -> PathBuf {
        let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S%.3f");
        self.output_dir.join(format!("step-{}.png", stamp))
    }

    async fn capture_to(&self, save_path: &Path) -> Result<(), EngineError> {
        info!("Capturing screenshot to: {}", save_path.display());

        #[cfg(any(target_os = "macos", target_os = "linux"))]
        let save_path_str = save_path.to_string_lossy().to_string();

        #[cfg(target_os = "macos")]
        let result = tokio::process::Command::new("screencapture")
            .arg("-x") // silent
            .arg(&save_path_str)
            .output()
            .await;

        #[cfg(target_os = "linux")]
        let result = tokio::process::Command::new("scrot")
            .arg("--overwrite")
            .arg(&save_path_str)
            .output()
            .await;

        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        let result: std::io::Result<std::process::Output> = Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no screenshot utility for this platform",
        ));

        match result {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => {
                let err = String::from_utf8_lossy(&output.stderr);
                warn!("Screenshot command failed: {}", err);
                Err(EngineError::Screenshot(err.trim().to_string()))
            }
            Err(e) => {
                warn!("Failed to execute screenshot utility: {}", e);
                Err(EngineError::Screenshot(format!(
                    "failed to execute screenshot utility: {}",
                    e
                )))
            }
        }
    }
}

#[async_trait]
impl ScreenshotService for ScreenCapture {
    async fn capture(&self) -> Result<String, EngineError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let save_path = self.next_path();
        self.capture_to(&save_path).await?;

        Ok(save_path.to_string_lossy().to_string())
    }
}
