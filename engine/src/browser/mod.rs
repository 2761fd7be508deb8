//! Browser automation adapter
//!
//! [`ChromeBrowser`] drives a single Chrome tab through `headless_chrome`.
//! The browser is launched on first use and reused for every later call.
//! `headless_chrome` is blocking, so each call runs on the blocking pool.

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

use sdk::errors::EngineError;
use sdk::ports::BrowserAutomation;

use crate::config::BrowserConfig;

/// How long an idle browser is kept alive before Chrome shuts it down
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

/// Launch settings for Chrome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChromeOptions {
    pub headless: bool,
    /// Chrome executable; auto-detected when `None`
    pub chrome_path: Option<PathBuf>,
}

impl From<&BrowserConfig> for ChromeOptions {
    fn from(config: &BrowserConfig) -> Self {
        Self {
            headless: config.headless,
            chrome_path: config.chrome_path.clone(),
        }
    }
}

struct ChromeSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeSession {
    fn launch(options: &ChromeOptions) -> Result<Self, EngineError> {
        info!(
            "Launching Chrome (headless: {}, path: {:?})",
            options.headless, options.chrome_path
        );

        let launch_options = LaunchOptions {
            headless: options.headless,
            path: options.chrome_path.clone(),
            idle_browser_timeout: IDLE_BROWSER_TIMEOUT,
            ..Default::default()
        };

        let browser = Browser::new(launch_options)
            .map_err(|e| EngineError::Browser(format!("Browser launch failed: {}", e)))?;
        let tab = browser
            .new_tab()
            .map_err(|e| EngineError::Browser(format!("Failed to open tab: {}", e)))?;

        info!("Chrome ready");
        Ok(Self {
            _browser: browser,
            tab,
        })
    }
}

/// [`BrowserAutomation`] over a lazily launched Chrome
pub struct ChromeBrowser {
    options: ChromeOptions,
    session: Arc<Mutex<Option<ChromeSession>>>,
}

impl ChromeBrowser {
    pub fn new(options: ChromeOptions) -> Self {
        Self {
            options,
            session: Arc::new(Mutex::new(None)),
        }
    }

    pub fn options(&self) -> &ChromeOptions {
        &self.options
    }

    /// Run a blocking operation against the tab, launching Chrome if needed
    async fn with_tab<F>(&self, op: F) -> Result<(), EngineError>
    where
        F: FnOnce(&Tab) -> anyhow::Result<()> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        let options = self.options.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|_| EngineError::Browser("browser session lock poisoned".to_string()))?;

            if guard.is_none() {
                *guard = Some(ChromeSession::launch(&options)?);
            }
            let tab = guard
                .as_ref()
                .map(|session| Arc::clone(&session.tab))
                .ok_or_else(|| EngineError::Browser("browser session unavailable".to_string()))?;

            op(&tab).map_err(|e| EngineError::Browser(e.to_string()))
        })
        .await
        .map_err(|e| EngineError::Browser(format!("browser task panicked: {}", e)))?
    }
}

#[async_trait]
impl BrowserAutomation for ChromeBrowser {
    async fn navigate(&self, url: &str) -> Result<(), EngineError> {
        let url = url.to_string();
        self.with_tab(move |tab| {
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn click(&self, selector: &str) -> Result<(), EngineError> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            tab.wait_for_element(&selector)?.click()?;
            Ok(())
        })
        .await
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), EngineError> {
        let selector = selector.to_string();
        let text = text.to_string();
        self.with_tab(move |tab| {
            let element = tab.wait_for_element(&selector)?;
            element.click()?;
            tab.type_str(&text)?;
            Ok(())
        })
        .await
    }
}
