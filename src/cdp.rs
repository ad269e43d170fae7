//! Chrome DevTools Protocol backend

use crate::{Backend, Error, HarvestConfig, PageHandle, Result, Viewport};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Emulation;
use headless_chrome::{Browser, LaunchOptions};
use log::debug;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

/// Headless Chrome engine (uses the `headless_chrome` crate)
///
/// Launches one sandboxable, GPU-less Chrome process per run and opens one
/// tab per page acquisition.
pub struct CdpBackend {
    browser: Browser,
    user_agent: String,
    navigation_timeout: Duration,
}

impl Backend for CdpBackend {
    type Page = CdpPage;

    fn launch(config: &HarvestConfig) -> Result<Self> {
        let primary = config.viewports.first().cloned().unwrap_or_else(Viewport::desktop);
        let args: Vec<&OsStr> = vec![OsStr::new("--disable-gpu"), OsStr::new("--disable-dev-shm-usage")];

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(config.sandbox)
            .window_size(Some((primary.width, primary.height)))
            .args(args)
            .build()
            .map_err(|e| Error::LaunchError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::LaunchError(format!("Failed to launch browser: {}", e)))?;

        debug!("Launched headless Chrome (sandbox: {})", config.sandbox);

        Ok(Self {
            browser,
            user_agent: config.user_agent.clone(),
            navigation_timeout: config.timing.navigation_timeout,
        })
    }

    fn new_page(&mut self) -> Result<CdpPage> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| Error::CdpError(format!("Failed to create tab: {}", e)))?;

        tab.set_user_agent(&self.user_agent, None, None)?;
        tab.set_default_timeout(self.navigation_timeout);

        Ok(CdpPage { tab })
    }

    fn close(self) -> Result<()> {
        // Dropping the browser terminates the child process.
        drop(self.browser);
        Ok(())
    }
}

/// One Chrome tab
pub struct CdpPage {
    tab: Arc<Tab>,
}

impl PageHandle for CdpPage {
    // Overrides the layout viewport; resizing the window would not.
    fn set_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        self.tab
            .call_method(Emulation::SetDeviceMetricsOverride {
                width: viewport.width,
                height: viewport.height,
                device_scale_factor: 1.0,
                mobile: false,
                scale: None,
                screen_width: None,
                screen_height: None,
                position_x: None,
                position_y: None,
                dont_set_visible_size: None,
                screen_orientation: None,
                viewport: None,
                display_feature: None,
                device_posture: None,
            })
            .map_err(|e| Error::CdpError(format!("Failed to set viewport {}: {}", viewport.label, e)))?;
        Ok(())
    }

    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        self.tab.set_default_timeout(timeout);

        self.tab
            .navigate_to(url)
            .map_err(|e| Error::NavigationError(format!("Navigation to {} failed: {}", url, e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::NavigationError(format!("Wait for navigation failed: {}", e)))?;

        Ok(())
    }

    fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| Error::ScriptError(format!("Evaluation failed: {}", e)))?;

        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    fn current_url(&self) -> String {
        self.tab.get_url()
    }

    fn close(&mut self) -> Result<()> {
        self.tab
            .close(true)
            .map_err(|e| Error::CdpError(format!("Failed to close tab: {}", e)))?;
        Ok(())
    }
}
