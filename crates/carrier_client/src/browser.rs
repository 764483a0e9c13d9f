//! Browser-driven capture fallback and session refresh.
//!
//! When both direct attempts fail, we open an isolated page on a shared
//! headless browser, navigate to the user-facing results page, and capture
//! the first matching successful availability response the page itself
//! makes. Capture is a race between a one-shot channel and a timer
//! (`recv_timeout`); each attempt gets a fresh tab, never a reused one.
//!
//! All browser work is synchronous and runs on the blocking pool.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info, warn};

use common::config::CarrierConfig;
use common::{Error, MonthAvailability, MonthRequestKey, Result};

use crate::payload;
use crate::rest::fill_path;

const CAPTURE_WINDOW: Duration = Duration::from_secs(30);
const CONSENT_TIMEOUT: Duration = Duration::from_secs(5);
const CONSENT_SELECTOR: &str = "#onetrust-accept-btn-handler";

type BrowserSlot = Arc<Mutex<Option<Browser>>>;

/// Lazily launched headless browser shared by all in-flight fallbacks.
#[derive(Clone)]
pub struct BrowserCapture {
    config: CarrierConfig,
    slot: BrowserSlot,
}

impl BrowserCapture {
    pub fn new(config: CarrierConfig) -> Self {
        Self {
            config,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Capture one month's availability via the user-facing page.
    pub async fn capture_month(
        &self,
        key: &MonthRequestKey,
        captured_at: DateTime<Utc>,
    ) -> Result<MonthAvailability> {
        let config = self.config.clone();
        let slot = self.slot.clone();
        let key = key.clone();
        let raw = tokio::task::spawn_blocking(move || capture_blocking(&slot, &config, &key))
            .await
            .map_err(|e| Error::Browser(format!("capture task panicked: {e}")))??;
        payload::parse_month(&raw, captured_at)
    }

    /// Re-navigate to the landing page, accept any consent prompt, and hand
    /// back the session cookies. The caller serializes refreshes.
    pub async fn refresh_session(&self) -> Result<Vec<(String, String)>> {
        let config = self.config.clone();
        let slot = self.slot.clone();
        tokio::task::spawn_blocking(move || refresh_blocking(&slot, &config))
            .await
            .map_err(|e| Error::Browser(format!("refresh task panicked: {e}")))?
    }
}

fn browser_err(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Browser(format!("{context}: {e}"))
}

fn ensure_browser(slot: &BrowserSlot) -> Result<Browser> {
    let mut guard = slot.lock().unwrap_or_else(|p| p.into_inner());
    if let Some(browser) = guard.as_ref() {
        return Ok(browser.clone());
    }
    info!("launching headless browser");
    let options = LaunchOptions::default_builder()
        .headless(true)
        .build()
        .map_err(|e| browser_err("building launch options", e))?;
    let browser = Browser::new(options).map_err(|e| browser_err("launching browser", e))?;
    *guard = Some(browser.clone());
    Ok(browser)
}

fn capture_blocking(slot: &BrowserSlot, config: &CarrierConfig, key: &MonthRequestKey) -> Result<String> {
    let browser = ensure_browser(slot)?;
    let tab = browser
        .new_tab()
        .map_err(|e| browser_err("opening tab", e))?;

    // Every exit path closes the tab, including registration and
    // navigation failures; only browser/tab creation may return before it.
    let outcome = capture_on_tab(&tab, config, key);
    if let Err(e) = tab.close(true) {
        debug!("closing capture tab: {e}");
    }
    outcome
}

fn capture_on_tab(tab: &Tab, config: &CarrierConfig, key: &MonthRequestKey) -> Result<String> {
    // Exact API path for this month, so unrelated responses are ignored.
    let api_fragment = fill_path(&config.availability_path, key);
    let page_url = format!(
        "{}{}",
        config.base_url.trim_end_matches('/'),
        fill_path(&config.search_path, key)
    );

    let (tx, rx) = mpsc::channel::<std::result::Result<String, String>>();
    tab.register_response_handling(
        "month-capture",
        Box::new(move |params, fetch_body| {
            if !params.response.url.contains(&api_fragment) {
                return;
            }
            let status = params.response.status as i64;
            if status != 200 {
                let _ = tx.send(Err(format!("intercepted response status {status}")));
                return;
            }
            match fetch_body() {
                Ok(body) => {
                    let text = if body.base_64_encoded {
                        match BASE64.decode(body.body.as_bytes()) {
                            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                            Err(e) => {
                                let _ = tx.send(Err(format!("body decode failed: {e}")));
                                return;
                            }
                        }
                    } else {
                        body.body
                    };
                    let _ = tx.send(Ok(text));
                }
                Err(e) => {
                    let _ = tx.send(Err(format!("fetching response body: {e}")));
                }
            }
        }),
    )
    .map_err(|e| browser_err("registering response handler", e))?;

    debug!("browser fallback for {key}: {page_url}");
    tab.navigate_to(&page_url)
        .map_err(|e| browser_err("navigating", e))?;

    match rx.recv_timeout(CAPTURE_WINDOW) {
        Ok(Ok(body)) => Ok(body),
        Ok(Err(reason)) => Err(Error::Browser(reason)),
        Err(_) => Err(Error::Browser(format!(
            "no matching response within {}s",
            CAPTURE_WINDOW.as_secs()
        ))),
    }
}

fn refresh_blocking(slot: &BrowserSlot, config: &CarrierConfig) -> Result<Vec<(String, String)>> {
    let browser = ensure_browser(slot)?;
    let tab = browser
        .new_tab()
        .map_err(|e| browser_err("opening refresh tab", e))?;

    let outcome = refresh_on_tab(&tab, config);
    if let Err(e) = tab.close(true) {
        debug!("closing refresh tab: {e}");
    }
    outcome
}

fn refresh_on_tab(tab: &Tab, config: &CarrierConfig) -> Result<Vec<(String, String)>> {
    let landing = format!(
        "{}{}",
        config.base_url.trim_end_matches('/'),
        config.landing_path
    );
    info!("session refresh: {landing}");
    tab.navigate_to(&landing)
        .map_err(|e| browser_err("navigating to landing page", e))?;
    tab.wait_until_navigated()
        .map_err(|e| browser_err("waiting for landing page", e))?;

    // Consent prompt only appears on a cold session.
    match tab.wait_for_element_with_custom_timeout(CONSENT_SELECTOR, CONSENT_TIMEOUT) {
        Ok(button) => {
            if let Err(e) = button.click() {
                warn!("consent click failed: {e}");
            }
        }
        Err(_) => debug!("no consent prompt shown"),
    }

    Ok(tab
        .get_cookies()
        .map_err(|e| browser_err("reading cookies", e))?
        .into_iter()
        .map(|c| (c.name, c.value))
        .collect())
}
