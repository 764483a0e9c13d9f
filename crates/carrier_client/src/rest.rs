//! Direct machine-to-machine calls against the carrier's availability API.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::cookie::Jar;
use reqwest::header;
use tracing::debug;
use url::Url;

use common::config::CarrierConfig;
use common::{Error, MonthAvailability, MonthRequestKey, Result};

use crate::payload;

const DIRECT_TIMEOUT: Duration = Duration::from_secs(20);
const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

/// Substitute `{origin}`/`{destination}`/`{year}`/`{month}` in a path
/// template.
pub fn fill_path(template: &str, key: &MonthRequestKey) -> String {
    template
        .replace("{origin}", &key.origin)
        .replace("{destination}", &key.destination)
        .replace("{year}", &key.year)
        .replace("{month}", &key.month)
}

/// Pooled HTTP client sharing a cookie jar with the browser session.
#[derive(Debug, Clone)]
pub struct CarrierRestClient {
    client: reqwest::Client,
    jar: Arc<Jar>,
    base: Url,
    config: CarrierConfig,
}

impl CarrierRestClient {
    pub fn new(config: CarrierConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| Error::Config(format!("invalid base_url '{}': {e}", config.base_url)))?;
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(4)
            .timeout(DIRECT_TIMEOUT)
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| Error::Http(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            jar,
            base,
            config,
        })
    }

    fn availability_url(&self, key: &MonthRequestKey) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            fill_path(&self.config.availability_path, key)
        )
    }

    /// Adopt session cookies captured by the browser, so direct attempts
    /// ride the refreshed session.
    pub fn adopt_cookies(&self, cookies: &[(String, String)]) {
        for (name, value) in cookies {
            self.jar
                .add_cookie_str(&format!("{name}={value}; Path=/"), &self.base);
        }
    }

    /// One direct availability request. Non-2xx or an unparseable body is a
    /// failure with a status + truncated-body reason.
    pub async fn fetch_month_direct(
        &self,
        key: &MonthRequestKey,
        captured_at: DateTime<Utc>,
    ) -> Result<MonthAvailability> {
        let url = self.availability_url(key);
        debug!("direct fetch {key}: GET {url}");

        let resp = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::Http(format!("{key}: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Http(format!("{key}: reading body: {e}")))?;

        if !status.is_success() {
            return Err(Error::CarrierApi {
                status: status.as_u16(),
                snippet: Error::body_snippet(&body),
            });
        }

        payload::parse_month(&body, captured_at)
    }
}
