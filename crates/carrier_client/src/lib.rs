//! Carrier-facing client: direct availability API, payload decoding, and
//! the browser-driven capture fallback, tied together by the per-request
//! fetch protocol in [`fetch`].

pub mod browser;
pub mod fetch;
pub mod payload;
pub mod rest;

pub use browser::BrowserCapture;
pub use fetch::CarrierFetcher;
pub use rest::CarrierRestClient;
