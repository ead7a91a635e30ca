use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::domain::Pid;
use crate::error::KiraError;

pub const DEFAULT_BASE_URL: &str = "https://dblp.org";

pub trait DblpClient: Send + Sync {
    fn fetch_profile(&self, pid: &Pid) -> Result<String, KiraError>;
    fn fetch_citation(&self, key: &str) -> Result<String, KiraError>;
    fn base_url(&self) -> &str;
}

#[derive(Clone)]
pub struct DblpHttpClient {
    client: Client,
    base_url: String,
}

impl DblpHttpClient {
    pub fn new(base_url: &str) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-ss/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::DblpHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| KiraError::DblpHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn citation_url(&self, key: &str) -> String {
        format!("{}/rec/{}.bib", self.base_url, key)
    }

    fn fetch_text(&self, url: &str) -> Result<String, KiraError> {
        debug!(%url, "dblp.request");
        let response = self.send_with_retries(|| self.client.get(url))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "DBLP request failed".to_string());
            return Err(KiraError::DblpStatus { status, message });
        }
        response
            .text()
            .map_err(|err| KiraError::DblpHttp(err.to_string()))
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, KiraError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(KiraError::DblpHttp(err.to_string()));
                }
            }
        }
    }
}

impl DblpClient for DblpHttpClient {
    fn fetch_profile(&self, pid: &Pid) -> Result<String, KiraError> {
        self.fetch_text(&pid.xml_url(&self.base_url))
    }

    fn fetch_citation(&self, key: &str) -> Result<String, KiraError> {
        self.fetch_text(&self.citation_url(key))
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
