//! HTTP output adapter

use super::Auth;
use crate::config::{FieldMapping, ParameterSet};
use crate::error::{Result, TransferError};
use crate::etl::{Adapter, AdapterState, Lifecycle, OutputAdapter};
use crate::record::Record;

use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::Duration;
use url::Url;

pub const HTTP_OUTPUT_PLUGIN: &str = "HTTP_OUTPUT_PLUGIN";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const HELP: &str = "HTTP output plugin parameters:\n\
    --op \"url=<http(s) endpoint>[|method=<POST|PUT>][|timeout=<seconds, default 30>]\
    [|auth=<basic|apikey|none>][|username=<user>|password=<password>][|apikey=<key>]\
    [|mapping=key:item_field~key2:item_field2]\"\n\
    Each item is sent as one JSON object; a non-2xx response fails that item.";

/// Sends every record as a JSON request body
pub struct HttpOutput {
    lifecycle: Lifecycle,
    client: Option<Client>,
    url: Option<Url>,
    method: Method,
    mapping: Option<FieldMapping>,
}

impl HttpOutput {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(HTTP_OUTPUT_PLUGIN),
            client: None,
            url: None,
            method: Method::POST,
            mapping: None,
        }
    }

    pub fn help_text() -> &'static str {
        HELP
    }
}

impl Default for HttpOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for HttpOutput {
    fn name(&self) -> &'static str {
        HTTP_OUTPUT_PLUGIN
    }

    fn help(&self) -> &'static str {
        HELP
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn close(&mut self) -> Result<()> {
        if self.lifecycle.close() {
            log::debug!("Disposing http output plugin");
            self.client = None;
        }
        Ok(())
    }
}

#[async_trait]
impl OutputAdapter for HttpOutput {
    async fn init(&mut self, config: &ParameterSet) -> Result<()> {
        self.lifecycle.begin_init()?;
        let init_err = |reason: String| TransferError::init(HTTP_OUTPUT_PLUGIN, reason);

        let raw_url = config.require(self.name(), "url")?;
        let url = Url::parse(raw_url).map_err(|e| init_err(format!("invalid url '{}': {}", raw_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(init_err(format!("unsupported url scheme '{}'", url.scheme())));
        }

        let method = match config.get("method").map(str::to_uppercase).as_deref() {
            None | Some("POST") => Method::POST,
            Some("PUT") => Method::PUT,
            Some(other) => return Err(init_err(format!("method must be POST or PUT, got '{}'", other))),
        };

        let timeout = match config.get("timeout") {
            None => DEFAULT_TIMEOUT_SECS,
            Some(raw) => raw
                .parse()
                .map_err(|_| init_err(format!("timeout must be a number of seconds, got '{}'", raw)))?,
        };

        let auth = Auth::from_parameters(self.name(), config)?;
        let headers = auth
            .headers()
            .map_err(|e| init_err(format!("invalid credentials: {}", e)))?;
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| init_err(e.to_string()))?;

        log::debug!("Plugin parameters: url: {} method: {} auth: {}", url, method, auth);
        self.mapping = config.mapping()?;
        self.client = Some(client);
        self.url = Some(url);
        self.method = method;
        self.lifecycle.mark_ready();
        log::info!("HTTP output plugin initialized");
        Ok(())
    }

    async fn write(&mut self, record: &Record) -> Result<()> {
        self.lifecycle.enter("write")?;
        let (Some(client), Some(url)) = (self.client.as_ref(), self.url.as_ref()) else {
            return Err(TransferError::item("http client is not open"));
        };

        let body = match &self.mapping {
            Some(mapping) => mapping.select(record),
            None => record.clone(),
        };

        let response = client
            .request(self.method.clone(), url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| TransferError::item(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransferError::item(format!(
                "{} {} returned {}: {}",
                self.method,
                url,
                status,
                text.trim()
            )));
        }
        log::debug!("Item sent, status {}", status);
        Ok(())
    }
}
