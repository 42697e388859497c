//! Phone API operations: call logs and recordings.
//!
//! Each operation fetches a fresh bearer token from the
//! [`AccessTokenProvider`] and installs it on the [`ApiClient`] before
//! issuing the request. Records are returned in the vendor's JSON shape.

use std::{sync::Arc, time::Duration};

use phonelink_core::{AccessTokenProvider, ApiError, Clock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::{ApiClient, Download, RequestOptions};

/// Pause between consecutive page requests.
pub const PAGE_DELAY: Duration = Duration::from_millis(500);

/// Filters for call-log listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallLogQuery {
    /// Start date (`yyyy-mm-dd`).
    pub from: Option<String>,
    /// End date (`yyyy-mm-dd`).
    pub to: Option<String>,
    /// Records per page.
    pub page_size: Option<u32>,
    /// Continuation token from a previous page.
    pub next_page_token: Option<String>,
}

impl CallLogQuery {
    fn to_options(&self) -> RequestOptions {
        let mut options = RequestOptions::default();
        if let Some(from) = &self.from {
            options = options.query("from", from);
        }
        if let Some(to) = &self.to {
            options = options.query("to", to);
        }
        if let Some(page_size) = self.page_size {
            options = options.query("page_size", page_size);
        }
        if let Some(token) = self.next_page_token.as_deref().filter(|t| !t.is_empty()) {
            options = options.query("next_page_token", token);
        }
        options
    }
}

/// One page of call logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallLogPage {
    /// Call-log records.
    #[serde(default, alias = "call_log")]
    pub call_logs: Vec<Value>,
    /// Token for the next page; absent or empty on the last page.
    #[serde(default)]
    pub next_page_token: Option<String>,
    /// Total records across all pages, when reported.
    #[serde(default)]
    pub total_records: Option<u64>,
}

/// One page of call recordings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingPage {
    /// Recording records.
    #[serde(default, alias = "recording_list", alias = "call_recordings")]
    pub recordings: Vec<Value>,
    /// Token for the next page.
    #[serde(default)]
    pub next_page_token: Option<String>,
    /// Total records, when reported.
    #[serde(default)]
    pub total_records: Option<u64>,
}

fn has_more(token: Option<&str>) -> bool {
    token.is_some_and(|t| !t.is_empty())
}

/// Authenticated phone API boundary.
pub struct PhoneApi {
    client: ApiClient,
    tokens: Arc<dyn AccessTokenProvider>,
    clock: Arc<dyn Clock>,
}

impl PhoneApi {
    /// Composes a client with a token source.
    pub fn new(client: ApiClient, tokens: Arc<dyn AccessTokenProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { client, tokens, clock }
    }

    /// Underlying client.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    async fn authorize(&self) -> Result<(), ApiError> {
        let token = self.tokens.access_token().await?;
        self.client.set_auth_token(token);
        Ok(())
    }

    /// Lists one page of the caller's call logs.
    ///
    /// # Errors
    ///
    /// Classified API failures; token failures surface as [`ApiError::Auth`].
    #[instrument(skip(self))]
    pub async fn list_call_logs(&self, query: &CallLogQuery) -> Result<CallLogPage, ApiError> {
        self.authorize().await?;
        let page: CallLogPage = self.client.get("/phone/users/me/call_logs", &query.to_options()).await?;
        debug!(count = page.call_logs.len(), more = has_more(page.next_page_token.as_deref()), "fetched call log page");
        Ok(page)
    }

    /// Follows pagination until exhausted, pausing between pages.
    ///
    /// # Errors
    ///
    /// The first failing page aborts the walk.
    pub async fn all_call_logs(&self, mut query: CallLogQuery) -> Result<Vec<Value>, ApiError> {
        let mut records = Vec::new();

        loop {
            let page = self.list_call_logs(&query).await?;
            records.extend(page.call_logs);

            if !has_more(page.next_page_token.as_deref()) {
                break;
            }

            query.next_page_token = page.next_page_token;
            self.clock.sleep(PAGE_DELAY).await;
        }

        info!(total = records.len(), "fetched all call logs");
        Ok(records)
    }

    /// Fetches a single call log.
    ///
    /// # Errors
    ///
    /// A missing log is reported as [`ApiError::NotFound`] tagged `CallLog`.
    #[instrument(skip(self))]
    pub async fn call_log_detail(&self, call_log_id: &str) -> Result<Value, ApiError> {
        self.authorize().await?;
        let path = format!("/phone/users/me/call_logs/{}", urlencoding::encode(call_log_id));
        self.client
            .get(&path, &RequestOptions::default())
            .await
            .map_err(|e| e.with_resource("CallLog", call_log_id))
    }

    /// Lists the caller's call recordings.
    ///
    /// # Errors
    ///
    /// Classified API failures.
    #[instrument(skip(self))]
    pub async fn list_recordings(&self) -> Result<RecordingPage, ApiError> {
        self.authorize().await?;
        let page: RecordingPage = self.client.get("/phone/users/me/recordings", &RequestOptions::default()).await?;
        debug!(count = page.recordings.len(), "fetched recordings");
        Ok(page)
    }

    /// Downloads a recording from its vendor download URL.
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] if no download key can be derived from the
    /// URL; a missing recording is [`ApiError::NotFound`] tagged `Recording`.
    #[instrument(skip_all)]
    pub async fn download_recording(&self, download_url: &str) -> Result<Download, ApiError> {
        let key = download_key(download_url)?;
        self.authorize().await?;

        let path = format!("/phone/recording/download/{}", urlencoding::encode(&key));
        let download = self
            .client
            .download(&path, &RequestOptions::default())
            .await
            .map_err(|e| e.with_resource("Recording", &key))?;

        info!(size = download.bytes.len(), "recording downloaded");
        Ok(download)
    }
}

/// Extracts the percent-decoded trailing path segment of a download URL.
pub fn download_key(download_url: &str) -> Result<String, ApiError> {
    let without_query = download_url.split(['?', '#']).next().unwrap_or_default();
    let segment = without_query.trim_end_matches('/').rsplit('/').next().unwrap_or_default();

    if segment.is_empty() || segment.contains(':') {
        return Err(ApiError::validation(format!("no download key in URL {without_query}"), vec![]));
    }

    urlencoding::decode(segment)
        .map(|key| key.into_owned())
        .map_err(|e| ApiError::validation(format!("invalid download key in URL {without_query}: {e}"), vec![]))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn download_key_is_last_decoded_segment() {
        assert_eq!(
            download_key("https://zoom.us/v2/phone/recording/download/abc%2Fdef?access_token=x").expect("key"),
            "abc/def"
        );
        assert_eq!(download_key("https://zoom.us/download/k1/").expect("key"), "k1");
    }

    #[test]
    fn download_key_rejects_bare_host() {
        assert!(download_key("https://").is_err());
        assert!(download_key("").is_err());
    }

    #[test]
    fn call_log_page_accepts_alias() {
        let page: CallLogPage =
            serde_json::from_value(json!({ "call_log": [{ "id": "L1" }], "next_page_token": "" })).expect("page");

        assert_eq!(page.call_logs.len(), 1);
        assert!(!has_more(page.next_page_token.as_deref()));
    }

    #[test]
    fn recording_page_accepts_aliases() {
        let list: RecordingPage =
            serde_json::from_value(json!({ "recording_list": [{ "id": "R1" }] })).expect("page");
        let calls: RecordingPage =
            serde_json::from_value(json!({ "call_recordings": [{ "id": "R1" }, { "id": "R2" }] })).expect("page");

        assert_eq!(list.recordings.len(), 1);
        assert_eq!(calls.recordings.len(), 2);
    }

    #[test]
    fn query_skips_empty_page_token() {
        let query = CallLogQuery {
            from: Some("2024-01-01".into()),
            page_size: Some(100),
            next_page_token: Some(String::new()),
            ..CallLogQuery::default()
        };

        let options = query.to_options();

        assert_eq!(
            options.query,
            vec![("from".to_string(), "2024-01-01".to_string()), ("page_size".to_string(), "100".to_string())]
        );
    }
}
