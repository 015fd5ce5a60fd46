use reqwest::{
    Client,
    header::{ACCEPT, USER_AGENT},
};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::{config::Endpoints, error::SourceError};

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// HTTP access to every upstream source.
#[derive(Debug, Clone)]
pub struct SourceClient {
    http: Client,
    user_agent: String,
    endpoints: Endpoints,
}

impl SourceClient {
    pub fn new(user_agent: impl Into<String>, endpoints: Endpoints) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|error| SourceError::Request { source_name: "http client", error })?;

        Ok(Self { http, user_agent: user_agent.into(), endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// GET against weather.gov, carrying the client identification header.
    pub(crate) async fn get_weather_gov<T: DeserializeOwned>(
        &self,
        source_name: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.endpoints.weather_gov, path);
        let request = self
            .http
            .get(&url)
            .query(query)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/geo+json");
        self.send(source_name, &url, request).await
    }

    /// GET against a source that needs no identification.
    pub(crate) async fn get_public<T: DeserializeOwned>(
        &self,
        source_name: &'static str,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let request = self.http.get(&url).query(query);
        self.send(source_name, &url, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        source_name: &'static str,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SourceError> {
        debug!(source = source_name, %url, "Sending request");

        let res = request
            .send()
            .await
            .map_err(|error| SourceError::Request { source_name, error })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|error| SourceError::Request { source_name, error })?;

        debug!(source = source_name, %status, bytes = body.len(), "Received response");

        if !status.is_success() {
            return Err(SourceError::Status {
                source_name,
                status,
                body: truncate_body(&body),
            });
        }

        serde_json::from_str(&body).map_err(|error| SourceError::Parse { source_name, error })
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_body_keeps_short_bodies() {
        assert_eq!(truncate_body("oops"), "oops");
    }

    #[test]
    fn truncate_body_cuts_on_char_boundary() {
        let body = "é".repeat(300);
        let cut = truncate_body(&body);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 203);
    }
}
