use crate::assertions;
use apiwatch_common::duration::parse_duration;
use apiwatch_common::types::{ApiKeyLocation, AuthConfig, MonitoringTarget, ProbeResult};
use chrono::Utc;
use reqwest::header::{HeaderName, HeaderValue};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing;

const MAX_BODY_BYTES: usize = 1024 * 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs one probe: build, dispatch, capture, assert. Never retries; every
/// failure mode is recorded on the result.
pub async fn check_target(client: &reqwest::Client, target: &MonitoringTarget) -> ProbeResult {
    let timestamp = Utc::now();
    let start = Instant::now();
    let mut result = ProbeResult {
        id: apiwatch_common::id::next_id(),
        target_id: target.id.clone(),
        status_code: 0,
        response_time: 0.0,
        success: false,
        error: String::new(),
        response_headers: HashMap::new(),
        response_body: String::new(),
        timestamp,
    };

    let timeout = parse_duration(&target.timeout).unwrap_or_else(|e| {
        tracing::warn!(target_id = %target.id, error = %e, "Invalid probe timeout, using default");
        DEFAULT_TIMEOUT
    });

    let request = match prepare_request(client, target, timeout) {
        Ok(request) => request,
        Err(e) => {
            result.error = format!("Failed to prepare request: {e}");
            result.response_time = start.elapsed().as_secs_f64();
            return result;
        }
    };

    let mut response = match client.execute(request).await {
        Ok(response) => response,
        Err(e) => {
            result.error = format!("Request failed: {e}");
            result.response_time = start.elapsed().as_secs_f64();
            return result;
        }
    };

    result.status_code = response.status().as_u16();
    for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            result
                .response_headers
                .insert(name.to_string(), value.to_string());
        }
    }

    // Read up to the cap; anything beyond is discarded silently and the
    // assertion layer only ever sees the captured prefix.
    let mut body = Vec::with_capacity(8 * 1024);
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let remaining = MAX_BODY_BYTES - body.len();
                body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
                if body.len() >= MAX_BODY_BYTES {
                    break;
                }
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }
    result.response_body = String::from_utf8_lossy(&body).into_owned();
    result.response_time = start.elapsed().as_secs_f64();

    result.success = assertions::evaluate(
        &target.expected_status,
        &target.response_rules,
        result.status_code,
        &result.response_body,
    );

    result
}

/// Builds the outgoing request: method, URL, headers, body, auth, and the
/// per-request timeout.
pub fn prepare_request(
    client: &reqwest::Client,
    target: &MonitoringTarget,
    timeout: Duration,
) -> anyhow::Result<reqwest::Request> {
    let method = reqwest::Method::from_bytes(target.method.as_bytes())
        .map_err(|_| anyhow::anyhow!("invalid method: {}", target.method))?;

    let mut builder = client.request(method, &target.url).timeout(timeout);

    for (name, value) in &target.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| anyhow::anyhow!("invalid header name: {name}"))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| anyhow::anyhow!("invalid header value for {name}"))?;
        builder = builder.header(name, value);
    }

    if let Some(body) = &target.body {
        builder = builder.body(body.clone());
    }

    if let Some(auth) = &target.auth_config {
        builder = match auth {
            AuthConfig::Bearer { token } => builder.bearer_auth(token),
            AuthConfig::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
            AuthConfig::ApiKey {
                key,
                location,
                name,
            } => match location {
                ApiKeyLocation::Header => {
                    let header = HeaderName::from_bytes(name.as_bytes())
                        .map_err(|_| anyhow::anyhow!("invalid api key header: {name}"))?;
                    builder.header(header, key)
                }
                ApiKeyLocation::Query => builder.query(&[(name.as_str(), key.as_str())]),
            },
        };
    }

    Ok(builder.build()?)
}
