//! Server-sent event stream consumer.
//!
//! A live evaluation or agent run is delivered as an SSE body: records are
//! separated by a blank line and carry their JSON payload on `data:` lines.
//! [`SseDecoder`] turns arbitrary byte chunks into JSON records,
//! [`consume_stream`] drives a decoder over any byte stream and hands each
//! record to a handler, and [`StreamClient`] opens the HTTP request.
//!
//! The caller learns how consumption ended through [`StreamEnd`]: a handler
//! that saw a terminal record returns [`Flow::Stop`], while a body that simply
//! runs out yields [`StreamEnd::Exhausted`] so a fallback path can kick in.

use std::fmt::Display;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::error::StreamError;

/// Default connect timeout for stream requests.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// What a record handler wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// A terminal record was seen; stop reading.
    Stop,
}

/// How a stream ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The handler asked to stop.
    Stopped,
    /// The body ended on its own.
    Exhausted,
}

/// Incremental SSE decoder with a carry-over buffer.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    utf8_carry: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes, which may split a UTF-8 sequence at either end.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<Value> {
        self.utf8_carry.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.utf8_carry) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                tracing::debug!(error = %e, "Invalid UTF-8 in event stream; replacing");
                let text = String::from_utf8_lossy(&self.utf8_carry).into_owned();
                self.utf8_carry.clear();
                return self.push(&text);
            }
        };

        let rest = self.utf8_carry.split_off(valid);
        let text = String::from_utf8(std::mem::replace(&mut self.utf8_carry, rest))
            .unwrap_or_default();
        self.push(&text)
    }

    /// Feeds a text chunk, returning every record it completes.
    pub fn push(&mut self, chunk: &str) -> Vec<Value> {
        self.buffer.push_str(chunk);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut records = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            if let Some(record) = parse_block(&block) {
                records.push(record);
            }
        }
        records
    }

    /// Drains a trailing record that arrived without its delimiter.
    pub fn finish(&mut self) -> Vec<Value> {
        let block = std::mem::take(&mut self.buffer);
        self.utf8_carry.clear();
        parse_block(&block).into_iter().collect()
    }
}

fn parse_block(block: &str) -> Option<Value> {
    let data: Vec<&str> = block
        .lines()
        .filter_map(|line| {
            line.strip_prefix("data:")
                .map(|payload| payload.strip_prefix(' ').unwrap_or(payload))
        })
        .collect();
    if data.is_empty() {
        return None;
    }

    let payload = data.join("\n");
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed stream record");
            None
        }
    }
}

/// Reads a byte stream to the end, passing each decoded record to `handler`.
///
/// Handler errors abort consumption immediately and are returned as-is.
/// Transport errors from the underlying stream become
/// [`StreamError::Transport`].
pub async fn consume_stream<S, B, E, F>(stream: S, mut handler: F) -> Result<StreamEnd, StreamError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
    F: FnMut(Value) -> Result<Flow, StreamError>,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = SseDecoder::new();
    let mut records = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| StreamError::Transport(e.to_string()))?;
        for record in decoder.push_bytes(chunk.as_ref()) {
            records += 1;
            if handler(record)? == Flow::Stop {
                tracing::debug!(records, "Stream stopped by terminal record");
                return Ok(StreamEnd::Stopped);
            }
        }
    }

    for record in decoder.finish() {
        records += 1;
        if handler(record)? == Flow::Stop {
            return Ok(StreamEnd::Stopped);
        }
    }

    tracing::debug!(records, "Stream exhausted");
    Ok(StreamEnd::Exhausted)
}

/// HTTP client for SSE endpoints.
#[derive(Debug, Clone)]
pub struct StreamClient {
    http: Client,
}

impl Default for StreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamClient {
    /// Creates a client with the default connect timeout and no read timeout.
    pub fn new() -> Self {
        let http = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { http }
    }

    /// Wraps an existing HTTP client.
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    /// POSTs `payload` as JSON and consumes the SSE response body.
    pub async fn post<P, F>(&self, url: &str, payload: &P, handler: F) -> Result<StreamEnd, StreamError>
    where
        P: Serialize + ?Sized,
        F: FnMut(Value) -> Result<Flow, StreamError>,
    {
        let body = serde_json::to_vec(payload)?;
        tracing::debug!(url = %url, bytes = body.len(), "Opening event stream");

        let response = self
            .http
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    StreamError::Transport(e.to_string())
                } else {
                    StreamError::Connect {
                        url: url.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Http {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        consume_stream(response.bytes_stream(), handler).await
    }
}
