use crate::error::{Error, ErrorKind, TransportErrorKind};
use crate::transport::{Channel, Credential, JoinRequest, Signal, Transport};
use async_trait::async_trait;
use eventsource_client::{self as es, Client};
use events::RawEvent;
use futures_util::stream::StreamExt;
use log::*;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

/// Path of the join endpoint, relative to the API base URL.
const JOIN_PATH: &str = "/realtime/join";

/// Reconnect behavior handed to the event source client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectSettings {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2,
        }
    }
}

/// [`Transport`] over Server-Sent Events.
///
/// Each `open` starts a reader task that turns the SSE stream into signals.
/// The stream carries no explicit handshake frame, so the first frame after a
/// (re)connect (an event or a keep-alive comment) counts as `Connected`.
pub struct SseTransport {
    base_url: String,
    sse_path: String,
    reconnect: ReconnectSettings,
    http: reqwest::Client,
}

impl SseTransport {
    pub fn new(base_url: impl Into<String>, sse_path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sse_path: sse_path.into(),
            reconnect: ReconnectSettings::default(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectSettings) -> Self {
        self.reconnect = reconnect;
        self
    }

    fn stream_url(&self) -> String {
        format!("{}{}", self.base_url, self.sse_path)
    }

    fn reconnect_options(&self) -> es::ReconnectOptions {
        es::ReconnectOptions::reconnect(true)
            .retry_initial(true)
            .delay(self.reconnect.initial_delay)
            .backoff_factor(self.reconnect.backoff_factor)
            .delay_max(self.reconnect.max_delay)
            .build()
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn open(&self, credential: &Credential) -> Result<Channel, Error> {
        let url = self.stream_url();
        let (tx, rx) = mpsc::unbounded_channel();

        let client = es::ClientBuilder::for_url(&url)?
            .header("Authorization", &format!("Bearer {}", credential.expose()))?
            .reconnect(self.reconnect_options())
            .build();

        debug!("Opening SSE stream at {}", url);

        let reader = tokio::spawn(async move {
            let mut stream = client.stream();
            let mut live = false;

            loop {
                let signals = match stream.next().await {
                    Some(Ok(es::SSE::Event(event))) => {
                        let mut signals = handshake(&mut live);
                        match serde_json::from_str::<Value>(&event.data) {
                            Ok(data) => {
                                signals.push(Signal::Event(RawEvent::new(event.event_type, data)))
                            }
                            Err(e) => {
                                warn!(
                                    "Dropping SSE event '{}' with non-JSON data: {}",
                                    event.event_type, e
                                );
                            }
                        }
                        signals
                    }
                    Some(Ok(es::SSE::Comment(_))) => {
                        // Keep-alive; only meaningful as proof of a live stream
                        handshake(&mut live)
                    }
                    Some(Err(e)) => {
                        let signal = if live {
                            Signal::Disconnected
                        } else {
                            Signal::ConnectError(e.to_string())
                        };
                        live = false;
                        vec![signal]
                    }
                    None => {
                        debug!("SSE stream ended");
                        if live {
                            let _ = tx.send(Signal::Disconnected);
                        }
                        break;
                    }
                };

                if signals.into_iter().any(|s| tx.send(s).is_err()) {
                    debug!("SSE signal receiver dropped, stopping reader");
                    break;
                }
            }
        });

        Ok(Channel::with_reader(rx, reader))
    }

    async fn join(&self, credential: &Credential, request: &JoinRequest) -> Result<(), Error> {
        let url = format!("{}{}", self.base_url, JOIN_PATH);

        let response = self
            .http
            .post(&url)
            .bearer_auth(credential.expose())
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::new(ErrorKind::Transport(
                TransportErrorKind::JoinRejected(response.status().as_u16()),
            )));
        }

        Ok(())
    }
}

/// Returns the `Connected` signal if this frame is the first since a (re)connect.
fn handshake(live: &mut bool) -> Vec<Signal> {
    if *live {
        Vec::new()
    } else {
        *live = true;
        vec![Signal::Connected]
    }
}
