//! The event-stream task. Subscribes to the service's SSE feed,
//! frames it into events, and forwards them over a channel. The task
//! never returns on its own; it rebuilds the subscription on
//! transport errors, on idle timeouts, and on the forced reconnect
//! cadence.

use crate::{backend::Backend, constant, payload};
use arlo_api::Result;
use futures_util::StreamExt;
use std::{convert::Infallible, sync::Arc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use arlo_api::Error;

// Frames an SSE byte stream into lines. Chunk boundaries fall
// anywhere, so partial lines are carried between pushes.

mod sse {
    pub struct Lines {
        buf: String,
    }

    impl Lines {
        pub fn new() -> Self {
            Lines { buf: String::new() }
        }

        // Feeds a chunk in and returns every completed line.

        pub fn push(&mut self, chunk: &str) -> Vec<String> {
            let mut lines = vec![];

            self.buf.push_str(chunk);

            while let Some(pos) = self.buf.find('\n') {
                let line =
                    self.buf[..pos].trim_end_matches('\r').to_string();

                self.buf.drain(..=pos);
                lines.push(line)
            }
            lines
        }
    }

    // Strips the SSE framing from a line. Only `data:` lines carry
    // payloads; comments and event-name lines are dropped.

    pub fn data_of(line: &str) -> Option<&str> {
        line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))
    }

}

pub struct StreamConfig {
    /// Reconnect when nothing, keepalives included, arrives for this
    /// long.
    pub idle_timeout: Duration,

    /// Forced reconnect cadence, when the user asked for one.
    pub reconnect_every: Option<Duration>,
}

impl StreamConfig {
    /// Derives the stream settings from the client options. A zero
    /// stream timeout falls back to the service watchdog interval.

    pub fn from_options(opts: &crate::config::ClientOptions) -> Self {
        StreamConfig {
            idle_timeout: if opts.stream_timeout.is_zero() {
                Duration::from_secs(constant::EVENT_STREAM_TIMEOUT)
            } else {
                opts.stream_timeout
            },
            reconnect_every: if opts.reconnect_every > 0 {
                Some(Duration::from_secs(opts.reconnect_every * 60))
            } else {
                None
            },
        }
    }
}

async fn server(
    backend: Arc<Backend>,
    cfg: StreamConfig,
    tx: mpsc::Sender<payload::StreamEvent>,
) -> Result<Infallible> {
    // This function should never exit; every path below rebuilds the
    // subscription.

    loop {
        let resp = match backend.subscribe().await {
            Ok(resp) => resp,

            Err(Error::AuthenticationError) => {
                warn!("session expired; logging in again");
                backend.relogin().await?;
                continue;
            }

            Err(e) => {
                error!("couldn't subscribe -- {}", e);
                sleep(Duration::from_secs(constant::REFRESH_CAMERA_DELAY))
                    .await;
                continue;
            }
        };

        let connected = Instant::now();
        let mut body = resp.bytes_stream();
        let mut lines = sse::Lines::new();

        'connection: loop {
            if let Some(every) = cfg.reconnect_every {
                if connected.elapsed() >= every {
                    info!("forced reconnect after {:?}", every);
                    break 'connection;
                }
            }

            match timeout(cfg.idle_timeout, body.next()).await {
                Err(_) => {
                    warn!("event stream went quiet; reconnecting");
                    break 'connection;
                }

                Ok(None) => {
                    warn!("event stream closed by peer; reconnecting");
                    break 'connection;
                }

                Ok(Some(Err(e))) => {
                    error!("event stream error -- {}", e);
                    break 'connection;
                }

                Ok(Some(Ok(chunk))) => {
                    for line in
                        lines.push(&String::from_utf8_lossy(&chunk))
                    {
                        let json_str = match sse::data_of(&line) {
                            Some(v) => v,
                            None => continue,
                        };

                        match serde_json::from_str::<payload::StreamEvent>(
                            json_str,
                        ) {
                            Ok(ev) if ev.is_connect_ack() => {
                                debug!("event stream connected")
                            }
                            Ok(ev) => tx.send(ev).await?,
                            Err(e) => {
                                warn!("undecodable event -- {}", e)
                            }
                        }
                    }
                }
            }
        }

        backend.unsubscribe().await;
    }
}

pub fn start(
    backend: Arc<Backend>,
    cfg: StreamConfig,
    tx: mpsc::Sender<payload::StreamEvent>,
) -> JoinHandle<Result<Infallible>> {
    tokio::spawn(
        server(backend, cfg, tx).instrument(info_span!("event_stream")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientOptions;

    #[test]
    fn test_stream_config() {
        let mut opts = ClientOptions::new("user", "pw");
        let cfg = StreamConfig::from_options(&opts);

        // Zero means "use the service watchdog".

        assert_eq!(
            cfg.idle_timeout,
            Duration::from_secs(constant::EVENT_STREAM_TIMEOUT)
        );
        assert_eq!(cfg.reconnect_every, None);

        opts.stream_timeout = Duration::from_secs(90);
        opts.reconnect_every = 90;

        let cfg = StreamConfig::from_options(&opts);

        assert_eq!(cfg.idle_timeout, Duration::from_secs(90));
        assert_eq!(cfg.reconnect_every, Some(Duration::from_secs(5400)));
    }
}
