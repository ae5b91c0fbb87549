//! The HTTP transport. Owns the `reqwest` client, the session token,
//! and the packet-dump file; everything else in the crate talks to
//! the cloud through this module.

use crate::{config::ClientOptions, constant, payload};
use arlo_api::{Error, Result};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Method,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Semaphore;
use tokio::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
struct Session {
    token: String,
    user_id: String,
}

pub struct Backend {
    client: reqwest::Client,
    host: String,
    username: String,
    password: String,
    dump_file: Option<PathBuf>,
    session: Mutex<Option<Session>>,
    permits: Semaphore,
    transid: AtomicU64,
}

// Translates transport-level errors into our error catalog. Connect
// timeouts and request timeouts both surface as `TimeoutError` so the
// daemon can treat them as "fix your network and restart".

fn xlat_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::TimeoutError
    } else if e.status() == Some(reqwest::StatusCode::UNAUTHORIZED) {
        Error::AuthenticationError
    } else if e.is_connect() {
        Error::OperationError(format!("can't reach service -- {}", e))
    } else {
        Error::OperationError(format!("request failed -- {}", e))
    }
}

// Unwraps the vendor `{success, data}` envelope. A reply can be an
// HTTP 200 and still be a failure.

fn decode_envelope(
    env: payload::Envelope,
    path: &str,
) -> Result<serde_json::Value> {
    if env.success {
        Ok(env.data)
    } else {
        Err(Error::OperationError(format!(
            "service reported failure for {}",
            path
        )))
    }
}

impl Backend {
    pub fn new(opts: &ClientOptions) -> Result<Self> {
        let mut hdr_map = HeaderMap::new();

        hdr_map.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // Build the client with our desired defaults. The service
        // closes idle connections aggressively, so keep the pool
        // small and the keepalive short.

        let mut builder = reqwest::Client::builder()
            .user_agent(opts.user_agent_header())
            .default_headers(hdr_map)
            .use_rustls_tls()
            .tcp_keepalive(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(opts.http_connections);

        if !opts.request_timeout.is_zero() {
            builder = builder.timeout(opts.request_timeout);
        }

        let client = builder.build().map_err(|e| {
            Error::OperationError(format!("can't create connection -- {}", e))
        })?;

        Ok(Backend {
            client,
            host: opts.host.trim_end_matches('/').to_string(),
            username: opts.username.clone(),
            password: opts.password.clone(),
            dump_file: if opts.packet_dump {
                Some(opts.storage_dir.join("packet.dump"))
            } else {
                None
            },
            session: Mutex::new(None),
            permits: Semaphore::new(opts.http_max_size),
            transid: AtomicU64::new(1),
        })
    }

    /// Generates the id attached to commands we publish to devices.
    /// Ids are unique for the life of the client.

    pub fn next_trans_id(&self) -> String {
        let seq = self.transid.fetch_add(1, Ordering::Relaxed);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        format!("{}!{}!{}", constant::TRANSID_PREFIX, seq, now)
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.lock().unwrap().is_some()
    }

    /// The cloud user id of the current session.

    pub fn user_id(&self) -> Result<String> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.user_id.clone())
            .ok_or(Error::AuthenticationError)
    }

    fn token(&self) -> Result<String> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.token.clone())
            .ok_or(Error::AuthenticationError)
    }

    /// Authenticates with the service and stores the session token
    /// for subsequent calls.

    pub async fn login(&self) -> Result<payload::LoginData> {
        let body = serde_json::json!({
            "email": &self.username,
            "password": &self.password,
        });
        let data = self
            .request(Method::POST, constant::LOGIN_PATH, Some(&body), false)
            .await?;
        let data: payload::LoginData = serde_json::from_value(data)
            .map_err(|e| Error::ProtocolError(format!("bad login reply -- {}", e)))?;

        debug!("logged in as user {}", &data.user_id);

        *self.session.lock().unwrap() = Some(Session {
            token: data.token.clone(),
            user_id: data.user_id.clone(),
        });
        Ok(data)
    }

    /// Ends the session. The service forgets tokens on its own, so
    /// failure here is only worth a warning.

    pub async fn logout(&self) {
        if self.is_logged_in() {
            if let Err(e) = self
                .request(Method::PUT, constant::LOGOUT_PATH, None, true)
                .await
            {
                warn!("logout failed -- {}", e)
            }
            *self.session.lock().unwrap() = None;
        }
    }

    /// Drops the current session and authenticates again. Used when
    /// the event stream discovers the token has expired.

    pub async fn relogin(&self) -> Result<()> {
        *self.session.lock().unwrap() = None;
        self.login().await.map(|_| ())
    }

    pub async fn get(&self, path: &str) -> Result<serde_json::Value> {
        self.request(Method::GET, path, None, true).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.request(Method::POST, path, Some(body), true).await
    }

    /// Publishes a command to a device through its base station. The
    /// service routes these by an extra cloud-id header.

    pub async fn notify(
        &self,
        device_id: &str,
        x_cloud_id: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let path = format!("{}{}", constant::NOTIFY_PATH, device_id);

        self.request_with(Method::POST, &path, Some(body), true, x_cloud_id)
            .await
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        authed: bool,
    ) -> Result<serde_json::Value> {
        self.request_with(method, path, body, authed, None).await
    }

    async fn request_with(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        authed: bool,
        x_cloud_id: Option<&str>,
    ) -> Result<serde_json::Value> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::MissingPeer(String::from("request pool")))?;
        let url = format!("{}{}", &self.host, path);
        let mut req = self.client.request(method, url);

        if authed {
            req = req.header(AUTHORIZATION, self.token()?);
        }

        if let Some(id) = x_cloud_id {
            req = req.header("xcloudId", id);
        }

        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(xlat_error)?
            .error_for_status()
            .map_err(xlat_error)?;
        let env: payload::Envelope =
            resp.json().await.map_err(|e| {
                Error::ProtocolError(format!("bad reply for {} -- {}", path, e))
            })?;
        let data = decode_envelope(env, path)?;

        self.dump(path, &data).await;
        Ok(data)
    }

    /// Opens the event-stream connection. The caller consumes the
    /// response body as a byte stream.

    pub async fn subscribe(&self) -> Result<reqwest::Response> {
        let url = format!(
            "{}{}{}",
            &self.host,
            constant::SUBSCRIBE_PATH,
            self.token()?
        );

        self.client
            .get(url)
            .header(AUTHORIZATION, self.token()?)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(xlat_error)?
            .error_for_status()
            .map_err(xlat_error)
    }

    pub async fn unsubscribe(&self) {
        if let Err(e) = self.get(constant::UNSUBSCRIBE_PATH).await {
            warn!("unsubscribe failed -- {}", e)
        }
    }

    /// Fetches a presigned media URL. These are absolute CDN links
    /// that must not carry our session token.

    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::MissingPeer(String::from("request pool")))?;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(xlat_error)?
            .error_for_status()
            .map_err(xlat_error)?;

        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(xlat_error)
    }

    // Appends a decoded payload to the packet-dump file, when the
    // user asked for one.

    async fn dump(&self, tag: &str, value: &serde_json::Value) {
        if let Some(path) = &self.dump_file {
            use tokio::io::AsyncWriteExt;

            let line = format!("{}: {}\n", tag, value);
            let file = tokio::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .await;

            match file {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(line.as_bytes()).await {
                        warn!("couldn't write packet dump -- {}", e)
                    }
                }
                Err(e) => warn!("couldn't open packet dump -- {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_backend() -> Backend {
        Backend::new(&ClientOptions::new("user@example.com", "hunter2"))
            .unwrap()
    }

    #[test]
    fn test_trans_ids() {
        let backend = mk_backend();
        let first = backend.next_trans_id();
        let second = backend.next_trans_id();

        assert_ne!(first, second);

        let parts: Vec<&str> = first.split('!').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], constant::TRANSID_PREFIX);
        assert_eq!(parts[1].parse::<u64>().unwrap(), 1);
        assert!(parts[2].parse::<u128>().is_ok());

        let parts: Vec<&str> = second.split('!').collect();

        assert_eq!(parts[1].parse::<u64>().unwrap(), 2);
    }

    #[test]
    fn test_envelope_decode() {
        let ok = payload::Envelope {
            success: true,
            data: serde_json::json!({ "token": "t" }),
        };

        assert_eq!(
            decode_envelope(ok, "/x").unwrap(),
            serde_json::json!({ "token": "t" })
        );

        let bad = payload::Envelope {
            success: false,
            data: serde_json::Value::Null,
        };

        assert!(matches!(
            decode_envelope(bad, "/x"),
            Err(Error::OperationError(_))
        ));
    }

    #[test]
    fn test_session_state() {
        let backend = mk_backend();

        assert!(!backend.is_logged_in());
        assert_eq!(backend.user_id(), Err(Error::AuthenticationError));
        assert_eq!(backend.token(), Err(Error::AuthenticationError));
    }
}
