//! Worker HTTP client.
//!
//! Every call opens a fresh HTTP/1.1 connection to the owning worker (the
//! workers are local, so connection setup is cheap), attaches the admin
//! credential header and is bounded by a timeout shorter than the poll tick.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, HeaderName, HeaderValue, USER_AGENT};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use tracing::debug;

use skirmish_core::{CreateGameRequest, GameConfig, GameInfo, ServerConfig, WorkerRouter};

use crate::error::{LobbyError, LobbyResult};

/// The slice of the worker API the master depends on.
///
/// Implemented over HTTP by [`WorkerClient`]; tests substitute in-memory
/// fleets.
pub trait WorkerApi: Clone + Send + Sync + 'static {
    /// `GET /{prefix}/api/game/{id}` on the owning worker.
    fn fetch_game(&self, game_id: &str) -> impl Future<Output = LobbyResult<GameInfo>> + Send;

    /// `POST /{prefix}/api/create_game/{id}` on the owning worker.
    fn create_game(
        &self,
        game_id: &str,
        config: &GameConfig,
    ) -> impl Future<Output = LobbyResult<()>> + Send;
}

/// HTTP client for the worker fleet.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    router: WorkerRouter,
    host: String,
    admin_header: HeaderName,
    admin_token: HeaderValue,
    timeout: Duration,
}

impl WorkerClient {
    pub fn new(
        router: WorkerRouter,
        host: &str,
        admin_header: &str,
        admin_token: &str,
        timeout: Duration,
    ) -> LobbyResult<Self> {
        let admin_header = HeaderName::from_bytes(admin_header.as_bytes())
            .map_err(|e| LobbyError::Http(format!("invalid admin header name: {e}")))?;
        let admin_token = HeaderValue::from_str(admin_token)
            .map_err(|e| LobbyError::Http(format!("invalid admin token: {e}")))?;
        Ok(Self {
            router,
            host: host.to_string(),
            admin_header,
            admin_token,
            timeout,
        })
    }

    /// Build a client from validated server config.
    pub fn from_config(config: &ServerConfig) -> LobbyResult<Self> {
        let timeout = config
            .fetch_timeout()
            .map_err(|e| LobbyError::Http(e.to_string()))?;
        Self::new(
            config.router(),
            &config.workers.host,
            &config.workers.admin_header,
            &config.workers.admin_token,
            timeout,
        )
    }

    pub fn router(&self) -> &WorkerRouter {
        &self.router
    }

    /// `POST /{prefix}/api/start_game/{id}`: force-start a lobby.
    pub async fn start_game(&self, game_id: &str) -> LobbyResult<()> {
        let (status, _) = self
            .send(Method::POST, game_id, "start_game", Bytes::new())
            .await?;
        expect_success(status, game_id)
    }

    /// Issue one request and return the status and full body.
    async fn send(
        &self,
        method: Method,
        game_id: &str,
        endpoint: &str,
        body: Bytes,
    ) -> LobbyResult<(StatusCode, Bytes)> {
        let route = self.router.route(game_id);
        let address = route.address(&self.host);
        let path = format!("/{}/api/{endpoint}/{game_id}", route.path);
        let uri = format!("http://{address}{path}");

        let exchange = async {
            let stream = tokio::net::TcpStream::connect(&address)
                .await
                .map_err(|e| LobbyError::Connect {
                    address: address.clone(),
                    reason: e.to_string(),
                })?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| LobbyError::Connect {
                    address: address.clone(),
                    reason: e.to_string(),
                })?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let mut builder = Request::builder()
                .method(method)
                .uri(&path)
                .header(HOST, &address)
                .header(USER_AGENT, "skirmish-master/0.1")
                .header(self.admin_header.clone(), self.admin_token.clone());
            if !body.is_empty() {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }
            let req = builder
                .body(Full::new(body))
                .map_err(|e| LobbyError::Http(e.to_string()))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| LobbyError::Http(e.to_string()))?;
            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| LobbyError::Http(e.to_string()))?
                .to_bytes();
            Ok((status, bytes))
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => {
                if let Err(ref e) = result {
                    debug!(error = %e, %uri, "worker request failed");
                }
                result
            }
            Err(_) => {
                debug!(%uri, "worker request timed out");
                Err(LobbyError::Timeout { uri })
            }
        }
    }
}

impl WorkerApi for WorkerClient {
    async fn fetch_game(&self, game_id: &str) -> LobbyResult<GameInfo> {
        let (status, body) = self.send(Method::GET, game_id, "game", Bytes::new()).await?;
        expect_success(status, game_id)?;
        serde_json::from_slice(&body).map_err(|e| LobbyError::Malformed {
            uri: format!("/api/game/{game_id}"),
            reason: e.to_string(),
        })
    }

    async fn create_game(&self, game_id: &str, config: &GameConfig) -> LobbyResult<()> {
        let body = serde_json::to_vec(&CreateGameRequest {
            game_config: config.clone(),
        })
        .map_err(|e| LobbyError::Http(e.to_string()))?;
        let (status, _) = self
            .send(Method::POST, game_id, "create_game", Bytes::from(body))
            .await?;
        expect_success(status, game_id)
    }
}

fn expect_success(status: StatusCode, game_id: &str) -> LobbyResult<()> {
    if status == StatusCode::NOT_FOUND {
        return Err(LobbyError::NotFound(game_id.to_string()));
    }
    if !status.is_success() {
        return Err(LobbyError::Status {
            uri: game_id.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(port: u16) -> WorkerClient {
        WorkerClient::new(
            WorkerRouter::new(1, port),
            "127.0.0.1",
            "x-admin-key",
            "token",
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[test]
    fn rejects_bad_header_name() {
        let err = WorkerClient::new(
            WorkerRouter::new(1, 3001),
            "127.0.0.1",
            "bad header",
            "token",
            Duration::from_millis(50),
        )
        .unwrap_err();
        assert!(matches!(err, LobbyError::Http(_)));
    }

    #[test]
    fn from_default_config() {
        let client = WorkerClient::from_config(&ServerConfig::default()).unwrap();
        assert_eq!(client.router().num_workers(), 2);
        assert_eq!(client.timeout, Duration::from_millis(80));
    }

    #[test]
    fn expect_success_maps_statuses() {
        assert!(expect_success(StatusCode::OK, "g").is_ok());
        assert!(expect_success(StatusCode::NOT_FOUND, "g").unwrap_err().is_not_found());
        assert!(matches!(
            expect_success(StatusCode::CONFLICT, "g"),
            Err(LobbyError::Status { status: 409, .. })
        ));
    }

    #[tokio::test]
    async fn fetch_from_closed_port_fails_to_connect() {
        // Port 1 won't be listening.
        let client = client_for(1);
        let err = client.fetch_game("abc").await.unwrap_err();
        assert!(matches!(err, LobbyError::Connect { .. } | LobbyError::Timeout { .. }));
    }

    #[tokio::test]
    async fn silent_worker_times_out() {
        // Accepts the connection but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = client_for(port);
        let err = client.fetch_game("abc").await.unwrap_err();
        assert!(matches!(err, LobbyError::Timeout { .. }));
        hold.abort();
    }
}
