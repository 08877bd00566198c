//! Exercises the automatic 401 refresh-and-retry against a local HTTP
//! stand-in for the Spotify accounts and Web API hosts.

use playlistwatch::{Authz, Error, PlaylistService, SpotifyClient};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Serve a fake accounts + Web API pair on one port: the token endpoint
/// always hands out a fresh access token, every API path answers 401.
/// Returns the bound address and a counter of API hits.
async fn spawn_always_unauthorized_server() -> (std::net::SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let api_hits = Arc::new(AtomicUsize::new(0));
    let hits = api_hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let hits = hits.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|window| window == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&buf);
                let path = head.split_whitespace().nth(1).unwrap_or("");

                if path.starts_with("/accounts/token") {
                    respond(&mut stream, "200 OK", r#"{"access_token":"fresh"}"#).await;
                } else {
                    hits.fetch_add(1, Ordering::SeqCst);
                    respond(
                        &mut stream,
                        "401 Unauthorized",
                        r#"{"error":{"status":401,"message":"Invalid access token"}}"#,
                    )
                    .await;
                }
            });
        }
    });

    (addr, api_hits)
}

#[tokio::test]
async fn expired_token_refreshes_once_then_surfaces_the_error() {
    let (addr, api_hits) = spawn_always_unauthorized_server().await;

    let refreshes = Arc::new(AtomicUsize::new(0));
    let refresh_count = refreshes.clone();

    let client = SpotifyClient::new("id".to_string(), "secret".to_string())
        .with_api_base_url(format!("http://{addr}/api"))
        .with_accounts_base_url(format!("http://{addr}/accounts"))
        .with_authz(Authz::new("stale".to_string(), "refresh".to_string()))
        .with_authz_refresh_callback(move |_| {
            refresh_count.fetch_add(1, Ordering::SeqCst);
        });

    let err = client.current_user_id().await.unwrap_err();

    match err {
        Error::SpotifyApiError(api) => assert_eq!(api.status, 401),
        other => panic!("expected a surfaced 401, got {other:?}"),
    }

    // One original request plus exactly one retry after the refresh; no
    // further refresh cycles
    assert_eq!(api_hits.load(Ordering::SeqCst), 2);
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);

    // The refreshed token did get installed before the retry
    let stored = client.get_authz().unwrap();
    assert_eq!(stored.access_token, "fresh");
}
