use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use tracing::debug;

use crate::core::error::{LoaderError, LoaderResult};

/// Single-shot network fetches used by the pipeline.
///
/// Dropping a returned future aborts the request.
#[async_trait]
pub trait BundleTransport: Send + Sync {
    /// GET `url` and return the body as text (manifests).
    async fn fetch_text(&self, url: &str) -> LoaderResult<String>;

    /// GET `url` and return the raw body (bundles).
    async fn fetch_bytes(&self, url: &str) -> LoaderResult<Vec<u8>>;
}

/// reqwest-backed transport. Any non-2xx status is a transport error.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, url: &str) -> LoaderResult<Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LoaderError::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoaderError::transport(
                url,
                format!("HTTP {}", status.as_u16()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl BundleTransport for HttpTransport {
    async fn fetch_text(&self, url: &str) -> LoaderResult<String> {
        let text = self
            .send(url)
            .await?
            .text()
            .await
            .map_err(|e| LoaderError::transport(url, e))?;
        debug!("Fetched {} bytes of text from {}", text.len(), url);
        Ok(text)
    }

    async fn fetch_bytes(&self, url: &str) -> LoaderResult<Vec<u8>> {
        let response = self.send(url).await?;
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LoaderError::transport(url, e))?;
            body.extend_from_slice(&chunk);
        }
        debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one canned HTTP response on a loopback port and return its URL.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/scenes/level1", addr)
    }

    #[tokio::test]
    async fn oversized_content_length_is_a_transport_error() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 1000000000000000000\r\nConnection: close\r\n\r\nabc",
        )
        .await;

        let err = HttpTransport::new(Client::new())
            .fetch_bytes(&url)
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::Transport { .. }));
    }

    #[tokio::test]
    async fn error_status_is_a_transport_error() {
        let url = serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;

        let err = HttpTransport::new(Client::new())
            .fetch_bytes(&url)
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::Transport { ref message, .. } if message == "HTTP 404"));
    }

    #[tokio::test]
    async fn body_is_collected() {
        let url = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 6\r\nConnection: close\r\n\r\nbundle").await;

        let bytes = HttpTransport::new(Client::new())
            .fetch_bytes(&url)
            .await
            .unwrap();
        assert_eq!(bytes, b"bundle");
    }
}
