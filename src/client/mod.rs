//! HTTP clients: span scoring endpoint and tokenizer download.

mod hub;
mod scorer;

pub use hub::*;
pub use scorer::*;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Raw HTTP/1.1 response that closes the connection.
    pub fn reply(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut out = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n",
            body.len()
        );
        for (name, value) in headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        out.push_str(body);
        out
    }

    /// Local HTTP server answering the n-th connection with `replies[n]`.
    ///
    /// The last reply repeats once the list runs out.
    pub struct StubServer {
        pub url: String,
        hits: Arc<AtomicUsize>,
    }

    impl StubServer {
        pub async fn start(replies: Vec<String>) -> Self {
            assert!(!replies.is_empty());
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&hits);

            tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    let reply = &replies[n.min(replies.len() - 1)];
                    read_request(&mut stream).await;
                    let _ = stream.write_all(reply.as_bytes()).await;
                    let _ = stream.shutdown().await;
                }
            });

            Self { url, hits }
        }

        /// Connections accepted so far.
        pub fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    /// Consume headers and body so closing the socket does not reset it.
    async fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);

            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }
}
