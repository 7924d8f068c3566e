pub mod dry_run;
pub mod telegram;
pub mod yahoo;

use crate::error::{FetchError, NotifyError};
use std::fmt;

/// A finite, strictly positive price.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Outcome of a single price lookup.
pub type Quote = Result<Price, FetchError>;

/// Market-data lookup, one ticker at a time.
#[allow(async_fn_in_trait)]
pub trait PriceSource {
    async fn fetch(&self, ticker: &str) -> Quote;
}

/// Outbound alert channel.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

#[cfg(test)]
pub(crate) mod stub_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer one HTTP request on a loopback port with a canned response.
    ///
    /// Returns the base URL to point a client at.
    pub async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request_complete(&request) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });

        format!("http://{}", addr)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= end + 4 + content_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_rejects_non_positive() {
        assert!(Price::new(0.0).is_none());
        assert!(Price::new(-1.0).is_none());
        assert!(Price::new(f64::NAN).is_none());
        assert!(Price::new(f64::INFINITY).is_none());
        assert_eq!(Price::new(79.5).map(Price::value), Some(79.5));
    }

    #[test]
    fn test_price_display() {
        assert_eq!(Price::new(187.4449).unwrap().to_string(), "187.44");
    }
}
