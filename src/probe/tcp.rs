use futures::future::BoxFuture;
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpStream;

use super::{Reach, Reached};

/// Bare TCP handshake against the resolved address.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnect;

impl Reach for TcpConnect {
    fn reach(&self, _host: &str, ip: IpAddr, port: u16) -> BoxFuture<'static, Reached> {
        let addr = SocketAddr::new(ip, port);
        Box::pin(async move {
            match TcpStream::connect(addr).await {
                // The stream is dropped right away, closing the connection.
                Ok(_stream) => Reached::Up { http_code: None },
                Err(e) => Reached::Down {
                    http_code: None,
                    message: format!("Connection failed: {}", e),
                },
            }
        })
    }
}
