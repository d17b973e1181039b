use futures::future::BoxFuture;
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use super::{Reach, Reached};

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub const MAX_REDIRECTS: usize = 10;

/// HEAD `/` over http, or https when the port is 443.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpHead;

pub fn head_url(host: &str, port: u16) -> String {
    let scheme = if port == 443 { "https" } else { "http" };
    if host.contains(':') && !host.starts_with('[') {
        format!("{}://[{}]:{}/", scheme, host, port)
    } else {
        format!("{}://{}:{}/", scheme, host, port)
    }
}

/// A redirect is a downgrade when it leaves https for plain http.
pub fn is_downgrade(from: &Url, to: &Url) -> bool {
    from.scheme() == "https" && to.scheme() == "http"
}

/// Decide whether to follow a redirect to `next`. `visited` holds every URL
/// already requested in the chain, oldest first; its last entry is the one
/// answering with the redirect. Returns the refusal reason, if any.
pub fn refuse_redirect(visited: &[Url], next: &Url) -> Option<String> {
    if visited.last().is_some_and(|from| is_downgrade(from, next)) {
        Some(format!("refusing redirect from https to {}", next))
    } else if visited.len() > MAX_REDIRECTS {
        Some(format!("too many redirects (more than {})", MAX_REDIRECTS))
    } else {
        None
    }
}

/// Follows safe redirects and remembers the last redirect status seen in
/// `last_code`, so a refused chain still reports the code it received.
fn redirect_policy(last_code: Arc<AtomicU16>) -> Policy {
    Policy::custom(move |attempt| {
        last_code.store(attempt.status().as_u16(), Ordering::Relaxed);
        match refuse_redirect(attempt.previous(), attempt.url()) {
            Some(reason) => attempt.error(reason),
            None => attempt.follow(),
        }
    })
}

/// The client is pinned to the address the probe resolved, so the request
/// hits the same IP that was reported.
fn build_client(host: &str, addr: SocketAddr, last_code: Arc<AtomicU16>) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect_policy(last_code))
        .resolve(host, addr)
        .pool_max_idle_per_host(0)
        .build()
}

impl Reach for HttpHead {
    fn reach(&self, host: &str, ip: IpAddr, port: u16) -> BoxFuture<'static, Reached> {
        let url = head_url(host, port);
        let host = host.to_string();
        Box::pin(async move {
            let last_code = Arc::new(AtomicU16::new(0));
            let client = match build_client(&host, SocketAddr::new(ip, port), Arc::clone(&last_code)) {
                Ok(client) => client,
                Err(e) => {
                    return Reached::Error {
                        message: format!("HTTP client setup failed: {:#}", anyhow::Error::from(e)),
                    }
                }
            };

            match client.head(url.as_str()).send().await {
                Ok(response) => {
                    let status = response.status();
                    let code = Some(status.as_u16());
                    if status.is_client_error() || status.is_server_error() {
                        Reached::Down {
                            http_code: code,
                            message: format!("HTTP {}", status),
                        }
                    } else {
                        Reached::Up { http_code: code }
                    }
                }
                Err(e) => {
                    let redirected = Some(last_code.load(Ordering::Relaxed)).filter(|&code| code != 0);
                    Reached::Down {
                        http_code: e.status().map(|s| s.as_u16()).or(redirected),
                        message: format!("{:#}", anyhow::Error::from(e)),
                    }
                }
            }
        })
    }
}
