use anyhow::{Context, Result};
use futures::future::BoxFuture;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;

use crate::config::DnsUpstream;

/// Name resolution used by probes.
pub trait Resolve: Send + Sync {
    fn resolve(&self, host: &str) -> BoxFuture<'static, Result<Vec<IpAddr>>>;
}

/// First IPv4 address, falling back to the first address of any family.
pub fn pick_address(addrs: &[IpAddr]) -> Option<IpAddr> {
    addrs
        .iter()
        .copied()
        .find(IpAddr::is_ipv4)
        .or_else(|| addrs.first().copied())
}

pub struct DnsResolver {
    resolver: Arc<TokioResolver>,
}

impl DnsResolver {
    pub fn new(upstream: DnsUpstream) -> Result<Self> {
        let resolver = match upstream {
            DnsUpstream::System => TokioResolver::builder_tokio()
                .context("Failed to read system DNS configuration")?
                .build(),
            DnsUpstream::Cloudflare => TokioResolver::builder_with_config(
                ResolverConfig::cloudflare(),
                TokioConnectionProvider::default(),
            )
            .build(),
            DnsUpstream::Google => TokioResolver::builder_with_config(
                ResolverConfig::google(),
                TokioConnectionProvider::default(),
            )
            .build(),
        };

        info!("DNS resolver configured: {:?}", upstream);

        Ok(Self {
            resolver: Arc::new(resolver),
        })
    }
}

impl Resolve for DnsResolver {
    fn resolve(&self, host: &str) -> BoxFuture<'static, Result<Vec<IpAddr>>> {
        let literal = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = literal.parse::<IpAddr>() {
            return Box::pin(async move { Ok(vec![ip]) });
        }

        let resolver = Arc::clone(&self.resolver);
        let host = host.to_string();
        Box::pin(async move {
            let lookup = resolver
                .lookup_ip(host.as_str())
                .await
                .with_context(|| format!("DNS resolution failed for {}", host))?;
            Ok(lookup.iter().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_pick_prefers_ipv4() {
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
        let v4 = IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34));
        assert_eq!(pick_address(&[v6, v4]), Some(v4));
        assert_eq!(pick_address(&[v6]), Some(v6));
        assert_eq!(pick_address(&[]), None);
    }

    #[tokio::test]
    async fn test_ip_literals_skip_lookup() {
        let resolver = DnsResolver::new(DnsUpstream::Cloudflare).unwrap();
        let addrs = resolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);

        let addrs = resolver.resolve("[::1]").await.unwrap();
        assert_eq!(addrs, vec![IpAddr::V6(Ipv6Addr::LOCALHOST)]);
    }
}
