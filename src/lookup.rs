use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use std::collections::HashMap;
use std::net::IpAddr;

/// Reverse-DNS lookups with an in-process cache.
///
/// Hop addresses repeat on every repaint, so each one is resolved at most
/// once per run; failures are cached too.
pub struct RdnsCache {
    resolver: TokioAsyncResolver,
    cache: HashMap<IpAddr, Option<String>>,
}

impl RdnsCache {
    pub fn new() -> Self {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        Self {
            resolver,
            cache: HashMap::new(),
        }
    }

    /// The PTR name for `ip`, or `None` when reverse lookup fails.
    pub async fn lookup(&mut self, ip: IpAddr) -> Option<String> {
        if let Some(cached) = self.cache.get(&ip) {
            return cached.clone();
        }

        let hostname = match self.resolver.reverse_lookup(ip).await {
            Ok(lookup) => lookup
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_string()),
            Err(_) => None,
        };

        self.cache.insert(ip, hostname.clone());
        hostname
    }
}

impl Default for RdnsCache {
    fn default() -> Self {
        Self::new()
    }
}
