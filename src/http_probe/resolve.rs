use std::net::IpAddr;

use trust_dns_resolver::TokioAsyncResolver;

use super::prelude::*;

/// Host name resolution, timed by the [`PhaseTimer`] as the DNS phase.
#[async_trait::async_trait]
pub trait Resolve: Send + Sync + 'static {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ProbeError>;
}

#[async_trait::async_trait]
impl Resolve for TokioAsyncResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ProbeError> {
        let lookup = self.lookup_ip(host).await.map_err(|source| ProbeError::Dns {
            host: host.to_string(),
            source,
        })?;
        Ok(lookup.iter().collect())
    }
}
