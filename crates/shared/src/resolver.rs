//! Tenant resolution from request identity
//!
//! Maps the identity an inbound request carries to a tenant slug. This is a
//! pure function over strings: it never queries the tenant directory, so the
//! caller decides whether the slug names an active tenant.
//!
//! Precedence, highest first:
//! 1. explicit override (`X-Tenant` header, then `?tenant=` query parameter)
//! 2. hostname `{slug}.{base-domain}` for each configured base domain
//! 3. no tenant
//!
//! Malformed override values are discarded and resolution falls through.

use crate::models::TenantSlug;

/// Header carrying an explicit tenant slug (local development, clients
/// without wildcard DNS)
pub const TENANT_HEADER: &str = "x-tenant";

/// Query parameter carrying an explicit tenant slug
pub const TENANT_QUERY_PARAM: &str = "tenant";

/// Network identity extracted from one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub override_header: Option<String>,
    pub override_query: Option<String>,
    pub host: Option<String>,
}

impl RequestIdentity {
    pub fn from_host(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Default::default()
        }
    }
}

/// Where a resolved slug came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Header,
    Query,
    Host,
}

/// Resolves request identities against the platform's base domains
#[derive(Debug, Clone)]
pub struct TenantResolver {
    base_domains: Vec<String>,
}

impl TenantResolver {
    pub fn new<I, S>(base_domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let base_domains = base_domains
            .into_iter()
            .map(|d| d.as_ref().trim().trim_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { base_domains }
    }

    pub fn base_domains(&self) -> &[String] {
        &self.base_domains
    }

    /// Resolve a request identity to a slug, or `None` for non-tenant traffic
    pub fn resolve(&self, identity: &RequestIdentity) -> Option<TenantSlug> {
        self.resolve_with_source(identity).map(|(slug, _)| slug)
    }

    pub fn resolve_with_source(
        &self,
        identity: &RequestIdentity,
    ) -> Option<(TenantSlug, ResolutionSource)> {
        if let Some(slug) = parse_override(identity.override_header.as_deref()) {
            return Some((slug, ResolutionSource::Header));
        }
        if let Some(slug) = parse_override(identity.override_query.as_deref()) {
            return Some((slug, ResolutionSource::Query));
        }
        identity
            .host
            .as_deref()
            .and_then(|host| self.slug_from_host(host))
            .map(|slug| (slug, ResolutionSource::Host))
    }

    /// Strip a known base domain off the host and validate the remaining label
    pub fn slug_from_host(&self, host: &str) -> Option<TenantSlug> {
        let host = strip_port(host.trim()).trim_end_matches('.').to_ascii_lowercase();

        self.base_domains.iter().find_map(|base| {
            let label = host.strip_suffix(base.as_str())?.strip_suffix('.')?;
            // a.b.base is not a tenant host
            if label.contains('.') {
                return None;
            }
            TenantSlug::parse(label).ok()
        })
    }
}

fn parse_override(value: Option<&str>) -> Option<TenantSlug> {
    value.and_then(|raw| TenantSlug::parse(raw).ok())
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals never carry a tenant label
    if host.starts_with('[') {
        return host;
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
