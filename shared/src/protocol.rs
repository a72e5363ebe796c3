/// mDNS service type used both to advertise and to query
pub const SERVICE_TYPE: &str = "_airlift._tcp.local.";

/// Substring a discovered full name must contain to be considered a match
pub const SERVICE_TAG: &str = "_airlift._tcp";

/// TXT record keys used in the advertisement
pub const TXT_APP: &str = "app";
pub const TXT_VERSION: &str = "version";

/// Value published under `TXT_APP`
pub const APP_NAME: &str = "airlift";

/// How long a discovery query collects responses before it is considered complete
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 3;

/// Per-candidate dial timeout on the receive side
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;

/// Buffered discovery matches between the browser task and the receive driver
pub const DEFAULT_MATCH_CAPACITY: usize = 16;
