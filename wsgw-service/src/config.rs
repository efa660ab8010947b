//! Configuration types and CLI/environment parsing for the gateway.
//!
//! Everything gateway-specific carries a `WSGW_` environment prefix; the
//! instance-identity values keep their deployment-mandated `MY_INSTANCE_*`
//! names because the surrounding infrastructure injects them under exactly
//! those keys.

use std::{net::SocketAddr, num::NonZeroU32, time::Duration};

use clap::Parser;

/// The configuration of one gateway instance.
///
/// It can be configured via environment variables or command line arguments
/// using `clap`.
#[derive(Parser, Debug)]
pub struct GatewayConfig {
    /// The bind addr of the gateway server.
    #[clap(long, env = "WSGW_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// Base URL of the application the gateway bridges to.
    #[clap(
        long,
        env = "WSGW_APP_BASE_URL",
        default_value = "http://127.0.0.1:8081"
    )]
    pub app_base_url: String,

    /// Host the load balancer serves browser clients from. When set, WebSocket
    /// upgrade requests carrying a different `Origin` host are refused.
    #[clap(long, env = "WSGW_LOAD_BALANCER_ADDRESS")]
    pub load_balancer_address: Option<String>,

    /// Host of the shared ownership directory (Redis). Clustering is disabled
    /// when unset; pushes for unknown connections then answer 404.
    #[clap(long, env = "WSGW_REDIS_HOST")]
    pub redis_host: Option<String>,

    /// Port of the shared ownership directory.
    #[clap(long, env = "WSGW_REDIS_PORT", default_value = "6379")]
    pub redis_port: u16,

    /// Externally reachable address of this instance. Required when
    /// clustering is enabled; stored in the ownership directory so peers can
    /// forward pushes here.
    #[clap(long, env = "MY_INSTANCE_IPADDRESS")]
    pub instance_ip_address: Option<String>,

    /// Listen port peers reach this instance on. Required when clustering is
    /// enabled; used when assembling peer URLs.
    #[clap(long, env = "MY_INSTANCE_PORT")]
    pub instance_port: Option<u16>,

    /// Protocol used when assembling peer URLs (`http` or `https`).
    #[clap(long, env = "MY_INSTANCE_PROTOCOL", default_value = "http")]
    pub instance_protocol: String,

    /// Capacity of the per-connection buffer of messages awaiting delivery to
    /// the client.
    #[clap(long, env = "WSGW_MESSAGE_BUFFER_SIZE", default_value = "16")]
    pub message_buffer_size: usize,

    /// Replenish period of the per-connection push rate limiter (one token
    /// per period).
    #[clap(
        long,
        env = "WSGW_PUSH_RATE_PERIOD",
        default_value = "100ms",
        value_parser = humantime::parse_duration
    )]
    pub push_rate_period: Duration,

    /// Burst size of the per-connection push rate limiter.
    #[clap(long, env = "WSGW_PUSH_RATE_BURST", default_value = "8")]
    pub push_rate_burst: NonZeroU32,

    /// Timeout applied to every outbound HTTP call toward the application and
    /// toward peer instances.
    #[clap(
        long,
        env = "WSGW_APP_TIMEOUT",
        default_value = "15s",
        value_parser = humantime::parse_duration
    )]
    pub app_timeout: Duration,

    /// Timeout applied to each write toward a client socket. A write
    /// exceeding it marks the connection too slow and aborts the session.
    #[clap(
        long,
        env = "WSGW_WRITE_TIMEOUT",
        default_value = "5s",
        value_parser = humantime::parse_duration
    )]
    pub write_timeout: Duration,

    /// Max wait time the service waits for its workers during shutdown.
    #[clap(
        long,
        env = "WSGW_MAX_WAIT_TIME_SHUTDOWN",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub max_wait_time_shutdown: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GatewayConfig::try_parse_from(["wsgw"]).expect("Can parse empty args");
        assert_eq!(config.message_buffer_size, 16);
        assert_eq!(config.push_rate_period, Duration::from_millis(100));
        assert_eq!(config.push_rate_burst.get(), 8);
        assert_eq!(config.app_timeout, Duration::from_secs(15));
        assert_eq!(config.write_timeout, Duration::from_secs(5));
        assert_eq!(config.redis_port, 6379);
        assert_eq!(config.instance_protocol, "http");
    }

    #[test]
    fn durations_parse_human_readable_values() {
        let config = GatewayConfig::try_parse_from(["wsgw", "--write-timeout", "2s"])
            .expect("Can parse args");
        assert_eq!(config.write_timeout, Duration::from_secs(2));
    }
}
