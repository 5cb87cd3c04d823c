// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::{
    fs::File,
    io::Read,
    net::{
        IpAddr,
        Ipv4Addr,
    },
    ops::Index,
    time::Duration,
};
use ::yaml_rust::{
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Number of DNS cache entries.
pub const DNS_CACHE_SIZE: usize = 2;

/// Maximum number of configured DNS servers.
pub const DNS_MAX_SERVERS: usize = 4;

/// Size of the largest supported network address in bytes.
pub const DNS_MAX_ADDR_SIZE: usize = 16;

// DNS client options.
mod dns_config {
    pub const SECTION_NAME: &str = "dns";
    pub const RETENTION_TIME: &str = "retention_time_secs";
    pub const RETRY_COUNT: &str = "retry_count";
    pub const RETRY_INTERVAL: &str = "retry_interval_secs";
    pub const SUPPORT_IPV6: &str = "support_ipv6";
}

// Network link options.
mod link_config {
    pub const SECTION_NAME: &str = "link";
    pub const DNS_POLL_INTERVAL: &str = "dns_poll_interval_millis";
    pub const CONNECT_RETRY_INTERVAL: &str = "connect_retry_interval_millis";
}

// Scheduler idle policy options.
mod idle_config {
    pub const SECTION_NAME: &str = "idle";
    pub const STAY_AWAKE_THRESHOLD: &str = "stay_awake_threshold";
    pub const DEEP_SLEEP_THRESHOLD: &str = "deep_sleep_threshold";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Runtime configuration file.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

/// DNS Client Configuration Descriptor
#[derive(Clone, Debug)]
pub struct DnsConfig {
    /// Retention period for valid cache entries.
    retention_time: Duration,
    /// Number of round robin retry attempts.
    retry_count: u8,
    /// Interval between retry attempts.
    retry_interval: Duration,
    /// Support IPv6 lookups?
    support_ipv6: bool,
    /// Default primary DNS server.
    primary_server: Ipv4Addr,
    /// Default secondary DNS server.
    secondary_server: Ipv4Addr,
}

/// Network Link Configuration Descriptor
#[derive(Clone, Debug)]
pub struct LinkConfig {
    /// Interval between DNS lookup polls while opening a link.
    dns_poll_interval: Duration,
    /// Interval between TCP connection attempts.
    connect_retry_interval: Duration,
}

/// Scheduler Idle Policy Configuration Descriptor
#[derive(Clone, Debug)]
pub struct IdleConfig {
    /// Busy wait ceiling in ticks.
    stay_awake_threshold: u32,
    /// Power save ceiling in ticks.
    deep_sleep_threshold: u32,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: &str) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        File::open(config_path)?.read_to_string(&mut config_s)?;
        Self::from_yaml(&config_s)
    }

    /// Parses a configuration from a YAML string.
    pub fn from_yaml(config_s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = match YamlLoader::load_from_str(config_s) {
            Ok(config) => config,
            Err(_) => return Err(Fail::invalid_argument("malformed config file")),
        };
        let config_obj: &Yaml = match &config[..] {
            [c] => c,
            _ => return Err(Fail::new(libc::EINVAL, "Wrong number of config objects")),
        };
        Ok(Self(config_obj.clone()))
    }

    /// Builds the DNS configuration descriptor, falling back to the default
    /// for any option the file does not set.
    pub fn dns_config(&self) -> Result<DnsConfig, Fail> {
        let section: &Yaml = self.0.index(dns_config::SECTION_NAME);
        Ok(DnsConfig::new(
            Self::get_duration_secs_option(section, dns_config::RETENTION_TIME)?,
            Self::get_int_option(section, dns_config::RETRY_COUNT)?,
            Self::get_duration_secs_option(section, dns_config::RETRY_INTERVAL)?,
            Self::get_bool_option(section, dns_config::SUPPORT_IPV6)?,
        ))
    }

    /// Builds the network link configuration descriptor.
    pub fn link_config(&self) -> Result<LinkConfig, Fail> {
        let section: &Yaml = self.0.index(link_config::SECTION_NAME);
        Ok(LinkConfig::new(
            Self::get_duration_millis_option(section, link_config::DNS_POLL_INTERVAL)?,
            Self::get_duration_millis_option(section, link_config::CONNECT_RETRY_INTERVAL)?,
        ))
    }

    /// Builds the scheduler idle policy configuration descriptor.
    pub fn idle_config(&self) -> Result<IdleConfig, Fail> {
        let section: &Yaml = self.0.index(idle_config::SECTION_NAME);
        Ok(IdleConfig::new(
            Self::get_int_option(section, idle_config::STAY_AWAKE_THRESHOLD)?,
            Self::get_int_option(section, idle_config::DEEP_SLEEP_THRESHOLD)?,
        ))
    }

    //==================================================================================================================
    // Static Functions
    //==================================================================================================================

    /// Indexes `yaml` to find the value at `index`. A missing option yields
    /// None so the caller falls back to the descriptor default.
    fn get_int_option<T: TryFrom<i64>>(yaml: &Yaml, index: &str) -> Result<Option<T>, Fail> {
        match yaml.index(index) {
            Yaml::BadValue => Ok(None),
            value => match value.as_i64().map(T::try_from) {
                Some(Ok(value)) => Ok(Some(value)),
                _ => {
                    let message: String = format!("parameter \"{}\" has unexpected type", index);
                    Err(Fail::new(libc::EINVAL, message.as_str()))
                },
            },
        }
    }

    fn get_bool_option(yaml: &Yaml, index: &str) -> Result<Option<bool>, Fail> {
        match yaml.index(index) {
            Yaml::BadValue => Ok(None),
            value => match value.as_bool() {
                Some(value) => Ok(Some(value)),
                None => {
                    let message: String = format!("parameter \"{}\" has unexpected type", index);
                    Err(Fail::new(libc::EINVAL, message.as_str()))
                },
            },
        }
    }

    fn get_duration_secs_option(yaml: &Yaml, index: &str) -> Result<Option<Duration>, Fail> {
        Ok(Self::get_int_option::<u64>(yaml, index)?.map(Duration::from_secs))
    }

    fn get_duration_millis_option(yaml: &Yaml, index: &str) -> Result<Option<Duration>, Fail> {
        Ok(Self::get_int_option::<u64>(yaml, index)?.map(Duration::from_millis))
    }
}

/// Associate Functions for DNS Client Configuration Descriptor
impl DnsConfig {
    /// Creates a DNS Client Configuration Descriptor.
    pub fn new(
        retention_time: Option<Duration>,
        retry_count: Option<u8>,
        retry_interval: Option<Duration>,
        support_ipv6: Option<bool>,
    ) -> Self {
        let mut config: DnsConfig = Self::default();

        if let Some(retention_time) = retention_time {
            config.retention_time = retention_time;
        }
        if let Some(retry_count) = retry_count {
            config.retry_count = retry_count;
        }
        if let Some(retry_interval) = retry_interval {
            config.retry_interval = retry_interval;
        }
        if let Some(support_ipv6) = support_ipv6 {
            config.support_ipv6 = support_ipv6;
        }

        config
    }

    /// Gets the cache entry retention period in the target [DnsConfig].
    pub fn get_retention_time(&self) -> Duration {
        self.retention_time
    }

    /// Gets the round robin retry count in the target [DnsConfig].
    pub fn get_retry_count(&self) -> u8 {
        self.retry_count
    }

    /// Gets the retry interval in the target [DnsConfig].
    pub fn get_retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Gets the IPv6 support option in the target [DnsConfig].
    pub fn get_support_ipv6(&self) -> bool {
        self.support_ipv6
    }

    /// Gets the default DNS server addresses in the target [DnsConfig], in
    /// priority order.
    pub fn get_default_servers(&self) -> [IpAddr; 2] {
        [IpAddr::V4(self.primary_server), IpAddr::V4(self.secondary_server)]
    }
}

/// Associate Functions for Network Link Configuration Descriptor
impl LinkConfig {
    /// Creates a Network Link Configuration Descriptor.
    pub fn new(dns_poll_interval: Option<Duration>, connect_retry_interval: Option<Duration>) -> Self {
        let mut config: LinkConfig = Self::default();

        if let Some(dns_poll_interval) = dns_poll_interval {
            config.dns_poll_interval = dns_poll_interval;
        }
        if let Some(connect_retry_interval) = connect_retry_interval {
            config.connect_retry_interval = connect_retry_interval;
        }

        config
    }

    /// Gets the DNS lookup poll interval in the target [LinkConfig].
    pub fn get_dns_poll_interval(&self) -> Duration {
        self.dns_poll_interval
    }

    /// Gets the TCP connection retry interval in the target [LinkConfig].
    pub fn get_connect_retry_interval(&self) -> Duration {
        self.connect_retry_interval
    }
}

/// Associate Functions for Scheduler Idle Policy Configuration Descriptor
impl IdleConfig {
    /// Creates a Scheduler Idle Policy Configuration Descriptor.
    pub fn new(stay_awake_threshold: Option<u32>, deep_sleep_threshold: Option<u32>) -> Self {
        let mut config: IdleConfig = Self::default();

        if let Some(stay_awake_threshold) = stay_awake_threshold {
            config.stay_awake_threshold = stay_awake_threshold;
        }
        if let Some(deep_sleep_threshold) = deep_sleep_threshold {
            config.deep_sleep_threshold = deep_sleep_threshold;
        }

        config
    }

    /// Gets the busy wait ceiling in the target [IdleConfig].
    pub fn get_stay_awake_threshold(&self) -> u32 {
        self.stay_awake_threshold
    }

    /// Gets the power save ceiling in the target [IdleConfig].
    pub fn get_deep_sleep_threshold(&self) -> u32 {
        self.deep_sleep_threshold
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Default Trait Implementation for DNS Client Configuration Descriptor
impl Default for DnsConfig {
    /// Creates a DNS Client Configuration Descriptor with the default
    /// values.
    fn default() -> Self {
        DnsConfig {
            retention_time: Duration::from_secs(60),
            retry_count: 3,
            retry_interval: Duration::from_secs(4),
            support_ipv6: false,
            primary_server: Ipv4Addr::new(1, 1, 1, 1),
            secondary_server: Ipv4Addr::new(1, 0, 0, 1),
        }
    }
}

/// Default Trait Implementation for Network Link Configuration Descriptor
impl Default for LinkConfig {
    /// Creates a Network Link Configuration Descriptor with the default
    /// values.
    fn default() -> Self {
        LinkConfig {
            dns_poll_interval: Duration::from_millis(1000),
            connect_retry_interval: Duration::from_millis(250),
        }
    }
}

/// Default Trait Implementation for Scheduler Idle Policy Configuration
/// Descriptor
impl Default for IdleConfig {
    /// Creates a Scheduler Idle Policy Configuration Descriptor with the
    /// default values.
    fn default() -> Self {
        IdleConfig {
            stay_awake_threshold: crate::runtime::scheduler::STAY_AWAKE_THRESHOLD,
            deep_sleep_threshold: crate::runtime::scheduler::DEEP_SLEEP_THRESHOLD,
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
