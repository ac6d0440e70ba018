use std::collections::HashSet;

use lazy_static::lazy_static;

pub const DEFAULT_HOST: &str = "https://amplitude.com";
pub const EU_HOST: &str = "https://analytics.eu.amplitude.com";

// user properties outside of this list live in the `gp:` namespace
pub const SYSTEM_PROPERTIES: [&str; 14] = [
    "version",
    "country",
    "city",
    "region",
    "dma",
    "language",
    "platform",
    "os",
    "device",
    "device_type",
    "start_version",
    "paying",
    "userdata_cohort",
    "user_id",
];

pub const USER_PROPERTY_PREFIX: &str = "gp:";

// group-by dimensions accepted per query
pub const MAX_DIMENSIONS: usize = 2;

pub const SECONDS_IN_DAY: u64 = 86400;
pub const MILLIS_IN_MINUTE: f64 = 60000.;

lazy_static! {
    static ref SYSTEM_PROPERTIES_SET: HashSet<&'static str> =
        SYSTEM_PROPERTIES.iter().copied().collect();
}

/// Case-insensitive check against the reserved system properties.
pub fn is_system_property(name: &str) -> bool {
    SYSTEM_PROPERTIES_SET.contains(name.to_lowercase().as_str())
}
