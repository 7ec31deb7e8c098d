use crate::{Error, Result};
use anyhow::Context;
use std::{env, time::Duration};
use time::{UtcOffset, macros::format_description};
use url::Url;

/// Settings of an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Zone times are presented in to the application.
    pub tz_location: UtcOffset,
    /// Zone times are stored in.
    pub tz_database: UtcOffset,
    /// Largest id list the object cache keeps, longer results are read directly.
    pub max_cached_ids: usize,
    /// Only tables with their own cacher are cached.
    pub disable_global_cache: bool,
    /// Installs an `LruCacher` of this size as default cacher.
    pub cache_size: Option<usize>,
    pub cache_expiry: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tz_location: UtcOffset::UTC,
            tz_database: UtcOffset::UTC,
            max_cached_ids: 500,
            disable_global_cache: false,
            cache_size: None,
            cache_expiry: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn tz_location(mut self, offset: UtcOffset) -> Self {
        self.tz_location = offset;
        self
    }

    pub fn tz_database(mut self, offset: UtcOffset) -> Self {
        self.tz_database = offset;
        self
    }

    pub fn max_cached_ids(mut self, max: usize) -> Self {
        self.max_cached_ids = max;
        self
    }

    pub fn disable_global_cache(mut self, disable: bool) -> Self {
        self.disable_global_cache = disable;
        self
    }

    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = Some(size);
        self
    }

    pub fn cache_expiry(mut self, expiry: Duration) -> Self {
        self.cache_expiry = Some(expiry);
        self
    }

    /// Reads a configuration url like `silo://?tz_location=+02:00&max_cached_ids=100`.
    ///
    /// Parameters missing from the url are taken from the `SILO_*` environment variable of
    /// the same name (`SILO_TZ_LOCATION`, `SILO_MAX_CACHED_IDS`, ...), then from the
    /// defaults.
    pub fn from_url(url: &str) -> Result<Self> {
        let context = || format!("While reading the configuration url `{}`", url);
        if !url.starts_with("silo://") {
            let error = Error::msg("Configuration url must start with `silo://`").context(context());
            log::error!("{:#}", error);
            return Err(error);
        }
        let parsed = Url::parse(url).with_context(context)?;
        let mut pairs = Vec::new();
        for pair in parsed.query().unwrap_or_default().split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key).with_context(context)?;
            let value = urlencoding::decode(value).with_context(context)?;
            pairs.push((key.into_owned(), value.into_owned()));
        }
        let take = |key: &str| {
            pairs
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .or_else(|| env::var(format!("SILO_{}", key.to_uppercase())).ok())
        };
        for (key, _) in &pairs {
            if !PARAMETERS.contains(&key.as_str()) {
                log::warn!("Unknown configuration parameter `{}` in `{}`", key, url);
            }
        }
        let mut config = Self::default();
        let read = || -> Result<Self> {
            if let Some(v) = take("tz_location") {
                config.tz_location = parse_offset(&v)?;
            }
            if let Some(v) = take("tz_database") {
                config.tz_database = parse_offset(&v)?;
            }
            if let Some(v) = take("max_cached_ids") {
                config.max_cached_ids = v.trim().parse().with_context(|| {
                    format!("`max_cached_ids` must be a non negative integer, got `{v}`")
                })?;
            }
            if let Some(v) = take("disable_global_cache") {
                config.disable_global_cache = parse_flag(&v)?;
            }
            if let Some(v) = take("cache_size") {
                config.cache_size = Some(v.trim().parse().with_context(|| {
                    format!("`cache_size` must be a non negative integer, got `{v}`")
                })?);
            }
            if let Some(v) = take("cache_expiry_ms") {
                let millis: u64 = v.trim().parse().with_context(|| {
                    format!("`cache_expiry_ms` must be a non negative integer, got `{v}`")
                })?;
                config.cache_expiry = Some(Duration::from_millis(millis));
            }
            Ok(config)
        };
        read().map_err(|e| {
            let e = e.context(context());
            log::error!("{:#}", e);
            e
        })
    }
}

const PARAMETERS: [&str; 6] = [
    "tz_location",
    "tz_database",
    "max_cached_ids",
    "disable_global_cache",
    "cache_size",
    "cache_expiry_ms",
];

/// Accepts `UTC`, `Z`, `+02:00`, `-0530` and `+2`.
pub fn parse_offset(input: &str) -> Result<UtcOffset> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("utc") || input.eq_ignore_ascii_case("z") {
        return Ok(UtcOffset::UTC);
    }
    let formats = [
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
        format_description!("[offset_hour sign:mandatory][offset_minute]"),
        format_description!("[offset_hour sign:mandatory padding:none]"),
    ];
    formats
        .iter()
        .find_map(|format| UtcOffset::parse(input, format).ok())
        .ok_or_else(|| Error::msg(format!("Cannot interpret `{input}` as a utc offset")))
}

fn parse_flag(input: &str) -> Result<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "" | "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::msg(format!("Cannot interpret `{input}` as a flag"))),
    }
}
