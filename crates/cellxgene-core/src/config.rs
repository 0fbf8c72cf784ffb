//! Configuration module
//!
//! Settings for the data locator: S3 region handling, custom S3-compatible
//! endpoints, and where remote objects are materialised on local disk.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::TEMP_FILE_PREFIX;

/// How the S3 region is chosen for remote locations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RegionSetting {
    /// Do not pass a region; the backend falls back to its own defaults.
    #[default]
    Disabled,
    /// Discover the region from the bucket of the data path.
    Auto,
    /// Use this region.
    Fixed(String),
}

impl FromStr for RegionSetting {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "" | "false" | "null" | "none" => Ok(RegionSetting::Disabled),
            "true" | "auto" => Ok(RegionSetting::Auto),
            _ => {
                if trimmed.contains(char::is_whitespace) {
                    return Err(anyhow::anyhow!("Invalid S3 region: {:?}", trimmed));
                }
                Ok(RegionSetting::Fixed(trimmed.to_string()))
            }
        }
    }
}

impl Display for RegionSetting {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RegionSetting::Disabled => write!(f, "false"),
            RegionSetting::Auto => write!(f, "auto"),
            RegionSetting::Fixed(region) => write!(f, "{}", region),
        }
    }
}

/// Data locator configuration
#[derive(Clone, Debug)]
pub struct LocatorConfig {
    pub s3_region: RegionSetting,
    /// Custom endpoint for S3-compatible providers (MinIO, DigitalOcean Spaces, etc.)
    pub s3_endpoint: Option<String>,
    pub temp_prefix: String,
    pub temp_dir: Option<PathBuf>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            s3_region: RegionSetting::Disabled,
            s3_endpoint: None,
            temp_prefix: TEMP_FILE_PREFIX.to_string(),
            temp_dir: None,
        }
    }
}

impl LocatorConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let s3_region = match lookup("CXG_S3_REGION") {
            Some(value) => value
                .parse()
                .map_err(|e| anyhow::anyhow!("CXG_S3_REGION is invalid: {}", e))?,
            None => RegionSetting::Disabled,
        };

        let config = LocatorConfig {
            s3_region,
            s3_endpoint: lookup("CXG_S3_ENDPOINT")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            temp_prefix: lookup("CXG_TEMP_PREFIX").unwrap_or_else(|| TEMP_FILE_PREFIX.to_string()),
            temp_dir: lookup("CXG_TEMP_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.temp_prefix.is_empty() {
            return Err(anyhow::anyhow!("CXG_TEMP_PREFIX must not be empty"));
        }

        if self.temp_prefix.contains('/') || self.temp_prefix.contains('\\') {
            return Err(anyhow::anyhow!(
                "CXG_TEMP_PREFIX must not contain path separators"
            ));
        }

        if let Some(ref endpoint) = self.s3_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(anyhow::anyhow!(
                    "CXG_S3_ENDPOINT must start with http:// or https://"
                ));
            }
        }

        Ok(())
    }

    /// Region to pass to the backend when it does not need discovery.
    pub fn fixed_region(&self) -> Option<&str> {
        match self.s3_region {
            RegionSetting::Fixed(ref region) => Some(region.as_str()),
            _ => None,
        }
    }
}
