use cellxgene_core::RegionSetting;
use cellxgene_storage::{DataLocator, LocatorError, LocatorResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG`, `info` when unset or invalid.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter())
        .init();
}

/// Load `.env`, then initialize tracing so `.env` may set `RUST_LOG`.
pub fn init_cli() {
    dotenvy::dotenv().ok();
    init_tracing();
}

/// How the region of a locator is decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionChoice {
    Known(Option<String>),
    /// Ask the bucket for its region
    Discover,
}

/// An explicit `--region` wins over the configured setting.
pub fn choose_region(explicit: Option<&str>, setting: &RegionSetting) -> RegionChoice {
    if let Some(region) = explicit {
        return RegionChoice::Known(Some(region.to_string()));
    }
    match setting {
        RegionSetting::Disabled => RegionChoice::Known(None),
        RegionSetting::Fixed(region) => RegionChoice::Known(Some(region.clone())),
        RegionSetting::Auto => RegionChoice::Discover,
    }
}

/// Summary printed by `stat`
#[derive(Debug, Serialize)]
pub struct LocationStat {
    pub protocol: Option<String>,
    pub cname: String,
    pub abspath: String,
    pub exists: bool,
    pub is_file: bool,
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

pub async fn stat(locator: &DataLocator) -> LocatorResult<LocationStat> {
    let exists = locator.exists().await?;
    let (is_file, size, last_modified) = if exists {
        (
            locator.is_file().await?,
            Some(locator.size().await?),
            locator.last_modified().await?,
        )
    } else {
        (false, None, None)
    };

    Ok(LocationStat {
        protocol: locator.protocol().map(String::from),
        cname: locator.cname().to_string(),
        abspath: locator.abspath()?,
        exists,
        is_file,
        size,
        last_modified,
    })
}

/// Copy the located object to `dest`, returning the number of bytes copied.
pub async fn fetch(locator: &DataLocator, dest: &Path) -> LocatorResult<u64> {
    let dest = dest.to_path_buf();
    locator
        .with_local_path(|path| async move {
            tokio::fs::copy(&path, &dest)
                .await
                .map_err(LocatorError::IoError)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn explicit_region_wins() {
        assert_eq!(
            choose_region(Some("us-east-2"), &RegionSetting::Auto),
            RegionChoice::Known(Some("us-east-2".to_string()))
        );
    }

    #[test]
    fn configured_region_settings() {
        assert_eq!(
            choose_region(None, &RegionSetting::Disabled),
            RegionChoice::Known(None)
        );
        assert_eq!(
            choose_region(None, &RegionSetting::Fixed("us-west-2".to_string())),
            RegionChoice::Known(Some("us-west-2".to_string()))
        );
        assert_eq!(
            choose_region(None, &RegionSetting::Auto),
            RegionChoice::Discover
        );
    }

    #[test]
    fn log_filter_read_from_env_file() {
        let dir = tempdir().unwrap();
        let env_file = dir.path().join(".env");
        std::fs::write(&env_file, "RUST_LOG=cellxgene_storage=trace\n").unwrap();

        dotenvy::from_path_override(&env_file).unwrap();
        assert_eq!(env_filter().to_string(), "cellxgene_storage=trace");
    }

    #[tokio::test]
    async fn stat_local_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pbmc3k.cxg");
        std::fs::write(&path, b"twelve bytes").unwrap();

        let locator = DataLocator::new(path.to_string_lossy(), None).unwrap();
        let stat = stat(&locator).await.unwrap();

        assert_eq!(stat.protocol, None);
        assert!(stat.exists);
        assert!(stat.is_file);
        assert_eq!(stat.size, Some(12));
        assert!(stat.last_modified.is_some());

        let json = serde_json::to_value(&stat).unwrap();
        assert_eq!(json["size"], 12);
        assert_eq!(json["exists"], true);
    }

    #[tokio::test]
    async fn stat_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.cxg");

        let locator = DataLocator::new(path.to_string_lossy(), None).unwrap();
        let stat = stat(&locator).await.unwrap();

        assert!(!stat.exists);
        assert!(!stat.is_file);
        assert_eq!(stat.size, None);
        assert_eq!(stat.last_modified, None);
    }

    #[tokio::test]
    async fn fetch_copies_local_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source.cxg");
        let dest = dir.path().join("copy.cxg");
        std::fs::write(&source, b"dataset").unwrap();

        let locator = DataLocator::new(source.to_string_lossy(), None).unwrap();
        let copied = fetch(&locator, &dest).await.unwrap();

        assert_eq!(copied, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"dataset");
        assert!(source.exists());
    }
}
