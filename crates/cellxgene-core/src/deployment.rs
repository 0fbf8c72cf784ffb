//! Hosted deployment configuration
//!
//! Renders the server config file for a hosted deployment environment.
//! The deployment system names its environments (`dev`, `stage`, `prod`, ...)
//! and the application derives its public URLs and data root from that name.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Deployment environment name as understood by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentEnv(String);

impl DeploymentEnv {
    /// Map the deployment system's environment name.
    ///
    /// The deployment system calls staging `stage`, the application needs `staging`.
    pub fn from_happy_env(value: &str) -> Result<Self, anyhow::Error> {
        let value = value.trim();
        if value.is_empty() {
            return Err(anyhow::anyhow!("No HAPPY_ENV specified"));
        }
        if value.contains(|c: char| c.is_whitespace() || c == '/') {
            return Err(anyhow::anyhow!("Invalid HAPPY_ENV: {:?}", value));
        }

        let name = if value == "stage" { "staging" } else { value };
        Ok(DeploymentEnv(name.to_string()))
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let value = env::var("HAPPY_ENV").map_err(|_| anyhow::anyhow!("No HAPPY_ENV specified"))?;
        Self::from_happy_env(&value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_production(&self) -> bool {
        self.0 == "prod"
    }

    /// Bucket holding the datasets served in this environment.
    pub fn dataroot(&self) -> String {
        format!("s3://hosted-cellxgene-{}", self.0)
    }
}

impl Display for DeploymentEnv {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// Public URLs of a hosted deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedUrls {
    pub api_base_url: String,
    /// Also used for the multi-dataset index page
    pub web_base_url: String,
    pub data_locator_url: String,
}

impl HostedUrls {
    pub fn for_env(env: &DeploymentEnv) -> Self {
        if env.is_production() {
            HostedUrls {
                api_base_url: "https://api.cellxgene.cziscience.com/cellxgene/".to_string(),
                web_base_url: "https://cellxgene.cziscience.com/".to_string(),
                data_locator_url: "https://api.cellxgene.cziscience.com/dp/v1".to_string(),
            }
        } else {
            let name = env.as_str();
            HostedUrls {
                api_base_url: format!(
                    "https://api.cellxgene.{}.single-cell.czi.technology/cellxgene/",
                    name
                ),
                web_base_url: format!("https://cellxgene.{}.single-cell.czi.technology/", name),
                data_locator_url: format!(
                    "https://api.cellxgene.{}.single-cell.czi.technology/dp/v1",
                    name
                ),
            }
        }
    }
}

/// Render the server config file for `env`.
pub fn render_hosted_config(env: &DeploymentEnv) -> String {
    let urls = HostedUrls::for_env(env);
    format!(
        r#"
server:
  app:
    verbose: true
    debug: true
    host: 0.0.0.0
    port: null
    open_browser: false
    force_https: false
    flask_secret_key: "asd"
    generate_cache_control_headers: true
    server_timing_headers: true
    csp_directives:
      img-src:
        - https://www.google-analytics.com
      script-src:
        - https://www.google-analytics.com
        - https://ssl.google-analytics.com
        - browser.sentry-cdn.com
      connect-src:
        - https://www.google-analytics.com
        - sentry.prod.si.czi.technology

    api_base_url: {api_base_url}
    web_base_url: {web_base_url}

  multi_dataset:
    dataroot:
      covid19:
        base_url: d
        dataroot: {dataroot}
      corpora_data_portal:
        base_url: e
        dataroot: {dataroot}

    # The index page when in multi-dataset mode:
    #   false or null:  this returns a 404 code
    #   true:  loads a test index page, which links to the datasets that are available in the dataroot
    #   string/URL:  redirect to this URL
    index: {web_base_url}

    # A list of allowed matrix types.  If an empty list, then all matrix types are allowed
    allowed_matrix_types: []

  data_locator:
    api_base: {data_locator_url}
    s3:
      # s3 region name.
      #   if true, then the s3 location is automatically determined from the datapath or dataroot.
      #   if false/null, then do not set.
      #   if a string, then use that value (e.g. us-east-1).
      region_name: true

  adaptor:
    cxg_adaptor:
      tiledb_ctx:
        sm.tile_cache_size: 60129542144 # 56 GB
        py.init_buffer_bytes: 536870912 # 512MiB

  limits:
    column_request_max: 32
    diffexp_cellcount_max: 1500000

dataset:
  app:
    # Scripts can be a list of either file names (string) or dicts containing keys src, integrity and crossorigin.
    scripts:
      - src: "https://browser.sentry-cdn.com/5.15.5/bundle.min.js"
        integrity: "sha384-wF7Jc4ZlWVxe/L8Ji3hOIBeTgo/HwFuaeEfjGmS3EXAG7Y+7Kjjr91gJpJtr+PAT"
        crossorigin: "anonymous"

    about_legal_tos: /tos/
    about_legal_privacy: /privacy/

  presentation:
    max_categories: 1000
    custom_colors: true

  embeddings:
    names: []

  diffexp:
    enable: true
    lfc_cutoff: 0.01
    top_n: 10
"#,
        api_base_url = urls.api_base_url,
        web_base_url = urls.web_base_url,
        data_locator_url = urls.data_locator_url,
        dataroot = env.dataroot(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_maps_to_staging() {
        let env = DeploymentEnv::from_happy_env("stage").unwrap();
        assert_eq!(env.as_str(), "staging");
        assert_eq!(env.dataroot(), "s3://hosted-cellxgene-staging");
    }

    #[test]
    fn empty_env_is_rejected() {
        assert!(DeploymentEnv::from_happy_env("").is_err());
        assert!(DeploymentEnv::from_happy_env("   ").is_err());
        assert!(DeploymentEnv::from_happy_env("dev/x").is_err());
    }

    #[test]
    fn prod_urls() {
        let env = DeploymentEnv::from_happy_env("prod").unwrap();
        let urls = HostedUrls::for_env(&env);
        assert_eq!(
            urls.api_base_url,
            "https://api.cellxgene.cziscience.com/cellxgene/"
        );
        assert_eq!(urls.web_base_url, "https://cellxgene.cziscience.com/");
        assert_eq!(
            urls.data_locator_url,
            "https://api.cellxgene.cziscience.com/dp/v1"
        );
    }

    #[test]
    fn non_prod_urls_embed_env() {
        let env = DeploymentEnv::from_happy_env("dev").unwrap();
        let urls = HostedUrls::for_env(&env);
        assert_eq!(
            urls.api_base_url,
            "https://api.cellxgene.dev.single-cell.czi.technology/cellxgene/"
        );
        assert_eq!(
            urls.data_locator_url,
            "https://api.cellxgene.dev.single-cell.czi.technology/dp/v1"
        );
    }

    #[test]
    fn rendered_config_interpolates_env() {
        let env = DeploymentEnv::from_happy_env("stage").unwrap();
        let config = render_hosted_config(&env);

        assert!(config.contains("dataroot: s3://hosted-cellxgene-staging"));
        assert!(config.contains(
            "api_base: https://api.cellxgene.staging.single-cell.czi.technology/dp/v1"
        ));
        assert!(config.contains("index: https://cellxgene.staging.single-cell.czi.technology/"));
        assert!(config.contains("region_name: true"));
        assert!(!config.contains('{'));
    }
}
