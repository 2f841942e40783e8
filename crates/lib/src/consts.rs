//! Crate-wide constants.

pub const APP_NAME: &str = "wheelhouse";

/// Environment variable overriding the work root (environments, build outputs).
pub const ROOT_ENV_VAR: &str = "WHEELHOUSE_ROOT";

/// Default name of the pipeline configuration file.
pub const CONFIG_FILENAME: &str = "wheelhouse.yml";

/// Name of the run summary written into the artifacts directory.
pub const SUMMARY_FILENAME: &str = "pipeline.json";

/// January 1, 1980 00:00:00 UTC (ZIP epoch), exported as `SOURCE_DATE_EPOCH`.
pub const SOURCE_DATE_EPOCH: &str = "315532800";

/// Exported to builds of 32-bit units.
pub const FORCE_32BIT_ENV_VAR: &str = "WHEELHOUSE_FORCE_32BIT";

/// Credential variables read by the CLI, in lookup order.
pub const USERNAME_ENV_VARS: &[&str] = &["WHEELHOUSE_INDEX_USERNAME", "TWINE_USERNAME"];
pub const PASSWORD_ENV_VARS: &[&str] = &["WHEELHOUSE_INDEX_PASSWORD", "TWINE_PASSWORD"];
