use std::path::PathBuf;

use clap::Args;

use crate::error::{Error, Result};

pub const DEFAULT_RUNNER: &str = "android.support.test.runner.AndroidJUnitRunner";
pub const DEFAULT_ADB: &str = "adb";

pub const ENV_CLASSFILES_PATH: &str = "DROIDMUT_CLASSFILES_PATH";
pub const ENV_PKGNAME: &str = "DROIDMUT_PKGNAME";
pub const ENV_TESTED_APP_ID: &str = "DROIDMUT_TESTED_APP_ID";
pub const ENV_INSTRUMENTATION_RUNNER: &str = "DROIDMUT_INSTRUMENTATION_RUNNER";
pub const ENV_INSTRUMENTED_TESTS_PATH: &str = "DROIDMUT_INSTRUMENTED_TESTS_PATH";
pub const ENV_ADB: &str = "DROIDMUT_ADB";

/// Where the tests run and where the compiled classes live.
#[derive(Debug, Clone, Args)]
pub struct DeviceConfig {
    /// Directory of compiled class artifacts of the tested application
    #[arg(long = "classes", env = ENV_CLASSFILES_PATH)]
    pub classes_dir: PathBuf,
    /// Package of the test application
    #[arg(long = "pkg", env = ENV_PKGNAME)]
    pub test_package: String,
    /// Package of the application under test
    #[arg(long = "tested-app", env = ENV_TESTED_APP_ID)]
    pub tested_app_id: String,
    /// Instrumentation runner class
    #[arg(long, env = ENV_INSTRUMENTATION_RUNNER, default_value = DEFAULT_RUNNER)]
    pub runner: String,
    /// Path prefixes of instrumented test classes without a runner annotation
    #[arg(long = "instrumented-tests-path", env = ENV_INSTRUMENTED_TESTS_PATH, value_delimiter = ',')]
    pub instrumented_test_paths: Vec<String>,
    /// Device bridge executable
    #[arg(long, env = ENV_ADB, default_value = DEFAULT_ADB)]
    pub adb: String,
}

impl DeviceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(Error::MissingConfig(key));

        Ok(DeviceConfig {
            classes_dir: PathBuf::from(required(ENV_CLASSFILES_PATH)?),
            test_package: required(ENV_PKGNAME)?,
            tested_app_id: required(ENV_TESTED_APP_ID)?,
            runner: get(ENV_INSTRUMENTATION_RUNNER).unwrap_or_else(|| DEFAULT_RUNNER.to_string()),
            instrumented_test_paths: get(ENV_INSTRUMENTED_TESTS_PATH)
                .map(|v| split_prefixes(&v))
                .unwrap_or_default(),
            adb: get(ENV_ADB).unwrap_or_else(|| DEFAULT_ADB.to_string()),
        })
    }

    /// `package/runner` component passed to the instrumentation command.
    pub fn instrumentation_component(&self) -> String {
        format!("{}/{}", self.test_package, self.runner)
    }
}

pub fn split_prefixes(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
