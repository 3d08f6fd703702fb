//! Finds the instrumented test methods in a directory of test classes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classfile::{self, ClassFile, MethodBody, ACC_PUBLIC};
use crate::error::Result;

pub const RUN_WITH: &str = "Lorg/junit/runner/RunWith;";
pub const TEST: &str = "Lorg/junit/Test;";
pub const INSTRUMENTATION_RUNNER: &str = "AndroidJUnit4";

/// One test method, run on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestUnit {
    /// Dotted class name, e.g. `com.example.NetTest`.
    pub class_name: String,
    pub method: String,
}

impl TestUnit {
    pub fn new(class_name: &str, method: &str) -> Self {
        TestUnit {
            class_name: class_name.to_string(),
            method: method.to_string(),
        }
    }

    /// `Class#method` selector understood by the instrumentation runner.
    pub fn selector(&self) -> String {
        format!("{}#{}", self.class_name, self.method)
    }
}

impl std::fmt::Display for TestUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.selector())
    }
}

/// Simple name of a class given as descriptor, internal or dotted name.
fn simple_name(name: &str) -> &str {
    let name = name.trim_end_matches(';');
    name.rsplit(['/', '.', '$']).next().unwrap_or(name)
}

/// Simple name of the `RunWith` runner, `Some("")` if the annotation carries
/// no value, `None` without the annotation.
fn declared_runner(class: &ClassFile) -> Option<&str> {
    class
        .annotations
        .iter()
        .find(|a| a.descriptor == RUN_WITH)
        .map(|a| a.value.as_deref().map(simple_name).unwrap_or_default())
}

fn is_test_method(method: &MethodBody, has_runner: bool) -> bool {
    if method.name.starts_with('<') {
        return false;
    }
    if method.annotations.iter().any(|a| a.descriptor == TEST) {
        return true;
    }
    let plain = method.annotations.is_empty()
        && method.descriptor.starts_with("()")
        && method.descriptor.ends_with(")V");
    if !plain {
        return false;
    }
    let named_test = method.name.starts_with("test");
    if method.access & ACC_PUBLIC != 0 {
        has_runner || named_test
    } else {
        named_test
    }
}

/// Test units of one class, or nothing if it is not an instrumented test class.
///
/// Path prefixes only apply to classes without any `RunWith` annotation; a
/// class run by some other runner is never instrumented.
pub fn test_units_for_class(class: &ClassFile, location: &Path, prefixes: &[String]) -> Vec<TestUnit> {
    let has_runner = match declared_runner(class) {
        Some(runner) if runner == INSTRUMENTATION_RUNNER => true,
        Some(_) => return Vec::new(),
        None => {
            let location = location.to_string_lossy();
            if !prefixes.iter().any(|p| location.starts_with(p.as_str())) {
                return Vec::new();
            }
            false
        }
    };
    let class_name = class.java_name();
    class
        .methods
        .iter()
        .filter(|m| is_test_method(m, has_runner))
        .map(|m| TestUnit::new(&class_name, &m.name))
        .collect()
}

/// All test units below `test_classes_dir`, ordered by class then method.
pub fn find_test_units(test_classes_dir: &Path, prefixes: &[String]) -> Result<Vec<TestUnit>> {
    let mut units = Vec::new();
    for artifact in classfile::scan_artifacts(test_classes_dir)? {
        let class = ClassFile::read(&artifact)?;
        let found = test_units_for_class(&class, &artifact, prefixes);
        log::debug!("{}: {} test units", class.name, found.len());
        units.extend(found);
    }
    units.sort();
    units.dedup();
    Ok(units)
}
