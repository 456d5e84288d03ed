//! Source validators.
//!
//! Validators run in order against the prepared source file. Each either
//! rejects the source with an error or returns a boolean verdict that is
//! recorded under its name. The pipeline reads only
//! [`UNIT_TEST_VALIDATOR`] to choose between the run and test commands.

use crate::environment::SdkKind;
use crate::error::ValidationError;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Result key of the unit test detector.
pub const UNIT_TEST_VALIDATOR: &str = "UnitTest";

/// One named check over a source file.
pub trait Validator: Send + Sync {
    /// Key under which the verdict is recorded.
    fn name(&self) -> &str;

    /// Check the source at `path`.
    ///
    /// # Errors
    ///
    /// An error rejects the source and fails validation.
    fn validate(&self, path: &Path) -> Result<bool, ValidationError>;
}

/// Verdicts of a validator set, keyed by validator name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResults(HashMap<String, bool>);

impl ValidationResults {
    /// Verdict of the named validator, if it ran.
    pub fn get(&self, name: &str) -> Option<bool> {
        self.0.get(name).copied()
    }

    /// Record a verdict.
    pub fn insert(&mut self, name: impl Into<String>, verdict: bool) {
        self.0.insert(name.into(), verdict);
    }

    /// Whether the source was detected as a unit test.
    pub fn is_unit_test(&self) -> bool {
        self.get(UNIT_TEST_VALIDATOR).unwrap_or(false)
    }
}

/// Ordered list of validators.
#[derive(Clone, Default)]
pub struct ValidatorSet {
    validators: Vec<Arc<dyn Validator>>,
}

impl fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.validators.iter().map(|v| v.name()))
            .finish()
    }
}

impl ValidatorSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a validator.
    pub fn with(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Standard validators for `kind`.
    pub fn for_sdk(kind: SdkKind) -> Self {
        let patterns: &[&[&str]] = match kind {
            SdkKind::Java => &[&["@Test", "org.junit"]],
            SdkKind::Go => &[&["func Test", "\"testing\""]],
            SdkKind::Python => &[&["import unittest"], &["import pytest"]],
            SdkKind::Shell => &[&["shunit2"]],
        };
        Self::new()
            .with(SourceExists)
            .with(FileExtension::new(kind.source_extension()))
            .with(UnitTest::new(patterns))
    }

    /// Number of validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Run every validator in order, stopping at the first rejection.
    pub fn run(&self, path: &Path) -> Result<ValidationResults, ValidationError> {
        let mut results = ValidationResults::default();
        for validator in &self.validators {
            let verdict = validator.validate(path)?;
            tracing::trace!(validator = validator.name(), verdict, "Validator passed");
            results.insert(validator.name(), verdict);
        }
        Ok(results)
    }
}

/// Rejects a missing source file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceExists;

impl Validator for SourceExists {
    fn name(&self) -> &str {
        "SourceExists"
    }

    fn validate(&self, path: &Path) -> Result<bool, ValidationError> {
        if path.is_file() {
            Ok(true)
        } else {
            Err(ValidationError::SourceMissing(path.to_path_buf()))
        }
    }
}

/// Rejects a source file with the wrong extension.
#[derive(Debug, Clone)]
pub struct FileExtension {
    extension: String,
}

impl FileExtension {
    /// Require `extension` (without the dot).
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }
}

impl Validator for FileExtension {
    fn name(&self) -> &str {
        "FileExtension"
    }

    fn validate(&self, path: &Path) -> Result<bool, ValidationError> {
        if path.extension().is_some_and(|ext| ext == self.extension.as_str()) {
            Ok(true)
        } else {
            Err(ValidationError::WrongExtension {
                path: path.to_path_buf(),
                expected: self.extension.clone(),
            })
        }
    }
}

/// Detects unit tests by content.
///
/// The source is a unit test when it contains every pattern of at least one
/// group.
#[derive(Debug, Clone)]
pub struct UnitTest {
    groups: Vec<Vec<String>>,
}

impl UnitTest {
    /// Create a detector from pattern groups.
    pub fn new(groups: &[&[&str]]) -> Self {
        Self {
            groups: groups
                .iter()
                .map(|group| group.iter().map(|p| p.to_string()).collect())
                .collect(),
        }
    }
}

impl Validator for UnitTest {
    fn name(&self) -> &str {
        UNIT_TEST_VALIDATOR
    }

    fn validate(&self, path: &Path) -> Result<bool, ValidationError> {
        let source = std::fs::read_to_string(path)?;
        Ok(self
            .groups
            .iter()
            .any(|group| group.iter().all(|pattern| source.contains(pattern.as_str()))))
    }
}
