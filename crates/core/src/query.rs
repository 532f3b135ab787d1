use serde::{Deserialize, Serialize};
use std::fmt;

use crate::program::ProgramStatus;

/// Partition key under which programs are cached and loaded.
///
/// The key is sent verbatim as the `status` filter of list requests; different
/// keys never share cache entries or in-flight requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(String);

impl QueryKey {
    pub const CURRENT: &'static str = "CURRENT";
    pub const ALL: &'static str = "ALL";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn current() -> Self {
        Self::new(Self::CURRENT)
    }

    pub fn all() -> Self {
        Self::new(Self::ALL)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_current(&self) -> bool {
        self.0.eq_ignore_ascii_case(Self::CURRENT)
    }

    /// The single status this key selects, if it names one.
    pub fn status(&self) -> Option<ProgramStatus> {
        ProgramStatus::parse(&self.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for QueryKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}
