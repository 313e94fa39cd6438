// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent descriptor: an immutable-by-name folder holding a system prompt
//! and tool configuration.

use crate::TenantId;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;

/// Human-chosen, tenant-unique agent name. Read off disk, not generated
/// locally, so it is a plain string wrapper rather than a [`crate::define_id`]
/// type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentName(pub String);

impl AgentName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AgentName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for AgentName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// An immutable-by-name folder descriptor: `name` is unique per tenant,
/// `path` points at the on-disk system prompt + tool config, `version` bumps
/// monotonically on redeploy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub name: AgentName,
    pub tenant_id: TenantId,
    pub path: PathBuf,
    pub version: u32,
}

impl Agent {
    pub fn new(name: AgentName, tenant_id: TenantId, path: PathBuf) -> Self {
        Self { name, tenant_id, path, version: 1 }
    }

    /// Redeploy bumps the version in place; the name/path identity is fixed.
    pub fn redeploy(&mut self, path: PathBuf) {
        self.path = path;
        self.version += 1;
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
