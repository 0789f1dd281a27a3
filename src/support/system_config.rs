//-
// Copyright (c) 2024, The Marginalia Authors
//
// This file is part of Marginalia.
//
// Marginalia is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Marginalia is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along
// with Marginalia. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::support::error::Error;
use crate::support::file_ops::IgnoreKinds;

/// The name of the configuration file within an account root.
pub const CONFIG_FILE_NAME: &str = "marginalia.toml";

/// The system-wide configuration for Marginalia.
///
/// This is stored in a file named `marginalia.toml` at the root of the
/// account directory. Every section is optional.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct SystemConfig {
    /// Limits on mailbox annotations.
    #[serde(default)]
    pub annotations: AnnotationConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// The maximum size, in bytes, of a single annotation value.
    ///
    /// Attempts to store larger values fail without modifying the mailbox.
    pub max_value_size: usize,

    /// The maximum number of annotations a single mailbox may carry.
    ///
    /// Replacing the value of an existing annotation is always permitted,
    /// even when the mailbox is at the limit.
    pub max_annotations: usize,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        AnnotationConfig {
            max_value_size: 65536,
            max_annotations: 256,
        }
    }
}

impl SystemConfig {
    /// Load the configuration from `root`, falling back to the defaults if
    /// there is no configuration file.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let data = fs::read_to_string(root.join(CONFIG_FILE_NAME))
            .ignore_not_found()?;
        Ok(toml::from_str(&data)?)
    }
}
