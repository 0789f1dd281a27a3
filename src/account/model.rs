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

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::support::error::Error;

/// Identifies a mailbox independently of its name.
///
/// IDs are assigned when the mailbox is created and stay the same for as long
/// as the mailbox exists. All annotation storage is keyed by the ID rather
/// than the path.
#[derive(
    Deserialize,
    Serialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
#[serde(transparent)]
pub struct MailboxId(pub u64);

impl fmt::Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The per-request context every mailbox operation runs within.
///
/// Sessions are passed explicitly to every call; nothing holds on to one
/// beyond the call it was given to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxSession {
    /// The user on whose behalf the operation is performed.
    pub user: String,
    /// Text prepended to every log line emitted for this session.
    pub log_prefix: String,
}

impl MailboxSession {
    pub fn new(protocol: &str, user: impl Into<String>) -> Self {
        let user = user.into();
        MailboxSession {
            log_prefix: format!("{}[{}]", protocol, user),
            user,
        }
    }
}

/// The name of an annotation entry, such as `/private/comment`.
///
/// Entry names follow RFC 5464: they start with `/`, are made of non-empty
/// `/`-separated components, and may not contain the IMAP wildcards `*` or
/// `%`. Names are case-insensitive and are stored in lower case.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnnotationKey(String);

impl AnnotationKey {
    /// The longest entry name accepted, in bytes.
    pub const MAX_LEN: usize = 1024;

    pub fn new(name: &str) -> Result<Self, Error> {
        if name.len() > Self::MAX_LEN
            || !name.starts_with('/')
            || name.ends_with('/')
            || name.contains("//")
            || name.contains(|c: char| {
                c == '*' || c == '%' || c.is_ascii_control()
            })
        {
            return Err(Error::BadAnnotationKey);
        }

        Ok(AnnotationKey(name.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl FromStr for AnnotationKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        AnnotationKey::new(s)
    }
}

impl fmt::Display for AnnotationKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AnnotationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The value half of an annotation entry.
///
/// `Nil` is the RFC 5464 `NIL` value. It never exists in storage; an entry
/// carrying it is a request to remove the entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnnotationValue {
    Present(String),
    Nil,
}

impl AnnotationValue {
    pub fn as_str(&self) -> Option<&str> {
        match *self {
            AnnotationValue::Present(ref s) => Some(s),
            AnnotationValue::Nil => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        AnnotationValue::Nil == *self
    }
}

impl From<Option<String>> for AnnotationValue {
    fn from(v: Option<String>) -> Self {
        v.map_or(AnnotationValue::Nil, AnnotationValue::Present)
    }
}

/// A single annotation entry on a mailbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    pub key: AnnotationKey,
    pub value: AnnotationValue,
}

impl Annotation {
    pub fn new(key: AnnotationKey, value: impl Into<String>) -> Self {
        Annotation {
            key,
            value: AnnotationValue::Present(value.into()),
        }
    }

    /// An entry which requests removal of `key`.
    pub fn nil(key: AnnotationKey) -> Self {
        Annotation {
            key,
            value: AnnotationValue::Nil,
        }
    }
}
