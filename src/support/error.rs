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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Mailbox does not exist")]
    NxMailbox,
    #[error("Unable to look up mailbox: {0}")]
    MailboxLookup(#[source] Box<Error>),
    #[error("Mailbox already exists")]
    MailboxExists,
    #[error("Unsafe mailbox name")]
    UnsafeName,
    #[error("Invalid annotation entry name")]
    BadAnnotationKey,
    #[error("Annotation value too large")]
    AnnotationTooBig,
    #[error("Too many annotations on mailbox")]
    TooManyAnnotations,
    #[error("Vacation response is enabled but has neither text nor HTML body")]
    IncompleteVacationResponse,
    #[error("Vacation response has no id")]
    MissingVacationId,
    #[error("Vacation window ends before it starts")]
    InvertedVacationWindow,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Nix(#[from] nix::Error),
    #[error(transparent)]
    Cbor(#[from] serde_cbor::error::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Whether this error means the referenced mailbox could not be found.
    pub fn is_mailbox_lookup_failure(&self) -> bool {
        matches!(*self, Error::NxMailbox | Error::MailboxLookup(_))
    }
}
