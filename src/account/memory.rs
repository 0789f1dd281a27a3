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

//! A volatile mailbox and annotation store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use log::info;

use super::annotations::*;
use super::model::*;
use crate::support::error::Error;
use crate::support::mailbox_paths::{
    normalise_mailbox_path, parse_mailbox_path,
};
use crate::support::safe_name::is_safe_name;

/// Keeps mailboxes and their annotations in memory.
///
/// Clones share the same underlying data. Every mapper call takes the
/// store's lock for its duration, so individual calls are atomic with respect
/// to each other.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    mailboxes: HashMap<String, MailboxId>,
    annotations: HashMap<MailboxId, BTreeMap<AnnotationKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mailbox at `path`, returning its new ID.
    pub fn create_mailbox(&self, path: &str) -> Result<MailboxId, Error> {
        let path = canonical_path(path).ok_or(Error::UnsafeName)?;
        let mut inner = self.inner.lock().unwrap();
        if inner.mailboxes.contains_key(&path) {
            return Err(Error::MailboxExists);
        }

        inner.next_id += 1;
        let id = MailboxId(inner.next_id);
        info!("Created in-memory mailbox {} as {}", path, id);
        inner.mailboxes.insert(path, id);
        Ok(id)
    }
}

/// The canonical form of `path`, or `None` if it is empty or has a component
/// which is not a safe name.
fn canonical_path(path: &str) -> Option<String> {
    if parse_mailbox_path(path).all(is_safe_name) {
        normalise_mailbox_path(path)
    } else {
        None
    }
}

impl MailboxResolver for MemoryStore {
    fn find_mailbox(
        &self,
        path: &str,
        _session: &MailboxSession,
    ) -> Result<MailboxId, Error> {
        let path = canonical_path(path).ok_or(Error::NxMailbox)?;
        self.inner
            .lock()
            .unwrap()
            .mailboxes
            .get(&path)
            .copied()
            .ok_or(Error::NxMailbox)
    }
}

impl AnnotationMapperFactory for MemoryStore {
    type Mapper = MemoryAnnotationMapper;

    fn annotation_mapper(
        &self,
        mailbox: MailboxId,
        _session: &MailboxSession,
    ) -> Result<MemoryAnnotationMapper, Error> {
        Ok(MemoryAnnotationMapper {
            store: self.clone(),
            mailbox,
        })
    }
}

/// `AnnotationMapper` for one mailbox of a `MemoryStore`.
pub struct MemoryAnnotationMapper {
    store: MemoryStore,
    mailbox: MailboxId,
}

impl MemoryAnnotationMapper {
    fn with_annotations<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<AnnotationKey, String>) -> R,
    ) -> R {
        let mut inner = self.store.inner.lock().unwrap();
        f(inner.annotations.entry(self.mailbox).or_default())
    }
}

impl AnnotationMapper for MemoryAnnotationMapper {
    fn insert_annotation(
        &mut self,
        key: &AnnotationKey,
        value: &str,
    ) -> Result<(), Error> {
        self.with_annotations(|annotations| {
            annotations.insert(key.clone(), value.to_owned());
        });
        Ok(())
    }

    fn delete_annotation(&mut self, key: &AnnotationKey) -> Result<(), Error> {
        self.with_annotations(|annotations| {
            annotations.remove(key);
        });
        Ok(())
    }

    fn get_all_annotations(&self) -> Result<Vec<Annotation>, Error> {
        Ok(self.with_annotations(|annotations| {
            annotations
                .iter()
                .map(|(k, v)| Annotation::new(k.clone(), v.clone()))
                .collect()
        }))
    }

    fn get_annotations_by_keys(
        &self,
        keys: &BTreeSet<AnnotationKey>,
    ) -> Result<Vec<Annotation>, Error> {
        Ok(self.with_annotations(|annotations| {
            keys.iter()
                .filter_map(|k| {
                    annotations
                        .get(k)
                        .map(|v| Annotation::new(k.clone(), v.clone()))
                })
                .collect()
        }))
    }
}
