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

//! Mailbox annotations (RFC 5464 `METADATA` entries).
//!
//! `AnnotationManager` is the front door. It resolves a mailbox path to a
//! `MailboxId` and then drives an `AnnotationMapper` scoped to that mailbox.
//! Nothing touches the mapper unless the mailbox resolved.

use std::collections::BTreeSet;

use log::{trace, warn};

use crate::account::model::*;
use crate::support::error::Error;

/// Resolves logical mailbox paths to mailbox identities.
pub trait MailboxResolver {
    /// Find the mailbox named by `path`, or fail with `Error::NxMailbox` if
    /// there is no such mailbox.
    fn find_mailbox(
        &self,
        path: &str,
        session: &MailboxSession,
    ) -> Result<MailboxId, Error>;
}

/// Key-value storage of the annotations of a single mailbox.
pub trait AnnotationMapper {
    /// Store `value` under `key`, replacing any existing value.
    fn insert_annotation(
        &mut self,
        key: &AnnotationKey,
        value: &str,
    ) -> Result<(), Error>;

    /// Remove `key`. Removing a key that does not exist is not an error.
    fn delete_annotation(&mut self, key: &AnnotationKey) -> Result<(), Error>;

    /// Return every annotation on the mailbox.
    fn get_all_annotations(&self) -> Result<Vec<Annotation>, Error>;

    /// Return the annotations whose keys are in `keys`.
    ///
    /// Keys with no stored annotation are absent from the result.
    fn get_annotations_by_keys(
        &self,
        keys: &BTreeSet<AnnotationKey>,
    ) -> Result<Vec<Annotation>, Error>;
}

/// Produces `AnnotationMapper`s scoped to a mailbox and session.
pub trait AnnotationMapperFactory {
    type Mapper: AnnotationMapper;

    fn annotation_mapper(
        &self,
        mailbox: MailboxId,
        session: &MailboxSession,
    ) -> Result<Self::Mapper, Error>;
}

impl<T: MailboxResolver + ?Sized> MailboxResolver for &T {
    fn find_mailbox(
        &self,
        path: &str,
        session: &MailboxSession,
    ) -> Result<MailboxId, Error> {
        (**self).find_mailbox(path, session)
    }
}

impl<T: AnnotationMapperFactory + ?Sized> AnnotationMapperFactory for &T {
    type Mapper = T::Mapper;

    fn annotation_mapper(
        &self,
        mailbox: MailboxId,
        session: &MailboxSession,
    ) -> Result<T::Mapper, Error> {
        (**self).annotation_mapper(mailbox, session)
    }
}

/// Applies annotation updates and queries against mailboxes.
///
/// The manager itself is stateless. It performs no locking of its own, and a
/// batch passed to `update_annotations` is not atomic: if the mapper fails
/// part-way through, the entries before the failure remain applied.
#[derive(Clone, Debug)]
pub struct AnnotationManager<R, F> {
    resolver: R,
    mappers: F,
}

impl<R: MailboxResolver, F: AnnotationMapperFactory> AnnotationManager<R, F> {
    pub fn new(resolver: R, mappers: F) -> Self {
        AnnotationManager { resolver, mappers }
    }

    /// Apply `annotations` to the mailbox at `path`, in order.
    ///
    /// Entries with a value are stored, replacing any previous value; `NIL`
    /// entries remove their key. When the same key occurs more than once, the
    /// last occurrence determines the final state.
    pub fn update_annotations(
        &self,
        path: &str,
        session: &MailboxSession,
        annotations: &[Annotation],
    ) -> Result<(), Error> {
        let mut mapper = self.mapper(path, session)?;
        for annotation in annotations {
            match annotation.value {
                AnnotationValue::Present(ref value) => {
                    trace!(
                        "{} Set {} on {}",
                        session.log_prefix,
                        annotation.key,
                        path
                    );
                    mapper.insert_annotation(&annotation.key, value)?;
                }
                AnnotationValue::Nil => {
                    trace!(
                        "{} Remove {} from {}",
                        session.log_prefix,
                        annotation.key,
                        path
                    );
                    mapper.delete_annotation(&annotation.key)?;
                }
            }
        }

        Ok(())
    }

    /// Return every annotation on the mailbox at `path`.
    pub fn get_all_annotations(
        &self,
        path: &str,
        session: &MailboxSession,
    ) -> Result<Vec<Annotation>, Error> {
        self.mapper(path, session)?.get_all_annotations()
    }

    /// Return the annotations on the mailbox at `path` whose keys are in
    /// `keys`.
    pub fn get_annotations_by_keys(
        &self,
        path: &str,
        session: &MailboxSession,
        keys: &BTreeSet<AnnotationKey>,
    ) -> Result<Vec<Annotation>, Error> {
        self.mapper(path, session)?.get_annotations_by_keys(keys)
    }

    fn mapper(
        &self,
        path: &str,
        session: &MailboxSession,
    ) -> Result<F::Mapper, Error> {
        let id = self
            .resolver
            .find_mailbox(path, session)
            .map_err(|e| {
                warn!(
                    "{} Failed to look up mailbox {:?}: {}",
                    session.log_prefix, path, e
                );
                lookup_failure(e)
            })?;
        self.mappers.annotation_mapper(id, session)
    }
}

/// Any failure to resolve a mailbox is a lookup failure, whatever the
/// resolver's reason was.
fn lookup_failure(e: Error) -> Error {
    match e {
        e @ Error::NxMailbox | e @ Error::MailboxLookup(_) => e,
        e => Error::MailboxLookup(Box::new(e)),
    }
}

#[cfg(test)]
mod test {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;

    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Open(MailboxId),
        Insert(String, String),
        Delete(String),
        GetAll,
        GetByKeys(Vec<String>),
    }

    #[derive(Default)]
    struct State {
        calls: Vec<Call>,
        stored: BTreeMap<AnnotationKey, String>,
        // Number of successful mutations after which the next one fails
        fail_after: Option<usize>,
    }

    #[derive(Clone, Default)]
    struct FakeStore {
        mailboxes: HashMap<String, MailboxId>,
        state: Arc<Mutex<State>>,
    }

    struct FakeMapper {
        state: Arc<Mutex<State>>,
    }

    impl FakeStore {
        fn with_mailbox(path: &str) -> Self {
            let mut store = FakeStore::default();
            store.mailboxes.insert(path.to_owned(), MailboxId(42));
            store
        }

        fn calls(&self) -> Vec<Call> {
            self.state.lock().unwrap().calls.clone()
        }

        fn preload(&self, key: &str, value: &str) {
            self.state
                .lock()
                .unwrap()
                .stored
                .insert(AnnotationKey::new(key).unwrap(), value.to_owned());
        }
    }

    impl MailboxResolver for FakeStore {
        fn find_mailbox(
            &self,
            path: &str,
            _: &MailboxSession,
        ) -> Result<MailboxId, Error> {
            if path.contains('*') {
                return Err(Error::UnsafeName);
            }
            if "broken" == path {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "Permission denied",
                )));
            }

            self.mailboxes.get(path).copied().ok_or(Error::NxMailbox)
        }
    }

    impl AnnotationMapperFactory for FakeStore {
        type Mapper = FakeMapper;

        fn annotation_mapper(
            &self,
            mailbox: MailboxId,
            _: &MailboxSession,
        ) -> Result<FakeMapper, Error> {
            self.state.lock().unwrap().calls.push(Call::Open(mailbox));
            Ok(FakeMapper {
                state: Arc::clone(&self.state),
            })
        }
    }

    impl FakeMapper {
        fn mutate(
            &mut self,
            call: Call,
            f: impl FnOnce(&mut BTreeMap<AnnotationKey, String>),
        ) -> Result<(), Error> {
            let mut state = self.state.lock().unwrap();
            if let Some(ref mut remaining) = state.fail_after {
                if 0 == *remaining {
                    return Err(Error::TooManyAnnotations);
                }
                *remaining -= 1;
            }

            state.calls.push(call);
            f(&mut state.stored);
            Ok(())
        }
    }

    impl AnnotationMapper for FakeMapper {
        fn insert_annotation(
            &mut self,
            key: &AnnotationKey,
            value: &str,
        ) -> Result<(), Error> {
            self.mutate(
                Call::Insert(key.to_string(), value.to_owned()),
                |stored| {
                    stored.insert(key.clone(), value.to_owned());
                },
            )
        }

        fn delete_annotation(
            &mut self,
            key: &AnnotationKey,
        ) -> Result<(), Error> {
            self.mutate(Call::Delete(key.to_string()), |stored| {
                stored.remove(key);
            })
        }

        fn get_all_annotations(&self) -> Result<Vec<Annotation>, Error> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::GetAll);
            Ok(state
                .stored
                .iter()
                .map(|(k, v)| Annotation::new(k.clone(), v.clone()))
                .collect())
        }

        fn get_annotations_by_keys(
            &self,
            keys: &BTreeSet<AnnotationKey>,
        ) -> Result<Vec<Annotation>, Error> {
            let mut state = self.state.lock().unwrap();
            let requested = keys.iter().map(|k| k.to_string()).collect();
            state.calls.push(Call::GetByKeys(requested));
            Ok(keys
                .iter()
                .filter_map(|k| {
                    state
                        .stored
                        .get(k)
                        .map(|v| Annotation::new(k.clone(), v.clone()))
                })
                .collect())
        }
    }

    fn key(k: &str) -> AnnotationKey {
        AnnotationKey::new(k).unwrap()
    }

    fn private_annotation() -> Annotation {
        Annotation::new(key("/private/comment"), "My private comment")
    }

    fn shared_annotation() -> Annotation {
        Annotation::new(key("/shared/comment"), "My shared comment")
    }

    fn session() -> MailboxSession {
        MailboxSession::new("test", "user")
    }

    fn manager(store: &FakeStore) -> AnnotationManager<&FakeStore, &FakeStore> {
        AnnotationManager::new(store, store)
    }

    #[test]
    fn update_fails_without_touching_store_when_mailbox_missing() {
        let store = FakeStore::with_mailbox("INBOX");
        assert_matches!(
            Err(Error::NxMailbox),
            manager(&store).update_annotations(
                "Archive",
                &session(),
                &[private_annotation()]
            )
        );
        assert!(store.calls().is_empty());
    }

    #[test]
    fn unsafe_path_is_a_lookup_failure() {
        let store = FakeStore::with_mailbox("INBOX");
        let err = manager(&store)
            .get_all_annotations("*", &session())
            .unwrap_err();
        assert!(err.is_mailbox_lookup_failure());
        assert_matches!(Error::MailboxLookup(_), err);
        assert!(store.calls().is_empty());
    }

    #[test]
    fn resolver_io_error_is_a_lookup_failure() {
        let store = FakeStore::with_mailbox("INBOX");
        let err = manager(&store)
            .update_annotations("broken", &session(), &[private_annotation()])
            .unwrap_err();
        assert!(err.is_mailbox_lookup_failure());
        match err {
            Error::MailboxLookup(cause) => assert_matches!(Error::Io(_), *cause),
            e => panic!("Unexpected error: {:?}", e),
        }

        let keys = vec![key("/private/comment")].into_iter().collect();
        assert!(manager(&store)
            .get_annotations_by_keys("broken", &session(), &keys)
            .unwrap_err()
            .is_mailbox_lookup_failure());
        assert!(store.calls().is_empty());
    }

    #[test]
    fn update_inserts_every_present_entry() {
        let store = FakeStore::with_mailbox("INBOX");
        manager(&store)
            .update_annotations(
                "INBOX",
                &session(),
                &[private_annotation(), shared_annotation()],
            )
            .unwrap();

        assert_eq!(
            vec![
                Call::Open(MailboxId(42)),
                Call::Insert(
                    "/private/comment".to_owned(),
                    "My private comment".to_owned()
                ),
                Call::Insert(
                    "/shared/comment".to_owned(),
                    "My shared comment".to_owned()
                ),
            ],
            store.calls()
        );
    }

    #[test]
    fn update_deletes_nil_entries() {
        let store = FakeStore::with_mailbox("INBOX");
        manager(&store)
            .update_annotations(
                "INBOX",
                &session(),
                &[private_annotation(), Annotation::nil(key("/shared/comment"))],
            )
            .unwrap();

        assert_eq!(
            vec![
                Call::Open(MailboxId(42)),
                Call::Insert(
                    "/private/comment".to_owned(),
                    "My private comment".to_owned()
                ),
                Call::Delete("/shared/comment".to_owned()),
            ],
            store.calls()
        );
    }

    #[test]
    fn deleting_absent_key_is_not_an_error() {
        let store = FakeStore::with_mailbox("INBOX");
        manager(&store)
            .update_annotations(
                "INBOX",
                &session(),
                &[Annotation::nil(key("/private/nothing"))],
            )
            .unwrap();
        assert!(manager(&store)
            .get_all_annotations("INBOX", &session())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn overwriting_replaces_value() {
        let store = FakeStore::with_mailbox("INBOX");
        store.preload("/private/comment", "old");
        manager(&store)
            .update_annotations("INBOX", &session(), &[private_annotation()])
            .unwrap();
        assert_eq!(
            vec![private_annotation()],
            manager(&store)
                .get_all_annotations("INBOX", &session())
                .unwrap()
        );
    }

    #[test]
    fn failed_batch_keeps_earlier_mutations() {
        let store = FakeStore::with_mailbox("INBOX");
        store.state.lock().unwrap().fail_after = Some(1);

        assert_matches!(
            Err(Error::TooManyAnnotations),
            manager(&store).update_annotations(
                "INBOX",
                &session(),
                &[
                    private_annotation(),
                    shared_annotation(),
                    Annotation::nil(key("/private/comment")),
                ],
            )
        );

        let state = store.state.lock().unwrap();
        assert_eq!(
            Some(&"My private comment".to_owned()),
            state.stored.get(&key("/private/comment"))
        );
        assert!(!state.stored.contains_key(&key("/shared/comment")));
    }

    #[test]
    fn get_all_fails_when_mailbox_missing() {
        let store = FakeStore::with_mailbox("INBOX");
        assert_matches!(
            Err(Error::NxMailbox),
            manager(&store).get_all_annotations("Archive", &session())
        );
        assert!(store.calls().is_empty());
    }

    #[test]
    fn get_all_returns_empty_for_no_annotations() {
        let store = FakeStore::with_mailbox("INBOX");
        assert!(manager(&store)
            .get_all_annotations("INBOX", &session())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn get_all_returns_stored_annotations() {
        let store = FakeStore::with_mailbox("INBOX");
        store.preload("/private/comment", "My private comment");
        store.preload("/shared/comment", "My shared comment");

        assert_eq!(
            vec![private_annotation(), shared_annotation()],
            manager(&store)
                .get_all_annotations("INBOX", &session())
                .unwrap()
        );
        assert_eq!(
            vec![Call::Open(MailboxId(42)), Call::GetAll],
            store.calls()
        );
    }

    #[test]
    fn get_by_keys_fails_when_mailbox_missing() {
        let store = FakeStore::with_mailbox("INBOX");
        let keys = vec![key("/private/comment")].into_iter().collect();
        assert_matches!(
            Err(Error::NxMailbox),
            manager(&store).get_annotations_by_keys(
                "Archive",
                &session(),
                &keys
            )
        );
        assert!(store.calls().is_empty());
    }

    #[test]
    fn get_by_keys_forwards_keys_and_omits_absent() {
        let store = FakeStore::with_mailbox("INBOX");
        store.preload("/private/comment", "My private comment");
        store.preload("/shared/comment", "My shared comment");

        let keys = vec![key("/private/comment"), key("/private/missing")]
            .into_iter()
            .collect();
        assert_eq!(
            vec![private_annotation()],
            manager(&store)
                .get_annotations_by_keys("INBOX", &session(), &keys)
                .unwrap()
        );
        assert_eq!(
            vec![
                Call::Open(MailboxId(42)),
                Call::GetByKeys(vec![
                    "/private/comment".to_owned(),
                    "/private/missing".to_owned()
                ]),
            ],
            store.calls()
        );

        let keys = vec![key("/private/missing")].into_iter().collect();
        assert!(manager(&store)
            .get_annotations_by_keys("INBOX", &session(), &keys)
            .unwrap()
            .is_empty());
    }

    proptest! {
        #[test]
        fn one_dispatch_per_entry_and_last_write_wins(
            ops in prop::collection::vec(
                (0usize..4, prop::option::of("[a-z]{0,8}")), 0..20)
        ) {
            const KEYS: [&str; 4] =
                ["/private/a", "/private/b", "/shared/a", "/shared/b"];

            let store = FakeStore::with_mailbox("INBOX");
            let batch = ops
                .iter()
                .map(|&(k, ref v)| Annotation {
                    key: key(KEYS[k]),
                    value: v.clone().into(),
                })
                .collect::<Vec<_>>();

            manager(&store)
                .update_annotations("INBOX", &session(), &batch)
                .unwrap();

            let expected_calls = ops
                .iter()
                .map(|&(k, ref v)| match *v {
                    Some(ref v) => Call::Insert(KEYS[k].to_owned(), v.clone()),
                    None => Call::Delete(KEYS[k].to_owned()),
                })
                .collect::<Vec<_>>();
            let calls = store.calls();
            prop_assert_eq!(&expected_calls[..], &calls[1..]);

            let mut expected = BTreeMap::new();
            for &(k, ref v) in &ops {
                match *v {
                    Some(ref v) => {
                        expected.insert(key(KEYS[k]), v.clone());
                    }
                    None => {
                        expected.remove(&key(KEYS[k]));
                    }
                }
            }
            prop_assert_eq!(expected, store.state.lock().unwrap().stored.clone());
        }
    }
}
