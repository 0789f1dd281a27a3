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

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use rand::{rngs::OsRng, Rng};
use tempfile::TempDir;

use super::annotations::*;
use super::model::*;
use crate::support::error::Error;
use crate::support::file_ops::{self, ErrorTransforms, FileLock, IgnoreKinds};
use crate::support::mailbox_paths::parse_mailbox_path;
use crate::support::safe_name::is_safe_name;
use crate::support::system_config::AnnotationConfig;
use crate::vacation::Vacation;

/// The file within each mailbox directory holding the mailbox's ID.
const MAILBOX_ID_FILE: &str = "%id";
const VACATION_FILE: &str = "vacation.toml";

/// An account stored on the local file system.
///
/// The layout under the account root is:
///
/// - `mail/`: one directory per mailbox, nested according to the mailbox
///   hierarchy. Each contains a `%id` file holding the mailbox ID.
/// - `annotations/`: one CBOR file per mailbox ID holding its annotations,
///   plus a `.lock` file next to it for `flock(2)`.
/// - `tmp/`: staging area for atomic file replacement.
/// - `vacation.toml`: the vacation record.
///
/// Mailbox paths are resolved against `mail/` on every call; the annotation
/// files only ever refer to mailbox IDs.
#[derive(Clone)]
pub struct Account {
    log_prefix: String,
    root: PathBuf,
    mailbox_root: PathBuf,
    annotation_root: PathBuf,
    tmp: PathBuf,
    config: Arc<AnnotationConfig>,
}

impl Account {
    pub fn new(
        log_prefix: String,
        root: PathBuf,
        config: AnnotationConfig,
    ) -> Self {
        Account {
            log_prefix,
            mailbox_root: root.join("mail"),
            annotation_root: root.join("annotations"),
            tmp: root.join("tmp"),
            root,
            config: Arc::new(config),
        }
    }

    /// Ensure that the directory structure exists and that there is an
    /// INBOX.
    pub fn init(&self) -> Result<(), Error> {
        for dir in &[&self.tmp, &self.mailbox_root, &self.annotation_root] {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(0o750)
                .create(dir)
                .ignore_already_exists()?;
        }

        self.create_if_nx(&self.mailbox_root.join("INBOX"))?;
        Ok(())
    }

    /// Create the mailbox at `path`, along with any missing parents.
    ///
    /// Returns the ID of the new mailbox.
    pub fn create_mailbox(&self, path: &str) -> Result<MailboxId, Error> {
        let dir = self.mailbox_dir(path, Error::UnsafeName)?;

        let mut parent = dir.parent();
        let mut parents = Vec::new();
        while let Some(p) = parent.filter(|&p| p != self.mailbox_root) {
            parents.push(p);
            parent = p.parent();
        }
        for p in parents.into_iter().rev() {
            self.create_if_nx(p)?;
        }

        let id = self.create(&dir)?;
        info!("{} Created mailbox {} as {}", self.log_prefix, path, id);
        Ok(id)
    }

    /// List the paths of all mailboxes in the account, sorted.
    pub fn list_mailboxes(&self) -> Result<Vec<String>, Error> {
        let mut accum = Vec::new();
        list_into(&self.mailbox_root, "", &mut accum)?;
        accum.sort_unstable();
        Ok(accum)
    }

    /// Load the account's vacation record.
    ///
    /// If none has ever been saved, returns a disabled, empty record.
    pub fn vacation(&self) -> Result<Vacation, Error> {
        let data = fs::read_to_string(self.root.join(VACATION_FILE))
            .ignore_not_found()?;
        Ok(toml::from_str(&data)?)
    }

    /// Replace the account's vacation record.
    pub fn set_vacation(&self, vacation: &Vacation) -> Result<(), Error> {
        let data = toml::to_string_pretty(vacation)?;
        file_ops::spit(
            &self.tmp,
            self.root.join(VACATION_FILE),
            0o600,
            data.as_bytes(),
        )?;
        info!(
            "{} Updated vacation record (enabled = {})",
            self.log_prefix, vacation.enabled
        );
        Ok(())
    }

    /// Map a logical mailbox path onto its directory, failing with `unsafe_err`
    /// if the path is empty or any part is unsafe.
    fn mailbox_dir(
        &self,
        path: &str,
        unsafe_err: Error,
    ) -> Result<PathBuf, Error> {
        let mut dir = self.mailbox_root.clone();
        let mut empty = true;
        for part in parse_mailbox_path(path) {
            if !is_safe_name(part) {
                return Err(unsafe_err);
            }

            dir.push(part);
            empty = false;
        }

        if empty {
            Err(unsafe_err)
        } else {
            Ok(dir)
        }
    }

    fn create(&self, dir: &Path) -> Result<MailboxId, Error> {
        let id = MailboxId(loop {
            let id: u64 = OsRng.gen();
            if 0 != id {
                break id;
            }
        });

        // Stage the new mailbox inside tmp, then move the whole thing in
        // when done.
        let stage = TempDir::new_in(&self.tmp)?;
        file_ops::spit(
            &self.tmp,
            stage.path().join(MAILBOX_ID_FILE),
            0o440,
            id.0.to_string().as_bytes(),
        )?;
        file_ops::chmod(stage.path(), 0o750)?;

        fs::rename(stage.path(), dir)
            .on_exists(Error::MailboxExists)
            .map_err(|e| match e {
                Error::Io(e)
                    if Some(nix::libc::ENOTEMPTY) == e.raw_os_error() =>
                {
                    Error::MailboxExists
                }
                e => e,
            })?;

        Ok(id)
    }

    fn create_if_nx(&self, dir: &Path) -> Result<(), Error> {
        if dir.join(MAILBOX_ID_FILE).is_file() {
            return Ok(());
        }

        match self.create(dir) {
            Ok(_) | Err(Error::MailboxExists) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn list_into(
    dir: &Path,
    prefix: &str,
    accum: &mut Vec<String>,
) -> Result<(), Error> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        let name = match entry.file_name().into_string() {
            Ok(name) if is_safe_name(&name) => name,
            _ => continue,
        };

        let path = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };

        if entry.path().join(MAILBOX_ID_FILE).is_file() {
            accum.push(path.clone());
        }
        list_into(&entry.path(), &path, accum)?;
    }

    Ok(())
}

impl MailboxResolver for Account {
    fn find_mailbox(
        &self,
        path: &str,
        session: &MailboxSession,
    ) -> Result<MailboxId, Error> {
        let dir = self.mailbox_dir(path, Error::NxMailbox)?;
        let raw = fs::read_to_string(dir.join(MAILBOX_ID_FILE))
            .on_not_found(Error::NxMailbox)?;
        let id = raw.trim().parse::<u64>().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Corrupt mailbox ID file in {}", dir.display()),
            )
        })?;

        let id = MailboxId(id);
        debug!("{} Resolved {} to {}", session.log_prefix, path, id);
        Ok(id)
    }
}

impl AnnotationMapperFactory for Account {
    type Mapper = FileAnnotationMapper;

    fn annotation_mapper(
        &self,
        mailbox: MailboxId,
        session: &MailboxSession,
    ) -> Result<FileAnnotationMapper, Error> {
        Ok(FileAnnotationMapper {
            log_prefix: session.log_prefix.clone(),
            data_path: self.annotation_root.join(mailbox.to_string()),
            lock_path: self.annotation_root.join(format!("{}.lock", mailbox)),
            tmp: self.tmp.clone(),
            config: Arc::clone(&self.config),
        })
    }
}

/// `AnnotationMapper` over the annotation file of one mailbox.
///
/// Each call is an independent, locked read-modify-write of the file.
pub struct FileAnnotationMapper {
    log_prefix: String,
    data_path: PathBuf,
    lock_path: PathBuf,
    tmp: PathBuf,
    config: Arc<AnnotationConfig>,
}

impl FileAnnotationMapper {
    fn load(&self) -> Result<BTreeMap<String, String>, Error> {
        let data = file_ops::slurp(&self.data_path)?;
        if data.is_empty() {
            Ok(BTreeMap::new())
        } else {
            Ok(serde_cbor::from_slice(&data)?)
        }
    }

    fn save(&self, annotations: &BTreeMap<String, String>) -> Result<(), Error> {
        let data = serde_cbor::to_vec(annotations)?;
        file_ops::spit(&self.tmp, &self.data_path, 0o600, &data)?;
        Ok(())
    }
}

fn to_annotation(key: &str, value: &str) -> Result<Annotation, Error> {
    Ok(Annotation::new(AnnotationKey::new(key)?, value))
}

impl AnnotationMapper for FileAnnotationMapper {
    fn insert_annotation(
        &mut self,
        key: &AnnotationKey,
        value: &str,
    ) -> Result<(), Error> {
        if value.len() > self.config.max_value_size {
            return Err(Error::AnnotationTooBig);
        }

        let _lock = FileLock::exclusive(&self.lock_path)?;
        let mut annotations = self.load()?;
        if !annotations.contains_key(key.as_str())
            && annotations.len() >= self.config.max_annotations
        {
            return Err(Error::TooManyAnnotations);
        }

        annotations.insert(key.to_string(), value.to_owned());
        self.save(&annotations)?;
        debug!("{} Stored {}", self.log_prefix, key);
        Ok(())
    }

    fn delete_annotation(&mut self, key: &AnnotationKey) -> Result<(), Error> {
        let _lock = FileLock::exclusive(&self.lock_path)?;
        let mut annotations = self.load()?;
        if annotations.remove(key.as_str()).is_some() {
            self.save(&annotations)?;
            debug!("{} Removed {}", self.log_prefix, key);
        }

        Ok(())
    }

    fn get_all_annotations(&self) -> Result<Vec<Annotation>, Error> {
        let _lock = FileLock::shared(&self.lock_path)?;
        self.load()?
            .iter()
            .map(|(k, v)| to_annotation(k, v))
            .collect()
    }

    fn get_annotations_by_keys(
        &self,
        keys: &BTreeSet<AnnotationKey>,
    ) -> Result<Vec<Annotation>, Error> {
        let _lock = FileLock::shared(&self.lock_path)?;
        let annotations = self.load()?;
        Ok(keys
            .iter()
            .filter_map(|k| {
                annotations
                    .get(k.as_str())
                    .map(|v| Annotation::new(k.clone(), v.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod test {
    use chrono::prelude::*;

    use super::*;

    struct Setup {
        _root: TempDir,
        account: Account,
    }

    fn set_up_with(config: AnnotationConfig) -> Setup {
        crate::init_test_log();

        let root = TempDir::new().unwrap();
        let account =
            Account::new("account".to_owned(), root.path().to_owned(), config);
        account.init().unwrap();

        Setup {
            _root: root,
            account,
        }
    }

    fn set_up() -> Setup {
        set_up_with(AnnotationConfig::default())
    }

    fn session() -> MailboxSession {
        MailboxSession::new("test", "user")
    }

    fn key(k: &str) -> AnnotationKey {
        AnnotationKey::new(k).unwrap()
    }

    #[test]
    fn init_creates_inbox() {
        let setup = set_up();
        assert_eq!(vec!["INBOX".to_owned()], setup.account.list_mailboxes().unwrap());
        // Idempotent
        setup.account.init().unwrap();
        assert_eq!(vec!["INBOX".to_owned()], setup.account.list_mailboxes().unwrap());
    }

    #[test]
    fn mailbox_crud() {
        let setup = set_up();
        let account = &setup.account;

        let id = account.create_mailbox("Archive/2014").unwrap();
        assert_eq!(
            vec![
                "Archive".to_owned(),
                "Archive/2014".to_owned(),
                "INBOX".to_owned(),
            ],
            account.list_mailboxes().unwrap()
        );
        assert_eq!(
            id,
            account.find_mailbox("/Archive/2014/", &session()).unwrap()
        );
        assert_ne!(
            id,
            account.find_mailbox("Archive", &session()).unwrap()
        );
        assert!(account.find_mailbox("inbox", &session()).is_ok());

        assert_matches!(
            Err(Error::MailboxExists),
            account.create_mailbox("Archive/2014")
        );
        assert_matches!(
            Err(Error::MailboxExists),
            account.create_mailbox("INBOX")
        );
        // Parents created implicitly are real mailboxes too
        assert_matches!(
            Err(Error::MailboxExists),
            account.create_mailbox("Archive")
        );

        assert_matches!(Err(Error::UnsafeName), account.create_mailbox(""));
        assert_matches!(Err(Error::UnsafeName), account.create_mailbox("../x"));
        assert_matches!(Err(Error::UnsafeName), account.create_mailbox("a/%id"));

        assert_matches!(
            Err(Error::NxMailbox),
            account.find_mailbox("Archive/2015", &session())
        );
        assert_matches!(
            Err(Error::NxMailbox),
            account.find_mailbox("../mail", &session())
        );
        assert_matches!(Err(Error::NxMailbox), account.find_mailbox("", &session()));
    }

    #[test]
    fn annotations_persist_across_instances() {
        let setup = set_up();
        let manager = AnnotationManager::new(&setup.account, &setup.account);

        manager
            .update_annotations(
                "INBOX",
                &session(),
                &[
                    Annotation::new(key("/private/comment"), "My private comment"),
                    Annotation::new(key("/shared/comment"), "My shared comment"),
                ],
            )
            .unwrap();

        let reopened = Account::new(
            "reopened".to_owned(),
            setup._root.path().to_owned(),
            AnnotationConfig::default(),
        );
        let manager = AnnotationManager::new(&reopened, &reopened);
        assert_eq!(
            vec![
                Annotation::new(key("/private/comment"), "My private comment"),
                Annotation::new(key("/shared/comment"), "My shared comment"),
            ],
            manager.get_all_annotations("INBOX", &session()).unwrap()
        );

        manager
            .update_annotations(
                "INBOX",
                &session(),
                &[
                    Annotation::nil(key("/shared/comment")),
                    Annotation::nil(key("/shared/never-existed")),
                ],
            )
            .unwrap();
        let keys = vec![key("/shared/comment"), key("/private/comment")]
            .into_iter()
            .collect();
        assert_eq!(
            vec![Annotation::new(
                key("/private/comment"),
                "My private comment"
            )],
            manager
                .get_annotations_by_keys("INBOX", &session(), &keys)
                .unwrap()
        );
    }

    #[test]
    fn annotations_are_scoped_to_mailbox_identity() {
        let setup = set_up();
        let account = &setup.account;
        account.create_mailbox("Sent").unwrap();
        let manager = AnnotationManager::new(account, account);

        manager
            .update_annotations(
                "Sent",
                &session(),
                &[Annotation::new(key("/private/comment"), "sent")],
            )
            .unwrap();
        assert!(manager
            .get_all_annotations("INBOX", &session())
            .unwrap()
            .is_empty());
        assert_matches!(
            Err(Error::NxMailbox),
            manager.get_all_annotations("Drafts", &session())
        );
    }

    #[test]
    fn corrupt_mailbox_id_is_a_lookup_failure() {
        let setup = set_up();
        let id_path =
            setup._root.path().join("mail").join("INBOX").join(MAILBOX_ID_FILE);
        fs::remove_file(&id_path).unwrap();
        fs::write(&id_path, "garbage").unwrap();

        let manager = AnnotationManager::new(&setup.account, &setup.account);
        let err = manager
            .get_all_annotations("INBOX", &session())
            .unwrap_err();
        assert!(err.is_mailbox_lookup_failure());
        match err {
            Error::MailboxLookup(cause) => match *cause {
                Error::Io(ref e) => {
                    assert_eq!(io::ErrorKind::InvalidData, e.kind())
                }
                ref e => panic!("Unexpected cause: {:?}", e),
            },
            e => panic!("Unexpected error: {:?}", e),
        }
        assert_eq!(
            0,
            fs::read_dir(setup._root.path().join("annotations"))
                .unwrap()
                .count()
        );
    }

    #[test]
    fn limits_are_enforced() {
        let setup = set_up_with(AnnotationConfig {
            max_value_size: 8,
            max_annotations: 2,
        });
        let manager = AnnotationManager::new(&setup.account, &setup.account);
        let update = |k: &str, v: &str| {
            manager.update_annotations(
                "INBOX",
                &session(),
                &[Annotation::new(key(k), v)],
            )
        };

        assert_matches!(
            Err(Error::AnnotationTooBig),
            update("/private/a", "123456789")
        );
        update("/private/a", "12345678").unwrap();
        update("/private/b", "b").unwrap();
        assert_matches!(
            Err(Error::TooManyAnnotations),
            update("/private/c", "c")
        );
        // Replacing an existing entry at the limit is fine
        update("/private/b", "bb").unwrap();

        assert_eq!(
            vec![
                Annotation::new(key("/private/a"), "12345678"),
                Annotation::new(key("/private/b"), "bb"),
            ],
            manager.get_all_annotations("INBOX", &session()).unwrap()
        );
    }

    #[test]
    fn vacation_round_trip() {
        let setup = set_up();
        assert_eq!(Vacation::default(), setup.account.vacation().unwrap());

        let vacation = Vacation {
            enabled: true,
            from_date: Some(
                FixedOffset::east_opt(7 * 3600)
                    .unwrap()
                    .with_ymd_and_hms(2016, 4, 15, 11, 56, 32)
                    .unwrap(),
            ),
            to_date: None,
            subject: Some("Away".to_owned()),
            text_body: Some("A message explaining I am in vacation".to_owned()),
            html_body: None,
        };
        setup.account.set_vacation(&vacation).unwrap();
        assert_eq!(vacation, setup.account.vacation().unwrap());
    }
}
