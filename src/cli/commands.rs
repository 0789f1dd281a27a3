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

use std::collections::BTreeSet;

use chrono::prelude::*;

use super::main::{
    AnnotationSubcommand, MailboxSubcommand, VacationSetSubcommand,
    VacationSubcommand,
};
use marginalia::account::account::Account;
use marginalia::account::annotations::AnnotationManager;
use marginalia::account::model::{Annotation, MailboxSession};
use marginalia::support::error::Error;
use marginalia::support::sysexits::*;
use marginalia::vacation::{
    Vacation, VacationResponse, VACATION_RESPONSE_ID,
};

fn exit_code(e: &Error) -> Sysexit {
    match *e {
        Error::NxMailbox | Error::MailboxLookup(_) => EX_NOINPUT,
        Error::MailboxExists => EX_CANTCREAT,
        Error::UnsafeName
        | Error::BadAnnotationKey
        | Error::AnnotationTooBig
        | Error::TooManyAnnotations
        | Error::IncompleteVacationResponse
        | Error::MissingVacationId
        | Error::InvertedVacationWindow => EX_DATAERR,
        Error::Io(_) => EX_IOERR,
        _ => EX_SOFTWARE,
    }
}

fn fail(e: Error) -> ! {
    die!(exit_code(&e), "{}", e)
}

pub(super) fn init(account: &Account) {
    if let Err(e) = account.init() {
        fail(e);
    }
}

pub(super) fn mailbox(account: &Account, cmd: MailboxSubcommand) {
    match cmd {
        MailboxSubcommand::Create { path } => {
            match account.create_mailbox(&path) {
                Ok(id) => println!("{}", id),
                Err(e) => fail(e),
            }
        }
        MailboxSubcommand::List => {
            for path in account.list_mailboxes().unwrap_or_else(|e| fail(e)) {
                println!("{}", path);
            }
        }
    }
}

pub(super) fn annotation(
    account: &Account,
    session: &MailboxSession,
    cmd: AnnotationSubcommand,
) {
    let manager = AnnotationManager::new(account, account);
    let result = match cmd {
        AnnotationSubcommand::Get { mailbox, keys } => {
            let annotations = if keys.is_empty() {
                manager.get_all_annotations(&mailbox, session)
            } else {
                let keys = keys.into_iter().collect::<BTreeSet<_>>();
                manager.get_annotations_by_keys(&mailbox, session, &keys)
            };

            annotations.map(|annotations| {
                for annotation in annotations {
                    if let Some(value) = annotation.value.as_str() {
                        println!("{} = {:?}", annotation.key, value);
                    }
                }
            })
        }
        AnnotationSubcommand::Set {
            mailbox,
            key,
            value,
        } => manager.update_annotations(
            &mailbox,
            session,
            &[Annotation::new(key, value)],
        ),
        AnnotationSubcommand::Unset { mailbox, key } => manager
            .update_annotations(&mailbox, session, &[Annotation::nil(key)]),
    };

    if let Err(e) = result {
        fail(e);
    }
}

pub(super) fn vacation(account: &Account, cmd: VacationSubcommand) {
    match cmd {
        VacationSubcommand::Show { at } => {
            let vacation = account.vacation().unwrap_or_else(|e| fail(e));
            let at = at.unwrap_or_else(|| Utc::now().into());
            let response = VacationResponse::builder()
                .from_vacation(&vacation, &at)
                .build()
                .unwrap_or_else(|e| fail(e));
            print_response(&response);
        }
        VacationSubcommand::Set(cmd) => vacation_set(account, cmd),
    }
}

fn vacation_set(account: &Account, cmd: VacationSetSubcommand) {
    let mut vacation = account.vacation().unwrap_or_else(|e| fail(e));
    apply_vacation_set(&mut vacation, cmd).unwrap_or_else(|e| fail(e));
    account.set_vacation(&vacation).unwrap_or_else(|e| fail(e));
}

/// Merge the options given to `vacation set` into `vacation`.
///
/// Fails without a usable result if the merged record has its window
/// inverted or is enabled without any body.
fn apply_vacation_set(
    vacation: &mut Vacation,
    cmd: VacationSetSubcommand,
) -> Result<(), Error> {
    if cmd.enable {
        vacation.enabled = true;
    } else if cmd.disable {
        vacation.enabled = false;
    }

    if cmd.clear_dates {
        vacation.from_date = None;
        vacation.to_date = None;
    }
    if cmd.from.is_some() {
        vacation.from_date = cmd.from;
    }
    if cmd.to.is_some() {
        vacation.to_date = cmd.to;
    }

    // An empty string clears the corresponding field
    fn update(field: &mut Option<String>, new: Option<String>) {
        if let Some(new) = new {
            *field = Some(new).filter(|s| !s.is_empty());
        }
    }
    update(&mut vacation.subject, cmd.subject);
    update(&mut vacation.text_body, cmd.text);
    update(&mut vacation.html_body, cmd.html);

    if let (Some(from), Some(to)) = (vacation.from_date, vacation.to_date) {
        if from > to {
            return Err(Error::InvertedVacationWindow);
        }
    }

    // Refuse to store a record that could never be presented to clients
    VacationResponse::builder()
        .id(VACATION_RESPONSE_ID)
        .enabled(vacation.enabled)
        .text_body(vacation.text_body.clone())
        .html_body(vacation.html_body.clone())
        .build()?;
    Ok(())
}

fn print_response(response: &VacationResponse) {
    fn show_date(date: Option<&DateTime<FixedOffset>>) -> String {
        date.map_or_else(|| "-".to_owned(), |d| d.to_rfc3339())
    }

    println!("id: {}", response.id());
    println!("enabled: {}", response.is_enabled());
    println!("from: {}", show_date(response.from_date()));
    println!("to: {}", show_date(response.to_date()));
    if let Some(subject) = response.subject() {
        println!("subject: {:?}", subject);
    }
    if let Some(text) = response.text_body() {
        println!("text: {:?}", text);
    }
    if let Some(html) = response.html_body() {
        println!("html: {:?}", html);
    }
}
