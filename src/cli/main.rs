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

use std::path::PathBuf;

use chrono::prelude::*;
use structopt::StructOpt;

use marginalia::account::account::Account;
use marginalia::account::model::{AnnotationKey, MailboxSession};
use marginalia::support::sysexits::*;
use marginalia::support::system_config::SystemConfig;

/// Manage mailbox annotations and the vacation response of a Marginalia
/// account directory.
#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Options {
    /// The account directory [default: the current directory]
    #[structopt(long, parse(from_os_str))]
    root: Option<PathBuf>,

    /// Log more detail to standard error. May be repeated.
    ///
    /// Ignored if the account directory contains `logging.toml`, which is
    /// then used as the log4rs configuration instead.
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Create the account directory structure and INBOX.
    ///
    /// This is safe to run on an account which already exists.
    Init,
    /// Create and list mailboxes.
    Mailbox(MailboxSubcommand),
    /// Query and modify mailbox annotations.
    Annotation(AnnotationSubcommand),
    /// Query and modify the vacation response.
    Vacation(VacationSubcommand),
}

#[derive(StructOpt)]
pub(super) enum MailboxSubcommand {
    /// Create a mailbox, along with any missing parents.
    Create {
        /// The mailbox path, with `/` as the hierarchy delimiter.
        path: String,
    },
    /// List all mailboxes.
    List,
}

#[derive(StructOpt)]
pub(super) enum AnnotationSubcommand {
    /// Show annotations on a mailbox.
    ///
    /// Without any keys, all annotations are shown. Requested keys which are
    /// not set are silently skipped.
    Get {
        mailbox: String,
        #[structopt(parse(try_from_str))]
        keys: Vec<AnnotationKey>,
    },
    /// Set an annotation, replacing any existing value.
    Set {
        mailbox: String,
        #[structopt(parse(try_from_str))]
        key: AnnotationKey,
        value: String,
    },
    /// Remove an annotation. Removing an annotation which is not set does
    /// nothing.
    Unset {
        mailbox: String,
        #[structopt(parse(try_from_str))]
        key: AnnotationKey,
    },
}

#[derive(StructOpt)]
pub(super) enum VacationSubcommand {
    /// Show the vacation response as clients would see it.
    Show {
        /// Evaluate the date window at this RFC 3339 instant instead of now.
        #[structopt(long, parse(try_from_str = parse_date))]
        at: Option<DateTime<FixedOffset>>,
    },
    Set(VacationSetSubcommand),
}

/// Update the vacation record.
///
/// Only the given options are changed. Dates are RFC 3339, e.g.
/// `2016-04-15T11:56:32+07:00`.
#[derive(StructOpt)]
pub(super) struct VacationSetSubcommand {
    /// Turn the vacation response on.
    #[structopt(long, conflicts_with = "disable")]
    pub(super) enable: bool,
    /// Turn the vacation response off.
    #[structopt(long)]
    pub(super) disable: bool,
    /// Start of the vacation window.
    #[structopt(long, parse(try_from_str = parse_date))]
    pub(super) from: Option<DateTime<FixedOffset>>,
    /// End of the vacation window.
    #[structopt(long, parse(try_from_str = parse_date))]
    pub(super) to: Option<DateTime<FixedOffset>>,
    /// Remove both ends of the vacation window.
    #[structopt(long, conflicts_with_all = &["from", "to"])]
    pub(super) clear_dates: bool,
    /// Subject of automatic replies.
    #[structopt(long)]
    pub(super) subject: Option<String>,
    /// Plain text body of automatic replies.
    #[structopt(long)]
    pub(super) text: Option<String>,
    /// HTML body of automatic replies.
    #[structopt(long)]
    pub(super) html: Option<String>,
}

fn parse_date(s: &str) -> chrono::ParseResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s)
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let options =
        Options::from_clap(&match Options::clap().get_matches_safe() {
            Ok(matches) => matches,
            Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::HelpDisplayed,
                    ..
                },
            )
            | Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::VersionDisplayed,
                    ..
                },
            ) => {
                println!("{}", e.message);
                return;
            }
            Err(e) => {
                eprintln!("{}", e.message);
                EX_USAGE.exit()
            }
        });

    let root = match options.root {
        Some(root) => root,
        None => match std::env::current_dir() {
            Ok(cwd) => cwd,
            Err(e) => die!(EX_OSERR, "Unable to determine current directory: {}", e),
        },
    };

    init_log(&root, options.verbose);

    let system_config = match SystemConfig::load(&root) {
        Ok(config) => config,
        Err(e) => die!(
            EX_CONFIG,
            "Error in config file under '{}': {}",
            root.display(),
            e
        ),
    };

    let session = MailboxSession::new("cli", current_user());
    let account = Account::new(
        session.log_prefix.clone(),
        root.clone(),
        system_config.annotations,
    );

    if let Command::Init = options.command {
        super::commands::init(&account);
        return;
    }

    if !root.join("mail").is_dir() {
        die!(
            EX_CONFIG,
            "'{}' does not look like an account directory; run\n\
             `marginalia --root '{}' init` to create one.",
            root.display(),
            root.display()
        );
    }

    match options.command {
        Command::Init => (),
        Command::Mailbox(cmd) => super::commands::mailbox(&account, cmd),
        Command::Annotation(cmd) => {
            super::commands::annotation(&account, &session, cmd)
        }
        Command::Vacation(cmd) => super::commands::vacation(&account, cmd),
    }
}

fn init_log(root: &std::path::Path, verbose: u8) {
    let log_config_file = root.join("logging.toml");
    if log_config_file.is_file() {
        if let Err(e) = log4rs::init_file(
            &log_config_file,
            log4rs::config::Deserializers::default(),
        ) {
            die!(
                EX_CONFIG,
                "Error in logging config '{}': {}",
                log_config_file.display(),
                e
            );
        }
    } else {
        init_simple_log(match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        });
    }
}

/// Send all log output at `level` and above to standard error.
fn init_simple_log(level: log::LevelFilter) {
    use log4rs::append::console::{ConsoleAppender, Target};
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S%.3f)} [{l}][{t}] {m}{n}",
        )))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level));

    match config.map(log4rs::init_config) {
        Ok(Ok(_)) => (),
        Ok(Err(e)) => die!(EX_SOFTWARE, "Failed to initialise logging: {}", e),
        Err(e) => die!(EX_SOFTWARE, "Bad logging configuration: {}", e),
    }
}

fn current_user() -> String {
    match nix::unistd::User::from_uid(nix::unistd::getuid()) {
        Ok(Some(user)) => user.name,
        _ => std::env::var("USER").unwrap_or_else(|_| "unknown".to_owned()),
    }
}
