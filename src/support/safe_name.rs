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

/// Determine whether the given mailbox name component is "safe".
///
/// Each component of a mailbox path becomes a directory in the account's
/// `mail` tree. This excludes empty names and patterns that cause directory
/// traversal, names that collide with the `%`-prefixed metadata files kept
/// next to them, and things that have special meaning within IMAP.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty() &&
        // Block directory traversal through .. and creation of hidden files on
        // UNIX
        !name.starts_with('.') &&
        !name.contains('/') &&
        !name.contains('\\') &&
        // Names beginning with # have special meaning in IMAP
        !name.starts_with('#') &&
        !name.contains(|c| c < ' ' || c == '\x7F') &&
        // % also marks mailbox metadata files such as `%id`
        !name.contains(|c| c == '*' || c == '%')
}
