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

//! Vacation auto-responses (JMAP `VacationResponse`).
//!
//! `Vacation` is the stored record. `VacationResponse` is what gets reported
//! to clients, with `enabled` reflecting whether the vacation is actually in
//! effect at some instant rather than just switched on.

use chrono::prelude::*;
use serde::{Deserialize, Serialize};

use crate::support::error::Error;

/// The id every account's single vacation response is reported under.
pub const VACATION_RESPONSE_ID: &str = "singleton";

/// A stored vacation record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vacation {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_date: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_date: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
}

impl Vacation {
    /// Whether this vacation is in effect at `instant`.
    ///
    /// This requires the record to be enabled and `instant` to fall within
    /// the window bounded by `from_date` and `to_date`, inclusive. A missing
    /// bound leaves that end of the window open.
    pub fn is_active_at<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> bool {
        let instant = instant.with_timezone(&Utc);
        self.enabled
            && self
                .from_date
                .map_or(true, |from| instant >= from.with_timezone(&Utc))
            && self
                .to_date
                .map_or(true, |to| instant <= to.with_timezone(&Utc))
    }
}

/// A vacation response as presented to clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VacationResponse {
    id: String,
    enabled: bool,
    from_date: Option<DateTime<FixedOffset>>,
    to_date: Option<DateTime<FixedOffset>>,
    subject: Option<String>,
    text_body: Option<String>,
    html_body: Option<String>,
}

impl VacationResponse {
    pub fn builder() -> VacationResponseBuilder {
        VacationResponseBuilder::default()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn from_date(&self) -> Option<&DateTime<FixedOffset>> {
        self.from_date.as_ref()
    }

    pub fn to_date(&self) -> Option<&DateTime<FixedOffset>> {
        self.to_date.as_ref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn text_body(&self) -> Option<&str> {
        self.text_body.as_deref()
    }

    pub fn html_body(&self) -> Option<&str> {
        self.html_body.as_deref()
    }
}

/// Builds a `VacationResponse`.
///
/// Nothing is validated until `build()`.
#[derive(Clone, Debug, Default)]
pub struct VacationResponseBuilder {
    id: Option<String>,
    enabled: bool,
    from_date: Option<DateTime<FixedOffset>>,
    to_date: Option<DateTime<FixedOffset>>,
    subject: Option<String>,
    text_body: Option<String>,
    html_body: Option<String>,
}

impl VacationResponseBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn from_date(mut self, from_date: Option<DateTime<FixedOffset>>) -> Self {
        self.from_date = from_date;
        self
    }

    pub fn to_date(mut self, to_date: Option<DateTime<FixedOffset>>) -> Self {
        self.to_date = to_date;
        self
    }

    pub fn subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    pub fn text_body(mut self, text_body: Option<String>) -> Self {
        self.text_body = text_body;
        self
    }

    pub fn html_body(mut self, html_body: Option<String>) -> Self {
        self.html_body = html_body;
        self
    }

    /// Populate every field from `vacation` as seen at `as_of`.
    ///
    /// The response is enabled only if the vacation is enabled and `as_of`
    /// lies within its date window. The id is set to the singleton id.
    pub fn from_vacation<Tz: TimeZone>(
        self,
        vacation: &Vacation,
        as_of: &DateTime<Tz>,
    ) -> Self {
        self.id(VACATION_RESPONSE_ID)
            .enabled(vacation.is_active_at(as_of))
            .from_date(vacation.from_date)
            .to_date(vacation.to_date)
            .subject(vacation.subject.clone())
            .text_body(vacation.text_body.clone())
            .html_body(vacation.html_body.clone())
    }

    pub fn build(self) -> Result<VacationResponse, Error> {
        let id = self.id.ok_or(Error::MissingVacationId)?;
        if self.enabled && self.text_body.is_none() && self.html_body.is_none()
        {
            return Err(Error::IncompleteVacationResponse);
        }

        Ok(VacationResponse {
            id,
            enabled: self.enabled,
            from_date: self.from_date,
            to_date: self.to_date,
            subject: self.subject,
            text_body: self.text_body,
            html_body: self.html_body,
        })
    }
}
