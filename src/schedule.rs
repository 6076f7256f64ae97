// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Follow-up lists: animals due for pregnancy diagnosis or calving.

use crate::breeding::BreedingRecord;
use crate::config::LedgerConfig;
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::cmp::Reverse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PdFilter {
    #[default]
    All,
    /// At least `pd_due_days` since A.I.
    Overdue,
    /// Due date within the bounds, soonest first.
    DueBetween {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalvingFilter {
    #[default]
    All,
    Overdue,
    /// At least `calving_approach_days` since A.I.
    Approaching,
    ExpectedBetween {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdDue {
    pub record: BreedingRecord,
    pub days_since_ai: i64,
    pub due_date: NaiveDate,
    pub overdue: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalvingDue {
    pub record: BreedingRecord,
    pub days_since_ai: i64,
    pub expected_date: NaiveDate,
    pub overdue: bool,
}

fn within(date: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    from.is_none_or(|from| date >= from) && to.is_none_or(|to| date <= to)
}

fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_days(Days::new(days.max(0) as u64))
        .unwrap_or(NaiveDate::MAX)
}

/// Inseminations still waiting for a P.D. result.
pub fn pd_due_list(
    records: &[BreedingRecord],
    filter: PdFilter,
    today: NaiveDate,
    config: &LedgerConfig,
) -> Vec<PdDue> {
    let mut due: Vec<PdDue> = records
        .iter()
        .filter(|r| r.pd_result.is_none())
        .map(|r| {
            let days_since_ai = (today - r.date).num_days();
            PdDue {
                record: r.clone(),
                days_since_ai,
                due_date: add_days(r.date, config.pd_due_days),
                overdue: days_since_ai >= config.pd_due_days,
            }
        })
        .filter(|d| match filter {
            PdFilter::All => true,
            PdFilter::Overdue => d.overdue,
            PdFilter::DueBetween { from, to } => within(d.due_date, from, to),
        })
        .collect();

    match filter {
        PdFilter::DueBetween { .. } => due.sort_by_key(|d| d.due_date),
        _ => due.sort_by_key(|d| Reverse(d.days_since_ai)),
    }
    due
}

/// Pregnant animals with their expected calving date.
pub fn calving_due_list(
    records: &[BreedingRecord],
    filter: CalvingFilter,
    today: NaiveDate,
    config: &LedgerConfig,
) -> Vec<CalvingDue> {
    let mut due: Vec<CalvingDue> = records
        .iter()
        .filter(|r| r.status.is_pregnant())
        .map(|r| {
            let gestation = config.gestation_days(r.jati);
            let days_since_ai = (today - r.date).num_days();
            CalvingDue {
                record: r.clone(),
                days_since_ai,
                expected_date: add_days(r.date, gestation),
                overdue: days_since_ai >= gestation,
            }
        })
        .filter(|d| match filter {
            CalvingFilter::All => true,
            CalvingFilter::Overdue => d.overdue,
            CalvingFilter::Approaching => d.days_since_ai >= config.calving_approach_days,
            CalvingFilter::ExpectedBetween { from, to } => within(d.expected_date, from, to),
        })
        .collect();

    match filter {
        CalvingFilter::Overdue | CalvingFilter::Approaching => {
            due.sort_by_key(|d| Reverse(d.days_since_ai));
        }
        CalvingFilter::All | CalvingFilter::ExpectedBetween { .. } => {
            due.sort_by_key(|d| d.expected_date);
        }
    }
    due
}
