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

//! The signed-in operator, as supplied by the authentication layer.

use crate::base::UserId;
use crate::config::LedgerConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Role {
    Admin,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
    pub email: Option<String>,
    pub role: Role,
}

impl Identity {
    pub fn user(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            display_name: display_name.into(),
            email: None,
            role: Role::User,
        }
    }

    pub fn admin(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            role: Role::Admin,
            ..Self::user(user_id, display_name)
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Tenant scope that owns this operator's books and batches.
    pub fn scope(&self) -> &UserId {
        &self.user_id
    }

    /// Admins and configured super-admin accounts read across tenants.
    pub fn sees_all_tenants(&self, config: &LedgerConfig) -> bool {
        if self.role == Role::Admin {
            return true;
        }
        self.email.as_deref().is_some_and(|email| {
            config
                .super_admin_emails
                .iter()
                .any(|admin| admin.eq_ignore_ascii_case(email))
        })
    }

    /// Whether a record owned by `owner` is visible to this operator.
    pub fn can_view(&self, owner: &UserId, config: &LedgerConfig) -> bool {
        owner == &self.user_id || self.sees_all_tenants(config)
    }
}
