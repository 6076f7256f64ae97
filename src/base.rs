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

//! Core identifier types and the closed vocabularies shared by every record.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Tenant (field veterinarian) that owns books, batches and breeding records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! document_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Allocates a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

document_id!(
    /// Identifier of a receipt book.
    BookId
);
document_id!(
    /// Identifier of a semen batch (a "bull" in the stock register).
    BullId
);
document_id!(
    /// Identifier of a DEBIT (discard) transaction against a batch.
    DebitId
);
document_id!(
    /// Identifier of a breeding (A.I.) record.
    BreedingId
);
document_id!(
    /// Identifier of a treatment-collection record (P.D., abortion).
    TreatmentId
);
document_id!(
    /// Identifier of a calving event.
    CalvingId
);

/// Semen type. Each type has its own receipt-book series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum SemenType {
    Conventional,
    Sexed,
}

impl SemenType {
    pub const ALL: [SemenType; 2] = [SemenType::Conventional, SemenType::Sexed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conventional => "Conventional",
            Self::Sexed => "Sexed",
        }
    }
}

impl fmt::Display for SemenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SemenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conventional" => Ok(Self::Conventional),
            "sexed" => Ok(Self::Sexed),
            other => Err(format!("unknown semen type '{other}'")),
        }
    }
}

/// Species ("jati") of the animal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Jati {
    Cow,
    Buffalo,
}

impl Jati {
    /// Breed value that accepts any bull of the species.
    pub fn non_descript_breed(&self) -> &'static str {
        match self {
            Self::Cow => "N.D.",
            Self::Buffalo => "N.D. BUFFALO",
        }
    }
}

impl fmt::Display for Jati {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cow => f.write_str("Cow"),
            Self::Buffalo => f.write_str("Buffalo"),
        }
    }
}

impl std::str::FromStr for Jati {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cow" => Ok(Self::Cow),
            "buffalo" => Ok(Self::Buffalo),
            other => Err(format!("unknown jati '{other}'")),
        }
    }
}
