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

//! Log subscriber setup for binaries.

use tracing_subscriber::EnvFilter;

/// Default directives for a verbosity level (`-v` count). Both the library
/// and the `breeding-ledger` binary targets are enabled.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "breeding_ledger_rs=info,breeding_ledger=info",
        1 => "breeding_ledger_rs=debug,breeding_ledger=debug",
        _ => "breeding_ledger_rs=trace,breeding_ledger=trace",
    }
}

/// Installs a fmt subscriber writing to stderr.
///
/// `RUST_LOG` wins over `verbosity` when set. Calling this twice is a no-op.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    // Err only if a global subscriber already exists
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
