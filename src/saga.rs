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

//! Step log and compensation for multi-write operations.
//!
//! Saving one breeding entry touches up to four documents in three
//! collections. Each write runs as a named step together with the action
//! that undoes it. When a step fails, the completed steps are undone in
//! reverse order and the caller gets [`LedgerError::PartialFailure`].
//!
//! ```text
//!  run(A) ─ok─► run(B) ─ok─► run(C) ─err─► undo(B) ─► undo(A) ─► PartialFailure
//! ```

use crate::error::LedgerError;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Individual writes performed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SagaStep {
    AutoNegative,
    PersistRecord,
    AdvanceReceipt,
    RestoreReceipt,
    DecrementStock,
    IncrementStock,
    UpdateRecord,
    DeleteRecord,
    RecordTreatment,
    UpdateTreatment,
    RecordCalving,
}

impl SagaStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoNegative => "auto-negative",
            Self::PersistRecord => "persist-record",
            Self::AdvanceReceipt => "advance-receipt",
            Self::RestoreReceipt => "restore-receipt",
            Self::DecrementStock => "decrement-stock",
            Self::IncrementStock => "increment-stock",
            Self::UpdateRecord => "update-record",
            Self::DeleteRecord => "delete-record",
            Self::RecordTreatment => "record-treatment",
            Self::UpdateTreatment => "update-treatment",
            Self::RecordCalving => "record-calving",
        }
    }
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepStatus {
    Done,
    /// Not needed for this operation (e.g. no active book to advance).
    Skipped,
    Failed(String),
    Compensated,
    CompensationFailed(String),
}

/// Outcome of every step of one operation, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SagaLog {
    pub operation: &'static str,
    pub steps: Vec<(SagaStep, StepStatus)>,
}

impl SagaLog {
    /// Latest status recorded for `step`.
    pub fn status(&self, step: SagaStep) -> Option<&StepStatus> {
        self.steps
            .iter()
            .rev()
            .find(|(s, _)| *s == step)
            .map(|(_, status)| status)
    }

    pub fn succeeded(&self) -> bool {
        self.steps
            .iter()
            .all(|(_, status)| matches!(status, StepStatus::Done | StepStatus::Skipped))
    }
}

type Undo<'a> = Box<dyn FnOnce() -> Result<(), LedgerError> + 'a>;

/// Runs steps and remembers how to undo them.
pub struct Saga<'a> {
    log: SagaLog,
    undo: Vec<(SagaStep, Undo<'a>)>,
}

impl<'a> Saga<'a> {
    pub fn new(operation: &'static str) -> Self {
        Self {
            log: SagaLog {
                operation,
                steps: Vec::new(),
            },
            undo: Vec::new(),
        }
    }

    /// Runs `action`. On success `undo` is kept for compensation and will
    /// receive a copy of the action's output.
    ///
    /// # Errors
    ///
    /// If nothing has been written yet, the step's own error. Otherwise
    /// [`LedgerError::PartialFailure`] after compensating earlier steps.
    pub fn run<R: Clone + 'a>(
        &mut self,
        step: SagaStep,
        action: impl FnOnce() -> Result<R, LedgerError>,
        undo: impl FnOnce(R) -> Result<(), LedgerError> + 'a,
    ) -> Result<R, LedgerError> {
        match action() {
            Ok(value) => {
                debug!(operation = self.log.operation, %step, "step done");
                self.log.steps.push((step, StepStatus::Done));
                let output = value.clone();
                self.undo.push((step, Box::new(move || undo(output))));
                Ok(value)
            }
            Err(error) => Err(self.abort(step, error)),
        }
    }

    /// Runs a step that needs no compensation (the last write, or a no-op).
    pub fn run_final<R: Clone + 'a>(
        &mut self,
        step: SagaStep,
        action: impl FnOnce() -> Result<R, LedgerError>,
    ) -> Result<R, LedgerError> {
        self.run(step, action, |_| Ok(()))
    }

    pub fn skip(&mut self, step: SagaStep) {
        debug!(operation = self.log.operation, %step, "step skipped");
        self.log.steps.push((step, StepStatus::Skipped));
    }

    /// Marks `step` failed and undoes everything done so far.
    fn abort(&mut self, step: SagaStep, error: LedgerError) -> LedgerError {
        self.log.steps.push((step, StepStatus::Failed(error.to_string())));
        if self.undo.is_empty() {
            return error;
        }

        warn!(operation = self.log.operation, %step, %error, "step failed, compensating");
        while let Some((done, undo)) = self.undo.pop() {
            let status = match undo() {
                Ok(()) => StepStatus::Compensated,
                Err(undo_error) => {
                    warn!(
                        operation = self.log.operation,
                        step = %done,
                        error = %undo_error,
                        "compensation failed"
                    );
                    StepStatus::CompensationFailed(undo_error.to_string())
                }
            };
            self.log.steps.push((done, status));
        }

        LedgerError::PartialFailure {
            step,
            reason: error.to_string(),
        }
    }

    pub fn finish(self) -> SagaLog {
        self.log
    }
}
