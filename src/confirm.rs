// src/confirm.rs

//! Confirm-before-destructive-action boundary.
//!
//! Destructive job operations take a [`Confirmed`] token. The only ways to
//! obtain one are a force flag or a positive answer from a [`Prompter`], so
//! the job view itself never deals with interactivity.

use std::io::{self, BufRead, Write};

use crate::errors::{EvalflowError, Result};

/// Proof that a destructive operation was confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmed(());

impl Confirmed {
    /// Confirmation granted by a force flag.
    pub fn forced() -> Self {
        Confirmed(())
    }
}

/// Source of yes/no answers.
pub trait Prompter {
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Ask on stderr, read the answer from stdin. Anything but `y`/`yes` is a no.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        let mut stderr = io::stderr();
        write!(stderr, "{question} [y/N]: ")?;
        stderr.flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

/// Prompter with a fixed answer, for non-interactive callers.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Prompter for FixedAnswer {
    fn confirm(&mut self, _question: &str) -> Result<bool> {
        Ok(self.0)
    }
}

/// Obtain confirmation for `action` on `job`.
///
/// `force` skips the prompt. A declined prompt fails with `Aborted` and no
/// state change has happened.
pub fn require(prompter: &mut dyn Prompter, action: &str, job: &str, force: bool) -> Result<Confirmed> {
    if force {
        return Ok(Confirmed::forced());
    }
    if prompter.confirm(&format!("continue to {action} job {job}?"))? {
        Ok(Confirmed(()))
    } else {
        Err(EvalflowError::Aborted(format!("{action} of job {job}")))
    }
}
