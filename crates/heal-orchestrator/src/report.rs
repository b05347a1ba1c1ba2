use std::fmt;

use crate::model::HealingSession;

/// Human-readable rendering of a session snapshot.
pub struct HealingReport<'a> {
    session: &'a HealingSession,
}

impl<'a> HealingReport<'a> {
    pub fn new(session: &'a HealingSession) -> Self {
        Self { session }
    }
}

impl fmt::Display for HealingReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.session;
        writeln!(f, "Healing session {}", s.session_id)?;
        writeln!(f, "Status: {}", s.status.as_str())?;
        writeln!(f, "Test: {}::{}", s.failure.test_file, s.failure.test_case)?;
        writeln!(f, "Failure: {}", s.failure.failure_type.as_str())?;
        writeln!(f, "Original locator: {}", s.failure.original_locator)?;
        if let Some(locator) = &s.successful_locator {
            writeln!(
                f,
                "Healed locator: {locator} (confidence {:.2})",
                s.confidence_score
            )?;
        }
        if let Some(error) = &s.error_message {
            writeln!(f, "Error: {error}")?;
        }
        if let Some(update) = &s.update {
            match (&update.backup_path, &update.error_message) {
                (_, Some(error)) => writeln!(f, "Code update: failed ({error})")?,
                (Some(backup), None) => writeln!(f, "Code update: applied (backup {backup})")?,
                (None, None) => writeln!(f, "Code update: applied")?,
            }
        }
        writeln!(f, "Duration: {:.3}s", s.duration_seconds())?;

        if !s.timings.is_empty() {
            writeln!(f, "Phase timings:")?;
            for timing in &s.timings {
                writeln!(f, "  {}: {:.3}s", timing.phase.as_str(), timing.seconds)?;
            }
        }
        if !s.candidates.is_empty() {
            writeln!(f, "Candidates ({}):", s.candidates.len())?;
            for candidate in &s.candidates {
                writeln!(
                    f,
                    "  {}. {} [{}] confidence {:.2} stability {:.2}",
                    candidate.priority,
                    candidate.locator,
                    candidate.source.as_str(),
                    candidate.confidence,
                    candidate.stability_score
                )?;
            }
        }
        writeln!(f, "Attempts ({}):", s.attempts.len())?;
        for attempt in &s.attempts {
            let mark = if attempt.success { "ok" } else { "fail" };
            write!(
                f,
                "  [{mark}] {} confidence {:.2} in {:.3}s",
                attempt.locator, attempt.confidence_score, attempt.execution_time_seconds
            )?;
            if let Some(error) = &attempt.error_message {
                write!(f, ": {error}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
