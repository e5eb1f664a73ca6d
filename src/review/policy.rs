//! Submission authorization.
//!
//! Whether an ingest may write a participant's report is decided here, as a
//! pure function of the submission's facts. Callers gather the facts from
//! the plan and the store; nothing in this module touches either.

use std::fmt;

/// Facts about one incoming submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission<'a> {
    pub participant: &'a str,
    /// The submitter marked this as an out-of-plan contribution.
    pub is_extra: bool,
    /// The participant is listed by the plan (or has a request artifact).
    pub in_plan: bool,
    /// A previous submission for this participant is already stored.
    pub artifact_exists: bool,
    /// The submitter asked to replace a previous submission.
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept { extra: bool, replaces: bool },
    Reject(Rejection),
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Unknown participant submitted without the extra flag.
    NotInPlan,
    /// The extra flag was used for a participant the plan already lists.
    ExtraShadowsPlanned,
    /// A submission exists and overwrite was not requested.
    AlreadySubmitted,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInPlan => write!(
                f,
                "participant is not part of the plan; pass --extra to submit an out-of-plan report"
            ),
            Self::ExtraShadowsPlanned => write!(
                f,
                "participant is already planned; submit without --extra"
            ),
            Self::AlreadySubmitted => write!(
                f,
                "a submission already exists; pass --overwrite to replace it"
            ),
        }
    }
}

pub fn authorize(submission: &Submission<'_>) -> Decision {
    match (submission.in_plan, submission.is_extra) {
        (false, false) => return Decision::Reject(Rejection::NotInPlan),
        (true, true) => return Decision::Reject(Rejection::ExtraShadowsPlanned),
        _ => {}
    }
    if submission.artifact_exists && !submission.overwrite {
        return Decision::Reject(Rejection::AlreadySubmitted);
    }
    Decision::Accept {
        extra: submission.is_extra,
        replaces: submission.artifact_exists,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(is_extra: bool, in_plan: bool, artifact_exists: bool, overwrite: bool) -> Submission<'static> {
        Submission {
            participant: "logic",
            is_extra,
            in_plan,
            artifact_exists,
            overwrite,
        }
    }

    #[test]
    fn test_first_planned_submission_accepted() {
        assert_eq!(
            authorize(&sub(false, true, false, false)),
            Decision::Accept {
                extra: false,
                replaces: false
            }
        );
    }

    #[test]
    fn test_resubmission_requires_overwrite() {
        assert_eq!(
            authorize(&sub(false, true, true, false)),
            Decision::Reject(Rejection::AlreadySubmitted)
        );
        assert_eq!(
            authorize(&sub(false, true, true, true)),
            Decision::Accept {
                extra: false,
                replaces: true
            }
        );
    }

    #[test]
    fn test_out_of_plan_needs_extra_flag() {
        assert_eq!(
            authorize(&sub(false, false, false, false)),
            Decision::Reject(Rejection::NotInPlan)
        );
        assert!(authorize(&sub(true, false, false, false)).is_accepted());
        // Overwrite protection applies to extras too
        assert_eq!(
            authorize(&sub(true, false, true, false)),
            Decision::Reject(Rejection::AlreadySubmitted)
        );
    }

    #[test]
    fn test_extra_flag_on_planned_participant_rejected() {
        assert_eq!(
            authorize(&sub(true, true, false, true)),
            Decision::Reject(Rejection::ExtraShadowsPlanned)
        );
    }

    #[test]
    fn test_rejection_messages_name_the_flag() {
        assert!(Rejection::NotInPlan.to_string().contains("--extra"));
        assert!(Rejection::AlreadySubmitted.to_string().contains("--overwrite"));
    }
}
