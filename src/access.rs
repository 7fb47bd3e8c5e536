//! Who may see and change what.
//!
//! Administrators (superusers) may do anything. Everyone else gets read access to
//! polls running today and to questions, may submit answers, and may read back only
//! the submissions recorded under their own user id.

use chrono::NaiveDate;

use crate::error::{self, ApiError};
use crate::survey::{AnswerGateway, Caller, Id, Poll};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PollScope {
    All,
    ActiveOn(NaiveDate),
}

impl PollScope {
    pub fn for_caller(caller: &Caller, today: NaiveDate) -> PollScope {
        if caller.is_superuser() {
            PollScope::All
        } else {
            PollScope::ActiveOn(today)
        }
    }

    pub fn allows(&self, poll: &Poll) -> bool {
        match self {
            PollScope::All => true,
            PollScope::ActiveOn(today) => poll.is_active(*today),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SubmissionScope {
    All,
    OwnedBy(Id),
    Nothing,
}

impl SubmissionScope {
    /// Narrow the caller's visibility by an optional `?user=` filter.
    pub fn for_caller(caller: &Caller, requested_user: Option<Id>) -> SubmissionScope {
        match (caller.0, requested_user) {
            (Some(user), requested) if user.is_superuser => {
                requested.map(SubmissionScope::OwnedBy).unwrap_or(SubmissionScope::All)
            },
            (Some(user), Some(requested)) if requested != user.id => SubmissionScope::Nothing,
            (Some(user), _) => SubmissionScope::OwnedBy(user.id),
            (None, _) => SubmissionScope::Nothing,
        }
    }

    pub fn allows(&self, gateway: &AnswerGateway) -> bool {
        match self {
            SubmissionScope::All => true,
            SubmissionScope::OwnedBy(id) => gateway.user_id == Some(*id),
            SubmissionScope::Nothing => false,
        }
    }
}

pub fn require_admin(caller: &Caller, action: &str) -> Result<(), ApiError> {
    if caller.is_superuser() {
        Ok(())
    } else {
        Err(error::admin_only(action))
    }
}
