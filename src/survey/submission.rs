use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Deserialize};

use super::answer::{Answer, UnvalidatedAnswer, ValidatedAnswer};
use super::id::Id;
use super::poll::Poll;
use crate::error::{self, ValidationError};

/// One respondent's recorded submission for a poll. `user_id` is absent for anonymous respondents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnswerGateway {
    pub id: Id,
    pub poll_id: Id,
    pub user_id: Option<Id>,
    pub created: DateTime<Utc>,
    pub answers: Vec<Answer>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UnvalidatedSubmission {
    pub poll_id: Id,
    #[serde(default)]
    pub answers: Vec<UnvalidatedAnswer>,
}

/// A submission that passed validation and is ready to be written in one transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct NewSubmission {
    pub poll_id: Id,
    pub user_id: Option<Id>,
    pub answers: Vec<ValidatedAnswer>,
}

impl NewSubmission {
    /// Validate every answer of `submission` against the questions of `poll`.
    ///
    /// Errors from all answers are gathered under `answers[i].<field>`; any of them
    /// rejects the submission as a whole.
    pub fn validate(
        submission: UnvalidatedSubmission,
        poll: &Poll,
        user_id: Option<Id>,
        today: NaiveDate,
    ) -> Result<NewSubmission, ValidationError> {
        if !poll.is_active(today) {
            return Err(error::submission_poll_inactive(&poll.id, today));
        }
        if submission.answers.is_empty() {
            return Err(error::submission_empty());
        }

        let mut errors = ValidationError::default();
        let mut seen: HashMap<Id, usize> = HashMap::new();
        let mut answers = Vec::with_capacity(submission.answers.len());

        for (i, answer) in submission.answers.into_iter().enumerate() {
            let prefix = format!("answers[{i}]");

            if let Some(first) = seen.insert(answer.question_id, i) {
                errors.merge(error::submission_question_repeated(&answer.question_id, first).nested(&prefix));
                continue;
            }

            let question = match poll.questions.iter().find(|q| q.id == answer.question_id) {
                Some(q) => q,
                None => {
                    errors.merge(error::submission_question_not_in_poll(&answer.question_id, &poll.id).nested(&prefix));
                    continue;
                },
            };

            match ValidatedAnswer::validate(answer, question) {
                Ok(valid) => answers.push(valid),
                Err(err) => errors.merge(err.nested(&prefix)),
            }
        }

        errors.into_result()?;
        Ok(NewSubmission { poll_id: poll.id, user_id, answers })
    }
}
