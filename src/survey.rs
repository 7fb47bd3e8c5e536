mod answer;
mod id;
mod poll;
mod question;
mod submission;
mod user;

use std::ops::RangeInclusive;

pub use answer::{Answer, AnswerContent, ValidatedAnswer};
pub use id::Id;
pub use poll::{CreatePoll, Poll, UnvalidatedCreatePoll, UnvalidatedUpdatePoll, UpdatePoll};
pub use question::{Choice, CreateQuestion, NewChoice, Question, QuestionKind, Shape, UnvalidatedQuestion};
pub use submission::{AnswerGateway, NewSubmission, UnvalidatedSubmission};
pub use user::Caller;

use crate::error::{self, ValidationError};

/// Trim `raw` and check its length in characters against `limits`.
fn bounded_text(
    field: &str,
    subject: &str,
    raw: &str,
    limits: RangeInclusive<usize>,
) -> Result<String, ValidationError> {
    let text = raw.trim();
    let len = text.chars().count();
    if !limits.contains(&len) {
        return Err(error::text_invalid_size(field, subject, limits, len));
    }
    Ok(String::from(text))
}
