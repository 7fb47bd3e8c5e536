mod memory;

pub use memory::MemoryStore;

use thiserror::Error;

use crate::access::PollScope;
use crate::survey::{
    AnswerContent, AnswerGateway, CreatePoll, CreateQuestion, Id, NewSubmission, Poll, Question, Shape,
    UpdatePoll, ValidatedAnswer,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{subject} {id} not found")]
    NotFound { subject: &'static str, id: Id },

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("invalid stored record: {0}")]
    InvalidRecord(String),

    #[error("in-memory store lock poisoned")]
    Poisoned,
}

pub fn poll_in_use(id: &Id) -> StoreError {
    StoreError::Conflict(format!("poll {id} still has questions or answers"))
}

pub fn question_answered(id: &Id) -> StoreError {
    StoreError::Conflict(format!("question {id} already has recorded answers"))
}

pub fn question_changed(id: &Id) -> StoreError {
    StoreError::Conflict(format!("question {id} changed while the submission was checked, resubmit"))
}

/// Re-check `answer` against `question` as stored at write time. Validation may have
/// seen an older version of the question.
pub fn ensure_current(answer: &ValidatedAnswer, question: &Question, poll_id: &Id) -> Result<(), StoreError> {
    let same_kind = matches!(
        (&answer.content, &question.shape),
        (AnswerContent::Text(_), Shape::Text)
            | (AnswerContent::Choices(_), Shape::OneChoice { .. } | Shape::MultipleChoices { .. })
    );
    let owned = answer.choice_ids().iter().all(|id| question.owns_choice(id));
    if question.poll_id != *poll_id || !same_kind || !owned {
        return Err(question_changed(&question.id));
    }
    Ok(())
}

/// Persistence for polls, questions and submissions.
///
/// Every method is one unit of work. Methods writing several rows (a question with its
/// choices, a submission with its answers and choice links) commit all of them or none.
pub trait Store: Send + Sync {
    fn list_polls(&self, scope: PollScope) -> Result<Vec<Poll>, StoreError>;
    fn get_poll(&self, id: &Id) -> Result<Poll, StoreError>;
    fn create_poll(&self, poll: CreatePoll) -> Result<Poll, StoreError>;
    fn update_poll(&self, id: &Id, update: UpdatePoll) -> Result<Poll, StoreError>;
    /// Refused with a conflict while questions or submissions reference the poll.
    fn delete_poll(&self, id: &Id) -> Result<(), StoreError>;

    fn list_questions(&self, poll_id: Option<Id>) -> Result<Vec<Question>, StoreError>;
    fn get_question(&self, id: &Id) -> Result<Question, StoreError>;
    fn create_question(&self, question: CreateQuestion) -> Result<Question, StoreError>;
    /// Overwrite a question and swap its whole choice set for `question`'s choices.
    /// Old choices are deleted, never diffed. Refused once the question has answers.
    fn replace_question(&self, id: &Id, question: CreateQuestion) -> Result<Question, StoreError>;
    /// Deletes the question's choices with it. Refused once the question has answers.
    fn delete_question(&self, id: &Id) -> Result<(), StoreError>;

    fn create_submission(&self, submission: NewSubmission) -> Result<AnswerGateway, StoreError>;
    /// All submissions, or only those recorded for `owner`.
    fn list_submissions(&self, owner: Option<Id>) -> Result<Vec<AnswerGateway>, StoreError>;
    fn get_submission(&self, id: &Id) -> Result<AnswerGateway, StoreError>;
}
