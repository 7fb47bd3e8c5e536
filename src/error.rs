use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::ops::RangeInclusive;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};

use crate::store::StoreError;
use crate::survey::{Id, QuestionKind};

/// Field-attributed validation failures, serialized as `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationError {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> ValidationError {
        let mut error = ValidationError::default();
        error.add(field, message);
        error
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_default().push(message.into());
    }

    pub fn merge(&mut self, other: ValidationError) {
        for (field, messages) in other.fields {
            self.fields.entry(field).or_default().extend(messages);
        }
    }

    /// Re-key every field under `prefix`, e.g. `value` becomes `answers[2].value`.
    pub fn nested(self, prefix: &str) -> ValidationError {
        ValidationError {
            fields: self.fields.into_iter()
                .map(|(field, messages)| (format!("{prefix}.{field}"), messages))
                .collect(),
        }
    }

    /// Stash the error of `result` into `self`, passing the success value through.
    pub fn collect<T>(&mut self, result: Result<T, ValidationError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.merge(err);
                None
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.fields
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let summary = self.fields.iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "Validation error: {summary}")
    }
}

impl std::error::Error for ValidationError {}

pub fn text_invalid_size(field: &str, subject: &str, limits: RangeInclusive<usize>, len: usize) -> ValidationError {
    ValidationError::new(
        field,
        format!("{subject} must be between {} and {} characters, got {len}", limits.start(), limits.end()),
    )
}

pub fn poll_dates_inverted(start: NaiveDate, finish: NaiveDate) -> ValidationError {
    ValidationError::new(
        "finish_date",
        format!("finish date must be after start date, got {start} to {finish}"),
    )
}

pub fn question_type_invalid(raw: &str) -> ValidationError {
    ValidationError::new("type", format!("\"{raw}\" is not a valid question type"))
}

pub fn question_choices_not_allowed(kind: QuestionKind, count: usize) -> ValidationError {
    ValidationError::new("choices", format!("choices not allowed for this type ({kind}), got {count}"))
}

pub fn question_choices_too_few(kind: QuestionKind, min: usize, count: usize) -> ValidationError {
    ValidationError::new("choices", format!("minimum {min} choices required for {kind}, got {count}"))
}

pub fn answer_value_required() -> ValidationError {
    ValidationError::new("value", "value required for text question")
}

pub fn answer_choices_required(kind: QuestionKind) -> ValidationError {
    ValidationError::new("choice_ids", format!("choices required for {kind} question"))
}

pub fn answer_choice_not_owned(choice_id: &Id, question_id: &Id) -> ValidationError {
    ValidationError::new(
        "choice_ids",
        format!("choice does not belong to this question: choice {choice_id}, question {question_id}"),
    )
}

pub fn answer_exactly_one_choice(count: usize) -> ValidationError {
    ValidationError::new("choice_ids", format!("exactly one choice required, got {count}"))
}

pub fn answer_at_least_one_choice() -> ValidationError {
    ValidationError::new("choice_ids", "at least one choice required")
}

pub fn submission_poll_inactive(poll_id: &Id, today: NaiveDate) -> ValidationError {
    ValidationError::new("poll_id", format!("poll {poll_id} is not open for submissions on {today}"))
}

pub fn submission_empty() -> ValidationError {
    ValidationError::new("answers", "at least one answer required")
}

pub fn submission_question_not_in_poll(question_id: &Id, poll_id: &Id) -> ValidationError {
    ValidationError::new("question_id", format!("question {question_id} does not belong to poll {poll_id}"))
}

pub fn submission_question_repeated(question_id: &Id, first_index: usize) -> ValidationError {
    ValidationError::new(
        "question_id",
        format!("question {question_id} was already answered at index {first_index}"),
    )
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("{subject} {id} not found")]
    NotFound { subject: &'static str, id: Id },

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Permission(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn admin_only(action: &str) -> ApiError {
    ApiError::Permission(format!("only administrators may {action}"))
}

pub fn not_found(subject: &'static str, id: Id) -> ApiError {
    ApiError::NotFound { subject, id }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { subject, id } => ApiError::NotFound { subject, id },
            StoreError::Conflict(message) => ApiError::Conflict(message),
            err => {
                tracing::error!("storage failure: {err}");
                ApiError::Internal(err.to_string())
            },
        }
    }
}

impl Reply for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        match self {
            ApiError::Validation(errors) => reply::with_status(reply::json(&errors), code).into_response(),
            // storage details stay in the log
            ApiError::Internal(_) => reply::with_status(
                reply::json(&json!({ "detail": "internal server error" })),
                code,
            ).into_response(),
            other => reply::with_status(
                reply::json(&json!({ "detail": other.to_string() })),
                code,
            ).into_response(),
        }
    }
}
