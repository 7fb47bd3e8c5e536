use std::fmt::{self, Display, Formatter};
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

use super::bounded_text;
use super::id::Id;
use crate::error::{self, ValidationError};

pub const TEXT_LIMITS: RangeInclusive<usize> = 1..=4096;
pub const MIN_CHOICES: usize = 2;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    Text,
    OneChoice,
    MultipleChoices,
}

impl QuestionKind {
    pub const ALL: [QuestionKind; 3] = [QuestionKind::Text, QuestionKind::OneChoice, QuestionKind::MultipleChoices];

    pub const fn as_str(self) -> &'static str {
        match self {
            QuestionKind::Text => "TEXT",
            QuestionKind::OneChoice => "ONE_CHOICE",
            QuestionKind::MultipleChoices => "MULTIPLE_CHOICES",
        }
    }

    /// One-letter storage code, guarded by a CHECK constraint in the database.
    pub const fn code(self) -> &'static str {
        match self {
            QuestionKind::Text => "T",
            QuestionKind::OneChoice => "C",
            QuestionKind::MultipleChoices => "M",
        }
    }

    pub fn from_code(code: &str) -> Option<QuestionKind> {
        QuestionKind::ALL.into_iter().find(|k| k.code() == code)
    }
}

impl Display for QuestionKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QuestionKind {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        QuestionKind::ALL.into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s) || k.code() == s)
            .ok_or_else(|| error::question_type_invalid(s))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub id: Id,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewChoice {
    pub text: String,
}

impl NewChoice {
    pub fn new(text: &str) -> NewChoice {
        NewChoice { text: String::from(text) }
    }
}

/// What a question accepts as an answer. Only the choice variants carry choices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Shape<C> {
    Text,
    OneChoice { choices: Vec<C> },
    MultipleChoices { choices: Vec<C> },
}

impl<C> Shape<C> {
    /// Pair `kind` with `choices` without checking the count. Text drops its choices.
    pub fn assemble(kind: QuestionKind, choices: Vec<C>) -> Shape<C> {
        match kind {
            QuestionKind::Text => Shape::Text,
            QuestionKind::OneChoice => Shape::OneChoice { choices },
            QuestionKind::MultipleChoices => Shape::MultipleChoices { choices },
        }
    }

    pub fn validated(kind: QuestionKind, choices: Vec<C>) -> Result<Shape<C>, ValidationError> {
        match kind {
            QuestionKind::Text if !choices.is_empty() => {
                Err(error::question_choices_not_allowed(kind, choices.len()))
            },
            QuestionKind::OneChoice | QuestionKind::MultipleChoices if choices.len() < MIN_CHOICES => {
                Err(error::question_choices_too_few(kind, MIN_CHOICES, choices.len()))
            },
            _ => Ok(Shape::assemble(kind, choices)),
        }
    }

    pub fn kind(&self) -> QuestionKind {
        match self {
            Shape::Text => QuestionKind::Text,
            Shape::OneChoice { .. } => QuestionKind::OneChoice,
            Shape::MultipleChoices { .. } => QuestionKind::MultipleChoices,
        }
    }

    pub fn choices(&self) -> &[C] {
        match self {
            Shape::Text => &[],
            Shape::OneChoice { choices } | Shape::MultipleChoices { choices } => choices.as_slice(),
        }
    }

    pub fn into_choices(self) -> Vec<C> {
        match self {
            Shape::Text => vec![],
            Shape::OneChoice { choices } | Shape::MultipleChoices { choices } => choices,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Id,
    pub poll_id: Id,
    pub text: String,
    #[serde(flatten)]
    pub shape: Shape<Choice>,
}

impl Question {
    pub fn kind(&self) -> QuestionKind {
        self.shape.kind()
    }

    pub fn owns_choice(&self, choice_id: &Id) -> bool {
        self.shape.choices().iter().any(|c| c.id == *choice_id)
    }
}

/// Question as received from a client; `type` stays a raw string until validated.
#[derive(Clone, Debug, Deserialize)]
pub struct UnvalidatedQuestion {
    pub poll_id: Id,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub choices: Vec<NewChoice>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateQuestion {
    pub poll_id: Id,
    pub text: String,
    pub shape: Shape<NewChoice>,
}

impl TryFrom<UnvalidatedQuestion> for CreateQuestion {
    type Error = ValidationError;
    fn try_from(value: UnvalidatedQuestion) -> Result<Self, Self::Error> {
        let UnvalidatedQuestion { poll_id, text, kind, choices } = value;

        let mut errors = ValidationError::default();
        let text = errors.collect(bounded_text("text", "question text", &text, TEXT_LIMITS));
        let kind = errors.collect(kind.parse::<QuestionKind>());

        let shape = kind.and_then(|kind| errors.collect(Shape::validated(kind, choices)));
        let shape = shape.map(|shape| {
            let kind = shape.kind();
            let mut trimmed = Vec::with_capacity(shape.choices().len());
            for (i, choice) in shape.into_choices().into_iter().enumerate() {
                let field = format!("choices[{i}].text");
                if let Some(text) = errors.collect(bounded_text(&field, "choice text", &choice.text, TEXT_LIMITS)) {
                    trimmed.push(NewChoice { text });
                }
            }
            Shape::assemble(kind, trimmed)
        });

        match (text, shape) {
            (Some(text), Some(shape)) if errors.is_empty() => Ok(CreateQuestion { poll_id, text, shape }),
            _ => Err(errors),
        }
    }
}
