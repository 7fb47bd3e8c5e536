use std::ops::RangeInclusive;

use serde::{Serialize, Deserialize};

use super::bounded_text;
use super::id::Id;
use super::question::{Choice, Question, Shape};
use crate::error::{self, ValidationError};

pub const VALUE_LIMITS: RangeInclusive<usize> = 1..=4096;

/// One recorded answer, with its choices resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: Id,
    pub question_id: Id,
    pub value: Option<String>,
    pub choices: Vec<Choice>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UnvalidatedAnswer {
    pub question_id: Id,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub choice_ids: Option<Vec<Id>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnswerContent {
    Text(String),
    Choices(Vec<Id>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedAnswer {
    pub question_id: Id,
    pub content: AnswerContent,
}

impl ValidatedAnswer {
    /// Check `answer` against the persisted `question` it targets.
    ///
    /// Text questions need a non-blank value and ignore any choices. Choice questions
    /// ignore the value and need choices owned by `question`; the first foreign choice
    /// fails the whole answer.
    pub fn validate(answer: UnvalidatedAnswer, question: &Question) -> Result<ValidatedAnswer, ValidationError> {
        let UnvalidatedAnswer { question_id, value, choice_ids } = answer;
        let kind = question.kind();

        let content = match &question.shape {
            Shape::Text => {
                let value = value.unwrap_or_default();
                if value.trim().is_empty() {
                    return Err(error::answer_value_required());
                }
                AnswerContent::Text(bounded_text("value", "answer value", &value, VALUE_LIMITS)?)
            },
            Shape::OneChoice { .. } | Shape::MultipleChoices { .. } => {
                let choice_ids = choice_ids.unwrap_or_default();
                if choice_ids.is_empty() {
                    return Err(error::answer_choices_required(kind));
                }

                if let Some(foreign) = choice_ids.iter().find(|id| !question.owns_choice(id)) {
                    return Err(error::answer_choice_not_owned(foreign, &question.id));
                }

                match question.shape {
                    Shape::OneChoice { .. } if choice_ids.len() != 1 => {
                        return Err(error::answer_exactly_one_choice(choice_ids.len()));
                    },
                    Shape::MultipleChoices { .. } if choice_ids.is_empty() => {
                        return Err(error::answer_at_least_one_choice());
                    },
                    _ => {},
                }

                // choices are a set
                let mut unique: Vec<Id> = Vec::with_capacity(choice_ids.len());
                for id in choice_ids {
                    if !unique.contains(&id) {
                        unique.push(id);
                    }
                }
                AnswerContent::Choices(unique)
            },
        };

        Ok(ValidatedAnswer { question_id, content })
    }

    pub fn value(&self) -> Option<&str> {
        match &self.content {
            AnswerContent::Text(value) => Some(value),
            AnswerContent::Choices(_) => None,
        }
    }

    pub fn choice_ids(&self) -> &[Id] {
        match &self.content {
            AnswerContent::Text(_) => &[],
            AnswerContent::Choices(ids) => ids.as_slice(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(text: &str) -> Choice {
        Choice { id: Id::new(), text: String::from(text) }
    }

    fn question(shape: Shape<Choice>) -> Question {
        Question {
            id: Id::new(),
            poll_id: Id::new(),
            text: String::from("Favourite colour?"),
            shape,
        }
    }

    fn answer(question: &Question, value: Option<&str>, choice_ids: &[Id]) -> UnvalidatedAnswer {
        UnvalidatedAnswer {
            question_id: question.id,
            value: value.map(String::from),
            choice_ids: Some(choice_ids.to_vec()),
        }
    }

    #[test]
    fn text_requires_value() {
        let q = question(Shape::Text);

        for value in [None, Some(""), Some("   ")] {
            let err = ValidatedAnswer::validate(answer(&q, value, &[]), &q).unwrap_err();
            assert!(err.messages("value")[0].contains("value required"));
        }

        let ok = ValidatedAnswer::validate(answer(&q, Some(" hello "), &[]), &q).unwrap();
        assert_eq!(ok.value(), Some("hello"));
    }

    #[test]
    fn text_ignores_choices() {
        let q = question(Shape::Text);
        let stray = Id::new();
        let ok = ValidatedAnswer::validate(answer(&q, Some("hello"), &[stray]), &q).unwrap();
        assert!(ok.choice_ids().is_empty());
    }

    #[test]
    fn text_value_length_bounded() {
        let q = question(Shape::Text);
        let long = "x".repeat(VALUE_LIMITS.end() + 1);
        let err = ValidatedAnswer::validate(answer(&q, Some(&long), &[]), &q).unwrap_err();
        assert_eq!(err.messages("value").len(), 1);
    }

    #[test]
    fn one_choice_needs_exactly_one() {
        let (red, blue) = (choice("Red"), choice("Blue"));
        let q = question(Shape::OneChoice { choices: vec![red.clone(), blue.clone()] });

        let err = ValidatedAnswer::validate(answer(&q, None, &[]), &q).unwrap_err();
        assert!(err.messages("choice_ids")[0].contains("choices required"));

        let err = ValidatedAnswer::validate(answer(&q, None, &[red.id, blue.id]), &q).unwrap_err();
        assert!(err.messages("choice_ids")[0].contains("exactly one choice required"));

        let ok = ValidatedAnswer::validate(answer(&q, None, &[red.id]), &q).unwrap();
        assert_eq!(ok.choice_ids(), &[red.id]);
    }

    #[test]
    fn one_choice_duplicate_counts_twice() {
        let red = choice("Red");
        let q = question(Shape::OneChoice { choices: vec![red.clone(), choice("Blue")] });

        let err = ValidatedAnswer::validate(answer(&q, None, &[red.id, red.id]), &q).unwrap_err();
        assert!(err.messages("choice_ids")[0].contains("exactly one choice required"));
    }

    #[test]
    fn multiple_choices_accepts_subset() {
        let (red, green) = (choice("Red"), choice("Green"));
        let q = question(Shape::MultipleChoices { choices: vec![red.clone(), choice("Blue"), green.clone()] });

        let ok = ValidatedAnswer::validate(answer(&q, Some("ignored"), &[green.id, red.id, green.id]), &q).unwrap();
        assert_eq!(ok.choice_ids(), &[green.id, red.id]);
        assert_eq!(ok.value(), None);

        let err = ValidatedAnswer::validate(answer(&q, None, &[]), &q).unwrap_err();
        assert!(err.messages("choice_ids")[0].contains("choices required"));
    }

    #[test]
    fn null_choice_ids_treated_as_empty() {
        let q = question(Shape::MultipleChoices { choices: vec![choice("Red"), choice("Blue")] });
        let input: UnvalidatedAnswer = serde_json::from_value(serde_json::json!({
            "question_id": q.id,
            "choice_ids": null,
        })).unwrap();

        assert!(ValidatedAnswer::validate(input, &q).is_err());
    }

    #[test]
    fn foreign_choice_rejected_with_offending_id() {
        let (red, blue) = (choice("Red"), choice("Blue"));
        let other = question(Shape::OneChoice { choices: vec![choice("Yes"), choice("No")] });
        let foreign = other.shape.choices()[0].id;

        let q = question(Shape::MultipleChoices { choices: vec![red.clone(), blue.clone()] });
        for ids in [vec![foreign], vec![red.id, foreign], vec![red.id, blue.id, foreign]] {
            let err = ValidatedAnswer::validate(answer(&q, None, &ids), &q).unwrap_err();
            let message = &err.messages("choice_ids")[0];
            assert!(message.contains("choice does not belong to this question"));
            assert!(message.contains(&foreign.to_string()));
        }

        // ownership is checked before the count
        let q = question(Shape::OneChoice { choices: vec![red.clone(), blue] });
        let err = ValidatedAnswer::validate(answer(&q, None, &[red.id, foreign]), &q).unwrap_err();
        assert!(err.messages("choice_ids")[0].contains("does not belong"));
    }

    #[test]
    fn red_blue_scenario() {
        let (red, blue) = (choice("Red"), choice("Blue"));
        let q = question(Shape::OneChoice { choices: vec![red.clone(), blue.clone()] });

        assert!(ValidatedAnswer::validate(answer(&q, None, &[red.id]), &q).is_ok());

        let err = ValidatedAnswer::validate(answer(&q, None, &[red.id, blue.id]), &q).unwrap_err();
        assert!(err.messages("choice_ids")[0].starts_with("exactly one choice required"));
    }
}
