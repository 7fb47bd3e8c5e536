use std::ops::RangeInclusive;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Deserialize};

use super::bounded_text;
use super::id::Id;
use super::question::Question;
use crate::error::{self, ValidationError};

pub const TITLE_LIMITS: RangeInclusive<usize> = 1..=1024;
pub const DESCRIPTION_LIMITS: RangeInclusive<usize> = 1..=8192;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub created: DateTime<Utc>,
    pub start_date: NaiveDate,
    pub finish_date: NaiveDate,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Poll {
    /// Whether `today` falls inside the inclusive `[start_date, finish_date]` window.
    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.start_date <= today && today <= self.finish_date
    }
}

/// Poll fields as received from a client.
#[derive(Clone, Debug, Deserialize)]
pub struct UnvalidatedCreatePoll {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_date: NaiveDate,
    pub finish_date: NaiveDate,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreatePoll {
    pub title: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub finish_date: NaiveDate,
}

impl TryFrom<UnvalidatedCreatePoll> for CreatePoll {
    type Error = ValidationError;
    fn try_from(value: UnvalidatedCreatePoll) -> Result<Self, Self::Error> {
        let UnvalidatedCreatePoll { title, description, start_date, finish_date } = value;

        let mut errors = ValidationError::default();
        let title = errors.collect(bounded_text("title", "poll title", &title, TITLE_LIMITS));
        let description = errors.collect(
            bounded_text("description", "poll description", &description, DESCRIPTION_LIMITS));
        errors.collect(check_window(start_date, finish_date));

        match (title, description) {
            (Some(title), Some(description)) if errors.is_empty() => Ok(CreatePoll {
                title,
                description,
                start_date,
                finish_date,
            }),
            _ => Err(errors),
        }
    }
}

/// Partial poll update. There is deliberately no `start_date`: it is fixed at creation,
/// and a client-supplied one is dropped during deserialization.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UnvalidatedUpdatePoll {
    pub title: Option<String>,
    pub description: Option<String>,
    pub finish_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdatePoll {
    pub title: Option<String>,
    pub description: Option<String>,
    pub finish_date: Option<NaiveDate>,
}

impl UpdatePoll {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.finish_date.is_none()
    }
}

impl TryFrom<(UnvalidatedUpdatePoll, &Poll)> for UpdatePoll {
    type Error = ValidationError;
    fn try_from((update, current): (UnvalidatedUpdatePoll, &Poll)) -> Result<Self, Self::Error> {
        let UnvalidatedUpdatePoll { title, description, finish_date } = update;

        let mut errors = ValidationError::default();
        let title = title.and_then(|t| {
            errors.collect(bounded_text("title", "poll title", &t, TITLE_LIMITS))
        });
        let description = description.and_then(|d| {
            errors.collect(bounded_text("description", "poll description", &d, DESCRIPTION_LIMITS))
        });
        if let Some(finish_date) = finish_date {
            errors.collect(check_window(current.start_date, finish_date));
        }

        errors.into_result()?;
        Ok(UpdatePoll { title, description, finish_date })
    }
}

fn check_window(start_date: NaiveDate, finish_date: NaiveDate) -> Result<(), ValidationError> {
    if finish_date < start_date {
        return Err(error::poll_dates_inverted(start_date, finish_date));
    }
    Ok(())
}
