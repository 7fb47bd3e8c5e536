use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::store::StoreError;
use crate::survey::{self, Id, QuestionKind, Shape};
use super::schema;

#[derive(Identifiable, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::polls)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Poll {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub created: NaiveDateTime,
    pub start_date: NaiveDate,
    pub finish_date: NaiveDate,
}

impl Poll {
    pub fn into_domain(self, questions: Vec<survey::Question>) -> survey::Poll {
        let Self { id, title, description, created, start_date, finish_date } = self;
        survey::Poll {
            id: Id(id),
            title,
            description,
            created: created.and_utc(),
            start_date,
            finish_date,
            questions,
        }
    }
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = schema::polls)]
pub struct UpdatePoll {
    pub title: Option<String>,
    pub description: Option<String>,
    pub finish_date: Option<NaiveDate>,
}

impl From<survey::UpdatePoll> for UpdatePoll {
    fn from(survey::UpdatePoll { title, description, finish_date }: survey::UpdatePoll) -> Self {
        Self { title, description, finish_date }
    }
}

#[derive(Associations, Identifiable, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::questions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(Poll))]
pub struct Question {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub text: String,
    pub kind: String,
    pub created: NaiveDateTime,
}

impl TryFrom<(Question, Vec<Choice>)> for survey::Question {
    type Error = StoreError;
    fn try_from((question, choices): (Question, Vec<Choice>)) -> Result<Self, Self::Error> {
        let Question { id, poll_id, text, kind, .. } = question;

        // re-check the stored type code, the CHECK constraint could have been dropped
        let kind = QuestionKind::from_code(&kind).ok_or_else(|| {
            StoreError::InvalidRecord(format!("question {id} has unknown type code {kind:?}"))
        })?;
        if kind == QuestionKind::Text && !choices.is_empty() {
            return Err(StoreError::InvalidRecord(format!("text question {id} has {} choices", choices.len())));
        }

        Ok(survey::Question {
            id: Id(id),
            poll_id: Id(poll_id),
            text,
            shape: Shape::assemble(kind, choices.into_iter().map(survey::Choice::from).collect()),
        })
    }
}

#[derive(Associations, Identifiable, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::choices)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(Question))]
pub struct Choice {
    pub id: Uuid,
    pub question_id: Uuid,
    pub position: i32,
    pub text: String,
}

impl From<Choice> for survey::Choice {
    fn from(choice: Choice) -> Self {
        survey::Choice {
            id: Id(choice.id),
            text: choice.text,
        }
    }
}

#[derive(Associations, Identifiable, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::answer_gateways)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(Poll))]
pub struct AnswerGateway {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub user_id: Option<Uuid>,
    pub created: NaiveDateTime,
}

impl AnswerGateway {
    pub fn into_domain(self, answers: Vec<survey::Answer>) -> survey::AnswerGateway {
        survey::AnswerGateway {
            id: Id(self.id),
            poll_id: Id(self.poll_id),
            user_id: self.user_id.map(Id),
            created: self.created.and_utc(),
            answers,
        }
    }
}

#[derive(Associations, Identifiable, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::answers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(AnswerGateway))]
pub struct Answer {
    pub id: Uuid,
    pub answer_gateway_id: Uuid,
    pub question_id: Uuid,
    pub position: i32,
    pub value: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = schema::answer_choices)]
pub struct AnswerChoice {
    pub answer_id: Uuid,
    pub choice_id: Uuid,
}
