pub mod models;
pub mod schema;

use chrono::{NaiveDateTime, SubsecRound, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;
use uuid::Uuid;

use crate::access::PollScope;
use crate::store::{self, Store, StoreError};
use crate::survey::{self, CreatePoll, CreateQuestion, Id, NewChoice, NewSubmission, UpdatePoll};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// PostgreSQL-backed store. Multi-row writes run inside one transaction.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn connect(database_url: &str, pool_size: u32) -> Result<PgStore, StoreError> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder().max_size(pool_size).build(manager)?;
        Ok(PgStore { pool })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        let mut pooled = self.pool.get()?;
        let connection: &mut PgConnection = &mut pooled;
        let applied = connection.run_pending_migrations(MIGRATIONS)
            .map_err(|err| StoreError::Migration(err.to_string()))?;
        info!("Applied {} pending migrations", applied.len());
        Ok(())
    }
}

/// Postgres keeps microseconds; returned records must match what a later read sees.
fn now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(6)
}

fn not_found(subject: &'static str, id: &Id) -> StoreError {
    StoreError::NotFound { subject, id: *id }
}

/// Check the poll exists and lock its row until the surrounding transaction ends.
fn ensure_poll(connection: &mut PgConnection, id: &Id) -> Result<(), StoreError> {
    schema::polls::table
        .find(id.0)
        .select(schema::polls::id)
        .for_update()
        .first::<Uuid>(connection)
        .optional()?
        .ok_or_else(|| not_found("poll", id))?;
    Ok(())
}

fn lock_question(connection: &mut PgConnection, id: &Id) -> Result<models::Question, StoreError> {
    schema::questions::table
        .find(id.0)
        .select(models::Question::as_select())
        .for_update()
        .first(connection)
        .optional()?
        .ok_or_else(|| not_found("question", id))
}

fn ensure_unanswered(connection: &mut PgConnection, id: &Id) -> Result<(), StoreError> {
    let answers: i64 = schema::answers::table
        .filter(schema::answers::question_id.eq(id.0))
        .count()
        .get_result(connection)?;
    if answers > 0 {
        return Err(store::question_answered(id));
    }
    Ok(())
}

/// Attach choices to questions, keeping the order of `db_questions`.
fn assemble_questions(
    connection: &mut PgConnection,
    db_questions: Vec<models::Question>,
) -> Result<Vec<survey::Question>, StoreError> {
    let db_choices: Vec<models::Choice> = models::Choice::belonging_to(&db_questions)
        .select(models::Choice::as_select())
        .order((schema::choices::question_id, schema::choices::position))
        .load(connection)?;

    let grouped = db_choices.grouped_by(&db_questions);
    db_questions.into_iter()
        .zip(grouped)
        .map(survey::Question::try_from)
        .collect()
}

fn assemble_polls(
    connection: &mut PgConnection,
    db_polls: Vec<models::Poll>,
) -> Result<Vec<survey::Poll>, StoreError> {
    let db_questions: Vec<models::Question> = models::Question::belonging_to(&db_polls)
        .select(models::Question::as_select())
        .order((schema::questions::created, schema::questions::id))
        .load(connection)?;
    let mut questions = assemble_questions(connection, db_questions)?;

    let mut polls = Vec::with_capacity(db_polls.len());
    for db_poll in db_polls {
        let (own, rest): (Vec<_>, Vec<_>) = questions.into_iter().partition(|q| q.poll_id == db_poll.id);
        questions = rest;
        polls.push(db_poll.into_domain(own));
    }
    Ok(polls)
}

fn assemble_submissions(
    connection: &mut PgConnection,
    db_gateways: Vec<models::AnswerGateway>,
) -> Result<Vec<survey::AnswerGateway>, StoreError> {
    let db_answers: Vec<models::Answer> = models::Answer::belonging_to(&db_gateways)
        .select(models::Answer::as_select())
        .order((schema::answers::answer_gateway_id, schema::answers::position))
        .load(connection)?;

    let answer_ids: Vec<Uuid> = db_answers.iter().map(|a| a.id).collect();
    let links: Vec<(Uuid, models::Choice)> = schema::answer_choices::table
        .inner_join(schema::choices::table)
        .filter(schema::answer_choices::answer_id.eq_any(answer_ids))
        .order((schema::choices::question_id, schema::choices::position))
        .select((schema::answer_choices::answer_id, models::Choice::as_select()))
        .load(connection)?;

    let grouped = db_answers.grouped_by(&db_gateways);
    let gateways = db_gateways.into_iter()
        .zip(grouped)
        .map(|(db_gateway, db_answers)| {
            let answers = db_answers.into_iter()
                .map(|db_answer| survey::Answer {
                    id: Id(db_answer.id),
                    question_id: Id(db_answer.question_id),
                    value: db_answer.value,
                    choices: links.iter()
                        .filter(|(answer_id, _)| *answer_id == db_answer.id)
                        .map(|(_, choice)| survey::Choice { id: Id(choice.id), text: choice.text.clone() })
                        .collect(),
                })
                .collect();
            db_gateway.into_domain(answers)
        })
        .collect();
    Ok(gateways)
}

fn insert_choices(
    connection: &mut PgConnection,
    question_id: Uuid,
    choices: Vec<NewChoice>,
) -> Result<Vec<models::Choice>, StoreError> {
    let db_choices: Vec<models::Choice> = choices.into_iter()
        .enumerate()
        .map(|(position, NewChoice { text })| models::Choice {
            id: Uuid::new_v4(),
            question_id,
            position: position as i32,
            text,
        })
        .collect();
    if !db_choices.is_empty() {
        diesel::insert_into(schema::choices::table)
            .values(&db_choices)
            .execute(connection)?;
    }
    Ok(db_choices)
}

impl Store for PgStore {
    fn list_polls(&self, scope: PollScope) -> Result<Vec<survey::Poll>, StoreError> {
        let mut pooled = self.pool.get()?;
        let connection: &mut PgConnection = &mut pooled;

        let mut query = schema::polls::table
            .select(models::Poll::as_select())
            .order((schema::polls::created, schema::polls::id))
            .into_boxed();
        if let PollScope::ActiveOn(today) = scope {
            query = query
                .filter(schema::polls::start_date.le(today))
                .filter(schema::polls::finish_date.ge(today));
        }

        let db_polls: Vec<models::Poll> = query.load(connection)?;
        assemble_polls(connection, db_polls)
    }

    fn get_poll(&self, id: &Id) -> Result<survey::Poll, StoreError> {
        let mut pooled = self.pool.get()?;
        let connection: &mut PgConnection = &mut pooled;

        let db_poll = schema::polls::table
            .find(id.0)
            .select(models::Poll::as_select())
            .first(connection)
            .optional()?
            .ok_or_else(|| not_found("poll", id))?;

        assemble_polls(connection, vec![db_poll])?
            .pop()
            .ok_or_else(|| not_found("poll", id))
    }

    fn create_poll(&self, poll: CreatePoll) -> Result<survey::Poll, StoreError> {
        let mut pooled = self.pool.get()?;
        let connection: &mut PgConnection = &mut pooled;

        let CreatePoll { title, description, start_date, finish_date } = poll;
        let db_poll = models::Poll {
            id: Uuid::new_v4(),
            title,
            description,
            created: now(),
            start_date,
            finish_date,
        };
        diesel::insert_into(schema::polls::table)
            .values(&db_poll)
            .execute(connection)?;

        Ok(db_poll.into_domain(vec![]))
    }

    fn update_poll(&self, id: &Id, update: UpdatePoll) -> Result<survey::Poll, StoreError> {
        if !update.is_empty() {
            let mut pooled = self.pool.get()?;
            let connection: &mut PgConnection = &mut pooled;
            let changes = models::UpdatePoll::from(update);
            let updated = diesel::update(schema::polls::table.find(id.0))
                .set(&changes)
                .execute(connection)?;
            if updated == 0 {
                return Err(not_found("poll", id));
            }
        }
        self.get_poll(id)
    }

    fn delete_poll(&self, id: &Id) -> Result<(), StoreError> {
        let mut pooled = self.pool.get()?;
        let connection: &mut PgConnection = &mut pooled;

        connection.transaction(|connection| {
            ensure_poll(connection, id)?;
            let questions: i64 = schema::questions::table
                .filter(schema::questions::poll_id.eq(id.0))
                .count()
                .get_result(connection)?;
            let gateways: i64 = schema::answer_gateways::table
                .filter(schema::answer_gateways::poll_id.eq(id.0))
                .count()
                .get_result(connection)?;
            if questions > 0 || gateways > 0 {
                return Err(store::poll_in_use(id));
            }

            diesel::delete(schema::polls::table.find(id.0)).execute(connection)?;
            Ok(())
        })
    }

    fn list_questions(&self, poll_id: Option<Id>) -> Result<Vec<survey::Question>, StoreError> {
        let mut pooled = self.pool.get()?;
        let connection: &mut PgConnection = &mut pooled;

        let mut query = schema::questions::table
            .select(models::Question::as_select())
            .order((schema::questions::created, schema::questions::id))
            .into_boxed();
        if let Some(poll_id) = poll_id {
            query = query.filter(schema::questions::poll_id.eq(poll_id.0));
        }

        let db_questions: Vec<models::Question> = query.load(connection)?;
        assemble_questions(connection, db_questions)
    }

    fn get_question(&self, id: &Id) -> Result<survey::Question, StoreError> {
        let mut pooled = self.pool.get()?;
        let connection: &mut PgConnection = &mut pooled;

        let db_question = schema::questions::table
            .find(id.0)
            .select(models::Question::as_select())
            .first(connection)
            .optional()?
            .ok_or_else(|| not_found("question", id))?;

        assemble_questions(connection, vec![db_question])?
            .pop()
            .ok_or_else(|| not_found("question", id))
    }

    fn create_question(&self, question: CreateQuestion) -> Result<survey::Question, StoreError> {
        let mut pooled = self.pool.get()?;
        let connection: &mut PgConnection = &mut pooled;

        connection.transaction(|connection| {
            let CreateQuestion { poll_id, text, shape } = question;
            ensure_poll(connection, &poll_id)?;

            let db_question = models::Question {
                id: Uuid::new_v4(),
                poll_id: poll_id.0,
                text,
                kind: String::from(shape.kind().code()),
                created: now(),
            };
            diesel::insert_into(schema::questions::table)
                .values(&db_question)
                .execute(connection)?;

            let db_choices = insert_choices(connection, db_question.id, shape.into_choices())?;
            survey::Question::try_from((db_question, db_choices))
        })
    }

    fn replace_question(&self, id: &Id, question: CreateQuestion) -> Result<survey::Question, StoreError> {
        let mut pooled = self.pool.get()?;
        let connection: &mut PgConnection = &mut pooled;

        connection.transaction(|connection| {
            let current = lock_question(connection, id)?;
            ensure_unanswered(connection, id)?;

            let CreateQuestion { poll_id, text, shape } = question;
            ensure_poll(connection, &poll_id)?;

            diesel::delete(schema::choices::table.filter(schema::choices::question_id.eq(id.0)))
                .execute(connection)?;

            let db_question = models::Question {
                id: current.id,
                poll_id: poll_id.0,
                text,
                kind: String::from(shape.kind().code()),
                created: current.created,
            };
            diesel::update(schema::questions::table.find(id.0))
                .set((
                    schema::questions::poll_id.eq(db_question.poll_id),
                    schema::questions::text.eq(&db_question.text),
                    schema::questions::kind.eq(&db_question.kind),
                ))
                .execute(connection)?;

            let db_choices = insert_choices(connection, db_question.id, shape.into_choices())?;
            survey::Question::try_from((db_question, db_choices))
        })
    }

    fn delete_question(&self, id: &Id) -> Result<(), StoreError> {
        let mut pooled = self.pool.get()?;
        let connection: &mut PgConnection = &mut pooled;

        connection.transaction(|connection| {
            lock_question(connection, id)?;
            ensure_unanswered(connection, id)?;
            // choices go with it through ON DELETE CASCADE
            diesel::delete(schema::questions::table.find(id.0)).execute(connection)?;
            Ok(())
        })
    }

    fn create_submission(&self, submission: NewSubmission) -> Result<survey::AnswerGateway, StoreError> {
        let mut pooled = self.pool.get()?;
        let connection: &mut PgConnection = &mut pooled;

        connection.transaction(|connection| {
            let NewSubmission { poll_id, user_id, answers } = submission;
            ensure_poll(connection, &poll_id)?;

            // locked rows hold off replacement and deletion until this commits
            let question_ids: Vec<Uuid> = answers.iter().map(|a| a.question_id.0).collect();
            let db_questions: Vec<models::Question> = schema::questions::table
                .filter(schema::questions::id.eq_any(question_ids))
                .select(models::Question::as_select())
                .for_update()
                .load(connection)?;
            let questions = assemble_questions(connection, db_questions)?;
            for answer in &answers {
                let question = questions.iter()
                    .find(|q| q.id == answer.question_id)
                    .ok_or_else(|| not_found("question", &answer.question_id))?;
                store::ensure_current(answer, question, &poll_id)?;
            }

            let db_gateway = models::AnswerGateway {
                id: Uuid::new_v4(),
                poll_id: poll_id.0,
                user_id: user_id.map(|id| id.0),
                created: now(),
            };
            diesel::insert_into(schema::answer_gateways::table)
                .values(&db_gateway)
                .execute(connection)?;

            let mut db_answers = Vec::with_capacity(answers.len());
            let mut links = vec![];
            for (position, answer) in answers.iter().enumerate() {
                let db_answer = models::Answer {
                    id: Uuid::new_v4(),
                    answer_gateway_id: db_gateway.id,
                    question_id: answer.question_id.0,
                    position: position as i32,
                    value: answer.value().map(String::from),
                };
                links.extend(answer.choice_ids().iter().map(|choice_id| models::AnswerChoice {
                    answer_id: db_answer.id,
                    choice_id: choice_id.0,
                }));
                db_answers.push(db_answer);
            }

            if !db_answers.is_empty() {
                diesel::insert_into(schema::answers::table)
                    .values(&db_answers)
                    .execute(connection)?;
            }
            if !links.is_empty() {
                diesel::insert_into(schema::answer_choices::table)
                    .values(&links)
                    .execute(connection)?;
            }

            let gateway_id = Id(db_gateway.id);
            assemble_submissions(connection, vec![db_gateway])?
                .pop()
                .ok_or_else(|| not_found("answer gateway", &gateway_id))
        })
    }

    fn list_submissions(&self, owner: Option<Id>) -> Result<Vec<survey::AnswerGateway>, StoreError> {
        let mut pooled = self.pool.get()?;
        let connection: &mut PgConnection = &mut pooled;

        let mut query = schema::answer_gateways::table
            .select(models::AnswerGateway::as_select())
            .order((schema::answer_gateways::created, schema::answer_gateways::id))
            .into_boxed();
        if let Some(owner) = owner {
            query = query.filter(schema::answer_gateways::user_id.eq(owner.0));
        }

        let db_gateways: Vec<models::AnswerGateway> = query.load(connection)?;
        assemble_submissions(connection, db_gateways)
    }

    fn get_submission(&self, id: &Id) -> Result<survey::AnswerGateway, StoreError> {
        let mut pooled = self.pool.get()?;
        let connection: &mut PgConnection = &mut pooled;

        let db_gateway = schema::answer_gateways::table
            .find(id.0)
            .select(models::AnswerGateway::as_select())
            .first(connection)
            .optional()?
            .ok_or_else(|| not_found("answer gateway", id))?;

        assemble_submissions(connection, vec![db_gateway])?
            .pop()
            .ok_or_else(|| not_found("answer gateway", id))
    }
}

/// Runs against the database named by `DATABASE_URL`. Every test creates its own poll,
/// so a shared scratch database is fine: `cargo test -- --ignored`.
#[cfg(test)]
mod tests {
    use std::env;
    use std::sync::Once;

    use chrono::NaiveDate;

    use super::*;
    use crate::survey::{AnswerContent, Poll, Question, Shape, ValidatedAnswer};

    static MIGRATE: Once = Once::new();

    fn store() -> PgStore {
        dotenvy::dotenv().ok();
        let url = env::var("DATABASE_URL").expect("DATABASE_URL must name a scratch database");
        let store = PgStore::connect(&url, 2).unwrap();
        MIGRATE.call_once(|| store.run_migrations().unwrap());
        store
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn january(store: &PgStore) -> Poll {
        store.create_poll(CreatePoll {
            title: String::from("January"),
            description: String::from("Monthly check-in"),
            start_date: date(2024, 1, 1),
            finish_date: date(2024, 1, 31),
        }).unwrap()
    }

    fn colours(poll: &Poll) -> CreateQuestion {
        CreateQuestion {
            poll_id: poll.id,
            text: String::from("Favourite colours?"),
            shape: Shape::MultipleChoices { choices: vec![
                NewChoice::new("Red"), NewChoice::new("Green"), NewChoice::new("Blue"),
            ]},
        }
    }

    fn pick(question: &Question, indexes: &[usize]) -> ValidatedAnswer {
        ValidatedAnswer {
            question_id: question.id,
            content: AnswerContent::Choices(indexes.iter().map(|&i| question.shape.choices()[i].id).collect()),
        }
    }

    #[test]
    #[ignore = "needs DATABASE_URL"]
    fn poll_embeds_questions_in_order() {
        let store = store();
        let poll = january(&store);
        let first = store.create_question(colours(&poll)).unwrap();
        let second = store.create_question(CreateQuestion {
            poll_id: poll.id,
            text: String::from("Anything else?"),
            shape: Shape::Text,
        }).unwrap();

        let read = store.get_poll(&poll.id).unwrap();
        assert_eq!(read.questions, vec![first.clone(), second]);
        let texts: Vec<&str> = read.questions[0].shape.choices().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["Red", "Green", "Blue"]);
        assert_eq!(store.list_questions(Some(poll.id)).unwrap()[0], first);

        let inside = store.list_polls(PollScope::ActiveOn(date(2024, 1, 15))).unwrap();
        assert!(inside.iter().any(|p| p.id == poll.id));
        let after = store.list_polls(PollScope::ActiveOn(date(2024, 2, 1))).unwrap();
        assert!(after.iter().all(|p| p.id != poll.id));
    }

    #[test]
    #[ignore = "needs DATABASE_URL"]
    fn submission_round_trips() {
        let store = store();
        let poll = january(&store);
        let colours = store.create_question(colours(&poll)).unwrap();
        let comment = store.create_question(CreateQuestion {
            poll_id: poll.id,
            text: String::from("Why?"),
            shape: Shape::Text,
        }).unwrap();
        let user = Id::new();

        let created = store.create_submission(NewSubmission {
            poll_id: poll.id,
            user_id: Some(user),
            answers: vec![
                pick(&colours, &[2, 0]),
                ValidatedAnswer { question_id: comment.id, content: AnswerContent::Text(String::from("Bright")) },
            ],
        }).unwrap();

        assert_eq!(created.user_id, Some(user));
        assert_eq!(created.answers.len(), 2);
        let picked: Vec<&str> = created.answers[0].choices.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(picked, ["Red", "Blue"]);
        assert_eq!(created.answers[1].value.as_deref(), Some("Bright"));
        assert!(created.answers[1].choices.is_empty());

        assert_eq!(store.get_submission(&created.id).unwrap(), created);
        assert_eq!(store.list_submissions(Some(user)).unwrap(), vec![created]);
    }

    #[test]
    #[ignore = "needs DATABASE_URL"]
    fn failed_submission_writes_nothing() {
        let store = store();
        let poll = january(&store);
        let question = store.create_question(colours(&poll)).unwrap();
        let user = Id::new();

        let stray = ValidatedAnswer { question_id: question.id, content: AnswerContent::Choices(vec![Id::new()]) };
        let result = store.create_submission(NewSubmission {
            poll_id: poll.id,
            user_id: Some(user),
            answers: vec![pick(&question, &[0]), stray],
        });

        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert!(store.list_submissions(Some(user)).unwrap().is_empty());
        store.delete_question(&question.id).unwrap();
    }

    #[test]
    #[ignore = "needs DATABASE_URL"]
    fn replace_question_swaps_whole_choice_set() {
        let store = store();
        let poll = january(&store);
        let original = store.create_question(colours(&poll)).unwrap();

        let replaced = store.replace_question(&original.id, CreateQuestion {
            poll_id: poll.id,
            text: String::from("Favourite colour?"),
            shape: Shape::OneChoice { choices: vec![NewChoice::new("Cyan"), NewChoice::new("Magenta")] },
        }).unwrap();

        assert_eq!(replaced.id, original.id);
        assert_eq!(replaced.kind(), survey::QuestionKind::OneChoice);
        assert_eq!(replaced.shape.choices().len(), 2);
        for old in original.shape.choices() {
            assert!(!replaced.owns_choice(&old.id));
        }
        assert_eq!(store.get_question(&original.id).unwrap(), replaced);
    }

    #[test]
    #[ignore = "needs DATABASE_URL"]
    fn stale_answer_conflicts_after_replacement() {
        let store = store();
        let poll = january(&store);
        let question = store.create_question(CreateQuestion {
            poll_id: poll.id,
            text: String::from("Name?"),
            shape: Shape::Text,
        }).unwrap();
        let stale = ValidatedAnswer { question_id: question.id, content: AnswerContent::Text(String::from("Ada")) };
        store.replace_question(&question.id, colours(&poll)).unwrap();

        let user = Id::new();
        let result = store.create_submission(NewSubmission {
            poll_id: poll.id,
            user_id: Some(user),
            answers: vec![stale],
        });
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert!(store.list_submissions(Some(user)).unwrap().is_empty());
    }

    #[test]
    #[ignore = "needs DATABASE_URL"]
    fn answered_question_is_frozen_and_poll_in_use() {
        let store = store();
        let poll = january(&store);
        let question = store.create_question(colours(&poll)).unwrap();
        store.create_submission(NewSubmission {
            poll_id: poll.id,
            user_id: None,
            answers: vec![pick(&question, &[1])],
        }).unwrap();

        assert!(matches!(store.replace_question(&question.id, colours(&poll)), Err(StoreError::Conflict(_))));
        assert!(matches!(store.delete_question(&question.id), Err(StoreError::Conflict(_))));
        assert!(matches!(store.delete_poll(&poll.id), Err(StoreError::Conflict(_))));
    }

    #[test]
    #[ignore = "needs DATABASE_URL"]
    fn unanswered_question_and_empty_poll_delete() {
        let store = store();
        let poll = january(&store);
        let question = store.create_question(colours(&poll)).unwrap();

        assert!(matches!(store.delete_poll(&poll.id), Err(StoreError::Conflict(_))));
        store.delete_question(&question.id).unwrap();
        assert!(matches!(store.get_question(&question.id), Err(StoreError::NotFound { .. })));
        store.delete_poll(&poll.id).unwrap();
        assert!(matches!(store.get_poll(&poll.id), Err(StoreError::NotFound { .. })));
        assert!(matches!(store.delete_poll(&poll.id), Err(StoreError::NotFound { .. })));
    }

    #[test]
    #[ignore = "needs DATABASE_URL"]
    fn update_poll_keeps_start_date() {
        let store = store();
        let poll = january(&store);
        let updated = store.update_poll(&poll.id, UpdatePoll {
            title: Some(String::from("Renamed")),
            finish_date: Some(date(2024, 2, 29)),
            ..Default::default()
        }).unwrap();

        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.start_date, poll.start_date);
        assert_eq!(updated.created, poll.created);
        assert_eq!(updated.finish_date, date(2024, 2, 29));
    }
}
