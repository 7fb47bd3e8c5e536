use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::{ensure_current, poll_in_use, question_answered, Store, StoreError};
use crate::access::PollScope;
use crate::survey::{
    Answer, AnswerGateway, Choice, CreatePoll, CreateQuestion, Id, NewChoice, NewSubmission, Poll,
    Question, Shape, UpdatePoll,
};

/// Process-local store. Each call holds the lock for its whole duration, so every
/// operation is checked in full before anything is written.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    // polls are kept without their questions
    polls: Vec<Poll>,
    questions: Vec<Question>,
    gateways: Vec<AnswerGateway>,
}

impl Tables {
    fn poll(&self, id: &Id) -> Result<&Poll, StoreError> {
        self.polls.iter()
            .find(|p| p.id == *id)
            .ok_or(StoreError::NotFound { subject: "poll", id: *id })
    }

    fn with_questions(&self, poll: &Poll) -> Poll {
        let mut poll = poll.clone();
        poll.questions = self.questions.iter()
            .filter(|q| q.poll_id == poll.id)
            .cloned()
            .collect();
        poll
    }

    fn question_index(&self, id: &Id) -> Result<usize, StoreError> {
        self.questions.iter()
            .position(|q| q.id == *id)
            .ok_or(StoreError::NotFound { subject: "question", id: *id })
    }

    fn is_answered(&self, question_id: &Id) -> bool {
        self.gateways.iter()
            .flat_map(|g| g.answers.iter())
            .any(|a| a.question_id == *question_id)
    }
}

fn materialize(shape: Shape<NewChoice>) -> Shape<Choice> {
    let kind = shape.kind();
    let choices = shape.into_choices().into_iter()
        .map(|NewChoice { text }| Choice { id: Id::new(), text })
        .collect();
    Shape::assemble(kind, choices)
}

impl MemoryStore {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Store for MemoryStore {
    fn list_polls(&self, scope: PollScope) -> Result<Vec<Poll>, StoreError> {
        let tables = self.tables()?;
        Ok(tables.polls.iter()
            .filter(|p| scope.allows(p))
            .map(|p| tables.with_questions(p))
            .collect())
    }

    fn get_poll(&self, id: &Id) -> Result<Poll, StoreError> {
        let tables = self.tables()?;
        let poll = tables.poll(id)?;
        Ok(tables.with_questions(poll))
    }

    fn create_poll(&self, poll: CreatePoll) -> Result<Poll, StoreError> {
        let CreatePoll { title, description, start_date, finish_date } = poll;
        let poll = Poll {
            id: Id::new(),
            title,
            description,
            created: Utc::now(),
            start_date,
            finish_date,
            questions: vec![],
        };
        self.tables()?.polls.push(poll.clone());
        Ok(poll)
    }

    fn update_poll(&self, id: &Id, update: UpdatePoll) -> Result<Poll, StoreError> {
        let mut tables = self.tables()?;
        let poll = tables.polls.iter_mut()
            .find(|p| p.id == *id)
            .ok_or(StoreError::NotFound { subject: "poll", id: *id })?;

        let UpdatePoll { title, description, finish_date } = update;
        if let Some(title) = title {
            poll.title = title;
        }
        if let Some(description) = description {
            poll.description = description;
        }
        if let Some(finish_date) = finish_date {
            poll.finish_date = finish_date;
        }

        let poll = poll.clone();
        Ok(tables.with_questions(&poll))
    }

    fn delete_poll(&self, id: &Id) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        tables.poll(id)?;
        if tables.questions.iter().any(|q| q.poll_id == *id) || tables.gateways.iter().any(|g| g.poll_id == *id) {
            return Err(poll_in_use(id));
        }
        tables.polls.retain(|p| p.id != *id);
        Ok(())
    }

    fn list_questions(&self, poll_id: Option<Id>) -> Result<Vec<Question>, StoreError> {
        let tables = self.tables()?;
        Ok(tables.questions.iter()
            .filter(|q| poll_id.map_or(true, |id| q.poll_id == id))
            .cloned()
            .collect())
    }

    fn get_question(&self, id: &Id) -> Result<Question, StoreError> {
        let tables = self.tables()?;
        let index = tables.question_index(id)?;
        Ok(tables.questions[index].clone())
    }

    fn create_question(&self, question: CreateQuestion) -> Result<Question, StoreError> {
        let mut tables = self.tables()?;
        let CreateQuestion { poll_id, text, shape } = question;
        tables.poll(&poll_id)?;

        let question = Question { id: Id::new(), poll_id, text, shape: materialize(shape) };
        tables.questions.push(question.clone());
        Ok(question)
    }

    fn replace_question(&self, id: &Id, question: CreateQuestion) -> Result<Question, StoreError> {
        let mut tables = self.tables()?;
        let index = tables.question_index(id)?;
        if tables.is_answered(id) {
            return Err(question_answered(id));
        }
        let CreateQuestion { poll_id, text, shape } = question;
        tables.poll(&poll_id)?;

        let question = Question { id: *id, poll_id, text, shape: materialize(shape) };
        tables.questions[index] = question.clone();
        Ok(question)
    }

    fn delete_question(&self, id: &Id) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let index = tables.question_index(id)?;
        if tables.is_answered(id) {
            return Err(question_answered(id));
        }
        tables.questions.remove(index);
        Ok(())
    }

    fn create_submission(&self, submission: NewSubmission) -> Result<AnswerGateway, StoreError> {
        let mut tables = self.tables()?;
        let NewSubmission { poll_id, user_id, answers } = submission;
        tables.poll(&poll_id)?;

        let mut recorded = Vec::with_capacity(answers.len());
        for answer in answers {
            let question = &tables.questions[tables.question_index(&answer.question_id)?];
            ensure_current(&answer, question, &poll_id)?;
            let choices = answer.choice_ids().iter()
                .filter_map(|id| question.shape.choices().iter().find(|c| c.id == *id))
                .cloned()
                .collect();
            recorded.push(Answer {
                id: Id::new(),
                question_id: answer.question_id,
                value: answer.value().map(String::from),
                choices,
            });
        }

        let gateway = AnswerGateway {
            id: Id::new(),
            poll_id,
            user_id,
            created: Utc::now(),
            answers: recorded,
        };
        tables.gateways.push(gateway.clone());
        Ok(gateway)
    }

    fn list_submissions(&self, owner: Option<Id>) -> Result<Vec<AnswerGateway>, StoreError> {
        let tables = self.tables()?;
        Ok(tables.gateways.iter()
            .filter(|g| owner.is_none() || g.user_id == owner)
            .cloned()
            .collect())
    }

    fn get_submission(&self, id: &Id) -> Result<AnswerGateway, StoreError> {
        let tables = self.tables()?;
        tables.gateways.iter()
            .find(|g| g.id == *id)
            .cloned()
            .ok_or(StoreError::NotFound { subject: "answer gateway", id: *id })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::survey::{AnswerContent, ValidatedAnswer};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn january(store: &MemoryStore) -> Poll {
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
            text: String::from("Favourite colour?"),
            shape: Shape::OneChoice { choices: vec![NewChoice::new("Red"), NewChoice::new("Blue")] },
        }
    }

    fn pick(question: &Question, index: usize) -> ValidatedAnswer {
        ValidatedAnswer {
            question_id: question.id,
            content: AnswerContent::Choices(vec![question.shape.choices()[index].id]),
        }
    }

    #[test]
    fn poll_embeds_questions() {
        let store = MemoryStore::default();
        let poll = january(&store);
        let question = store.create_question(colours(&poll)).unwrap();

        let poll = store.get_poll(&poll.id).unwrap();
        assert_eq!(poll.questions, vec![question]);
    }

    #[test]
    fn list_polls_respects_scope() {
        let store = MemoryStore::default();
        january(&store);

        assert_eq!(store.list_polls(PollScope::All).unwrap().len(), 1);
        assert_eq!(store.list_polls(PollScope::ActiveOn(date(2024, 1, 31))).unwrap().len(), 1);
        assert!(store.list_polls(PollScope::ActiveOn(date(2024, 2, 1))).unwrap().is_empty());
    }

    #[test]
    fn update_poll_keeps_start_date() {
        let store = MemoryStore::default();
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

    #[test]
    fn question_needs_existing_poll() {
        let store = MemoryStore::default();
        let mut question = colours(&january(&store));
        question.poll_id = Id::new();
        assert!(matches!(store.create_question(question), Err(StoreError::NotFound { subject: "poll", .. })));
    }

    #[test]
    fn replace_question_swaps_whole_choice_set() {
        let store = MemoryStore::default();
        let poll = january(&store);
        let original = store.create_question(colours(&poll)).unwrap();

        let replacement = CreateQuestion {
            poll_id: poll.id,
            text: String::from("Favourite colours?"),
            shape: Shape::MultipleChoices { choices: vec![
                NewChoice::new("Red"), NewChoice::new("Green"), NewChoice::new("Blue"),
            ]},
        };
        let replaced = store.replace_question(&original.id, replacement).unwrap();

        assert_eq!(replaced.id, original.id);
        assert_eq!(replaced.shape.choices().len(), 3);
        for old in original.shape.choices() {
            assert!(!replaced.owns_choice(&old.id), "choice ids must not survive a replacement");
        }
        assert_eq!(store.get_question(&original.id).unwrap(), replaced);
    }

    #[test]
    fn submission_round_trips() {
        let store = MemoryStore::default();
        let poll = january(&store);
        let question = store.create_question(colours(&poll)).unwrap();
        let user = Id::new();

        let created = store.create_submission(NewSubmission {
            poll_id: poll.id,
            user_id: Some(user),
            answers: vec![pick(&question, 1)],
        }).unwrap();

        let read = store.get_submission(&created.id).unwrap();
        assert_eq!(read, created);
        assert_eq!(read.answers[0].choices[0].text, "Blue");
        assert_eq!(read.answers[0].value, None);
    }

    #[test]
    fn failed_submission_writes_nothing() {
        let store = MemoryStore::default();
        let poll = january(&store);
        let question = store.create_question(colours(&poll)).unwrap();

        let stray = ValidatedAnswer { question_id: question.id, content: AnswerContent::Choices(vec![Id::new()]) };
        let result = store.create_submission(NewSubmission {
            poll_id: poll.id,
            user_id: None,
            answers: vec![pick(&question, 0), stray],
        });

        assert!(result.is_err());
        assert!(store.list_submissions(None).unwrap().is_empty());
    }

    #[test]
    fn stale_answer_conflicts_after_replacement() {
        let store = MemoryStore::default();
        let poll = january(&store);
        let question = store.create_question(colours(&poll)).unwrap();
        let stale = pick(&question, 0);
        store.replace_question(&question.id, colours(&poll)).unwrap();

        let result = store.create_submission(NewSubmission {
            poll_id: poll.id,
            user_id: None,
            answers: vec![stale],
        });
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert!(store.list_submissions(None).unwrap().is_empty());
    }

    #[test]
    fn text_answer_conflicts_once_question_takes_choices() {
        let store = MemoryStore::default();
        let poll = january(&store);
        let question = store.create_question(CreateQuestion {
            poll_id: poll.id,
            text: String::from("Name?"),
            shape: Shape::Text,
        }).unwrap();
        let stale = ValidatedAnswer {
            question_id: question.id,
            content: AnswerContent::Text(String::from("Ada")),
        };
        store.replace_question(&question.id, colours(&poll)).unwrap();

        let result = store.create_submission(NewSubmission {
            poll_id: poll.id,
            user_id: None,
            answers: vec![stale],
        });
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn answered_question_is_frozen_and_poll_in_use() {
        let store = MemoryStore::default();
        let poll = january(&store);
        let question = store.create_question(colours(&poll)).unwrap();
        store.create_submission(NewSubmission {
            poll_id: poll.id,
            user_id: None,
            answers: vec![pick(&question, 0)],
        }).unwrap();

        assert!(matches!(store.replace_question(&question.id, colours(&poll)), Err(StoreError::Conflict(_))));
        assert!(matches!(store.delete_question(&question.id), Err(StoreError::Conflict(_))));
        assert!(matches!(store.delete_poll(&poll.id), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn unanswered_question_and_empty_poll_delete() {
        let store = MemoryStore::default();
        let poll = january(&store);
        let question = store.create_question(colours(&poll)).unwrap();

        assert!(matches!(store.delete_poll(&poll.id), Err(StoreError::Conflict(_))));
        store.delete_question(&question.id).unwrap();
        store.delete_poll(&poll.id).unwrap();
        assert!(matches!(store.get_poll(&poll.id), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn submissions_filter_by_owner() {
        let store = MemoryStore::default();
        let poll = january(&store);
        let question = store.create_question(colours(&poll)).unwrap();
        let (alice, bob) = (Id::new(), Id::new());

        for user_id in [Some(alice), Some(bob), None] {
            store.create_submission(NewSubmission {
                poll_id: poll.id,
                user_id,
                answers: vec![pick(&question, 0)],
            }).unwrap();
        }

        assert_eq!(store.list_submissions(None).unwrap().len(), 3);
        let mine = store.list_submissions(Some(alice)).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].user_id, Some(alice));
    }
}
