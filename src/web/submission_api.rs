use serde::Deserialize;
use tracing::{debug, info};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection};

use crate::access::{PollScope, SubmissionScope};
use crate::error;
use crate::survey::{Caller, Id, NewSubmission, UnvalidatedSubmission};
use super::{blocking, caller, json_body, respond, today, with_store, SharedStore};

#[derive(Debug, Default, Deserialize)]
pub struct SubmissionQuery {
    pub user: Option<Id>,
}

pub fn routes(store: SharedStore) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let list = warp::path!("api" / "answer-gateways")
        .and(warp::get())
        .and(caller())
        .and(warp::query::<SubmissionQuery>())
        .and(with_store(store.clone()))
        .then(list_submissions);
    let create = warp::path!("api" / "answer-gateways")
        .and(warp::post())
        .and(caller())
        .and(json_body())
        .and(with_store(store.clone()))
        .then(new_submission);
    let get = warp::path!("api" / "answer-gateways" / Id)
        .and(warp::get())
        .and(caller())
        .and(with_store(store))
        .then(get_submission);

    list.or(create).unify()
        .or(get).unify()
}

pub async fn new_submission(caller: Caller, input: UnvalidatedSubmission, store: SharedStore) -> Response {
    let today = today();
    let result = blocking(move || {
        let poll = store.get_poll(&input.poll_id)?;
        // same visibility as reading the poll; only admins learn that it is closed
        if !PollScope::for_caller(&caller, today).allows(&poll) {
            return Err(error::not_found("poll", poll.id));
        }

        // a question id outside this poll is a validation error, one that exists nowhere is not found
        if poll.is_active(today) {
            for answer in &input.answers {
                if !poll.questions.iter().any(|q| q.id == answer.question_id) {
                    store.get_question(&answer.question_id)?;
                }
            }
        }

        let submission = NewSubmission::validate(input, &poll, caller.user_id(), today)
            .inspect_err(|err| debug!(poll = %poll.id, "rejected submission from {caller}: {err}"))?;
        let gateway = store.create_submission(submission)?;
        info!(gateway = %gateway.id, poll = %poll.id, answers = gateway.answers.len(), "{caller} submitted answers");
        Ok(gateway)
    }).await;
    respond(result, StatusCode::CREATED)
}

pub async fn list_submissions(caller: Caller, query: SubmissionQuery, store: SharedStore) -> Response {
    let scope = SubmissionScope::for_caller(&caller, query.user);
    let result = blocking(move || match scope {
        SubmissionScope::Nothing => Ok(vec![]),
        SubmissionScope::All => Ok(store.list_submissions(None)?),
        SubmissionScope::OwnedBy(user) => Ok(store.list_submissions(Some(user))?),
    }).await;
    respond(result, StatusCode::OK)
}

pub async fn get_submission(id: Id, caller: Caller, store: SharedStore) -> Response {
    let scope = SubmissionScope::for_caller(&caller, None);
    let result = blocking(move || {
        let gateway = store.get_submission(&id)?;
        if !scope.allows(&gateway) {
            return Err(error::not_found("answer gateway", id));
        }
        Ok(gateway)
    }).await;
    respond(result, StatusCode::OK)
}
