use serde::Deserialize;
use tracing::info;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection};

use crate::access;
use crate::survey::{Caller, CreateQuestion, Id, UnvalidatedQuestion};
use super::{blocking, caller, json_body, respond, respond_empty, with_store, SharedStore};

#[derive(Debug, Default, Deserialize)]
pub struct QuestionQuery {
    pub poll_id: Option<Id>,
}

pub fn routes(store: SharedStore) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let list = warp::path!("api" / "questions")
        .and(warp::get())
        .and(warp::query::<QuestionQuery>())
        .and(with_store(store.clone()))
        .then(list_questions);
    let create = warp::path!("api" / "questions")
        .and(warp::post())
        .and(caller())
        .and(json_body())
        .and(with_store(store.clone()))
        .then(new_question);
    let get = warp::path!("api" / "questions" / Id)
        .and(warp::get())
        .and(with_store(store.clone()))
        .then(get_question);
    let replace = warp::path!("api" / "questions" / Id)
        .and(warp::put())
        .and(caller())
        .and(json_body())
        .and(with_store(store.clone()))
        .then(replace_question);
    let delete = warp::path!("api" / "questions" / Id)
        .and(warp::delete())
        .and(caller())
        .and(with_store(store))
        .then(delete_question);

    list.or(create).unify()
        .or(get).unify()
        .or(replace).unify()
        .or(delete).unify()
}

pub async fn list_questions(query: QuestionQuery, store: SharedStore) -> Response {
    respond(blocking(move || Ok(store.list_questions(query.poll_id)?)).await, StatusCode::OK)
}

pub async fn get_question(id: Id, store: SharedStore) -> Response {
    respond(blocking(move || Ok(store.get_question(&id)?)).await, StatusCode::OK)
}

pub async fn new_question(caller: Caller, input: UnvalidatedQuestion, store: SharedStore) -> Response {
    let result = blocking(move || {
        access::require_admin(&caller, "create questions")?;
        let question = store.create_question(CreateQuestion::try_from(input)?)?;
        info!(question = %question.id, poll = %question.poll_id, "{caller} created {} question", question.kind());
        Ok(question)
    }).await;
    respond(result, StatusCode::CREATED)
}

/// Full replacement: text, type and the entire choice set.
pub async fn replace_question(id: Id, caller: Caller, input: UnvalidatedQuestion, store: SharedStore) -> Response {
    let result = blocking(move || {
        access::require_admin(&caller, "update questions")?;
        let question = store.replace_question(&id, CreateQuestion::try_from(input)?)?;
        info!(question = %question.id, "{caller} replaced question");
        Ok(question)
    }).await;
    respond(result, StatusCode::OK)
}

pub async fn delete_question(id: Id, caller: Caller, store: SharedStore) -> Response {
    let result = blocking(move || {
        access::require_admin(&caller, "delete questions")?;
        store.delete_question(&id)?;
        info!(question = %id, "{caller} deleted question");
        Ok(())
    }).await;
    respond_empty(result)
}
