use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::{PortalError, PortalResult};
use crate::models::{Person, ProjectRecord};

/// `GET /projects/student/{id}` and `GET /projects/mentor/{id}` → `{data: [..]}`.
pub fn owned_projects(body: Value) -> Vec<ProjectRecord> {
    collection(body, "data")
}

/// `GET /admins/projects` → `{projects: [..]}`.
pub fn all_projects(body: Value) -> Vec<ProjectRecord> {
    collection(body, "projects")
}

/// `GET /admins/students` → `{students: [..]}`.
pub fn admin_students(body: Value) -> Vec<Person> {
    collection(body, "students")
}

/// `GET /admins/mentors` → `{mentors: [..]}`.
pub fn admin_mentors(body: Value) -> Vec<Person> {
    collection(body, "mentors")
}

/// `POST /students/many` → `{data: [..]}`.
pub fn students_many(body: Value) -> Vec<Person> {
    collection(body, "data")
}

/// `GET /mentors` and `GET /admin/users` → bare array.
pub fn bare_people(body: Value) -> Vec<Person> {
    collection(body, "data")
}

/// `GET /students/{id}` → `{data: {..}}`.
pub fn student_by_id(body: Value) -> PortalResult<Person> {
    entity(body, "data")
}

/// `GET /mentors/{id}` → `{mentor: {..}}`.
///
/// Some deployments answer with `{data: {..}}` instead. That shape is accepted
/// but logged, since it is a backend inconsistency to be settled with the API
/// owner rather than something to quietly paper over.
pub fn mentor_by_id(body: Value) -> PortalResult<Person> {
    if body.get("mentor").is_some() {
        return entity(body, "mentor");
    }
    if body.get("data").is_some() {
        warn!("mentor lookup answered with a `data` envelope instead of `mentor`");
        return entity(body, "data");
    }
    Err(PortalError::decode("mentor lookup response has no `mentor` object"))
}

/// `POST /{role}s/login` → `{success, user, token?}`.
pub fn login(body: Value) -> PortalResult<(Person, Option<String>)> {
    let accepted = body.get("success").and_then(Value::as_bool).unwrap_or(true);
    if !accepted {
        return Err(PortalError::Status {
            status: 401,
            message: message(&body).unwrap_or_default(),
        });
    }

    let token = body
        .get("token")
        .and_then(Value::as_str)
        .map(str::to_string);
    let user = entity(body, "user")?;
    Ok((user, token))
}

/// `PUT /{role}s/{id}`, `POST /admin/users`, `PUT /admin/users/{id}` → `{user: {..}}`.
pub fn user(body: Value) -> PortalResult<Person> {
    entity(body, "user")
}

/// Backend error bodies carry a human readable `message`.
pub fn message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// A missing or mistyped collection field is an empty collection, never an
/// error. Individual items that fail to decode are dropped with a warning.
fn collection<T: DeserializeOwned>(body: Value, field: &str) -> Vec<T> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(field) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                warn!(field, kind = kind_of(&other), "collection field is not an array");
                return Vec::new();
            }
            None => {
                warn!(field, "response has no collection field, treating as empty");
                return Vec::new();
            }
        },
        other => {
            warn!(field, kind = kind_of(&other), "unexpected collection payload");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(field, error = %err, "skipping undecodable item");
                None
            }
        })
        .collect()
}

fn entity<T: DeserializeOwned>(mut body: Value, field: &str) -> PortalResult<T> {
    let inner = body
        .get_mut(field)
        .map(Value::take)
        .filter(|v| v.is_object())
        .ok_or_else(|| PortalError::decode(format!("response has no `{field}` object")))?;
    serde_json::from_value(inner).map_err(|e| PortalError::decode(e.to_string()))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
