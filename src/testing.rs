use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::api::PortalBackend;
use crate::error::{PortalError, PortalResult};
use crate::models::{
    FeedbackInput, Person, ProfileUpdate, ProjectRecord, ProjectSubmission, Registration, Role,
    UserForm,
};

#[derive(Default)]
pub struct FakeBackend {
    pub student_projects: HashMap<String, Vec<ProjectRecord>>,
    pub mentor_projects: HashMap<String, Vec<ProjectRecord>>,
    pub all_projects: Vec<ProjectRecord>,
    pub fail_projects: bool,
    pub students: HashMap<String, String>,
    pub mentors: HashMap<String, String>,
    /// `false` makes `students_many` fail outright.
    pub batch_enabled: bool,
    pub login_user: Option<Person>,
    pub update_user: Option<Person>,
    pub fail_mutations: bool,
    pub calls: Calls,
}

#[derive(Default)]
pub struct Calls {
    pub login: AtomicUsize,
    pub register: AtomicUsize,
    pub student_lookups: AtomicUsize,
    pub mentor_lookups: AtomicUsize,
    pub batches: Mutex<Vec<Vec<String>>>,
    pub feedback: AtomicUsize,
    pub created: AtomicUsize,
    pub primary: AtomicUsize,
}

pub fn project(id: &str, student: &str, mentor: &str, status: &str) -> ProjectRecord {
    serde_json::from_value(json!({
        "id": id,
        "title": format!("Project {id}"),
        "student_id": student,
        "mentor_id": mentor,
        "status": status,
    }))
    .unwrap()
}

pub fn person(id: &str, name: &str) -> Person {
    Person {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        ..Person::default()
    }
}

fn not_found() -> PortalError {
    PortalError::Status {
        status: 404,
        message: "not found".into(),
    }
}

fn rejected() -> PortalError {
    PortalError::Status {
        status: 500,
        message: "backend down".into(),
    }
}

#[async_trait]
impl PortalBackend for FakeBackend {
    async fn login(
        &self,
        _role: Role,
        _email: &str,
        password: &str,
    ) -> PortalResult<(Person, Option<String>)> {
        self.calls.login.fetch_add(1, Ordering::SeqCst);
        match &self.login_user {
            Some(user) if password == "secret" => Ok((user.clone(), Some("token-1".into()))),
            _ => Err(PortalError::Status {
                status: 401,
                message: "Invalid credentials".into(),
            }),
        }
    }

    async fn register(&self, _registration: &Registration) -> PortalResult<()> {
        self.calls.register.fetch_add(1, Ordering::SeqCst);
        if self.fail_mutations {
            return Err(PortalError::Status {
                status: 409,
                message: "Email already registered".into(),
            });
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        _role: Role,
        _id: &str,
        _update: &ProfileUpdate,
    ) -> PortalResult<Person> {
        if self.fail_mutations {
            return Err(rejected());
        }
        self.update_user
            .clone()
            .ok_or_else(|| PortalError::decode("no user"))
    }

    async fn student_projects(&self, student_id: &str) -> PortalResult<Vec<ProjectRecord>> {
        self.calls.primary.fetch_add(1, Ordering::SeqCst);
        if self.fail_projects {
            return Err(rejected());
        }
        Ok(self
            .student_projects
            .get(student_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mentor_projects(&self, mentor_id: &str) -> PortalResult<Vec<ProjectRecord>> {
        self.calls.primary.fetch_add(1, Ordering::SeqCst);
        if self.fail_projects {
            return Err(rejected());
        }
        Ok(self
            .mentor_projects
            .get(mentor_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn all_projects(&self) -> PortalResult<Vec<ProjectRecord>> {
        self.calls.primary.fetch_add(1, Ordering::SeqCst);
        if self.fail_projects {
            return Err(rejected());
        }
        Ok(self.all_projects.clone())
    }

    async fn student(&self, id: &str) -> PortalResult<Person> {
        self.calls.student_lookups.fetch_add(1, Ordering::SeqCst);
        self.students
            .get(id)
            .map(|name| person(id, name))
            .ok_or_else(not_found)
    }

    async fn mentor(&self, id: &str) -> PortalResult<Person> {
        self.calls.mentor_lookups.fetch_add(1, Ordering::SeqCst);
        self.mentors
            .get(id)
            .map(|name| person(id, name))
            .ok_or_else(not_found)
    }

    async fn students_many(&self, ids: &[String]) -> PortalResult<Vec<Person>> {
        self.calls.batches.lock().unwrap().push(ids.to_vec());
        if !self.batch_enabled {
            return Err(rejected());
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.students.get(id).map(|name| person(id, name)))
            .collect())
    }

    async fn admin_students(&self) -> PortalResult<Vec<Person>> {
        Ok(self
            .students
            .iter()
            .map(|(id, name)| person(id, name))
            .collect())
    }

    async fn admin_mentors(&self) -> PortalResult<Vec<Person>> {
        Ok(self
            .mentors
            .iter()
            .map(|(id, name)| person(id, name))
            .collect())
    }

    async fn mentor_directory(&self) -> PortalResult<Vec<Person>> {
        self.admin_mentors().await
    }

    async fn submit_feedback(
        &self,
        _project_id: &str,
        _feedback: &FeedbackInput,
    ) -> PortalResult<()> {
        self.calls.feedback.fetch_add(1, Ordering::SeqCst);
        if self.fail_mutations {
            return Err(rejected());
        }
        Ok(())
    }

    async fn create_project(
        &self,
        _student_id: &str,
        _submission: &ProjectSubmission,
    ) -> PortalResult<()> {
        self.calls.created.fetch_add(1, Ordering::SeqCst);
        if self.fail_mutations {
            return Err(rejected());
        }
        Ok(())
    }

    async fn list_users(&self) -> PortalResult<Vec<Person>> {
        Ok(Vec::new())
    }

    async fn create_user(&self, form: &UserForm) -> PortalResult<Person> {
        Ok(person("new", &form.name))
    }

    async fn update_user(&self, id: &str, form: &UserForm) -> PortalResult<Person> {
        Ok(person(id, &form.name))
    }

    async fn delete_user(&self, _id: &str) -> PortalResult<()> {
        Ok(())
    }
}
