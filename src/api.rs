use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::envelope;
use crate::error::{PortalError, PortalResult};
use crate::models::{
    FeedbackInput, Person, ProfileUpdate, ProjectRecord, ProjectSubmission, Registration, Role,
    UserForm,
};

/// Every backend call the portal makes. Aggregation and session code only
/// talk to this trait, so tests can swap in an in-memory backend.
#[async_trait]
pub trait PortalBackend: Send + Sync {
    async fn login(
        &self,
        role: Role,
        email: &str,
        password: &str,
    ) -> PortalResult<(Person, Option<String>)>;

    async fn register(&self, registration: &Registration) -> PortalResult<()>;

    async fn update_profile(
        &self,
        role: Role,
        id: &str,
        update: &ProfileUpdate,
    ) -> PortalResult<Person>;

    async fn student_projects(&self, student_id: &str) -> PortalResult<Vec<ProjectRecord>>;

    async fn mentor_projects(&self, mentor_id: &str) -> PortalResult<Vec<ProjectRecord>>;

    async fn all_projects(&self) -> PortalResult<Vec<ProjectRecord>>;

    async fn student(&self, id: &str) -> PortalResult<Person>;

    async fn mentor(&self, id: &str) -> PortalResult<Person>;

    async fn students_many(&self, ids: &[String]) -> PortalResult<Vec<Person>>;

    async fn admin_students(&self) -> PortalResult<Vec<Person>>;

    async fn admin_mentors(&self) -> PortalResult<Vec<Person>>;

    async fn mentor_directory(&self) -> PortalResult<Vec<Person>>;

    async fn submit_feedback(&self, project_id: &str, feedback: &FeedbackInput)
        -> PortalResult<()>;

    async fn create_project(
        &self,
        student_id: &str,
        submission: &ProjectSubmission,
    ) -> PortalResult<()>;

    async fn list_users(&self) -> PortalResult<Vec<Person>>;

    async fn create_user(&self, form: &UserForm) -> PortalResult<Person>;

    async fn update_user(&self, id: &str, form: &UserForm) -> PortalResult<Person>;

    async fn delete_user(&self, id: &str) -> PortalResult<()>;
}

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> PortalResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base: config.api_url.clone(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Sends the request and returns the decoded JSON body (`Null` when empty).
    /// Non-2xx answers become `PortalError::Status` with the backend's message.
    async fn send(&self, request: RequestBuilder) -> PortalResult<Value> {
        let request_id = Uuid::new_v4().to_string();
        let mut request = request.header("x-request-id", &request_id);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        debug!(%request_id, status = status.as_u16(), "backend responded");

        if !status.is_success() {
            return Err(PortalError::Status {
                status: status.as_u16(),
                message: envelope::message(&body).unwrap_or_default(),
            });
        }

        Ok(body)
    }

    async fn get(&self, path: &str) -> PortalResult<Value> {
        self.send(self.client.get(self.url(path))).await
    }
}

#[async_trait]
impl PortalBackend for HttpBackend {
    #[instrument(skip(self, password))]
    async fn login(
        &self,
        role: Role,
        email: &str,
        password: &str,
    ) -> PortalResult<(Person, Option<String>)> {
        let url = self.url(&format!("/{}/login", role.collection()));
        let body = self
            .send(self.client.post(url).json(&json!({ "email": email, "password": password })))
            .await?;
        envelope::login(body)
    }

    #[instrument(skip_all, fields(role = %registration.role()))]
    async fn register(&self, registration: &Registration) -> PortalResult<()> {
        let url = self.url(&format!("/{}/register", registration.role().collection()));
        let request = match registration {
            Registration::Student(form) => self.client.post(url).json(form),
            Registration::Mentor(form) => {
                // the backend reads the specialization a second time as `expertise`
                let mut payload = serde_json::to_value(form)
                    .map_err(|e| PortalError::decode(e.to_string()))?;
                payload["expertise"] = Value::String(form.specialization.clone());
                self.client.post(url).json(&payload)
            }
            Registration::Admin(form) => self.client.post(url).json(form),
        };
        self.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self, update))]
    async fn update_profile(
        &self,
        role: Role,
        id: &str,
        update: &ProfileUpdate,
    ) -> PortalResult<Person> {
        let url = self.url(&format!("/{}/{id}", role.collection()));
        let body = self.send(self.client.put(url).json(update)).await?;
        envelope::user(body)
    }

    #[instrument(skip(self))]
    async fn student_projects(&self, student_id: &str) -> PortalResult<Vec<ProjectRecord>> {
        let body = self.get(&format!("/projects/student/{student_id}")).await?;
        Ok(envelope::owned_projects(body))
    }

    #[instrument(skip(self))]
    async fn mentor_projects(&self, mentor_id: &str) -> PortalResult<Vec<ProjectRecord>> {
        let body = self.get(&format!("/projects/mentor/{mentor_id}")).await?;
        Ok(envelope::owned_projects(body))
    }

    #[instrument(skip(self))]
    async fn all_projects(&self) -> PortalResult<Vec<ProjectRecord>> {
        let body = self.get("/admins/projects").await?;
        Ok(envelope::all_projects(body))
    }

    #[instrument(skip(self), level = "debug")]
    async fn student(&self, id: &str) -> PortalResult<Person> {
        let body = self.get(&format!("/students/{id}")).await?;
        envelope::student_by_id(body)
    }

    #[instrument(skip(self), level = "debug")]
    async fn mentor(&self, id: &str) -> PortalResult<Person> {
        let body = self.get(&format!("/mentors/{id}")).await?;
        envelope::mentor_by_id(body)
    }

    #[instrument(skip(self), fields(count = ids.len()))]
    async fn students_many(&self, ids: &[String]) -> PortalResult<Vec<Person>> {
        let body = self
            .send(
                self.client
                    .post(self.url("/students/many"))
                    .json(&json!({ "ids": ids })),
            )
            .await?;
        Ok(envelope::students_many(body))
    }

    async fn admin_students(&self) -> PortalResult<Vec<Person>> {
        let body = self.get("/admins/students").await?;
        Ok(envelope::admin_students(body))
    }

    async fn admin_mentors(&self) -> PortalResult<Vec<Person>> {
        let body = self.get("/admins/mentors").await?;
        Ok(envelope::admin_mentors(body))
    }

    async fn mentor_directory(&self) -> PortalResult<Vec<Person>> {
        let body = self.get("/mentors").await?;
        Ok(envelope::bare_people(body))
    }

    #[instrument(skip(self, feedback), fields(mentor_id = %feedback.mentor_id))]
    async fn submit_feedback(
        &self,
        project_id: &str,
        feedback: &FeedbackInput,
    ) -> PortalResult<()> {
        let url = self.url(&format!("/projects/{project_id}/feedbacks"));
        self.send(self.client.post(url).json(feedback)).await?;
        Ok(())
    }

    #[instrument(skip(self, submission), fields(title = %submission.title))]
    async fn create_project(
        &self,
        student_id: &str,
        submission: &ProjectSubmission,
    ) -> PortalResult<()> {
        let mut form = Form::new()
            .text("title", submission.title.clone())
            .text("project_type", submission.project_type.code().to_string())
            .text("description", submission.description.clone())
            .text("company", submission.company.clone())
            .text("startDate", submission.start_date.clone())
            .text("endDate", submission.end_date.clone())
            .text("technologies", submission.technologies.clone())
            .text("mentorId", submission.mentor_id.clone())
            .text("projectUrl", submission.project_url.clone())
            .text("studentId", student_id.to_string());

        if let Some(path) = &submission.certificate {
            form = form.part("certificate", certificate_part(path).await?);
        }

        let url = self.url("/projects/create");
        self.send(self.client.post(url).multipart(form)).await?;
        Ok(())
    }

    async fn list_users(&self) -> PortalResult<Vec<Person>> {
        let body = self.get("/admin/users").await?;
        Ok(envelope::bare_people(body))
    }

    #[instrument(skip_all, fields(email = %form.email))]
    async fn create_user(&self, form: &UserForm) -> PortalResult<Person> {
        let body = self
            .send(self.client.post(self.url("/admin/users")).json(form))
            .await?;
        envelope::user(body)
    }

    #[instrument(skip(self, form))]
    async fn update_user(&self, id: &str, form: &UserForm) -> PortalResult<Person> {
        let url = self.url(&format!("/admin/users/{id}"));
        let body = self.send(self.client.put(url).json(form)).await?;
        envelope::user(body)
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, id: &str) -> PortalResult<()> {
        let url = self.url(&format!("/admin/users/{id}"));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}

async fn certificate_part(path: &Path) -> PortalResult<Part> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "certificate".to_string());
    Ok(Part::bytes(bytes).file_name(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdminRegistration, MentorRegistration, ProjectStatus};
    use httpmock::prelude::*;

    fn backend(server: &MockServer) -> HttpBackend {
        let config = ClientConfig {
            api_url: server.base_url(),
            session_file: std::env::temp_dir().join("unused-session.json"),
            timeout: None,
        };
        HttpBackend::new(&config).unwrap()
    }

    #[tokio::test]
    async fn login_posts_to_role_scoped_endpoint() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/mentors/login")
                    .header_exists("x-request-id")
                    .json_body(json!({"email": "a@b.io", "password": "pw"}));
                then.status(200).json_body(json!({
                    "success": true,
                    "user": {"_id": "m1", "name": "Dr. A", "email": "a@b.io"}
                }));
            })
            .await;

        let (user, token) = backend(&server)
            .login(Role::Mentor, "a@b.io", "pw")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(user.id.as_deref(), Some("m1"));
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn error_status_carries_backend_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/students/login");
                then.status(401).json_body(json!({"message": "Wrong password"}));
            })
            .await;

        let err = backend(&server)
            .login(Role::Student, "s@b.io", "bad")
            .await
            .unwrap_err();

        match err {
            PortalError::Status { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Wrong password");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mentor_registration_repeats_specialization_as_expertise() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/mentors/register")
                    .body_includes(r#""specialization":"ML""#)
                    .body_includes(r#""expertise":"ML""#);
                then.status(201).json_body(json!({"success": true}));
            })
            .await;

        let registration = Registration::Mentor(MentorRegistration {
            name: "Dr. A".into(),
            email: "a@b.io".into(),
            password: "pw".into(),
            department: "CS".into(),
            specialization: "ML".into(),
            phone: "1".into(),
            experience: "5".into(),
            company: "Acme".into(),
        });
        backend(&server).register(&registration).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn admin_registration_hits_admins_collection() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/admins/register");
                then.status(201);
            })
            .await;

        let registration = Registration::Admin(AdminRegistration {
            name: "Root".into(),
            email: "root@b.io".into(),
            password: "pw".into(),
        });
        backend(&server).register(&registration).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn project_collections_use_their_envelopes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/projects/mentor/m1");
                then.status(200).json_body(json!({
                    "data": [{"_id": "p1", "status": "approved", "student_id": "s1"}]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/admins/projects");
                then.status(200).json_body(json!({"message": "no projects key"}));
            })
            .await;

        let api = backend(&server);
        let mine = api.mentor_projects("m1").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].status, ProjectStatus::Approved);

        assert!(api.all_projects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn students_many_sends_id_list() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/students/many")
                    .json_body(json!({"ids": ["s1", "s2"]}));
                then.status(200)
                    .json_body(json!({"data": [{"_id": "s2", "name": "Bob"}]}));
            })
            .await;

        let people = backend(&server)
            .students_many(&["s1".to_string(), "s2".to_string()])
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].display_name(), "Bob");
    }

    #[tokio::test]
    async fn create_project_is_multipart() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/projects/create")
                    .header_exists("content-type")
                    .body_includes("studentId")
                    .body_includes("s1");
                then.status(201).json_body(json!({"success": true}));
            })
            .await;

        let submission = ProjectSubmission {
            title: "Tracker".into(),
            description: "desc".into(),
            start_date: "2026-01-01".into(),
            end_date: "2026-02-01".into(),
            technologies: "rust".into(),
            mentor_id: "m1".into(),
            ..ProjectSubmission::default()
        };
        backend(&server)
            .create_project("s1", &submission)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn bearer_token_is_forwarded() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/admin/users/u9")
                    .header("authorization", "Bearer tok");
                then.status(204);
            })
            .await;

        backend(&server)
            .with_token(Some("tok".into()))
            .delete_user("u9")
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
