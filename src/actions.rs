use tracing::info;

use crate::aggregate::{self, Owner};
use crate::api::PortalBackend;
use crate::error::{PortalError, PortalResult};
use crate::models::{
    EnrichedProject, FeedbackInput, Identity, Person, ProjectSubmission, Role, UserForm,
};
use crate::validate;

pub const FEEDBACK_FAILED: &str = "Failed to submit feedback. Please try again.";
pub const SUBMIT_FAILED: &str = "Failed to submit project. Please try again.";
pub const USER_UPDATE_FAILED: &str = "Failed to update user. Please try again.";

/// Posts a mentor's review and returns the mentor's freshly reloaded projects.
pub async fn submit_feedback(
    backend: &dyn PortalBackend,
    mentor: &Identity,
    project_id: &str,
    grade: &str,
    remarks: &str,
) -> PortalResult<Vec<EnrichedProject>> {
    let feedback = FeedbackInput {
        mentor_id: mentor.id.clone(),
        grade: grade.trim().to_string(),
        remarks: remarks.trim().to_string(),
    };
    validate::feedback(&feedback).map_err(PortalError::Validation)?;

    backend.submit_feedback(project_id, &feedback).await?;
    info!(project = project_id, grade = %feedback.grade, "feedback submitted");

    aggregate::load_enriched_projects(backend, &Owner::Mentor(mentor.id.clone())).await
}

pub async fn submit_project(
    backend: &dyn PortalBackend,
    student: &Identity,
    submission: &ProjectSubmission,
) -> PortalResult<()> {
    validate::project_submission(submission).map_err(PortalError::Validation)?;
    backend.create_project(&student.id, submission).await?;
    info!(student = %student.id, title = %submission.title, "project submitted");
    Ok(())
}

/// Registered users, optionally narrowed to one role.
pub async fn list_users(
    backend: &dyn PortalBackend,
    role: Option<Role>,
) -> PortalResult<Vec<Person>> {
    let users = backend.list_users().await?;
    Ok(match role {
        Some(role) => users
            .into_iter()
            .filter(|u| u.role.as_deref() == Some(role.as_str()))
            .collect(),
        None => users,
    })
}

/// `(students, mentors, admins)` among `users`.
pub fn role_counts(users: &[Person]) -> (usize, usize, usize) {
    users.iter().fold((0, 0, 0), |(s, m, a), user| {
        match user.role.as_deref().and_then(|r| r.parse::<Role>().ok()) {
            Some(Role::Student) => (s + 1, m, a),
            Some(Role::Mentor) => (s, m + 1, a),
            Some(Role::Admin) => (s, m, a + 1),
            None => (s, m, a),
        }
    })
}

pub async fn save_user(
    backend: &dyn PortalBackend,
    id: Option<&str>,
    mut form: UserForm,
) -> PortalResult<Person> {
    // blank password on edit means "keep the current one"
    if form.password.as_deref().is_some_and(str::is_empty) {
        form.password = None;
    }
    let user = match id {
        Some(id) => backend.update_user(id, &form).await?,
        None => backend.create_user(&form).await?,
    };
    info!(user = ?user.id, "user saved");
    Ok(user)
}
