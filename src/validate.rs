use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::FieldErrors;
use crate::models::{FeedbackInput, ProjectSubmission, Registration};

/// Grades a mentor can award, best first.
pub const GRADES: [&str; 8] = ["A", "A-", "B+", "B", "B-", "C", "D", "F"];

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+@\S+\.\S+").expect("email pattern compiles"));

pub fn login(email: &str, password: &str) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    check_email(&mut errors, email);
    if password.is_empty() {
        errors.insert("password", "Password is required".into());
    }
    finish(errors)
}

pub fn registration(registration: &Registration) -> Result<(), FieldErrors> {
    let (name, email, password) = match registration {
        Registration::Student(f) => (&f.name, &f.email, &f.password),
        Registration::Mentor(f) => (&f.name, &f.email, &f.password),
        Registration::Admin(f) => (&f.name, &f.email, &f.password),
    };

    let mut errors = FieldErrors::new();
    if name.trim().is_empty() {
        errors.insert("name", "Name is required".into());
    }
    check_email(&mut errors, email);
    if password.is_empty() {
        errors.insert("password", "Password is required".into());
    }
    finish(errors)
}

pub fn project_submission(submission: &ProjectSubmission) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    if submission.title.trim().is_empty() {
        errors.insert("title", "Title is required".into());
    }
    if submission.description.trim().is_empty() {
        errors.insert("description", "Description is required".into());
    }
    let start = required_date(&mut errors, "startDate", "Start date", &submission.start_date);
    let end = required_date(&mut errors, "endDate", "End date", &submission.end_date);
    if submission.technologies.trim().is_empty() {
        errors.insert("technologies", "Technologies are required".into());
    }
    if submission.mentor_id.trim().is_empty() {
        errors.insert("mentorId", "Please select a mentor".into());
    }
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            errors.insert("endDate", "End date must be after start date".into());
        }
    }

    finish(errors)
}

pub fn feedback(feedback: &FeedbackInput) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    let grade = feedback.grade.trim();
    if grade.is_empty() {
        errors.insert("grade", "Grade is required".into());
    } else if !GRADES.contains(&grade) {
        errors.insert("grade", format!("Grade must be one of {}", GRADES.join(", ")));
    }
    if feedback.remarks.trim().is_empty() {
        errors.insert("remarks", "Feedback is required".into());
    }
    finish(errors)
}

pub fn looks_like_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

fn check_email(errors: &mut FieldErrors, email: &str) {
    if email.is_empty() {
        errors.insert("email", "Email is required".into());
    } else if !looks_like_email(email) {
        errors.insert("email", "Email is invalid".into());
    }
}

fn required_date(
    errors: &mut FieldErrors,
    field: &'static str,
    label: &str,
    raw: &str,
) -> Option<NaiveDate> {
    if raw.trim().is_empty() {
        errors.insert(field, format!("{label} is required"));
        return None;
    }
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.insert(field, format!("{label} must be YYYY-MM-DD"));
            None
        }
    }
}

fn finish(errors: FieldErrors) -> Result<(), FieldErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
