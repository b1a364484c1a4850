use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Display fallback for a student or mentor name that could not be resolved.
pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Mentor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Mentor => "mentor",
            Role::Admin => "admin",
        }
    }

    /// Path segment of the role's backend collection (`/students`, `/mentors`, `/admins`).
    pub fn collection(&self) -> &'static str {
        match self {
            Role::Student => "students",
            Role::Mentor => "mentors",
            Role::Admin => "admins",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "mentor" => Ok(Role::Mentor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProjectType {
    Project,
    Internship,
    Other(String),
}

impl ProjectType {
    pub fn code(&self) -> &str {
        match self {
            ProjectType::Project => "project",
            ProjectType::Internship => "internship",
            ProjectType::Other(raw) => raw,
        }
    }
}

impl From<String> for ProjectType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "project" => ProjectType::Project,
            "internship" => ProjectType::Internship,
            _ => ProjectType::Other(raw),
        }
    }
}

impl From<ProjectType> for String {
    fn from(value: ProjectType) -> Self {
        value.code().to_string()
    }
}

impl FromStr for ProjectType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ProjectType::from(s.to_string()))
    }
}

impl Default for ProjectType {
    fn default() -> Self {
        ProjectType::Project
    }
}

/// Review status of a submission. Codes are kept exactly as the backend spells
/// them (`Submitted` is capitalised, the rest are snake case).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProjectStatus {
    Submitted,
    Approved,
    NeedsImprovement,
    Pending,
    Other(String),
}

impl ProjectStatus {
    pub fn code(&self) -> &str {
        match self {
            ProjectStatus::Submitted => "Submitted",
            ProjectStatus::Approved => "approved",
            ProjectStatus::NeedsImprovement => "needs_improvement",
            ProjectStatus::Pending => "pending",
            ProjectStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for ProjectStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "Submitted" => ProjectStatus::Submitted,
            "approved" => ProjectStatus::Approved,
            "needs_improvement" => ProjectStatus::NeedsImprovement,
            "pending" => ProjectStatus::Pending,
            _ => ProjectStatus::Other(raw),
        }
    }
}

impl From<ProjectStatus> for String {
    fn from(value: ProjectStatus) -> Self {
        value.code().to_string()
    }
}

impl FromStr for ProjectStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ProjectStatus::from(s.to_string()))
    }
}

impl Default for ProjectStatus {
    fn default() -> Self {
        ProjectStatus::Pending
    }
}

/// Authenticated actor held by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
}

impl Identity {
    /// Builds an identity from a login payload. The role always comes from the
    /// endpoint that authenticated the user, never from the payload.
    pub fn from_person(person: Person, role: Role) -> Option<Self> {
        Some(Self {
            id: person.id?,
            name: person.name.unwrap_or_default(),
            email: person.email.unwrap_or_default(),
            role,
            department: person.department,
            year: person.year,
            specialization: person.specialization,
            company: person.company,
            phone: person.phone,
            github_link: person.github_link,
            experience: person.experience,
        })
    }

    /// Shallow merge of a profile-update response. Fields absent from the
    /// response are kept; `id` and `role` never change.
    pub fn merge(&mut self, update: Person) {
        fn take(slot: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *slot = value;
            }
        }

        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(email) = update.email {
            self.email = email;
        }
        take(&mut self.department, update.department);
        take(&mut self.year, update.year);
        take(&mut self.specialization, update.specialization);
        take(&mut self.company, update.company);
        take(&mut self.phone, update.phone);
        take(&mut self.github_link, update.github_link);
        take(&mut self.experience, update.experience);
    }
}

/// Student, mentor or user entry as returned by the backend. Every field is
/// optional because the backend omits whatever it has not stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct Person {
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub year: Option<String>,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub phone: Option<String>,
    #[serde(default)]
    pub github_link: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub experience: Option<String>,
}

impl Person {
    /// A missing or blank name reads as [`UNKNOWN_NAME`].
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNKNOWN_NAME)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct ProjectRecord {
    #[serde(deserialize_with = "de::string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "type", default)]
    pub project_type: ProjectType,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub student_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub mentor_id: Option<String>,
    #[serde(default)]
    pub upload_date: Option<String>,
    #[serde(default, deserialize_with = "de::technologies")]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub feedback_date: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub grade: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(alias = "projectUrl", default)]
    pub project_url: Option<String>,
}

// Both records arrive with `id`, `_id` or both keys set; the decoders below
// fold them into `id` first.
impl<'de> Deserialize<'de> for Person {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = de::single_id(serde_json::Value::deserialize(deserializer)?);
        Person::deserialize(value).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Person {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Person::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for ProjectRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = de::single_id(serde_json::Value::deserialize(deserializer)?);
        ProjectRecord::deserialize(value).map_err(serde::de::Error::custom)
    }
}

impl Serialize for ProjectRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ProjectRecord::serialize(self, serializer)
    }
}

/// A project plus the display names resolved for its foreign keys. A name is
/// `None` when the view did not ask for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedProject {
    #[serde(flatten)]
    pub record: ProjectRecord,
    #[serde(rename = "studentName", skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(rename = "mentorName", skip_serializing_if = "Option::is_none")]
    pub mentor_name: Option<String>,
}

impl EnrichedProject {
    #[cfg(test)]
    pub fn bare(record: ProjectRecord) -> Self {
        Self {
            record,
            student_name: None,
            mentor_name: None,
        }
    }

    pub fn student_label(&self) -> &str {
        self.student_name.as_deref().unwrap_or(UNKNOWN_NAME)
    }

    pub fn mentor_label(&self) -> &str {
        self.mentor_name.as_deref().unwrap_or(UNKNOWN_NAME)
    }
}

/// Equality filters applied before deriving summaries. `None` passes everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    pub project_type: Option<ProjectType>,
    pub status: Option<ProjectStatus>,
}

impl ProjectFilter {
    pub fn matches(&self, record: &ProjectRecord) -> bool {
        self.project_type
            .as_ref()
            .map_or(true, |t| *t == record.project_type)
            && self.status.as_ref().map_or(true, |s| *s == record.status)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryView {
    pub total: usize,
    pub approved: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub approval_rate: f64,
    pub distinct_students: usize,
    pub distinct_mentors: usize,
    pub student_to_mentor_ratio: f64,
}

impl SummaryView {
    pub fn status_count(&self, status: &ProjectStatus) -> usize {
        self.by_status.get(status.code()).copied().unwrap_or(0)
    }

    pub fn type_count(&self, project_type: &ProjectType) -> usize {
        self.by_type.get(project_type.code()).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentProgress {
    pub student_id: String,
    pub student_name: String,
    pub project_count: usize,
    pub approved_count: usize,
    pub pending_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentRegistration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub department: String,
    pub year: String,
    pub phone: String,
    pub github_link: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MentorRegistration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub department: String,
    pub specialization: String,
    pub phone: String,
    pub experience: String,
    pub company: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminRegistration {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub enum Registration {
    Student(StudentRegistration),
    Mentor(MentorRegistration),
    Admin(AdminRegistration),
}

impl Registration {
    pub fn role(&self) -> Role {
        match self {
            Registration::Student(_) => Role::Student,
            Registration::Mentor(_) => Role::Mentor,
            Registration::Admin(_) => Role::Admin,
        }
    }
}

/// Partial profile update; unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ProfileUpdate::default()
    }
}

/// Admin-side user form. `password` is only sent when non-empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserForm {
    pub name: String,
    pub email: String,
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

/// Raw project submission as typed in by a student.
#[derive(Debug, Clone, Default)]
pub struct ProjectSubmission {
    pub title: String,
    pub project_type: ProjectType,
    pub description: String,
    pub company: String,
    pub start_date: String,
    pub end_date: String,
    pub technologies: String,
    pub mentor_id: String,
    pub project_url: String,
    pub certificate: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackInput {
    pub mentor_id: String,
    pub grade: String,
    pub remarks: String,
}

mod de {
    use super::*;
    use serde_json::Value;

    /// Moves a Mongo-style `_id` onto `id` unless `id` already holds a value.
    pub fn single_id(mut value: Value) -> Value {
        if let Value::Object(map) = &mut value {
            if let Some(object_id) = map.remove("_id") {
                if map.get("id").map_or(true, Value::is_null) {
                    map.insert("id".to_string(), object_id);
                }
            }
        }
        value
    }

    fn scalar_to_string(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        scalar_to_string(value)
            .ok_or_else(|| serde::de::Error::custom("expected a string or number id"))
    }

    pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.and_then(scalar_to_string))
    }

    /// Accepts `["rust", "sql"]` as well as the comma-joined form the upload
    /// form sends (`"rust, sql"`).
    pub fn technologies<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        let items = match value {
            Some(Value::Array(items)) => items.into_iter().filter_map(scalar_to_string).collect(),
            Some(Value::String(joined)) => joined.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        };

        Ok(items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect())
    }
}
