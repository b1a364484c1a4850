use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::{join_all, try_join3};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::PortalBackend;
use crate::error::PortalResult;
use crate::models::{
    EnrichedProject, Identity, Person, ProjectFilter, Role, SummaryView, UNKNOWN_NAME,
};
use crate::summary;

pub const LOAD_FAILED: &str = "Failed to load data. Please try again later.";

/// Whose projects a view shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    Student(String),
    Mentor(String),
    Admin,
}

impl Owner {
    pub fn of(identity: &Identity) -> Self {
        match identity.role {
            Role::Student => Owner::Student(identity.id.clone()),
            Role::Mentor => Owner::Mentor(identity.id.clone()),
            Role::Admin => Owner::Admin,
        }
    }

    pub fn kind(&self) -> Role {
        match self {
            Owner::Student(_) => Role::Student,
            Owner::Mentor(_) => Role::Mentor,
            Owner::Admin => Role::Admin,
        }
    }

    /// Students see their mentors, mentors see their students, admins see both.
    fn wants_student_names(&self) -> bool {
        !matches!(self, Owner::Student(_))
    }

    fn wants_mentor_names(&self) -> bool {
        !matches!(self, Owner::Mentor(_))
    }
}

#[derive(Debug, Clone, Copy)]
enum Lookup {
    Student,
    Mentor,
}

/// Only a failed primary fetch fails the load. Each name lookup settles on its
/// own and a failed one resolves to [`UNKNOWN_NAME`]. Nothing is cached.
pub async fn load_enriched_projects(
    backend: &dyn PortalBackend,
    owner: &Owner,
) -> PortalResult<Vec<EnrichedProject>> {
    let records = match owner {
        Owner::Student(id) => backend.student_projects(id).await?,
        Owner::Mentor(id) => backend.mentor_projects(id).await?,
        Owner::Admin => backend.all_projects().await?,
    };

    let student_ids = if owner.wants_student_names() {
        distinct(records.iter().map(|r| r.student_id.as_deref()))
    } else {
        Vec::new()
    };
    let mentor_ids = if owner.wants_mentor_names() {
        distinct(records.iter().map(|r| r.mentor_id.as_deref()))
    } else {
        Vec::new()
    };

    let (students, mentors) = futures::join!(
        resolve_students(backend, &student_ids),
        fan_out(backend, &mentor_ids, Lookup::Mentor),
    );

    debug!(
        owner = ?owner.kind(),
        records = records.len(),
        students = student_ids.len(),
        mentors = mentor_ids.len(),
        "enriched projects"
    );

    Ok(records
        .into_iter()
        .map(|record| {
            let student_name = owner
                .wants_student_names()
                .then(|| name_for(&students, record.student_id.as_deref()));
            let mentor_name = owner
                .wants_mentor_names()
                .then(|| name_for(&mentors, record.mentor_id.as_deref()));
            EnrichedProject {
                record,
                student_name,
                mentor_name,
            }
        })
        .collect())
}

/// One `students/many` round trip for every student id. Ids the batch does
/// not return stay unresolved. If the batch call itself fails the ids are
/// looked up one by one instead.
async fn resolve_students(
    backend: &dyn PortalBackend,
    ids: &[String],
) -> HashMap<String, String> {
    if ids.is_empty() {
        return HashMap::new();
    }

    match backend.students_many(ids).await {
        Ok(people) => people
            .into_iter()
            .filter_map(|person| {
                let id = person.id.clone()?;
                Some((id, person.display_name().to_string()))
            })
            .collect(),
        Err(err) => {
            warn!(error = %err, count = ids.len(), "batch student lookup failed, falling back to single lookups");
            fan_out(backend, ids, Lookup::Student).await
        }
    }
}

/// Concurrent single lookups, all settled before returning.
async fn fan_out(
    backend: &dyn PortalBackend,
    ids: &[String],
    lookup: Lookup,
) -> HashMap<String, String> {
    let lookups = ids.iter().map(|id| async move {
        let result = match lookup {
            Lookup::Student => backend.student(id).await,
            Lookup::Mentor => backend.mentor(id).await,
        };
        (id, result)
    });

    join_all(lookups)
        .await
        .into_iter()
        .map(|(id, result)| {
            let name = match result {
                Ok(person) => person.display_name().to_string(),
                Err(err) => {
                    debug!(?lookup, %id, error = %err, "name lookup failed");
                    UNKNOWN_NAME.to_string()
                }
            };
            (id.clone(), name)
        })
        .collect()
}

fn name_for(names: &HashMap<String, String>, id: Option<&str>) -> String {
    id.and_then(|id| names.get(id))
        .cloned()
        .unwrap_or_else(|| UNKNOWN_NAME.to_string())
}

/// Distinct non-empty ids in first-seen order.
fn distinct<'a>(ids: impl Iterator<Item = Option<&'a str>>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.flatten()
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// The students behind a mentor's projects, fetched in one batch.
pub async fn load_roster(
    backend: &dyn PortalBackend,
    projects: &[EnrichedProject],
) -> PortalResult<Vec<Person>> {
    let ids = distinct(projects.iter().map(|p| p.record.student_id.as_deref()));
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    backend.students_many(&ids).await
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminOverview {
    pub students: usize,
    pub mentors: usize,
    /// Registered students and mentors plus the acting admin.
    pub users_total: usize,
    pub registry_ratio: f64,
    pub summary: SummaryView,
}

pub async fn load_admin_overview(backend: &dyn PortalBackend) -> PortalResult<AdminOverview> {
    let (students, mentors, projects) = try_join3(
        backend.admin_students(),
        backend.admin_mentors(),
        load_enriched_projects(backend, &Owner::Admin),
    )
    .await?;

    let summary = summary::derive_summary(&projects, &ProjectFilter::default());
    Ok(AdminOverview {
        students: students.len(),
        mentors: mentors.len(),
        users_total: students.len() + mentors.len() + 1,
        registry_ratio: summary::ratio(students.len(), mentors.len()),
        summary,
    })
}

/// What a settled load renders. `Empty` is a successful load with nothing to
/// show, distinct from `Failed`. A view whose load has not returned yet is
/// still loading and holds no `LoadState`.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Failed(String),
    Empty,
    Ready(Vec<EnrichedProject>),
}

impl LoadState {
    pub fn from_result(result: PortalResult<Vec<EnrichedProject>>) -> Self {
        match result {
            Ok(projects) if projects.is_empty() => LoadState::Empty,
            Ok(projects) => LoadState::Ready(projects),
            Err(err) => {
                warn!(error = %err, "project load failed");
                LoadState::Failed(LOAD_FAILED.to_string())
            }
        }
    }

    /// Narrows a ready state; a filter that matches nothing yields `Empty`.
    pub fn filtered(&self, filter: &ProjectFilter) -> LoadState {
        match self {
            LoadState::Ready(projects) => {
                let kept: Vec<EnrichedProject> = summary::filter_projects(projects, filter)
                    .into_iter()
                    .cloned()
                    .collect();
                if kept.is_empty() {
                    LoadState::Empty
                } else {
                    LoadState::Ready(kept)
                }
            }
            other => other.clone(),
        }
    }
}

/// Drives one view's load. Once the view is torn down, results that arrive
/// afterwards are dropped instead of handed back.
pub struct ViewLoader {
    backend: Arc<dyn PortalBackend>,
    owner: Owner,
    teardown: CancellationToken,
}

impl ViewLoader {
    pub fn new(backend: Arc<dyn PortalBackend>, owner: Owner) -> Self {
        Self {
            backend,
            owner,
            teardown: CancellationToken::new(),
        }
    }

    pub fn teardown_token(&self) -> CancellationToken {
        self.teardown.clone()
    }

    /// Returns `None` when the view went away before the load settled.
    pub async fn load(&self) -> Option<LoadState> {
        if self.teardown.is_cancelled() {
            return None;
        }

        let result = tokio::select! {
            _ = self.teardown.cancelled() => {
                debug!(owner = ?self.owner.kind(), "view torn down mid-load");
                return None;
            }
            result = load_enriched_projects(self.backend.as_ref(), &self.owner) => result,
        };

        if self.teardown.is_cancelled() {
            return None;
        }

        let state = LoadState::from_result(result);
        if let LoadState::Ready(projects) = &state {
            info!(owner = ?self.owner.kind(), count = projects.len(), "projects loaded");
        }
        Some(state)
    }
}
