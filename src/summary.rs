use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::models::{
    EnrichedProject, ProjectFilter, ProjectStatus, StudentProgress, SummaryView,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DateField {
    #[value(name = "upload")]
    UploadDate,
    #[value(name = "feedback")]
    FeedbackDate,
}

impl DateField {
    fn get<'a>(&self, project: &'a EnrichedProject) -> Option<&'a str> {
        let raw = match self {
            DateField::UploadDate => project.record.upload_date.as_deref(),
            DateField::FeedbackDate => project.record.feedback_date.as_deref(),
        };
        raw.filter(|value| !value.trim().is_empty())
    }
}

pub fn filter_projects<'a>(
    records: &'a [EnrichedProject],
    filter: &ProjectFilter,
) -> Vec<&'a EnrichedProject> {
    records
        .iter()
        .filter(|project| filter.matches(&project.record))
        .collect()
}

/// Counts and ratios over the records that pass `filter`. Both ratios are 0
/// when their denominator is 0.
pub fn derive_summary(records: &[EnrichedProject], filter: &ProjectFilter) -> SummaryView {
    let mut summary = SummaryView::default();
    let mut students = HashSet::new();
    let mut mentors = HashSet::new();

    for project in filter_projects(records, filter) {
        let record = &project.record;
        summary.total += 1;
        *summary
            .by_status
            .entry(record.status.code().to_string())
            .or_insert(0) += 1;
        *summary
            .by_type
            .entry(record.project_type.code().to_string())
            .or_insert(0) += 1;
        if record.status == ProjectStatus::Approved {
            summary.approved += 1;
        }
        if let Some(id) = record.student_id.as_deref() {
            students.insert(id);
        }
        if let Some(id) = record.mentor_id.as_deref() {
            mentors.insert(id);
        }
    }

    summary.distinct_students = students.len();
    summary.distinct_mentors = mentors.len();
    summary.approval_rate = ratio(summary.approved, summary.total);
    summary.student_to_mentor_ratio = ratio(students.len(), mentors.len());
    summary
}

pub fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Up to `n` records carrying `field`, newest first. Dates that do not parse
/// sort as the epoch.
pub fn recent_n(records: &[EnrichedProject], n: usize, field: DateField) -> Vec<&EnrichedProject> {
    let mut dated: Vec<(i64, &EnrichedProject)> = records
        .iter()
        .filter_map(|project| field.get(project).map(|raw| (parse_timestamp(raw), project)))
        .collect();
    dated.sort_by_key(|(ts, _)| Reverse(*ts));
    dated.into_iter().take(n).map(|(_, project)| project).collect()
}

/// Milliseconds since the epoch, or 0 when `raw` is not a date the backend emits.
pub fn parse_timestamp(raw: &str) -> i64 {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.timestamp_millis();
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return dt.and_utc().timestamp_millis();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or(0);
    }
    0
}

/// `needs_improvement` → `Needs Improvement`. Works on any code, known or not.
pub fn status_label(code: &str) -> String {
    code.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Per-student counts for a mentor's roster, in order of first appearance.
pub fn student_progress(records: &[EnrichedProject]) -> Vec<StudentProgress> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut rows: Vec<StudentProgress> = Vec::new();

    for project in records {
        let Some(student_id) = project.record.student_id.as_deref() else {
            continue;
        };
        let slot = *index.entry(student_id).or_insert_with(|| {
            rows.push(StudentProgress {
                student_id: student_id.to_string(),
                student_name: project.student_label().to_string(),
                project_count: 0,
                approved_count: 0,
                pending_count: 0,
            });
            rows.len() - 1
        });

        let row = &mut rows[slot];
        row.project_count += 1;
        match project.record.status {
            ProjectStatus::Approved => row.approved_count += 1,
            ProjectStatus::Submitted => row.pending_count += 1,
            _ => {}
        }
    }

    rows
}

/// Reviewed projects, most recent feedback first.
pub fn with_feedback(records: &[EnrichedProject]) -> Vec<&EnrichedProject> {
    let mut reviewed: Vec<&EnrichedProject> = records.iter().filter(|p| has_feedback(p)).collect();
    reviewed.sort_by_key(|p| {
        Reverse(
            p.record
                .feedback_date
                .as_deref()
                .map_or(0, parse_timestamp),
        )
    });
    reviewed
}

pub fn awaiting_feedback(records: &[EnrichedProject]) -> Vec<&EnrichedProject> {
    records.iter().filter(|p| !has_feedback(p)).collect()
}

fn has_feedback(project: &EnrichedProject) -> bool {
    project
        .record
        .feedback
        .as_deref()
        .is_some_and(|text| !text.trim().is_empty())
}
