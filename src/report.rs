use std::fmt::Write;
use std::path::Path;

use serde::Serialize;

use crate::models::{EnrichedProject, Identity, SummaryView};
use crate::summary::{self, DateField};

pub fn build_report(
    viewer: &Identity,
    summary: &SummaryView,
    projects: &[EnrichedProject],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Project Tracking Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}, {})",
        viewer.name, viewer.role, viewer.email
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Total submissions: {}", summary.total);
    let _ = writeln!(
        output,
        "- Approved: {} ({:.0}% approval rate)",
        summary.approved,
        summary.approval_rate * 100.0
    );
    let _ = writeln!(
        output,
        "- Students: {}, mentors: {} (ratio {:.1})",
        summary.distinct_students, summary.distinct_mentors, summary.student_to_mentor_ratio
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");
    if summary.by_status.is_empty() {
        let _ = writeln!(output, "No submissions yet.");
    } else {
        for (code, count) in summary.by_status.iter() {
            let _ = writeln!(output, "- {}: {}", summary::status_label(code), count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Type Mix");
    if summary.by_type.is_empty() {
        let _ = writeln!(output, "No submissions yet.");
    } else {
        for (code, count) in summary.by_type.iter() {
            let _ = writeln!(output, "- {}: {}", summary::status_label(code), count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Submissions");
    let recent = summary::recent_n(projects, 5, DateField::UploadDate);
    if recent.is_empty() {
        let _ = writeln!(output, "No submissions yet.");
    } else {
        for project in recent {
            let _ = writeln!(
                output,
                "- {} by {}, mentor {} ({}) on {}: {}",
                project.record.title,
                project.student_label(),
                project.mentor_label(),
                project.record.project_type.code(),
                project.record.upload_date.as_deref().unwrap_or_default(),
                summary::status_label(project.record.status.code())
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Feedback");
    let reviewed = summary::with_feedback(projects);
    if reviewed.is_empty() {
        let _ = writeln!(output, "No feedback recorded.");
    } else {
        for project in reviewed.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} (grade {}): {}",
                project.record.title,
                project.record.grade.as_deref().unwrap_or("-"),
                project.record.feedback.as_deref().unwrap_or_default()
            );
        }
    }

    output
}

#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    title: &'a str,
    project_type: &'a str,
    status: &'a str,
    student_id: &'a str,
    student_name: &'a str,
    mentor_id: &'a str,
    mentor_name: &'a str,
    upload_date: &'a str,
    technologies: String,
    grade: &'a str,
}

pub fn export_csv(path: &Path, projects: &[EnrichedProject]) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    for project in projects {
        let record = &project.record;
        writer.serialize(CsvRow {
            id: &record.id,
            title: &record.title,
            project_type: record.project_type.code(),
            status: record.status.code(),
            student_id: record.student_id.as_deref().unwrap_or_default(),
            student_name: project.student_name.as_deref().unwrap_or_default(),
            mentor_id: record.mentor_id.as_deref().unwrap_or_default(),
            mentor_name: project.mentor_name.as_deref().unwrap_or_default(),
            upload_date: record.upload_date.as_deref().unwrap_or_default(),
            technologies: record.technologies.join("; "),
            grade: record.grade.as_deref().unwrap_or_default(),
        })?;
    }
    writer.flush()?;
    Ok(projects.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProjectFilter, Role};
    use crate::testing::project;

    fn viewer() -> Identity {
        Identity {
            id: "a1".into(),
            name: "Root".into(),
            email: "root@uni.edu".into(),
            role: Role::Admin,
            department: None,
            year: None,
            specialization: None,
            company: None,
            phone: None,
            github_link: None,
            experience: None,
        }
    }

    #[test]
    fn empty_report_says_so() {
        let summary = summary::derive_summary(&[], &ProjectFilter::default());
        let report = build_report(&viewer(), &summary, &[]);
        assert!(report.contains("Total submissions: 0"));
        assert!(report.contains("No submissions yet."));
        assert!(report.contains("No feedback recorded."));
    }

    #[test]
    fn report_lists_labels_and_recent_work() {
        let mut first = EnrichedProject::bare(project("1", "s1", "m1", "needs_improvement"));
        first.record.upload_date = Some("2026-02-01".into());
        first.student_name = Some("Ann".into());
        let projects = vec![first];
        let summary = summary::derive_summary(&projects, &ProjectFilter::default());

        let report = build_report(&viewer(), &summary, &projects);
        assert!(report.contains("- Needs Improvement: 1"));
        assert!(report.contains("- Project 1 by Ann, mentor Unknown (project) on 2026-02-01: Needs Improvement"));
    }

    #[test]
    fn csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.csv");
        let mut p = EnrichedProject::bare(project("1", "s1", "m1", "approved"));
        p.mentor_name = Some("Dr. A".into());
        p.record.technologies = vec!["rust".into(), "sql".into()];

        assert_eq!(export_csv(&path, &[p]).unwrap(), 1);

        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert!(lines.next().unwrap().starts_with("id,title,project_type,status"));
        assert_eq!(
            lines.next().unwrap(),
            "1,Project 1,project,approved,s1,,m1,Dr. A,,rust; sql,"
        );
    }
}
