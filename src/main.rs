use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod actions;
mod aggregate;
mod api;
mod config;
mod envelope;
mod error;
mod guard;
mod models;
mod report;
mod session;
mod summary;
mod validate;

#[cfg(test)]
mod testing;

use crate::aggregate::{LoadState, Owner, ViewLoader};
use crate::api::HttpBackend;
use crate::error::PortalError;
use crate::guard::{GuardDecision, RoleGuard};
use crate::models::{
    AdminRegistration, EnrichedProject, Identity, MentorRegistration, ProfileUpdate,
    ProjectFilter, ProjectStatus, ProjectSubmission, ProjectType, Registration, Role,
    StudentRegistration, UserForm,
};
use crate::session::{Session, SessionStore};
use crate::summary::DateField;

#[derive(Parser)]
#[command(name = "portal-tracker")]
#[command(about = "Internship and project tracking for students, mentors and admins", long_about = None)]
struct Cli {
    /// Backend base URL, overrides PORTAL_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in as a student, mentor or admin
    Login {
        #[arg(long, value_enum)]
        role: Role,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in identity
    Whoami,
    /// Create an account (does not sign in)
    Register {
        #[command(subcommand)]
        kind: RegisterKind,
    },
    /// Update the signed-in profile
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[arg(long)]
        specialization: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        github_link: Option<String>,
        #[arg(long)]
        experience: Option<String>,
    },
    /// List projects visible to the signed-in user
    Projects {
        #[arg(long = "type")]
        project_type: Option<ProjectType>,
        #[arg(long)]
        status: Option<ProjectStatus>,
    },
    /// Counts and ratios over visible projects
    Summary {
        #[arg(long = "type")]
        project_type: Option<ProjectType>,
        #[arg(long)]
        status: Option<ProjectStatus>,
    },
    /// Most recent submissions or reviews
    Recent {
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[arg(long, value_enum, default_value = "upload")]
        by: DateField,
    },
    /// Reviewed projects and those still awaiting feedback
    Reviews,
    /// Students behind a mentor's projects
    Students,
    /// Review a project (mentor)
    Feedback {
        #[arg(long)]
        project: String,
        #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(validate::GRADES))]
        grade: String,
        #[arg(long)]
        remarks: String,
    },
    /// Submit a project or internship (student)
    Submit {
        #[arg(long)]
        title: String,
        #[arg(long = "type", default_value = "project")]
        project_type: ProjectType,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "")]
        company: String,
        /// YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// YYYY-MM-DD
        #[arg(long)]
        end: String,
        /// Comma separated
        #[arg(long)]
        technologies: String,
        #[arg(long)]
        mentor: String,
        #[arg(long, default_value = "")]
        url: String,
        #[arg(long)]
        certificate: Option<PathBuf>,
    },
    /// Mentors available for new submissions
    Mentors,
    /// Registry and project totals (admin)
    Overview,
    /// Manage users (admin)
    Users {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Write a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export visible projects as CSV
    Export {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[derive(Subcommand)]
enum RegisterKind {
    Student {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        department: String,
        #[arg(long, default_value = "")]
        year: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        github_link: String,
    },
    Mentor {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        department: String,
        #[arg(long, default_value = "")]
        specialization: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        experience: String,
        #[arg(long, default_value = "")]
        company: String,
    },
    Admin {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum UserAction {
    List {
        #[arg(long, value_enum)]
        role: Option<Role>,
    },
    Add {
        #[command(flatten)]
        form: UserArgs,
    },
    Update {
        #[arg(long)]
        id: String,
        #[command(flatten)]
        form: UserArgs,
    },
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[derive(clap::Args)]
struct UserArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long, value_enum)]
    role: Role,
    #[arg(long)]
    password: Option<String>,
    #[arg(long)]
    department: Option<String>,
    #[arg(long)]
    year: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    specialization: Option<String>,
    #[arg(long)]
    experience: Option<String>,
    #[arg(long)]
    company: Option<String>,
}

impl From<UserArgs> for UserForm {
    fn from(args: UserArgs) -> Self {
        UserForm {
            name: args.name,
            email: args.email,
            role: Some(args.role),
            password: args.password,
            department: args.department,
            year: args.year,
            phone: args.phone,
            specialization: args.specialization,
            experience: args.experience,
            company: args.company,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("portal_tracker=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = config::ClientConfig::from_env().context("invalid client configuration")?;
    if let Some(url) = cli.api_url.as_deref() {
        config = config.with_api_url(url);
    }

    let store = SessionStore::new(config.session_file.clone());
    let token = store
        .load()
        .context("failed to read the stored session")?
        .and_then(|s| s.token);
    let backend = HttpBackend::new(&config)
        .context("failed to build HTTP client")?
        .with_token(token);
    let session = Session::new(Arc::new(backend), Some(store));
    session.restore()?;

    match cli.command {
        Commands::Login {
            role,
            email,
            password,
        } => {
            let outcome = session.login(&email, &password, role).await;
            if !outcome.success {
                bail!(outcome.message);
            }
            if let Some(identity) = outcome.identity {
                println!("Welcome, {}! Signed in as {}.", identity.name, identity.role);
            }
        }
        Commands::Logout => {
            session.logout();
            println!("Signed out.");
        }
        Commands::Whoami => match session.identity() {
            Some(identity) => {
                println!("{} <{}> ({}, id {})", identity.name, identity.email, identity.role, identity.id);
            }
            None => println!("Not signed in."),
        },
        Commands::Register { kind } => {
            let registration = match kind {
                RegisterKind::Student {
                    name,
                    email,
                    password,
                    department,
                    year,
                    phone,
                    github_link,
                } => Registration::Student(StudentRegistration {
                    name,
                    email,
                    password,
                    department,
                    year,
                    phone,
                    github_link,
                }),
                RegisterKind::Mentor {
                    name,
                    email,
                    password,
                    department,
                    specialization,
                    phone,
                    experience,
                    company,
                } => Registration::Mentor(MentorRegistration {
                    name,
                    email,
                    password,
                    department,
                    specialization,
                    phone,
                    experience,
                    company,
                }),
                RegisterKind::Admin {
                    name,
                    email,
                    password,
                } => Registration::Admin(AdminRegistration {
                    name,
                    email,
                    password,
                }),
            };
            let outcome = session.register(&registration).await;
            if !outcome.success {
                bail!(outcome.message);
            }
            println!("{}", outcome.message);
        }
        Commands::Profile {
            name,
            email,
            department,
            year,
            specialization,
            company,
            phone,
            github_link,
            experience,
        } => {
            let identity = signed_in(&session)?;
            let update = ProfileUpdate {
                name,
                email,
                department,
                year,
                specialization,
                company,
                phone,
                github_link,
                experience,
            };
            if update.is_empty() {
                println!("Nothing to update.");
                return Ok(());
            }
            let outcome = session
                .update_profile(&identity.id, identity.role, &update)
                .await;
            if !outcome.success {
                bail!(outcome.message);
            }
            println!("{}", outcome.message);
        }
        Commands::Projects {
            project_type,
            status,
        } => {
            let identity = signed_in(&session)?;
            let filter = ProjectFilter {
                project_type,
                status,
            };
            let state = load_view(&session, &identity).await?.filtered(&filter);
            match state {
                LoadState::Ready(projects) => {
                    for project in &projects {
                        print_project(project);
                    }
                }
                LoadState::Empty => println!("No projects found with the selected filters."),
                LoadState::Failed(message) => bail!(message),
            }
        }
        Commands::Summary {
            project_type,
            status,
        } => {
            let identity = signed_in(&session)?;
            let projects = ready_projects(load_view(&session, &identity).await?)?;
            let filter = ProjectFilter {
                project_type,
                status,
            };
            let view = summary::derive_summary(&projects, &filter);
            println!("Total submissions: {}", view.total);
            for (code, count) in &view.by_status {
                println!("  {}: {}", summary::status_label(code), count);
            }
            for (code, count) in &view.by_type {
                println!("  {}: {}", summary::status_label(code), count);
            }
            println!("Approval rate: {:.1}%", view.approval_rate * 100.0);
            if identity.role != Role::Student {
                println!(
                    "Students per mentor: {:.1} ({} students, {} mentors)",
                    view.student_to_mentor_ratio, view.distinct_students, view.distinct_mentors
                );
            }
        }
        Commands::Recent { limit, by } => {
            let identity = signed_in(&session)?;
            let projects = ready_projects(load_view(&session, &identity).await?)?;
            let recent = summary::recent_n(&projects, limit, by);
            if recent.is_empty() {
                println!("No submissions yet.");
            }
            for project in recent {
                print_project(project);
            }
        }
        Commands::Reviews => {
            let identity = signed_in(&session)?;
            let projects = ready_projects(load_view(&session, &identity).await?)?;

            let reviewed = summary::with_feedback(&projects);
            println!("Reviewed: {}", reviewed.len());
            for project in reviewed {
                println!(
                    "- [{}] {} grade {} on {}: {}",
                    project.record.id,
                    project.record.title,
                    project.record.grade.as_deref().unwrap_or("-"),
                    project.record.feedback_date.as_deref().unwrap_or("-"),
                    project.record.feedback.as_deref().unwrap_or_default()
                );
            }

            let awaiting = summary::awaiting_feedback(&projects);
            println!("Awaiting feedback: {}", awaiting.len());
            for project in awaiting {
                print_project(project);
            }
        }
        Commands::Students => {
            let identity = guarded(&session, Role::Mentor)?;
            let projects = ready_projects(load_view(&session, &identity).await?)?;
            let roster = aggregate::load_roster(session.backend().as_ref(), &projects)
                .await
                .map_err(|e| user_facing(e, aggregate::LOAD_FAILED))?;
            println!("My students: {}", roster.len());
            for row in summary::student_progress(&projects) {
                println!(
                    "- {} ({}): {} projects, {} approved, {} pending",
                    row.student_name,
                    row.student_id,
                    row.project_count,
                    row.approved_count,
                    row.pending_count
                );
            }
        }
        Commands::Feedback {
            project,
            grade,
            remarks,
        } => {
            let identity = guarded(&session, Role::Mentor)?;
            let projects = actions::submit_feedback(
                session.backend().as_ref(),
                &identity,
                &project,
                &grade,
                &remarks,
            )
            .await
            .map_err(|e| user_facing(e, actions::FEEDBACK_FAILED))?;
            println!("Feedback saved. {} projects assigned to you.", projects.len());
        }
        Commands::Submit {
            title,
            project_type,
            description,
            company,
            start,
            end,
            technologies,
            mentor,
            url,
            certificate,
        } => {
            let identity = guarded(&session, Role::Student)?;
            let submission = ProjectSubmission {
                title,
                project_type,
                description,
                company,
                start_date: start,
                end_date: end,
                technologies,
                mentor_id: mentor,
                project_url: url,
                certificate,
            };
            actions::submit_project(session.backend().as_ref(), &identity, &submission)
                .await
                .map_err(|e| user_facing(e, actions::SUBMIT_FAILED))?;
            println!("Project submitted.");
        }
        Commands::Mentors => {
            let mentors = session
                .backend()
                .mentor_directory()
                .await
                .map_err(|e| user_facing(e, aggregate::LOAD_FAILED))?;
            for mentor in mentors {
                println!(
                    "- {} ({}) {}",
                    mentor.display_name(),
                    mentor.id.as_deref().unwrap_or("-"),
                    mentor.specialization.as_deref().unwrap_or_default()
                );
            }
        }
        Commands::Overview => {
            guarded(&session, Role::Admin)?;
            let overview = aggregate::load_admin_overview(session.backend().as_ref())
                .await
                .map_err(|e| user_facing(e, aggregate::LOAD_FAILED))?;
            println!("Users: {}", overview.users_total);
            println!("Students: {}", overview.students);
            println!("Mentors: {}", overview.mentors);
            println!("Students per mentor: {:.1}", overview.registry_ratio);
            println!("Projects: {}", overview.summary.total);
            println!("Approved: {}", overview.summary.approved);
            println!(
                "Under review: {}",
                overview.summary.status_count(&ProjectStatus::Submitted)
            );
            println!(
                "Needs improvement: {}",
                overview.summary.status_count(&ProjectStatus::NeedsImprovement)
            );
            println!(
                "Pending: {}",
                overview.summary.status_count(&ProjectStatus::Pending)
            );
            println!(
                "Internships: {}, projects: {}",
                overview.summary.type_count(&ProjectType::Internship),
                overview.summary.type_count(&ProjectType::Project)
            );
        }
        Commands::Users { action } => {
            guarded(&session, Role::Admin)?;
            let backend = session.backend();
            match action {
                UserAction::List { role } => {
                    let users = actions::list_users(backend.as_ref(), role)
                        .await
                        .map_err(|e| user_facing(e, "Failed to load users. Please try again later."))?;
                    let (students, mentors, admins) = actions::role_counts(&users);
                    println!(
                        "{} users ({students} students, {mentors} mentors, {admins} admins)",
                        users.len()
                    );
                    for user in users {
                        println!(
                            "- {} <{}> {} ({})",
                            user.display_name(),
                            user.email.as_deref().unwrap_or_default(),
                            user.role.as_deref().unwrap_or("-"),
                            user.id.as_deref().unwrap_or("-")
                        );
                    }
                }
                UserAction::Add { form } => {
                    let user = actions::save_user(backend.as_ref(), None, form.into())
                        .await
                        .map_err(|e| user_facing(e, "Failed to add user. Please try again."))?;
                    println!("Added {}.", user.display_name());
                }
                UserAction::Update { id, form } => {
                    let user = actions::save_user(backend.as_ref(), Some(&id), form.into())
                        .await
                        .map_err(|e| user_facing(e, actions::USER_UPDATE_FAILED))?;
                    println!("Updated {}.", user.display_name());
                }
                UserAction::Delete { id } => {
                    backend
                        .delete_user(&id)
                        .await
                        .map_err(|e| user_facing(e, "Failed to delete user. Please try again."))?;
                    println!("Deleted {id}.");
                }
            }
        }
        Commands::Report { out } => {
            let identity = signed_in(&session)?;
            let projects = ready_projects(load_view(&session, &identity).await?)?;
            let view = summary::derive_summary(&projects, &ProjectFilter::default());
            let report = report::build_report(&identity, &view, &projects);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { csv } => {
            let identity = signed_in(&session)?;
            let projects = ready_projects(load_view(&session, &identity).await?)?;
            let written = report::export_csv(&csv, &projects)?;
            println!("Exported {written} projects to {}.", csv.display());
        }
    }

    Ok(())
}

fn guarded(session: &Session, role: Role) -> anyhow::Result<Identity> {
    let guard = RoleGuard::new(role);
    let snapshot = session.snapshot();
    guard.require(&snapshot).with_context(|| match guard.check(&snapshot) {
        GuardDecision::Redirect(target) => format!("this command needs a {role} session (go to {target})"),
        _ => "session is still loading".to_string(),
    })
}

fn signed_in(session: &Session) -> anyhow::Result<Identity> {
    session
        .identity()
        .ok_or(PortalError::Unauthenticated)
        .context("run `portal-tracker login` first")
}

/// Loads the identity's projects; Ctrl-C tears the view down mid-flight.
async fn load_view(session: &Session, identity: &Identity) -> anyhow::Result<LoadState> {
    let loader = ViewLoader::new(session.backend(), Owner::of(identity));
    let teardown = loader.teardown_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            teardown.cancel();
        }
    });

    let state = loader.load().await;
    watcher.abort();
    state.ok_or_else(|| anyhow!("interrupted"))
}

fn ready_projects(state: LoadState) -> anyhow::Result<Vec<EnrichedProject>> {
    match state {
        LoadState::Ready(projects) => Ok(projects),
        LoadState::Empty => Ok(Vec::new()),
        LoadState::Failed(message) => Err(anyhow!(message)),
    }
}

/// Validation problems are listed per field; anything else becomes `fallback`.
fn user_facing(err: PortalError, fallback: &str) -> anyhow::Error {
    match err {
        PortalError::Validation(fields) => {
            for (field, message) in &fields {
                eprintln!("  {field}: {message}");
            }
            anyhow!("please fix the fields above")
        }
        other => {
            warn!(error = %other, "request failed");
            anyhow!(fallback.to_string())
        }
    }
}

fn print_project(project: &EnrichedProject) {
    let record = &project.record;
    let mut who = Vec::new();
    if let Some(student) = &project.student_name {
        who.push(format!("student {student}"));
    }
    if let Some(mentor) = &project.mentor_name {
        who.push(format!("mentor {mentor}"));
    }
    println!(
        "- [{}] {} ({}, {}){}{}",
        record.id,
        record.title,
        record.project_type.code(),
        summary::status_label(record.status.code()),
        if who.is_empty() { String::new() } else { format!(" {}", who.join(", ")) },
        record
            .upload_date
            .as_deref()
            .map(|d| format!(" submitted {d}"))
            .unwrap_or_default()
    );
}
