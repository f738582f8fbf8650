//! Skillpath CLI - competency graphs and personalized learning paths

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use skillpath_core::CoreContext;
use skillpath_core::config::{CONFIG_KEYS, Config};
use skillpath_core::domain::enrollment::{
    ConsumptionUpdate, EnrollmentRequest, PathOrigin, PersonalizedPath,
};
use skillpath_core::domain::graph::{NestingUpdate, NewSkill, Skill, SkillUpdate};
use skillpath_core::domain::patch::Patch;
use skillpath_core::domain::repositories::{
    NewRepository, Pagination, RepositoryFilter, RepositoryUpdate, SkillRepository,
};
use skillpath_core::domain::resolver::ResolveMode;
use skillpath_core::domain::units::{TemplatePath, UnitCatalog, UnitFilter, UnitSpec};
use tracing::warn;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "skillpath")]
#[command(author, version, about = "Competency graphs and personalized learning paths", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage skill repositories
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Manage skills and their nesting
    Skill {
        #[command(subcommand)]
        action: SkillAction,
    },

    /// Manage learning units
    Unit {
        #[command(subcommand)]
        action: UnitAction,
    },

    /// Manage template paths
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Enroll learners and record consumption
    Path {
        #[command(subcommand)]
        action: PathAction,
    },

    /// Inspect and edit learning histories
    Learner {
        #[command(subcommand)]
        action: LearnerAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum RepoAction {
    /// Create a repository
    Create {
        /// Owner id
        owner: String,
        /// Repository name
        name: String,
        #[arg(long)]
        repo_version: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List repositories
    List {
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        repo_version: Option<String>,
        /// Zero-based page
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Show a repository with its skills
    Show { id: Uuid },
    /// Update a repository
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "clear_version")]
        repo_version: Option<String>,
        #[arg(long)]
        clear_version: bool,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a repository and all of its skills
    Delete { id: Uuid },
}

#[derive(Subcommand)]
enum SkillAction {
    /// Add a skill to a repository
    Add {
        repository: Uuid,
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long, default_value_t = 0)]
        level: i32,
        /// Existing skills to nest under the new one
        #[arg(long, value_delimiter = ',')]
        nests: Vec<Uuid>,
        /// Existing skills to nest the new one under
        #[arg(long, value_delimiter = ',')]
        under: Vec<Uuid>,
    },
    /// Show a skill
    Show { id: Uuid },
    /// List the skills of a repository
    List { repository: Uuid },
    /// Replace a skill's nested skills or parents
    Nest {
        id: Uuid,
        /// New nested skills (empty to clear)
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        children: Option<Vec<Uuid>>,
        /// New parent skills (empty to clear)
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        parents: Option<Vec<Uuid>>,
    },
    /// Update a skill's attributes
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        level: Option<i32>,
    },
    /// Move a skill and its descendants to another repository
    Move { id: Uuid, repository: Uuid },
    /// Delete a skill
    Delete { id: Uuid },
}

#[derive(Subcommand)]
enum UnitAction {
    /// Register a learning unit
    Register {
        title: String,
        #[arg(long, value_delimiter = ',')]
        requires: Vec<Uuid>,
        #[arg(long, value_delimiter = ',')]
        teaches: Vec<Uuid>,
    },
    /// List all units
    List,
}

#[derive(Subcommand)]
enum TemplateAction {
    /// Register a template path
    Create {
        title: String,
        #[arg(long, value_delimiter = ',', required = true)]
        units: Vec<Uuid>,
    },
    /// List template paths
    List,
}

#[derive(Subcommand)]
enum PathAction {
    /// Enroll a learner into a new path
    Enroll {
        learner: String,
        /// Copy a template path
        #[arg(long, conflicts_with = "goals")]
        template: Option<Uuid>,
        /// Resolve a path towards these goal skills
        #[arg(long, value_delimiter = ',')]
        goals: Option<Vec<Uuid>>,
        /// Resolver mode (greedy or optimal); configured default when absent
        #[arg(long)]
        mode: Option<String>,
        /// Resolver time bound in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Resolve without creating the path
        #[arg(long)]
        dry_run: bool,
    },
    /// Show a path
    Show { id: Uuid },
    /// Record consumption of a unit
    Consume {
        path: Uuid,
        unit: Uuid,
        #[arg(long)]
        minutes: Option<u32>,
        #[arg(long)]
        score: Option<f64>,
        #[arg(long)]
        finished: bool,
    },
}

#[derive(Subcommand)]
enum LearnerAction {
    /// Show a learner's history
    Show { learner: String },
    /// List a learner's paths
    Paths { learner: String },
    /// Mark skills as learned
    Learn {
        learner: String,
        #[arg(required = true, value_delimiter = ',')]
        skills: Vec<Uuid>,
    },
    /// Remove a learned skill
    Forget { learner: String, skill: Uuid },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Show configuration file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("skillpath=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let out = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Config { action } => cmd_config(action, out),
        Commands::Doctor => cmd_doctor(out).await,
        command => {
            let ctx = CoreContext::from_config(Config::load()?).await?;
            match command {
                Commands::Repo { action } => cmd_repo(&ctx, action, out).await,
                Commands::Skill { action } => cmd_skill(&ctx, action, out).await,
                Commands::Unit { action } => cmd_unit(&ctx, action, out).await,
                Commands::Template { action } => cmd_template(&ctx, action, out).await,
                Commands::Path { action } => cmd_path(&ctx, action, out).await,
                Commands::Learner { action } => cmd_learner(&ctx, action, out).await,
                Commands::Config { .. } | Commands::Doctor => Ok(()),
            }
        }
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    /// Print `value` as JSON, or run the text renderer
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(value),
        }
        Ok(())
    }

    fn note(&self, message: impl AsRef<str>) {
        if !self.quiet && self.format == OutputFormat::Text {
            println!("{}", message.as_ref());
        }
    }
}

fn print_repository(r: &SkillRepository) {
    println!("Repository: {}", r.name);
    println!("  ID: {}", r.id);
    println!("  Owner: {}", r.owner_id);
    if let Some(version) = &r.version {
        println!("  Version: {}", version);
    }
    if let Some(desc) = &r.description {
        println!("  Description: {}", desc);
    }
    println!("  Updated: {}", r.updated_at.format("%Y-%m-%d %H:%M:%S"));
}

fn print_skill(s: &Skill) {
    println!("Skill: {} (level {})", s.name, s.level);
    println!("  ID: {}", s.id);
    println!("  Repository: {}", s.repository_id);
    if let Some(desc) = &s.description {
        println!("  Description: {}", desc);
    }
    if !s.nested_skill_ids.is_empty() {
        println!("  Nests: {}", join_ids(&s.nested_skill_ids));
    }
    if !s.parent_skill_ids.is_empty() {
        println!("  Nested under: {}", join_ids(&s.parent_skill_ids));
    }
}

fn print_path(p: &PersonalizedPath) {
    println!("Path: {}", p.id);
    println!("  Learner: {}", p.learner_id);
    println!("  Origin: {}", p.origin);
    println!("  Mode: {}", p.mode);
    println!("  Status: {}", p.status());
    for unit in &p.units {
        let mut line = format!("  {:>3}. {} [{}]", unit.position + 1, unit.unit_id, unit.status);
        if let Some(minutes) = unit.actual_processing_time_minutes {
            line.push_str(&format!(" {}min", minutes));
        }
        if let Some(score) = unit.test_performance {
            line.push_str(&format!(" score {:.2}", score));
        }
        println!("{}", line);
    }
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_repo(ctx: &CoreContext, action: RepoAction, out: Output) -> anyhow::Result<()> {
    let manager = ctx.repository_manager();

    match action {
        RepoAction::Create {
            owner,
            name,
            repo_version,
            description,
        } => {
            let mut new = NewRepository::new(owner, name);
            new.version = repo_version;
            new.description = description;
            let repo = manager.create_repository(new).await?;
            out.note("Repository created.");
            out.emit(&repo, print_repository)?;
        }
        RepoAction::List {
            owner,
            name,
            repo_version,
            page,
            page_size,
        } => {
            let filter = RepositoryFilter {
                owner_id: owner,
                name,
                version: repo_version,
            };
            let repos = manager
                .list_repositories(&filter, Pagination { page, page_size })
                .await?;
            out.emit(&repos, |repos| {
                if repos.is_empty() {
                    println!("No repositories found.");
                }
                for r in repos {
                    println!(
                        "  {} - {} {} ({})",
                        r.id,
                        r.name,
                        r.version.as_deref().unwrap_or("-"),
                        r.owner_id
                    );
                }
            })?;
        }
        RepoAction::Show { id } => {
            let detail = manager.get_repository(id).await?;
            out.emit(&detail, |detail| {
                print_repository(&detail.repository);
                println!("  Skills: {}", detail.skills.len());
                for s in &detail.skills {
                    println!("    {} - {}", s.id, s.name);
                }
            })?;
        }
        RepoAction::Update {
            id,
            name,
            repo_version,
            clear_version,
            description,
        } => {
            let update = RepositoryUpdate {
                name,
                version: if clear_version {
                    Patch::Clear
                } else {
                    Patch::from_option(repo_version)
                },
                description: Patch::from_option(description),
            };
            let repo = manager.update_repository(id, update).await?;
            out.note("Repository updated.");
            out.emit(&repo, print_repository)?;
        }
        RepoAction::Delete { id } => {
            manager.delete_repository(id).await?;
            out.note(format!("Repository '{}' deleted.", id));
        }
    }
    Ok(())
}

async fn cmd_skill(ctx: &CoreContext, action: SkillAction, out: Output) -> anyhow::Result<()> {
    let store = ctx.graph_store();

    match action {
        SkillAction::Add {
            repository,
            name,
            description,
            level,
            nests,
            under,
        } => {
            let mut new = NewSkill::new(repository, name)
                .with_level(level)
                .nesting(nests)
                .nested_under(under);
            new.description = description;
            let skill = store.add_skill(new).await?;
            out.note("Skill created.");
            out.emit(&skill, print_skill)?;
        }
        SkillAction::Show { id } => {
            let skill = store.get_skill(id).await?;
            out.emit(&skill, print_skill)?;
        }
        SkillAction::List { repository } => {
            let skills = store.list_skills(repository).await?;
            out.emit(&skills, |skills| {
                if skills.is_empty() {
                    println!("No skills in this repository.");
                }
                for s in skills {
                    println!("  {} - {} (level {})", s.id, s.name, s.level);
                }
            })?;
        }
        SkillAction::Nest {
            id,
            children,
            parents,
        } => {
            if children.is_none() && parents.is_none() {
                anyhow::bail!("Specify --children and/or --parents");
            }
            let update = NestingUpdate {
                nested: children.map(Patch::Set).unwrap_or_default(),
                parents: parents.map(Patch::Set).unwrap_or_default(),
            };
            let skill = store.update_nesting(id, update).await?;
            out.note("Nesting updated.");
            out.emit(&skill, print_skill)?;
        }
        SkillAction::Update {
            id,
            name,
            description,
            level,
        } => {
            let update = SkillUpdate {
                name,
                description: Patch::from_option(description),
                level,
            };
            let skill = store.update_skill(id, update).await?;
            out.emit(&skill, print_skill)?;
        }
        SkillAction::Move { id, repository } => {
            let skill = store.move_to_repository(id, repository).await?;
            out.note("Skill moved.");
            out.emit(&skill, print_skill)?;
        }
        SkillAction::Delete { id } => {
            store.delete_skill(id).await?;
            out.note(format!("Skill '{}' deleted.", id));
        }
    }
    Ok(())
}

async fn cmd_unit(ctx: &CoreContext, action: UnitAction, out: Output) -> anyhow::Result<()> {
    match action {
        UnitAction::Register {
            title,
            requires,
            teaches,
        } => {
            let unit = UnitSpec::new(title).requires(requires).teaches(teaches);
            ctx.catalog().register_unit(&unit).await?;
            out.emit(&unit, |u| println!("Unit registered: {} ({})", u.title, u.id))?;
        }
        UnitAction::List => {
            let units = ctx.catalog().list_candidate_units(&UnitFilter::all()).await?;
            out.emit(&units, |units| {
                if units.is_empty() {
                    println!("No units registered.");
                }
                for u in units {
                    println!(
                        "  {} - {} (requires {}, teaches {})",
                        u.id,
                        u.title,
                        u.required_skill_ids.len(),
                        u.teaching_goal_ids.len()
                    );
                }
            })?;
        }
    }
    Ok(())
}

async fn cmd_template(ctx: &CoreContext, action: TemplateAction, out: Output) -> anyhow::Result<()> {
    match action {
        TemplateAction::Create { title, units } => {
            let template = TemplatePath {
                id: Uuid::new_v4(),
                title,
                unit_ids: units,
            };
            ctx.catalog().register_template_path(&template).await?;
            out.emit(&template, |t| {
                println!("Template registered: {} ({})", t.title, t.id)
            })?;
        }
        TemplateAction::List => {
            let templates = ctx.catalog().list_template_paths().await?;
            out.emit(&templates, |templates| {
                if templates.is_empty() {
                    println!("No template paths registered.");
                }
                for t in templates {
                    println!("  {} - {} ({} units)", t.id, t.title, t.unit_ids.len());
                }
            })?;
        }
    }
    Ok(())
}

async fn cmd_path(ctx: &CoreContext, action: PathAction, out: Output) -> anyhow::Result<()> {
    let engine = ctx.enrollment_engine();

    match action {
        PathAction::Enroll {
            learner,
            template,
            goals,
            mode,
            timeout_secs,
            dry_run,
        } => {
            let mode = match mode {
                Some(raw) => ResolveMode::parse(&raw).ok_or_else(|| {
                    anyhow::anyhow!("Invalid resolver mode '{}'. Use 'greedy' or 'optimal'.", raw)
                })?,
                None => ctx.config().resolver.default_mode,
            };
            let origin = PathOrigin::from_parts(template, goals)?;
            let mut request = EnrollmentRequest::new(learner, origin).with_mode(mode);
            if let Some(secs) = timeout_secs {
                request = request.with_timeout(Duration::from_secs(secs));
            }

            if dry_run {
                let preview = engine.preview(request).await?;
                out.emit(&preview, |p| {
                    println!("Resolved {} unit(s) ({} mode):", p.unit_ids.len(), p.mode);
                    for (i, id) in p.unit_ids.iter().enumerate() {
                        println!("  {:>3}. {}", i + 1, id);
                    }
                })?;
            } else {
                let path = engine.enroll(request).await?;
                out.note("Learner enrolled.");
                out.emit(&path, print_path)?;
            }
        }
        PathAction::Show { id } => {
            let path = engine.get_path(id).await?;
            out.emit(&path, print_path)?;
        }
        PathAction::Consume {
            path,
            unit,
            minutes,
            score,
            finished,
        } => {
            let update = ConsumptionUpdate {
                actual_processing_time_minutes: minutes,
                test_performance: score,
                finished,
            };
            let path = engine.record_consumption(path, unit, update).await?;
            out.note("Consumption recorded.");
            out.emit(&path, print_path)?;
        }
    }
    Ok(())
}

async fn cmd_learner(ctx: &CoreContext, action: LearnerAction, out: Output) -> anyhow::Result<()> {
    let tracker = ctx.tracker();

    match action {
        LearnerAction::Show { learner } => {
            let history = tracker.history(&learner).await?;
            out.emit(&history, |h| {
                println!("Learner: {}", h.learner_id);
                println!("  Since: {}", h.created_at.format("%Y-%m-%d %H:%M:%S"));
                println!("  Learned skills: {}", h.learned_skills.len());
                for s in &h.learned_skills {
                    println!("    {} ({})", s.skill_id, s.learned_at.format("%Y-%m-%d"));
                }
                println!("  Paths: {}", h.paths.len());
                for p in &h.paths {
                    println!(
                        "    {} [{}] {}/{} finished",
                        p.id, p.status, p.finished_units, p.unit_count
                    );
                }
            })?;
        }
        LearnerAction::Paths { learner } => {
            let paths = tracker.list_paths(&learner).await?;
            out.emit(&paths, |paths| {
                if paths.is_empty() {
                    println!("No paths found.");
                }
                for p in paths {
                    println!(
                        "  {} [{}] {} - {}/{} finished",
                        p.id, p.status, p.origin, p.finished_units, p.unit_count
                    );
                }
            })?;
        }
        LearnerAction::Learn { learner, skills } => {
            let added = tracker.add_learning_progress(&learner, &skills).await?;
            out.emit(&added, |added| {
                println!("{} skill(s) newly learned.", added.len())
            })?;
        }
        LearnerAction::Forget { learner, skill } => {
            tracker.delete_learning_progress(&learner, skill).await?;
            out.note(format!("Skill '{}' removed from '{}'.", skill, learner));
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, out: Output) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            out.note(format!("Set {} = {}", key, value));
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for key in CONFIG_KEYS {
                println!("{} = {}", key, config.get(key)?);
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(out: Output) -> anyhow::Result<()> {
    let mut all_ok = true;
    println!("Skillpath Health Check");
    println!("======================");
    println!();

    let config = match Config::load() {
        Ok(config) => {
            println!("[OK] Configuration: Valid");
            config
        }
        Err(e) => {
            println!("[!!] Configuration: {}", e);
            return Err(e);
        }
    };

    match CoreContext::from_config(config.clone()).await {
        Ok(ctx) => match ctx.database().health_check().await {
            Ok(()) => println!("[OK] Database: {}", ctx.database().path().display()),
            Err(e) => {
                all_ok = false;
                println!("[!!] Database: {}", e);
            }
        },
        Err(e) => {
            all_ok = false;
            println!("[!!] Database: {}", e);
        }
    }

    match &config.resolver.endpoint {
        Some(endpoint) => println!("[OK] Resolver: {}", endpoint),
        None => {
            all_ok = false;
            warn!("Resolver endpoint not configured");
            println!("[!!] Resolver: Not configured");
            println!("     Run `skillpath config set resolver.endpoint <url>`");
        }
    }

    println!();
    if all_ok {
        println!("All checks passed.");
    } else {
        out.note("Some checks need attention.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_enroll_with_goal_list() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "skillpath".to_string(),
            "path".to_string(),
            "enroll".to_string(),
            "learner-1".to_string(),
            "--goals".to_string(),
            format!("{},{}", a, b),
        ])
        .unwrap();

        match cli.command {
            Commands::Path {
                action: PathAction::Enroll { goals, template, .. },
            } => {
                assert_eq!(goals, Some(vec![a, b]));
                assert!(template.is_none());
            }
            _ => panic!("expected path enroll"),
        }
    }

    #[test]
    fn test_enroll_rejects_both_origins() {
        let id = Uuid::new_v4().to_string();
        let result = Cli::try_parse_from([
            "skillpath", "path", "enroll", "learner-1", "--template", &id, "--goals", &id,
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_nest_with_empty_children_clears() {
        let id = Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from(["skillpath", "skill", "nest", &id, "--children"]).unwrap();
        match cli.command {
            Commands::Skill {
                action: SkillAction::Nest { children, parents, .. },
            } => {
                assert_eq!(children, Some(Vec::new()));
                assert!(parents.is_none());
            }
            _ => panic!("expected skill nest"),
        }
    }

    #[test]
    fn test_global_json_flag() {
        let cli = Cli::try_parse_from(["skillpath", "config", "list", "--format", "json"]).unwrap();
        assert!(cli.format == OutputFormat::Json);
    }
}
