//! CLI command definitions for gradebox.
//!
//! Every command works against a content tree on disk and prints JSON to
//! stdout, so output composes with the usual shell tooling.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::RuntimeSettings;
use crate::content::embeds::{parse_embeds, EmbedType};
use crate::content::resolver::{self, ResolvedExercise};
use crate::content::store::ContentStore;
use crate::exercise::Exercise;
use crate::grading::{Action, Grader};
use crate::sandbox::python::PythonSandbox;
use crate::sandbox::sql::SqlSandbox;

/// Default content tree root.
const DEFAULT_CONTENT_DIR: &str = "./content";

/// Interactive-exercise toolkit: parse lesson embeds, resolve exercises,
/// and grade submissions against sandboxed engines.
#[derive(Parser)]
#[command(name = "gradebox")]
#[command(about = "Resolve, execute, and grade interactive course exercises")]
#[command(version)]
#[command(
    long_about = "gradebox works against a course content tree (courses/, shared/).\n\nExample usage:\n  gradebox resolve --course sql101 --module module-02 --exercise ex-top\n  gradebox submit --course sql101 --module module-02 --exercise ex-top --file answer.sql"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Content tree root directory.
    #[arg(short, long, default_value = DEFAULT_CONTENT_DIR, global = true, env = "GRADEBOX_CONTENT_DIR")]
    pub content: PathBuf,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Split a markdown lesson into text segments and embed directives.
    Parse(ParseArgs),

    /// Resolve an exercise with its datasets and schema.
    Resolve(ResolveArgs),

    /// Execute a submission for feedback, without grading.
    Run(ExecuteArgs),

    /// Grade a submission and print the resulting progress delta.
    Submit(SubmitArgs),

    /// Validate every exercise document in the content tree.
    Check(CheckArgs),
}

/// Arguments for `gradebox parse`.
#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// Markdown file to parse.
    pub file: PathBuf,

    /// Print only the embed directives, not the full segment list.
    #[arg(long)]
    pub embeds_only: bool,

    /// Restrict embed output to one directive type (exercise, dataset, colab).
    #[arg(long)]
    pub embed_type: Option<String>,
}

/// Arguments for `gradebox resolve`.
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    #[arg(long)]
    pub course: String,

    #[arg(long)]
    pub module: String,

    #[arg(short, long)]
    pub exercise: String,

    /// Keep reference solutions and hidden test bodies in the output.
    #[arg(long)]
    pub include_solutions: bool,
}

/// Arguments for `gradebox run`.
#[derive(Parser, Debug)]
pub struct ExecuteArgs {
    #[arg(long)]
    pub course: String,

    #[arg(long)]
    pub module: String,

    #[arg(short, long)]
    pub exercise: String,

    /// File holding the submission; "-" reads stdin.
    #[arg(short, long)]
    pub file: String,
}

/// Arguments for `gradebox submit`.
#[derive(Parser, Debug)]
pub struct SubmitArgs {
    #[arg(long)]
    pub course: String,

    #[arg(long)]
    pub module: String,

    #[arg(short, long)]
    pub exercise: String,

    /// File holding the submission; "-" reads stdin.
    #[arg(short, long)]
    pub file: String,

    /// Prior attempt count for this (learner, exercise) pair.
    #[arg(long, default_value = "0")]
    pub attempts: u32,
}

/// Arguments for `gradebox check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Also verify that every declared dataset and schema exists.
    #[arg(long, default_value = "true")]
    pub dependencies: bool,
}

/// Parses CLI arguments. Split from execution so logging can initialize
/// with the parsed log level first.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Executes a parsed CLI invocation.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let store = ContentStore::new(&cli.content);

    match cli.command {
        Commands::Parse(args) => parse_command(args).await,
        Commands::Resolve(args) => resolve_command(&store, args).await,
        Commands::Run(args) => execute_command(&store, &cli.content, args, Action::Run, 0).await,
        Commands::Submit(args) => {
            let execute = ExecuteArgs {
                course: args.course,
                module: args.module,
                exercise: args.exercise,
                file: args.file,
            };
            execute_command(&store, &cli.content, execute, Action::Submit, args.attempts).await
        }
        Commands::Check(args) => check_command(&store, &cli.content, args).await,
    }
}

async fn parse_command(args: ParseArgs) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let parsed = parse_embeds(&text);

    if args.embeds_only {
        let filter = args
            .embed_type
            .as_deref()
            .map(parse_embed_type)
            .transpose()?;
        let embeds: Vec<_> = parsed
            .embeds
            .into_iter()
            .filter(|e| filter.map(|f| e.kind == f).unwrap_or(true))
            .collect();
        println!("{}", serde_json::to_string_pretty(&embeds)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&parsed.segments)?);
    }
    Ok(())
}

fn parse_embed_type(name: &str) -> anyhow::Result<EmbedType> {
    match name {
        "exercise" => Ok(EmbedType::Exercise),
        "dataset" => Ok(EmbedType::Dataset),
        "colab" => Ok(EmbedType::Colab),
        other => anyhow::bail!("unknown embed type '{other}'"),
    }
}

async fn resolve_command(store: &ContentStore, args: ResolveArgs) -> anyhow::Result<()> {
    let resolved =
        resolver::resolve_with_fallback(store, &args.course, &args.module, &args.exercise).await?;

    if args.include_solutions {
        // Full definition, for authoring workflows only.
        println!("{}", serde_json::to_string_pretty(&resolved.exercise)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&resolved.client_payload())?);
    }
    Ok(())
}

async fn execute_command(
    store: &ContentStore,
    content_root: &Path,
    args: ExecuteArgs,
    action: Action,
    attempts: u32,
) -> anyhow::Result<()> {
    let submitted = read_submission(&args.file).await?;
    let resolved =
        resolver::resolve_with_fallback(store, &args.course, &args.module, &args.exercise).await?;

    let settings = RuntimeSettings::load(&content_root.join("environments.yaml"))?;
    let python = PythonSandbox::from_settings(&settings.python);
    let mut sql = sql_sandbox_for(&resolved);

    let mut grader = Grader::new(&python, &mut sql);
    let outcome = grader
        .grade(&resolved.exercise, &submitted, action, attempts)
        .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn sql_sandbox_for(resolved: &ResolvedExercise) -> SqlSandbox {
    let datasets = resolved
        .exercise
        .datasets()
        .iter()
        .filter_map(|reference| {
            resolved
                .datasets
                .get(&reference.id)
                .map(|text| (reference.id.clone(), text.clone()))
        })
        .collect();
    SqlSandbox::new(resolved.schema.clone(), datasets)
}

async fn read_submission(file: &str) -> anyhow::Result<String> {
    if file == "-" {
        use tokio::io::AsyncReadExt;
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .context("failed to read submission from stdin")?;
        Ok(buffer)
    } else {
        tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("failed to read {file}"))
    }
}

async fn check_command(
    store: &ContentStore,
    content_root: &Path,
    args: CheckArgs,
) -> anyhow::Result<()> {
    let mut checked = 0usize;
    let mut problems: Vec<String> = Vec::new();

    for entry in WalkDir::new(content_root.join("courses"))
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let in_exercises = path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name == "exercises")
            .unwrap_or(false);
        if !in_exercises || path.extension().map(|ext| ext != "yaml").unwrap_or(true) {
            continue;
        }

        checked += 1;
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let exercise: Exercise = match serde_yaml::from_str(&text) {
            Ok(exercise) => exercise,
            Err(e) => {
                problems.push(format!("{}: {e}", path.display()));
                continue;
            }
        };

        if args.dependencies {
            for reference in exercise.datasets() {
                if let Err(e) = store.load_dataset(&reference.path).await {
                    problems.push(format!("{}: dataset '{}': {e}", path.display(), reference.id));
                }
            }
            if let Exercise::Sql(sql) = &exercise {
                if let Err(e) = store.load_schema(&sql.schema_id).await {
                    problems.push(format!("{}: schema '{}': {e}", path.display(), sql.schema_id));
                }
            }
        }
    }

    for problem in &problems {
        warn!("{problem}");
    }
    info!(checked, problems = problems.len(), "content check finished");
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "checked": checked,
            "problems": problems,
        }))?
    );

    if problems.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} problem(s) found in content tree", problems.len())
    }
}
