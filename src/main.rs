/// Version injected at compile time via SITESTACK_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("SITESTACK_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use sitestack::assemble::{assemble, StackFile};
use sitestack::check::{check, Severity};
use sitestack::config::Config;
use sitestack::resource::all_kinds;
use sitestack::{synthesize, Descriptor, Environment};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Synthesize static site + API deployments
#[derive(Parser, Debug)]
#[command(name = "sitestack", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synthesize a stack file into a deployment artifact
    Synth {
        /// Stack file (.yaml, .yml or .json)
        file: PathBuf,

        /// Write to this path instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Emit only the provider template
        #[arg(long)]
        template_only: bool,

        #[command(flatten)]
        target: Target,
    },
    /// Report risky configuration in a stack file
    Check {
        file: PathBuf,

        /// Fail when any high severity finding is reported
        #[arg(long)]
        strict: bool,

        #[command(flatten)]
        target: Target,
    },
    /// List declarable kinds with their options, attributes and actions
    Kinds,
    /// Show or persist the default account and region
    Defaults {
        #[arg(long)]
        account: Option<String>,

        #[arg(long)]
        region: Option<String>,
    },
}

#[derive(ClapArgs, Debug)]
struct Target {
    /// Target account
    #[arg(short, long)]
    account: Option<String>,

    /// Target region
    #[arg(short, long)]
    region: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("sitestack {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("sitestack").join("sitestack.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".sitestack").join("sitestack.log");
    }
    PathBuf::from("sitestack.log")
}

fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    match args.command {
        Command::Synth {
            file,
            out,
            template_only,
            target,
        } => run_synth(&file, out.as_deref(), template_only, &target),
        Command::Check {
            file,
            strict,
            target,
        } => run_check(&file, strict, &target),
        Command::Kinds => run_kinds(),
        Command::Defaults { account, region } => run_defaults(account, region),
    }
}

/// Load and assemble a stack file against the effective environment
fn load_descriptor(file: &Path, target: &Target) -> Result<Descriptor> {
    let stack = StackFile::load(file)?;
    let config = Config::load();
    let env = Environment::new(
        &config.effective_account(target.account.as_deref(), stack.account.as_deref()),
        &config.effective_region(target.region.as_deref(), stack.region.as_deref()),
    );
    tracing::info!("Using account: {}, region: {}", env.account, env.region);

    assemble(&stack, env).with_context(|| format!("invalid stack file {}", file.display()))
}

fn run_synth(file: &Path, out: Option<&Path>, template_only: bool, target: &Target) -> Result<()> {
    let descriptor = load_descriptor(file, target)?;
    let artifact = synthesize(&descriptor).context("synthesis failed")?;

    let rendered = if template_only {
        serde_json::to_string_pretty(&artifact.template)?
    } else {
        artifact.to_json_pretty()?
    };

    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, rendered + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "Synthesized '{}': {} resources -> {}",
                artifact.stack,
                artifact.template.resources.len(),
                path.display()
            );
        }
        None => println!("{}", rendered),
    }

    // stdout carries the artifact; outputs go to stderr
    for (name, value) in &artifact.outputs {
        eprintln!("{} = {}", name, value);
    }
    Ok(())
}

fn run_check(file: &Path, strict: bool, target: &Target) -> Result<()> {
    let descriptor = load_descriptor(file, target)?;
    synthesize(&descriptor).context("synthesis failed")?;
    let findings = check(&descriptor);

    if findings.is_empty() {
        println!("No findings.");
        return Ok(());
    }
    for finding in &findings {
        println!("{:<6}  {:<24}  {}", finding.severity, finding.id, finding.message);
    }

    let high = findings
        .iter()
        .filter(|f| f.severity == Severity::High)
        .count();
    if strict && high > 0 {
        bail!("{} high severity finding(s)", high);
    }
    Ok(())
}

fn run_kinds() -> Result<()> {
    for (kind, schema) in all_kinds() {
        if !schema.declarable {
            continue;
        }
        println!("{} ({}, {})", kind, schema.display_name, schema.provider_type);
        println!("  attributes: {}", schema.attributes.join(", "));
        let actions = schema.action_names();
        if !actions.is_empty() {
            println!("  actions:    {}", actions.join(", "));
        }
        for (name, def) in &schema.options {
            let required = if def.required { " (required)" } else { "" };
            match &def.description {
                Some(description) => println!(
                    "  - {}: {}{}  # {}",
                    name,
                    def.option_type.as_str(),
                    required,
                    description
                ),
                None => println!("  - {}: {}{}", name, def.option_type.as_str(), required),
            }
        }
    }
    Ok(())
}

fn run_defaults(account: Option<String>, region: Option<String>) -> Result<()> {
    let mut config = Config::load();

    if account.is_none() && region.is_none() {
        println!("account: {}", config.effective_account(None, None));
        println!("region:  {}", config.effective_region(None, None));
        return Ok(());
    }
    if let Some(account) = account {
        config.set_account(&account)?;
    }
    if let Some(region) = region {
        config.set_region(&region)?;
    }
    println!("Saved defaults.");
    Ok(())
}
