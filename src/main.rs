use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dialoguer::{Input, Select};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cpp_builder::config::{Settings, ensure_user_settings};
use cpp_builder::generator::{MakefileGenerator, Platform};
use cpp_builder::project::{ProjectHandler, load_project_settings};
use cpp_builder::runner::{Runner, TerminalSink, launch_in_terminal, load_targets};

#[derive(Parser)]
#[command(name = "cpp_builder", version, about = "Generate Makefiles for C++ projects and run their targets")]
struct Cli {
    /// 配置文件地址，默认使用用户配置
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the targets of the Makefile in a directory
    Targets {
        #[arg(short = 'C', long, default_value = ".")]
        directory: PathBuf,
    },
    /// Run a Makefile target, streaming its output
    Run {
        /// Target name or basename; prompts when omitted
        target: Option<String>,
        #[arg(short = 'C', long, default_value = ".")]
        directory: PathBuf,
        /// Run inside the configured terminal emulator instead
        #[arg(long)]
        terminal: bool,
    },
    /// Generate a Makefile
    Makefile {
        /// Build the single-directory Makefile next to this source file
        #[arg(long, conflicts_with = "project", required_unless_present = "project")]
        file: Option<PathBuf>,
        /// Project folder containing `<name>.cpp-project.json`
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Create a new project in the workspace directory
    New {
        name: Option<String>,
    },
    /// Print the settings file location, creating it if needed
    Settings,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Targets { directory } => list_targets(&directory),
        Command::Run {
            target,
            directory,
            terminal,
        } => run_target(cli.settings.as_deref(), target, &directory, terminal),
        Command::Makefile { file, project } => make_file(cli.settings.as_deref(), file, project),
        Command::New { name } => new_project(cli.settings.as_deref(), name),
        Command::Settings => {
            let path = match cli.settings {
                Some(p) => p,
                None => ensure_user_settings()?,
            };
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    Settings::load(path).context("failed to load settings")
}

fn list_targets(dir: &Path) -> anyhow::Result<()> {
    let info = load_targets(dir)?;
    if info.targets.is_empty() {
        warn!("No targets found");
    }
    for target in &info.targets {
        println!("{}\t{}", target.basename, target.fullname);
    }
    Ok(())
}

fn run_target(
    settings: Option<&Path>,
    target: Option<String>,
    dir: &Path,
    terminal: bool,
) -> anyhow::Result<()> {
    let info = load_targets(dir)?;

    let fullname = match target {
        Some(name) => match info.find(&name) {
            Some(t) => t.fullname.clone(),
            None => {
                warn!("{} is not a target of the Makefile, passing it to make as is", name);
                name
            }
        },
        None => {
            if info.targets.is_empty() {
                bail!("no targets found in the Makefile");
            }
            let names: Vec<&str> = info.targets.iter().map(|t| t.basename.as_str()).collect();
            let chosen = Select::new()
                .with_prompt("Make target")
                .items(&names[..])
                .default(0)
                .interact_opt()?;
            match chosen {
                Some(i) => info.targets[i].fullname.clone(),
                None => return Ok(()),
            }
        }
    };

    if terminal {
        let settings = load_settings(settings)?;
        launch_in_terminal(&settings, dir, &fullname)?;
        return Ok(());
    }

    let mut runner = Runner::new(dir).inherit_process_group();
    runner.start(&fullname, TerminalSink)?;
    if let Some(outcome) = runner.wait()? {
        outcome.check()?;
    }
    Ok(())
}

fn make_file(settings: Option<&Path>, file: Option<PathBuf>, project: Option<PathBuf>) -> anyhow::Result<()> {
    let platform = Platform::current();
    let (generator, dir) = match (file, project) {
        (Some(file), _) => {
            let settings = load_settings(settings)?;
            let generator = MakefileGenerator::for_single_file(settings, &file, platform)?;
            let dir = file
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            (generator, dir)
        }
        (None, Some(project)) => {
            let settings = load_project_settings(&project)
                .with_context(|| format!("error in project file of {}", project.display()))?;
            (MakefileGenerator::for_project(settings, &project, platform)?, project)
        }
        (None, None) => bail!("either --file or --project is required"),
    };

    let path = generator.write(&dir)?;
    println!("{}", path.display());
    Ok(())
}

fn new_project(settings: Option<&Path>, name: Option<String>) -> anyhow::Result<()> {
    let settings = load_settings(settings)?;
    let name = match name {
        Some(n) => n,
        None => Input::<String>::new().with_prompt("Enter Project Name").interact_text()?,
    };

    let mut handler = ProjectHandler::new(&name, settings)?;
    let file = handler.create_base_project()?;
    info!("Created project {} at {}", name, handler.project_dir().display());
    println!("{}", file.display());
    Ok(())
}
