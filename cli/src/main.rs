use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use loas_core::{
    assign_guids, clean, corpus_stats, new_guid, run_build, validate_corpus, write_docs,
    ArtifactFormat, BuildConfig, BuildReport, SystemToolchain, ValidationReport,
};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Validate, compile and index LOAS macOS attack-test definitions"
)]
struct LoasCli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Configuration file (defaults to loas.yaml in the working directory when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Discover and validate every definition file
    Validate {
        /// Root of the definition tree
        #[arg(long, value_name = "DIR")]
        definitions: Option<PathBuf>,
        /// Output JSON instead of a human-readable summary
        #[arg(long)]
        json: bool,
    },
    /// Validate, compile every definition and write the script index and coverage layer
    Build(BuildArgs),
    /// Generate one documentation page per technique
    Docs {
        #[arg(long, value_name = "DIR")]
        definitions: Option<PathBuf>,
        /// Directory receiving the `.mdx` pages
        #[arg(long, value_name = "DIR")]
        docs_dir: Option<PathBuf>,
    },
    /// Summarise the definition corpus and the artifacts already built
    Stats {
        #[arg(long, value_name = "DIR")]
        definitions: Option<PathBuf>,
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Fill in missing test guids in the definition files
    Guids {
        #[arg(long, value_name = "DIR")]
        definitions: Option<PathBuf>,
        /// Report what would change without writing
        #[arg(long)]
        check: bool,
    },
    /// Remove the release tree
    Clean {
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
        /// Actually delete; without it the command only reports what would go
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Args)]
struct BuildArgs {
    #[arg(long, value_name = "DIR")]
    definitions: Option<PathBuf>,
    /// Release tree root
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
    /// Script index JSON path
    #[arg(long, value_name = "FILE")]
    index: Option<PathBuf>,
    /// ATT&CK Navigator layer JSON path
    #[arg(long, value_name = "FILE")]
    layer: Option<PathBuf>,
    /// Restrict the artifact formats. Repeat for multiple formats.
    #[arg(long = "format", value_name = "FORMAT", action = ArgAction::Append)]
    formats: Vec<ArtifactFormat>,
    /// Worker threads (defaults to the available parallelism)
    #[arg(long, value_name = "N")]
    jobs: Option<usize>,
    /// Per-tool timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Abort before compiling when any definition is invalid
    #[arg(long)]
    strict: bool,
    /// Stop dispatching new definitions after the first failure
    #[arg(long)]
    fail_fast: bool,
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = LoasCli::parse();
    init_logging(cli.verbose);

    let mut config = BuildConfig::load(cli.config.as_deref(), Path::new("."))?;
    log::debug!("configuration: {config:?}");

    match cli.command {
        Command::Validate { definitions, json } => {
            override_path(&mut config.definitions_dir, definitions);
            let report = validate_corpus(&config.definitions_dir)?;
            output_validation(&report, json)?;
            if !report.is_clean() {
                anyhow::bail!("validation failed");
            }
        }
        Command::Build(args) => {
            let json = args.json;
            apply_build_args(&mut config, args)?;
            let toolchain = SystemToolchain::new(config.toolchain.clone(), config.tool_timeout());
            let report = run_build(&config, &toolchain)?;
            output_build(&report, json)?;
            if report.has_failures() {
                anyhow::bail!("build failed");
            }
        }
        Command::Docs {
            definitions,
            docs_dir,
        } => {
            override_path(&mut config.definitions_dir, definitions);
            override_path(&mut config.docs_dir, docs_dir);
            let report = validate_corpus(&config.definitions_dir)?;
            for error in &report.errors {
                println!("  - [skipped] {error}");
            }
            let written = write_docs(&report.definitions, &config.docs_dir)?;
            println!(
                "Wrote {} technique pages to {}",
                written.len(),
                config.docs_dir.display()
            );
        }
        Command::Stats {
            definitions,
            output,
            json,
        } => {
            override_path(&mut config.definitions_dir, definitions);
            override_path(&mut config.output_dir, output);
            let stats = corpus_stats(&config.definitions_dir, &config.output_dir)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", stats.table());
            }
        }
        Command::Guids { definitions, check } => {
            override_path(&mut config.definitions_dir, definitions);
            let report = assign_guids(&config.definitions_dir, check, &mut new_guid)?;
            println!("{report}");
            if report.has_duplicates() {
                anyhow::bail!("duplicate guids found");
            }
            if report.changed() {
                if check {
                    anyhow::bail!("{} files are missing guids", report.updated.len());
                }
                anyhow::bail!("guids were added to {} files; commit them", report.updated.len());
            }
        }
        Command::Clean { output, yes } => {
            override_path(&mut config.output_dir, output);
            if !config.output_dir.exists() {
                println!("Nothing to clean at {}", config.output_dir.display());
            } else if yes {
                for path in clean(&[config.output_dir.as_path()])? {
                    println!("Removed {}", path.display());
                }
            } else {
                println!(
                    "Would remove {} (re-run with --yes to delete)",
                    config.output_dir.display()
                );
                anyhow::bail!("refusing to delete without --yes");
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn override_path(target: &mut PathBuf, value: Option<PathBuf>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn apply_build_args(config: &mut BuildConfig, args: BuildArgs) -> anyhow::Result<()> {
    override_path(&mut config.definitions_dir, args.definitions);
    override_path(&mut config.output_dir, args.output);
    override_path(&mut config.index_path, args.index);
    override_path(&mut config.layer_path, args.layer);
    if !args.formats.is_empty() {
        config.formats = args.formats;
    }
    if args.jobs.is_some() {
        config.jobs = args.jobs;
    }
    if let Some(timeout) = args.timeout {
        config.tool_timeout_secs = timeout;
    }
    config.strict |= args.strict;
    config.fail_fast |= args.fail_fast;
    config
        .validate()
        .context("invalid build options after applying command-line flags")
}

fn output_validation(report: &ValidationReport, json: bool) -> anyhow::Result<()> {
    if json {
        let payload = json!({
            "files": report.files,
            "valid": report.definitions.len(),
            "errors": report.errors,
            "warnings": report.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn output_build(report: &BuildReport, json: bool) -> anyhow::Result<()> {
    if json {
        let payload = json!({
            "report": report,
            "summary": report.tally(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print!("{report}");
        if report.has_failures() {
            println!("\n[warn] some definitions could not be built");
        }
    }
    Ok(())
}
