//! `ladder` command-line front end

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use ladder_core::{LadderConfig, LadderError, LadderSession};
use ladder_grading::{GradingReport, SubmissionOutcome};
use ladder_model::ChallengeStatus;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("ladder")
        .version(ladder_core::VERSION)
        .about("Grade coding challenges and track ladder progress")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to ladder.toml"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("list")
                .about("Show levels and their status")
                .arg(
                    Arg::new("refresh")
                        .long("refresh")
                        .action(ArgAction::SetTrue)
                        .help("Ignore the freshness window"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Grade a solution and submit it when it passes")
                .arg(Arg::new("slug").required(true).help("Challenge slug"))
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Python source file"),
                ),
        )
        .subcommand(
            Command::new("hint")
                .about("Buy a hint")
                .arg(Arg::new("slug").required(true).help("Challenge slug")),
        )
        .subcommand(Command::new("certificate").about("Show certificate eligibility"))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> Result<LadderConfig> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => LadderConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => LadderConfig::default(),
    };
    Ok(config.apply_env())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let session = LadderSession::connect(load_config(&matches)?)?;

    let code = match matches.subcommand() {
        Some(("list", args)) => list(&session, args).await,
        Some(("run", args)) => run(&session, args).await,
        Some(("hint", args)) => hint(&session, args).await,
        Some(("certificate", _)) => certificate(&session).await,
        _ => Ok(2),
    };

    match code {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("{}", e.user_message());
            std::process::exit(if e.is_retryable() { 75 } else { 1 });
        }
    }
}

async fn list(session: &LadderSession, args: &ArgMatches) -> Result<i32, LadderError> {
    let levels = session.levels(args.get_flag("refresh")).await?;

    if args.get_flag("json") {
        match serde_json::to_string_pretty(&*levels) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("failed to encode levels: {e}"),
        }
        return Ok(0);
    }

    for level in levels.iter() {
        let marker = match level.status {
            ChallengeStatus::Completed => "x",
            ChallengeStatus::Unlocked => ">",
            ChallengeStatus::Locked => " ",
        };
        println!(
            "[{marker}] {:>3}  {:<24} {}  {}",
            level.order,
            level.slug,
            "*".repeat(usize::from(level.stars)),
            level.title
        );
    }
    let summary = session.summary().await?;
    println!();
    println!(
        "{}/{} completed, {}/{} stars",
        summary.completed, summary.total, summary.stars, summary.max_stars
    );
    Ok(0)
}

async fn run(session: &LadderSession, args: &ArgMatches) -> Result<i32, LadderError> {
    let Some(slug) = args.get_one::<String>("slug") else {
        return Ok(2);
    };
    let Some(path) = args.get_one::<PathBuf>("file") else {
        return Ok(2);
    };
    let code = match std::fs::read_to_string(path) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("cannot read {}: {e}", path.display());
            return Ok(2);
        }
    };

    let report = session.grade(slug, &code).await?;
    print_report(&report);
    Ok(if report.is_done() { 0 } else { 1 })
}

fn print_report(report: &GradingReport) {
    for line in &report.output_lines {
        println!("{line}");
    }
    println!();
    println!("{}: {}", report.phase, report.grade.message());

    match &report.submission {
        SubmissionOutcome::NotSubmitted => {}
        SubmissionOutcome::Acknowledged(result) => {
            println!("Stars: {}  XP: +{}", result.stars, result.xp_earned);
            if let Some(next) = report.next_level_slug() {
                println!("Next level: {next}");
            }
        }
        SubmissionOutcome::Rejected(_) => println!("The server did not accept the submission."),
        SubmissionOutcome::Failed(e) => {
            println!("Submission failed: {e}. Your progress was not saved; run again to retry.");
        }
    }
}

async fn hint(session: &LadderSession, args: &ArgMatches) -> Result<i32, LadderError> {
    let Some(slug) = args.get_one::<String>("slug") else {
        return Ok(2);
    };
    session.levels(false).await?;
    let hint = session.purchase_hint(slug).await?;
    println!("{}", hint.hint);
    if let Some(coins) = hint.coins_remaining {
        println!("Coins left: {coins}");
    }
    Ok(0)
}

async fn certificate(session: &LadderSession) -> Result<i32, LadderError> {
    let status = session.certificate().await?;
    match status.record {
        Some(record) => {
            println!("Certificate {}", record.certificate_id);
            if let Some(url) = record.verification_url {
                println!("Verify at {url}");
            }
        }
        None if status.eligibility.eligible => {
            println!("All challenges completed: you can claim your certificate.");
        }
        None => println!("Complete every challenge to earn the certificate."),
    }
    Ok(0)
}
