// Reelforge Command Line Interface
// Drives the production pipeline through the server's HTTP API

mod client;

use clap::{Parser, Subcommand};
use client::ApiClient;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "reelforge")]
#[command(about = "Reelforge Command Line Interface - short promo videos from a product page", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, env = "REELFORGE_SERVER", default_value = "http://localhost:8080", global = true)]
    server: String,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new run for a product page
    Start {
        /// Product page URL
        url: String,

        /// Target narration length in seconds
        #[arg(long, short, default_value = "15")]
        duration: f64,

        #[arg(long, short)]
        title: Option<String>,

        /// Keep polling until the run finishes
        #[arg(long, short)]
        watch: bool,
    },

    /// Show run status
    Status { run_id: String },

    /// Poll a run until it completes or fails
    Watch {
        run_id: String,

        /// Polling interval in seconds
        #[arg(long, short, default_value = "2")]
        interval: u64,
    },

    /// Continue from the first pending or failed stage
    Resume { run_id: String },

    /// Execute one pending or failed stage
    RunStage { run_id: String, stage_id: String },

    /// Show one stage with its output
    Stage { run_id: String, stage_id: String },

    /// Replace the output of a completed stage
    Edit {
        run_id: String,
        stage_id: String,

        /// New output as inline JSON
        #[arg(long)]
        output: String,
    },

    /// Start a new run from a given stage, reusing earlier results
    Restart {
        run_id: String,

        /// 1-based stage order
        #[arg(long)]
        from: u32,
    },

    /// Save a snapshot of a run's stages
    Snapshot {
        run_id: String,

        #[arg(long, short)]
        note: Option<String>,
    },

    /// List snapshots of a run
    Snapshots { run_id: String },

    /// Replace a run's stages with a snapshot
    Restore {
        run_id: String,
        snapshot_id: String,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Run history
    List,

    /// Voices offered by the configured speech engine
    Voices,

    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_target(false)
            .init();
    }

    let api = ApiClient::new(&cli.server)?;
    let raw = cli.json;

    match cli.command {
        Commands::Start { url, duration, title, watch } => {
            let body = json!({ "source_url": url, "target_duration": duration, "title": title });
            let accepted = api.post("/api/v1/runs", Some(body)).await?;
            let run_id = accepted["run_id"].as_str().unwrap_or_default().to_string();
            if raw {
                print_json(&accepted)?;
            } else {
                println!("✅ Run started: {}", run_id);
            }
            if watch {
                watch_run(&api, &run_id, Duration::from_secs(2), raw).await?;
            }
        }
        Commands::Status { run_id } => {
            let report = api.get(&format!("/api/v1/runs/{}", run_id)).await?;
            if raw {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
        }
        Commands::Watch { run_id, interval } => {
            watch_run(&api, &run_id, Duration::from_secs(interval.max(1)), raw).await?;
        }
        Commands::Resume { run_id } => {
            let report = api.post(&format!("/api/v1/runs/{}/resume", run_id), None).await?;
            println!("✅ Resumed at {}", report["current_stage"].as_str().unwrap_or("-"));
        }
        Commands::RunStage { run_id, stage_id } => {
            api.post(&format!("/api/v1/runs/{}/stages/{}/run", run_id, stage_id), None)
                .await?;
            println!("✅ Stage {} started", stage_id);
        }
        Commands::Stage { run_id, stage_id } => {
            let stage = api.get(&format!("/api/v1/runs/{}/stages/{}", run_id, stage_id)).await?;
            print_json(&stage)?;
        }
        Commands::Edit { run_id, stage_id, output } => {
            let output: Value = serde_json::from_str(&output)?;
            api.patch(
                &format!("/api/v1/runs/{}/stages/{}", run_id, stage_id),
                json!({ "output": output }),
            )
            .await?;
            println!("✅ Output of {} replaced", stage_id);
        }
        Commands::Restart { run_id, from } => {
            let accepted = api
                .post(
                    &format!("/api/v1/runs/{}/restart", run_id),
                    Some(json!({ "from_order": from })),
                )
                .await?;
            println!(
                "✅ New run {} (restart from stage {})",
                accepted["new_run_id"].as_str().unwrap_or("-"),
                from
            );
        }
        Commands::Snapshot { run_id, note } => {
            let snapshot = api
                .post(&format!("/api/v1/runs/{}/snapshots", run_id), Some(json!({ "note": note })))
                .await?;
            println!(
                "✅ Snapshot {} ({})",
                snapshot["label"].as_str().unwrap_or("-"),
                snapshot["id"].as_str().unwrap_or("-")
            );
        }
        Commands::Snapshots { run_id } => {
            let list = api.get(&format!("/api/v1/runs/{}/snapshots", run_id)).await?;
            if raw {
                print_json(&list)?;
            } else {
                for s in list.as_array().into_iter().flatten() {
                    println!(
                        "{:<8} {}  {}/{} stages  {}",
                        s["label"].as_str().unwrap_or("-"),
                        s["id"].as_str().unwrap_or("-"),
                        s["completed_stages"],
                        s["total_stages"],
                        s["note"].as_str().unwrap_or("")
                    );
                }
            }
        }
        Commands::Restore { run_id, snapshot_id, yes } => {
            if !yes && !confirm(&format!("Replace all stages of run {} with snapshot {}?", run_id, snapshot_id))? {
                println!("❌ Cancelled");
                return Ok(());
            }
            api.post(
                &format!("/api/v1/runs/{}/snapshots/{}/restore", run_id, snapshot_id),
                Some(json!({ "confirm": true })),
            )
            .await?;
            println!("✅ Snapshot restored");
        }
        Commands::List => {
            let runs = api.get("/api/v1/runs").await?;
            if raw {
                print_json(&runs)?;
            } else {
                for r in runs.as_array().into_iter().flatten() {
                    println!(
                        "{}  {:<10} {:>3}%  {}",
                        r["id"].as_str().unwrap_or("-"),
                        r["status"].as_str().unwrap_or("-"),
                        r["percentage"].as_u64().unwrap_or(0),
                        r["title"].as_str().unwrap_or("")
                    );
                }
            }
        }
        Commands::Voices => {
            let voices = api.get("/api/v1/voices").await?;
            for v in voices.as_array().into_iter().flatten() {
                println!(
                    "{:<24} {}",
                    v["id"].as_str().unwrap_or("-"),
                    v["name"].as_str().unwrap_or("")
                );
            }
        }
        Commands::Health => match api.get("/health").await {
            Ok(health) => {
                println!("✅ Server is healthy");
                print_json(&health)?;
            }
            Err(e) => {
                println!("❌ Cannot reach {}: {}", api.server_url(), e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

/// Poll until the run reaches `completed` or `error`.
async fn watch_run(api: &ApiClient, run_id: &str, interval: Duration, raw: bool) -> anyhow::Result<()> {
    let mut last = String::new();
    loop {
        let report = api.get(&format!("/api/v1/runs/{}", run_id)).await?;
        let status = report["status"].as_str().unwrap_or("unknown").to_string();
        let line = progress_line(&report);
        if line != last {
            println!("{}", line);
            last = line;
        }
        if status == "completed" || status == "error" {
            if raw {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
            if status == "error" {
                std::process::exit(2);
            }
            return Ok(());
        }
        tokio::time::sleep(interval).await;
    }
}

fn progress_line(report: &Value) -> String {
    format!(
        "[{:>3}%] {:<10} {}",
        report["progress"]["percentage"].as_u64().unwrap_or(0),
        report["status"].as_str().unwrap_or("-"),
        report["current_stage"].as_str().unwrap_or("")
    )
}

fn print_report(report: &Value) {
    println!("📋 {} ({})", report["title"].as_str().unwrap_or("-"), report["run_id"].as_str().unwrap_or("-"));
    println!("   {}", progress_line(report));
    for stage in report["stages"].as_array().into_iter().flatten() {
        let status = stage["status"].as_str().unwrap_or("-");
        let mark = match status {
            "completed" => "✅",
            "running" => "⏳",
            "error" => "❌",
            "not_implemented" => "➖",
            _ => "  ",
        };
        println!(
            "   {} {:>2}. {:<22} {}",
            mark,
            stage["order"].as_u64().unwrap_or(0),
            stage["id"].as_str().unwrap_or("-"),
            stage["error"]["message"].as_str().unwrap_or("")
        );
    }
    if let Some(url) = report["final_outputs"]["voice"]["url"].as_str() {
        println!("   🔊 {}", url);
    }
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    use std::io::{self, Write};
    print!("⚠️  {} (yes/no): ", question);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("yes"))
}
