//! yard - demo CLI exercising the workyard coordinator end to end.
//!
//! A simple polling timer service and rate-limited URL fetcher, built on
//! the library's public surface — not a feature of the core crate, just a
//! thin exerciser so it can be driven from a terminal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use workyard::{
    Config, Coordinator, FetchItem, SubprocessArgs, SubprocessItem, TimerItem, Workflow,
    WorkflowError,
};

#[derive(Parser)]
#[command(name = "yard")]
#[command(about = "Demo CLI for the workyard work-item coordinator")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL and print its status code and body length
    Fetch {
        url: String,
        /// Request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },

    /// Sleep for the given number of milliseconds via the Timer Worker
    Sleep {
        #[arg(long, default_value = "1000")]
        millis: u64,
    },

    /// Run a workflow that fetches a URL, then waits on a timer, to
    /// exercise single-yield, sub-workflow, and batch-yield composition
    /// in one pass.
    Demo {
        #[arg(long, default_value = "https://example.com")]
        url: String,
    },
}

/// Supplies argv for subprocess items the demo never actually yields —
/// the CLI has no subcommand that runs an external process, but the
/// Subprocess Worker still needs one registered to start the standard
/// pool.
struct NoSubprocessArgs;

impl SubprocessArgs for NoSubprocessArgs {
    fn args(&self, _item: &SubprocessItem) -> Vec<String> {
        Vec::new()
    }
}

struct FetchWorkflow {
    url: String,
    timeout: Duration,
}

#[async_trait]
impl Workflow for FetchWorkflow {
    type Output = FetchItem;

    async fn run(&self, ctx: Arc<Coordinator>) -> Result<FetchItem, WorkflowError> {
        let item = FetchItem::new(self.url.clone()).with_timeout(self.timeout);
        ctx.join_one(item).await
    }
}

struct SleepWorkflow {
    delay: Duration,
}

#[async_trait]
impl Workflow for SleepWorkflow {
    type Output = ();

    async fn run(&self, ctx: Arc<Coordinator>) -> Result<(), WorkflowError> {
        ctx.join_one(TimerItem::after(self.delay)).await?;
        Ok(())
    }
}

/// Composes a fetch sub-workflow and a batch of three timers in one pass,
/// demonstrating single-yield, sub-workflow, and batch-yield composition
/// together.
struct DemoWorkflow {
    url: String,
}

#[async_trait]
impl Workflow for DemoWorkflow {
    type Output = (u16, Vec<Duration>);

    async fn run(&self, ctx: Arc<Coordinator>) -> Result<(u16, Vec<Duration>), WorkflowError> {
        let fetched = ctx
            .join_workflow(FetchWorkflow {
                url: self.url.clone(),
                timeout: Duration::from_secs(10),
            })
            .await?;
        let status = fetched.status_code.unwrap_or(0);

        let timers = vec![
            TimerItem::after(Duration::from_millis(100)),
            TimerItem::after(Duration::from_millis(50)),
            TimerItem::after(Duration::from_millis(150)),
        ];
        let completed = ctx.join_many(timers).await?;
        let elapsed = completed.into_iter().map(|t| t.ready_time.elapsed()).collect();

        Ok((status, elapsed))
    }
}

fn build_coordinator() -> Arc<Coordinator> {
    let coordinator = Coordinator::standard(Config::default(), Arc::new(NoSubprocessArgs));
    coordinator.start();
    coordinator
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "workyard=info" } else { "workyard=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let coordinator = build_coordinator();

    let result: anyhow::Result<()> = match cli.command {
        Commands::Fetch { url, timeout_secs } => {
            let handle = coordinator.submit(FetchWorkflow {
                url,
                timeout: Duration::from_secs(timeout_secs),
            });
            match handle.join().await {
                Ok(item) => {
                    println!(
                        "status={} bytes={}",
                        item.status_code.map(|c| c.to_string()).unwrap_or_else(|| "?".into()),
                        item.data.map(|d| d.len()).unwrap_or(0)
                    );
                    Ok(())
                }
                Err(err) => Err(anyhow::anyhow!(err)),
            }
        }
        Commands::Sleep { millis } => {
            let handle = coordinator.submit(SleepWorkflow {
                delay: Duration::from_millis(millis),
            });
            handle.join().await.map_err(|err| anyhow::anyhow!(err))?;
            println!("slept {millis}ms");
            Ok(())
        }
        Commands::Demo { url } => {
            let spinner = indicatif::ProgressBar::new_spinner();
            spinner.set_style(
                indicatif::ProgressStyle::with_template("{spinner} {msg}")
                    .expect("valid template"),
            );
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner.set_message("fetching, then joining a batch of timers...");

            let handle = coordinator.submit(DemoWorkflow { url });
            let outcome = handle.join().await;
            spinner.finish_and_clear();

            match outcome {
                Ok((status, timers)) => {
                    println!("{} status={status}", console::style("fetch").bold());
                    for (i, elapsed) in timers.iter().enumerate() {
                        println!("timer[{i}] elapsed={elapsed:?}");
                    }
                    Ok(())
                }
                Err(err) => Err(anyhow::anyhow!(err)),
            }
        }
    };

    info!("coordinator shutting down");
    coordinator.stop().await;
    result
}
