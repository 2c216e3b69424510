//! CLI for imagegen - DALL-E 3 batch generation with cost tracking.

use clap::{Args, Parser, Subcommand, ValueEnum};
use imagegen::accounting::{cost_per_image, BudgetStatus};
use imagegen::batch::{estimate_plan_cost, BatchExecutor, BatchOutcome, BatchPlan, BatchType};
use imagegen::config::ClientConfig;
use imagegen::image::providers::RelayClient;
use imagegen::image::{BudgetSource, GenerationRequest, ImageQuality, ImageSize, ImageStyle};
use imagegen::session::Session;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imagegen")]
#[command(about = "Generate DALL-E 3 images and compare styles and sizes within a budget")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a single image
    Generate(GenerateArgs),

    /// Generate a comparison batch from one prompt
    Batch(BatchArgs),

    /// Show the price of an image or a batch
    Cost(CostArgs),

    /// Show the relay's monthly budget
    Budget,

    /// Show session spend and remaining quota
    Session {
        /// Zero the session spend
        #[arg(long)]
        reset_spend: bool,
    },

    /// List saved images
    Gallery {
        /// Remove every saved image
        #[arg(long)]
        clear: bool,
    },

    /// Run the relay server
    #[cfg(feature = "server")]
    Serve,
}

#[derive(Args)]
struct ImageOptions {
    /// Output size
    #[arg(long, value_enum, default_value = "1024x1024")]
    size: SizeArg,

    /// Image quality
    #[arg(long, value_enum, default_value = "standard")]
    quality: QualityArg,

    /// Rendering style
    #[arg(long, value_enum, default_value = "vivid")]
    style: StyleArg,
}

#[derive(Args)]
struct GenerateArgs {
    /// The text prompt describing the image
    prompt: String,

    #[command(flatten)]
    options: ImageOptions,
}

#[derive(Args)]
struct BatchArgs {
    /// The text prompt shared by every image in the batch
    prompt: String,

    /// Which dimension to vary
    #[arg(short = 't', long = "type", value_enum, default_value = "styles")]
    batch_type: BatchTypeArg,

    #[command(flatten)]
    options: ImageOptions,

    /// Only show the plan and its cost
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct CostArgs {
    /// Image quality
    #[arg(long, value_enum, default_value = "standard")]
    quality: QualityArg,

    /// Price a whole batch of this type
    #[arg(short = 't', long = "type", value_enum)]
    batch_type: Option<BatchTypeArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SizeArg {
    #[value(name = "1024x1024")]
    Square,
    #[value(name = "1792x1024")]
    Landscape,
    #[value(name = "1024x1792")]
    Portrait,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum QualityArg {
    Standard,
    Hd,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StyleArg {
    Vivid,
    Natural,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BatchTypeArg {
    Styles,
    Sizes,
    Matrix,
}

impl From<SizeArg> for ImageSize {
    fn from(arg: SizeArg) -> Self {
        match arg {
            SizeArg::Square => ImageSize::Square,
            SizeArg::Landscape => ImageSize::Landscape,
            SizeArg::Portrait => ImageSize::Portrait,
        }
    }
}

impl From<QualityArg> for ImageQuality {
    fn from(arg: QualityArg) -> Self {
        match arg {
            QualityArg::Standard => ImageQuality::Standard,
            QualityArg::Hd => ImageQuality::Hd,
        }
    }
}

impl From<StyleArg> for ImageStyle {
    fn from(arg: StyleArg) -> Self {
        match arg {
            StyleArg::Vivid => ImageStyle::Vivid,
            StyleArg::Natural => ImageStyle::Natural,
        }
    }
}

impl From<BatchTypeArg> for BatchType {
    fn from(arg: BatchTypeArg) -> Self {
        match arg {
            BatchTypeArg::Styles => BatchType::Styles,
            BatchTypeArg::Sizes => BatchType::Sizes,
            BatchTypeArg::Matrix => BatchType::Matrix,
        }
    }
}

impl ImageOptions {
    fn plan(&self, batch_type: BatchTypeArg) -> BatchPlan {
        BatchPlan::new(
            batch_type.into(),
            self.size.into(),
            self.quality.into(),
            self.style.into(),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(&cli.command).into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Generate(args) => {
            let request = GenerationRequest::new(&args.prompt)
                .with_size(args.options.size.into())
                .with_quality(args.options.quality.into())
                .with_style(args.options.style.into());
            generate(request, cli.json).await?;
        }
        Commands::Batch(args) => {
            run_batch(args, cli.json).await?;
        }
        Commands::Cost(args) => {
            show_cost(args, cli.json)?;
        }
        Commands::Budget => {
            show_budget(cli.json).await?;
        }
        Commands::Session { reset_spend } => {
            show_session(reset_spend, cli.json)?;
        }
        Commands::Gallery { clear } => {
            show_gallery(clear, cli.json)?;
        }
        #[cfg(feature = "server")]
        Commands::Serve => {
            serve().await?;
        }
    }

    Ok(())
}

fn default_filter(command: &Commands) -> &'static str {
    match command {
        #[cfg(feature = "server")]
        Commands::Serve => "imagegen=info,tower_http=info",
        _ => "imagegen=warn",
    }
}

fn relay_client(config: &ClientConfig) -> anyhow::Result<RelayClient> {
    let mut builder = RelayClient::builder().timeout(config.timeout);
    if let Some(url) = &config.api_url {
        builder = builder.base_url(url);
    }
    Ok(builder.build()?)
}

/// Cancels `token` on Ctrl-C so the running batch stops after the current slot.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current image...");
            token.cancel();
        }
    });
}

fn print_budget_line(status: &BudgetStatus) {
    println!(
        "Monthly budget: ${} of ${} spent ({:.1}%), ${} remaining{}",
        status.spent,
        status.limit,
        status.percent_used,
        status.remaining,
        if status.is_exhausted { " [EXHAUSTED]" } else { "" }
    );
}

fn print_outcomes(outcomes: &[BatchOutcome]) {
    for outcome in outcomes {
        match outcome {
            BatchOutcome::Success(slot) => {
                println!("  {:<24} {}  (${})", slot.label, slot.result.url, slot.result.cost);
                if !slot.result.revised_prompt.is_empty() {
                    println!("  {:<24} revised: {}", "", slot.result.revised_prompt);
                }
            }
            BatchOutcome::Failed(slot) => {
                println!("  {:<24} FAILED: {}", slot.label, slot.error);
            }
        }
    }
}

async fn generate(request: GenerationRequest, json_output: bool) -> anyhow::Result<()> {
    let config = ClientConfig::from_env();
    let relay = relay_client(&config)?;
    let mut session = Session::open(&config.state_path)?;
    session.refresh_budget(&relay).await;

    let executor = BatchExecutor::new(relay);
    cancel_on_ctrl_c(executor.cancellation_token());
    let outcome = session.generate_single(&executor, &request).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome.result() {
        Some(result) => {
            println!("Generated image: {}", result.url);
            if !result.revised_prompt.is_empty() {
                println!("Revised prompt: {}", result.revised_prompt);
            }
            println!("Cost: ${}", result.cost);
        }
        None => anyhow::bail!(
            "generation failed: {}",
            outcome.error().unwrap_or("unknown error")
        ),
    }
    println!(
        "Session spend: ${}, {} images left",
        session.accounting().session_spend,
        session.accounting().quota_remaining
    );
    Ok(())
}

async fn run_batch(args: BatchArgs, json_output: bool) -> anyhow::Result<()> {
    let config = ClientConfig::from_env();
    let relay = relay_client(&config)?;
    let mut session = Session::open(&config.state_path)?;
    session.refresh_budget(&relay).await;

    let plan = args.options.plan(args.batch_type);

    if args.dry_run {
        let estimate = estimate_plan_cost(&plan);
        let check = session.preflight(&args.prompt, &plan);
        if json_output {
            let result = serde_json::json!({
                "plan": plan,
                "estimate": estimate,
                "accounting": session.accounting(),
                "ok": check.is_ok(),
                "error": check.err().map(|e| e.to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            println!("Batch of {} images:", estimate.count);
            for config in &plan {
                println!("  {}", config.label);
            }
            println!(
                "Estimated cost: ${} (${} each)",
                estimate.total, estimate.per_image
            );
            match check {
                Ok(_) => println!("Pre-flight check passed"),
                Err(e) => println!("Pre-flight check failed: {e}"),
            }
        }
        return Ok(());
    }

    let executor = BatchExecutor::new(relay);
    cancel_on_ctrl_c(executor.cancellation_token());

    let outcomes = session
        .run_batch(&executor, &plan, &args.prompt, |progress| {
            if !json_output && !progress.is_idle() {
                eprintln!(
                    "Generating {}/{}...",
                    progress.current, progress.total
                );
            }
        })
        .await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        return Ok(());
    }

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    println!("Batch finished: {}/{} generated", succeeded, outcomes.len());
    print_outcomes(&outcomes);
    println!(
        "Session spend: ${}, {} images left",
        session.accounting().session_spend,
        session.accounting().quota_remaining
    );
    Ok(())
}

fn show_cost(args: CostArgs, json_output: bool) -> anyhow::Result<()> {
    let quality: ImageQuality = args.quality.into();
    let Some(batch_type) = args.batch_type else {
        let cost = cost_per_image(quality);
        if json_output {
            let result = serde_json::json!({
                "quality": quality,
                "cost": cost,
                "currency": "USD",
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            println!("{} quality: ${} per image", quality, cost);
        }
        return Ok(());
    };

    let plan = BatchPlan::new(
        batch_type.into(),
        ImageSize::default(),
        quality,
        ImageStyle::default(),
    );
    let estimate = estimate_plan_cost(&plan);
    if json_output {
        println!("{}", serde_json::to_string_pretty(&estimate)?);
    } else {
        println!(
            "{} batch: {} images x ${} = ${}",
            BatchType::from(batch_type),
            estimate.count,
            estimate.per_image,
            estimate.total
        );
    }
    Ok(())
}

async fn show_budget(json_output: bool) -> anyhow::Result<()> {
    let config = ClientConfig::from_env();
    let relay = relay_client(&config)?;
    let status = relay.fetch_budget_status().await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_budget_line(&status);
    }
    Ok(())
}

fn show_session(reset_spend: bool, json_output: bool) -> anyhow::Result<()> {
    let config = ClientConfig::from_env();
    let mut session = Session::open(&config.state_path)?;
    if reset_spend {
        session.reset_spend()?;
    }

    let accounting = session.accounting();
    if json_output {
        let result = serde_json::json!({
            "state_path": session.store().path().display().to_string(),
            "session_spend": accounting.session_spend,
            "quota_remaining": accounting.quota_remaining,
            "gallery_size": session.gallery().len(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        if reset_spend {
            println!("Session spend reset");
        }
        println!("Session spend: ${}", accounting.session_spend);
        println!(
            "Images remaining: {}/{}",
            accounting.quota_remaining,
            imagegen::DEFAULT_QUOTA
        );
        println!("Saved images: {}", session.gallery().len());
        println!("State file: {}", session.store().path().display());
    }
    Ok(())
}

fn show_gallery(clear: bool, json_output: bool) -> anyhow::Result<()> {
    let config = ClientConfig::from_env();
    let mut session = Session::open(&config.state_path)?;
    if clear {
        session.clear_gallery()?;
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(session.gallery())?);
        return Ok(());
    }
    if session.gallery().is_empty() {
        println!("Gallery is empty");
    }
    for (i, result) in session.gallery().iter().enumerate() {
        println!(
            "{:>2}. [{} {} {}] {}",
            i + 1,
            result.parameters.size.label(),
            result.parameters.quality,
            result.parameters.style,
            result.original_prompt
        );
        println!("    {}", result.url);
    }
    Ok(())
}

#[cfg(feature = "server")]
async fn serve() -> anyhow::Result<()> {
    use imagegen::image::providers::DalleProvider;
    use imagegen::server::{self, AppState, BudgetLedger};
    use std::sync::Arc;

    let config = imagegen::config::ServerConfig::from_env()?;
    let provider = DalleProvider::builder().from_env().build()?;
    let deployment = provider.deployment().to_string();
    tracing::info!(%deployment, "using DALL-E deployment");

    let state = AppState::new(
        Arc::new(provider),
        BudgetLedger::new(config.monthly_budget),
        deployment,
    );
    server::serve(&config, state, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}
