use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sitesmith::agent::{Agent, Outcome};
use sitesmith::developer::{DeveloperConfig, WebDeveloperSystem};
use sitesmith::prompt_template::system_prompt;
use sitesmith::providers::factory::get_provider;
use sitesmith::registry::ToolRegistry;

mod configuration;
mod error;
mod prompt;
mod session;

use configuration::{Overrides, Settings};
use prompt::cliclack::CliclackPrompt;
use session::Session;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Model service to use
    #[arg(short, long, value_enum)]
    provider: Option<ProviderVariant>,

    /// API key (can also be set via SITESMITH_PROVIDER__API_KEY, GEMINI_API_KEY or OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Base url of the model service
    #[arg(long)]
    host: Option<String>,

    /// Stop a request after this many model calls
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Keep one conversation for the whole session instead of starting fresh per request
    #[arg(long)]
    keep_history: bool,

    /// Run a single request and exit instead of starting an interactive session
    request: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ProviderVariant {
    Gemini,
    #[value(name = "openai")]
    OpenAi,
}

impl ProviderVariant {
    fn name(&self) -> &'static str {
        match self {
            ProviderVariant::Gemini => "gemini",
            ProviderVariant::OpenAi => "openai",
        }
    }
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            provider: self.provider.map(|p| p.name().to_string()),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            host: self.host.clone(),
            max_rounds: self.max_rounds,
            keep_history: self.keep_history,
        }
    }
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sitesmith=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();

    let settings = Settings::with_overrides(&cli.overrides())?;
    tracing::info!(
        provider = settings.provider.name(),
        model = settings.provider.model(),
        max_rounds = ?settings.agent.max_rounds,
        "loaded settings"
    );

    let developer = WebDeveloperSystem::new(DeveloperConfig {
        shell: settings.shell.to_config(),
        ..DeveloperConfig::default()
    });
    let platform = developer.platform();
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(developer))?;

    let system = system_prompt(platform, &registry).context("Failed to render system prompt")?;
    let provider = get_provider(settings.provider.into_config()?)?;
    let agent = Agent::new(provider, registry, system).with_max_rounds(settings.agent.max_rounds);

    let mut session = Session::new(
        agent,
        Box::new(CliclackPrompt::new()),
        settings.agent.keep_history,
    );
    match cli.request {
        Some(request) => match session.headless_start(&request).await {
            Outcome::Done(_) => Ok(()),
            Outcome::Failed(reason) => Err(anyhow::anyhow!("Request failed: {}", reason)),
        },
        None => session.start().await,
    }
}
