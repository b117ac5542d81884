use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use mdshare::{Config, prepare};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

/// Render markdown into shareable preview pages
#[derive(Debug, Parser)]
#[command(name = "mdshare", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render a markdown file (or `-` for stdin)
    Render(RenderArgs),
}

#[derive(Debug, Args)]
struct RenderArgs {
    /// Markdown input, `-` reads stdin
    input: String,

    /// Theme name (overrides the config file)
    #[arg(long)]
    theme: Option<String>,

    /// Days until the preview expires (overrides the config file)
    #[arg(long)]
    expiration_days: Option<u32>,

    /// Print only the sanitized HTML fragment
    #[arg(long, conflicts_with = "metadata")]
    fragment: bool,

    /// Print the derived metadata as JSON
    #[arg(long)]
    metadata: bool,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    output: Option<Utf8PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mdshare=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Render(args) => render(args).await,
    }
}

async fn render(args: RenderArgs) -> Result<()> {
    let mut config = Config::discover()?;
    if let Some(theme) = args.theme {
        config.theme = theme;
    }
    if let Some(days) = args.expiration_days {
        config.expiration_days = days;
    }

    let markdown = read_input(&args.input).await?;
    let now_ms = chrono::Utc::now().timestamp_millis();
    let prepared = prepare(&markdown, &config.to_preview_options(), now_ms).await?;
    info!(
        title = prepared.metadata.title.as_deref().unwrap_or(""),
        expires_at_ms = prepared.expires_at_ms,
        cache_control = %prepared.cache_control,
        "rendered {}",
        args.input
    );

    let output = if args.metadata {
        let mut json = serde_json::to_string_pretty(&prepared.metadata)?;
        json.push('\n');
        json
    } else if args.fragment {
        prepared.html
    } else {
        prepared.page
    };

    match args.output {
        Some(path) => tokio::fs::write(&path, output)
            .await
            .wrap_err_with(|| format!("failed to write {path}"))?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(output.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut markdown = String::new();
        tokio::io::stdin()
            .read_to_string(&mut markdown)
            .await
            .wrap_err("failed to read stdin")?;
        Ok(markdown)
    } else {
        tokio::fs::read_to_string(input)
            .await
            .wrap_err_with(|| format!("failed to read {input}"))
    }
}
