use clap::{Parser, ValueEnum};
use fragment_harvest::cdp::CdpBackend;
use fragment_harvest::simple::SimpleBackend;
use fragment_harvest::{pipeline, HarvestConfig, OutputLayout, Timing};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Headless Chrome over the DevTools protocol
    Chrome,
    /// Plain HTTP fetch, no JavaScript
    Static,
}

/// Extract a site's header and footer into embeddable units plus one scoped stylesheet
#[derive(Parser, Debug)]
#[command(name = "fragment-harvest", version)]
struct Cli {
    /// Base URL of the site to harvest
    #[arg(long, env = "FRAGMENTS_BASE_URL")]
    base_url: String,

    /// Path (and query) joined onto the base URL
    #[arg(long, default_value = "/")]
    path: String,

    /// Directory receiving the unit files and index.ts
    #[arg(long, env = "FRAGMENTS_COMPONENTS_DIR", default_value = "src/external")]
    components_dir: PathBuf,

    /// Consolidated stylesheet path
    #[arg(long, env = "FRAGMENTS_STYLESHEET", default_value = "src/styles/auto-generated.css")]
    stylesheet: PathBuf,

    #[arg(long, value_enum, default_value_t = BackendKind::Chrome)]
    backend: BackendKind,

    /// Run Chrome without its sandbox (needed in most containers)
    #[arg(long)]
    no_sandbox: bool,

    /// Delay after network idle before capturing fragments
    #[arg(long, default_value_t = 3_000)]
    settle_ms: u64,

    /// Navigation plus network-idle timeout
    #[arg(long, default_value_t = 30_000)]
    nav_timeout_ms: u64,

    /// Per-stylesheet fetch timeout
    #[arg(long, default_value_t = 10_000)]
    fetch_timeout_ms: u64,

    /// Dump every CSS stage output and a JSON run report here
    #[arg(long)]
    debug_dir: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> HarvestConfig {
        HarvestConfig {
            base_url: self.base_url,
            target_path: self.path,
            timing: Timing {
                navigation_timeout: Duration::from_millis(self.nav_timeout_ms),
                settle_delay: Duration::from_millis(self.settle_ms),
                fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
                ..Default::default()
            },
            sandbox: !self.no_sandbox,
            output: OutputLayout { components_dir: self.components_dir, stylesheet_path: self.stylesheet },
            debug_dir: self.debug_dir,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let backend = cli.backend;
    let config = cli.into_config();

    let report = match backend {
        BackendKind::Chrome => pipeline::run::<CdpBackend>(&config).await,
        BackendKind::Static => pipeline::run::<SimpleBackend>(&config).await,
    };

    std::process::exit(report.exit_code());
}
