use anyhow::Context;
use clap::Parser;
use cw_canvas::{BearerProvider, CanvasViewCache, RealtimeTileSource};
use cw_core::config::RECOMMENDED_MAX_SESSIONS;
use cw_core::logging::init_logging;
use cw_core::{
    AgentConfig, ConfigOverrides, CredentialPool, GraphqlGateway, HttpOrderFeed, LoopContext,
    OrderStore, PassthroughTokenSource, Reconciler, SelectionMode, SessionPageTokenSource,
    SystemClock, TokenSource, TokenSourceKind, Warden, WardenError,
};
use cw_palette::PaletteKind;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Keeps a region of a shared pixel canvas matching its placement orders
#[derive(Debug, Parser)]
#[command(name = "canvas-warden", version)]
struct Cli {
    /// TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// `;`-delimited session identifiers, one placement loop each
    #[arg(long, env = "CANVAS_WARDEN_SESSIONS", hide_env_values = true)]
    sessions: Option<String>,

    /// Target selection: scan-first or collect-all
    #[arg(long)]
    selection: Option<SelectionMode>,

    /// Built-in palette: legacy or extended
    #[arg(long)]
    palette: Option<PaletteKind>,

    /// Also append log lines to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Order list URL
    #[arg(long, value_name = "URL")]
    orders_url: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            sessions: self.sessions.clone(),
            selection: self.selection,
            palette: self.palette,
            log_file: self.log_file.clone(),
            orders_url: self.orders_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("canvas-warden: {err:#}");
            err.downcast_ref::<WardenError>()
                .map_or(ExitCode::FAILURE, |err| ExitCode::from(err.exit_code()))
        }
    }
}

fn load_config(cli: &Cli) -> Result<AgentConfig, WardenError> {
    let config = match &cli.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    }
    .with_overrides(cli.overrides());
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    init_logging(config.log_file.as_deref())?;

    let sessions = config.session_list();
    if sessions.len() > RECOMMENDED_MAX_SESSIONS {
        tracing::warn!(
            sessions = sessions.len(),
            "More than {RECOMMENDED_MAX_SESSIONS} sessions from one address may get them throttled"
        );
    }

    let http = reqwest::Client::builder()
        .user_agent(concat!("canvas-warden/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let token_source: Arc<dyn TokenSource> = match config.token_source {
        TokenSourceKind::Passthrough => Arc::new(PassthroughTokenSource),
        TokenSourceKind::SessionPage => Arc::new(SessionPageTokenSource::new(
            http.clone(),
            config.endpoints.session_page_url.clone(),
        )),
    };
    let credentials = Arc::new(CredentialPool::new(sessions, token_source).map_err(WardenError::from)?);
    let acquired = credentials.refresh_all().await;
    if acquired < credentials.len() {
        tracing::warn!(
            acquired,
            total = credentials.len(),
            retry_secs = config.credentials_retry().as_secs(),
            "Some access tokens are missing, retrying"
        );
    }
    let _credential_refresher =
        credentials.spawn_refresher(config.credentials_refresh(), config.credentials_retry());

    let feed = HttpOrderFeed::new(http.clone(), config.endpoints.orders_url.clone());
    let orders = Arc::new(OrderStore::new(Arc::new(feed)));
    let _ = orders.refresh().await;
    let _order_refresher = orders.spawn_refresher(config.orders_refresh());

    let layout = config.layout();
    let bearer: Arc<dyn BearerProvider> = credentials.clone();
    let tiles = RealtimeTileSource::new(config.subscription(), http.clone(), bearer);
    let canvas = Arc::new(CanvasViewCache::new(tiles, layout, config.freshness()));
    let gateway = GraphqlGateway::new(http, config.endpoints.placement_url.clone(), layout)
        .with_origin(config.endpoints.origin.clone());

    let palette = config.palette_catalog();
    tracing::info!(
        accounts = credentials.len(),
        selection = %config.selection,
        colors = palette.len(),
        "Canvas Warden starting"
    );

    let ctx = LoopContext {
        orders,
        credentials,
        canvas,
        gateway: Arc::new(gateway),
        reconciler: Reconciler::new(Arc::new(palette)),
        selection: config.selection,
        gate: config.gate,
        timings: config.timings(),
        clock: Arc::new(SystemClock),
    };

    tokio::select! {
        () = Warden::new(ctx).run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            tracing::info!("Shutting down");
        }
    }
    Ok(())
}
