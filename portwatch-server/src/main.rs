use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use portwatch_server::config::{Cli, Command, ServeArgs, Settings, WatchArgs};
use portwatch_server::connector::StreamWatcher;
use portwatch_server::store::{FleetStore, MemoryStore};
use portwatch_server::web::{AppState, Web};
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Watch(args) => watch(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let store: Arc<dyn FleetStore> = match &args.fleet {
        Some(path) => Arc::new(MemoryStore::load(path).await.into_diagnostic()?),
        None => {
            log::warn!("No --fleet file given, starting with an empty store");
            Arc::new(MemoryStore::default())
        }
    };
    let state = AppState::new(store, Settings::from(&args), args.seed);
    let port = args.port;

    Toplevel::new(move |s: SubsystemHandle| async move {
        let broadcaster = state.broadcaster.clone();
        s.start(SubsystemBuilder::new("broadcaster", move |s| broadcaster.run(s)));
        s.start(SubsystemBuilder::new("web", move |s| Web::new(state, port).run(s)));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_millis(5000))
    .await
    .map_err(Into::into)
}

async fn watch(args: WatchArgs) -> Result<()> {
    let watcher = StreamWatcher::new(
        &args.url,
        args.radius,
        Duration::from_secs(args.reconnect_delay),
    );

    Toplevel::new(move |s: SubsystemHandle| async move {
        s.start(SubsystemBuilder::new("watch", move |s| watcher.run(s)));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_millis(1000))
    .await
    .map_err(Into::into)
}
