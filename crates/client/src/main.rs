//! Notifier Client - Main entry point
//!
//! Runs one notification session in the terminal and prints the feed as it
//! changes. Ctrl-C ends the session.

use std::rc::Rc;

use anyhow::{bail, Context};
use chrono::Utc;
use notifier_client::{
    logging, ApiClient, AuthSession, EventChannel, NotificationService, NotificationSession,
    NotifierConfig, Storage, TokioScheduler, WebSocketTransport,
};

fn main() -> anyhow::Result<()> {
    logging::init("notifier_client=debug");

    let config = NotifierConfig::from_env().context("invalid notifier configuration")?;
    let storage = Storage::default_location();

    // Seed the stored credential from the environment when given.
    let identity = match (
        std::env::var("NOTIFIER_USER_ID"),
        std::env::var("NOTIFIER_TOKEN"),
    ) {
        (Ok(user_id), Ok(token)) => {
            let session = AuthSession::new(user_id, token);
            match &storage {
                Some(storage) if session.save(storage) => {}
                _ => notifier_client::log_warn!("Could not persist credential"),
            }
            Some(session)
        }
        _ => storage.as_ref().and_then(AuthSession::load),
    };
    let Some(identity) = identity.filter(|s| s.is_usable()) else {
        bail!("no credential: set NOTIFIER_USER_ID and NOTIFIER_TOKEN");
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let local = tokio::task::LocalSet::new();

    local.block_on(&runtime, run(config, identity));
    Ok(())
}

async fn run(config: NotifierConfig, identity: AuthSession) {
    let api = ApiClient::new()
        .with_base_url(config.api_base_url.clone())
        .with_token(identity.token.clone());

    let channel = EventChannel::new();
    let scheduler = Rc::new(TokioScheduler::new(channel.sender()));
    let session = NotificationSession::new(
        &config,
        Some(identity),
        Rc::new(NotificationService::new(api)),
        Box::new(WebSocketTransport::new()),
        scheduler,
        channel,
    );
    let handle = session.handle();

    let mut feed = handle.subscribe();
    tokio::task::spawn_local(async move {
        while feed.changed().await.is_ok() {
            let snapshot = feed.borrow_and_update().clone();
            let now = Utc::now();
            println!("── {} unread ──", snapshot.unread_count);
            for n in snapshot.notifications.iter().take(5) {
                println!(
                    "{} [{}] {}: {} ({})",
                    if n.read { " " } else { "•" },
                    n.kind.as_str(),
                    n.title,
                    n.message,
                    n.relative_time(now)
                );
            }
        }
    });

    let mut status = handle.connection_status();
    tokio::task::spawn_local(async move {
        while status.changed().await.is_ok() {
            let state = status.borrow_and_update().clone();
            match &state.last_error {
                Some(e) => println!("[{}] {}", state.phase.label(), e),
                None => println!("[{}]", state.phase.label()),
            }
        }
    });

    let shutdown = handle.clone();
    tokio::task::spawn_local(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.shutdown();
        }
    });

    session.run().await;
}
