//! Long-press a list row and confirm its context menu opened.
//!
//! Attaches to an existing Appium session:
//!
//! ```sh
//! cargo run --example open_context_menu -- http://127.0.0.1:4723 <session-id> "Floor 2"
//! ```

use anyhow::{bail, Context};
use screenwright::{
    navigate_and_verify_with, Automator, EngineConfig, GestureKind, Query, ScreenPredicate,
    Strategy, WebDriverSession,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screenwright=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let server = args
        .next()
        .or_else(|| std::env::var("SCREENWRIGHT_SERVER_URL").ok())
        .unwrap_or_else(|| "http://127.0.0.1:4723".to_string());
    let Some(session_id) = args.next().or_else(|| std::env::var("SCREENWRIGHT_SESSION_ID").ok()) else {
        bail!("usage: open_context_menu <server-url> <session-id> [row-label]");
    };
    let row = args.next().unwrap_or_else(|| "Floor 2".to_string());

    let session = WebDriverSession::attach(&server, &session_id)
        .with_context(|| format!("attaching to {session_id} on {server}"))?;
    let config = EngineConfig::from_env()?;
    let automator = Automator::with_config(Arc::new(session), config);

    // The list must be on screen before anything is resolved
    automator
        .locator(Strategy::by_type("navigationbar", None))
        .wait_async(Some(Duration::from_secs(15)))
        .await
        .context("list screen never appeared")?;

    let target = Query::new(
        format!("row '{row}'"),
        vec![
            Strategy::by_type("cell", Some(&row)),
            Strategy::by_label(&row),
            Strategy::by_label_contains(&row),
        ],
    )?;
    let menu = ScreenPredicate::any_of(
        "context menu",
        vec![
            ScreenPredicate::element_present("menu", Query::from("type:menu")),
            ScreenPredicate::title_present("Delete"),
        ],
    );

    let worker = automator.clone();
    let transition = tokio::task::spawn_blocking(move || {
        let config = worker.config().clone();
        navigate_and_verify_with(
            worker.driver().as_ref(),
            &target,
            GestureKind::LongPress(config.gesture.long_press()),
            &menu,
            &config,
        )
    })
    .await??;

    println!(
        "context menu for '{row}' open after {:?} ({} scrolls, via {})",
        transition.confirmed_after,
        transition.scrolls,
        transition.element.strategy()
    );
    Ok(())
}
