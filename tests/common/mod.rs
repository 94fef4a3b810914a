#![allow(dead_code)]

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

pub const FAKE_ENGINE: &str = "tests/engines/fake_gtp.sh";

/// Launch command of the scripted engine with `vars` (`KEY=value` words) in its environment.
pub fn fake(vars: &[&str]) -> String {
    if vars.is_empty() {
        format!("sh {FAKE_ENGINE}")
    } else {
        format!("env {} sh {FAKE_ENGINE}", vars.join(" "))
    }
}

/// Every command a player must support, comma-separated.
pub fn player_commands() -> String {
    gtp_tournament::engine::PLAYER_COMMANDS.join(",")
}

pub fn init_test_logger() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_thread_names(true)
        .with_test_writer()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
