mod bridge;
mod outline;

use crate::bridge::{HostEnvironment, HostInput};
use slint::ComponentHandle;
use std::process;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;
use tether_ui_host_runtime::ClientConfig;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing_subscriber::EnvFilter;

slint::include_modules!();

/// How long teardown waits for the session thread to finish.
const SESSION_STOP_WAIT: Duration = Duration::from_millis(500);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run() {
        tracing::error!(error = %err, "ui_host fatal error");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;
    let ui = AppWindow::new()?;

    let host = HostEnvironment {
        width: 640,
        height: 480,
        dark: ui.get_system_dark(),
    };

    let (tx, rx) = mpsc::unbounded_channel();
    install_callbacks(&ui, tx.clone());

    let ui_weak = ui.as_weak();
    let (done_tx, done_rx) = std_mpsc::channel::<()>();
    let session_handle = thread::Builder::new()
        .name("tether-session".to_string())
        .spawn(move || {
            let result = bridge::run_session(config, host, rx, ui_weak);

            let quit_result = slint::invoke_from_event_loop(|| {
                let _ = slint::quit_event_loop();
            });
            if let Err(err) = quit_result {
                tracing::warn!(error = %err, "failed to request UI event loop quit");
            }

            let _ = done_tx.send(());
            result
        })?;

    ui.run()?;

    // Drop UI first so callback closures release their `tx` clones.
    drop(ui);
    if tx.send(HostInput::Shutdown).is_err() {
        tracing::debug!("session already stopped");
    }
    drop(tx);

    // A disconnect means the thread ended without signalling (a panic).
    let stopped = !matches!(
        done_rx.recv_timeout(SESSION_STOP_WAIT),
        Err(std_mpsc::RecvTimeoutError::Timeout)
    );

    if stopped {
        match session_handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(error = %err, "session thread returned error"),
            Err(err) => tracing::error!(error = ?err, "session thread join failed"),
        }
    } else {
        // Avoid hanging process exit on a blocked connect during teardown.
        tracing::warn!("session thread still active during shutdown; skipping join");
    }

    Ok(())
}

fn install_callbacks(ui: &AppWindow, tx: UnboundedSender<HostInput>) {
    let click_tx = tx.clone();
    ui.on_row_clicked(move |key| {
        send_input(&click_tx, HostInput::RowClicked(key.to_string()));
    });

    let back_tx = tx.clone();
    ui.on_go_back(move || {
        send_input(&back_tx, HostInput::GoBack);
    });

    let resize_tx = tx.clone();
    ui.on_resized(move |width, height| {
        let (Ok(width), Ok(height)) = (u32::try_from(width), u32::try_from(height)) else {
            return;
        };
        send_input(&resize_tx, HostInput::Resized { width, height });
    });

    ui.on_system_theme_changed(move |dark| {
        send_input(&tx, HostInput::SystemTheme { dark });
    });
}

fn send_input(tx: &UnboundedSender<HostInput>, input: HostInput) {
    if tx.send(input.clone()).is_err() {
        tracing::warn!(?input, "failed to queue UI input");
    }
}
