//! Session thread.
//!
//! The session, its channel and every adapter live on one thread with a
//! current-thread Tokio runtime. UI callbacks reach it through
//! [`HostInput`]; results go back through `upgrade_in_event_loop`.

use crate::outline::{self, OutlineItem};
use crate::{AppWindow, OutlineRow};
use slint::{ModelRc, SharedString, VecModel, Weak};
use std::cell::RefCell;
use std::rc::Rc;
use tether_ui_host_runtime::env::{
    Appearance, ClipboardAdapter, LocationAdapter, ThemeAdapter, WindowAdapter,
};
use tether_ui_host_runtime::{
    Client, ClientConfig, CommandExecutor, ConnectionIndicator, Environment, IndicatorState,
    LocalStorage, Outbox, Session, TcpTransport, UiEvent,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostInput {
    RowClicked(String),
    GoBack,
    Resized { width: u32, height: u32 },
    SystemTheme { dark: bool },
    Shutdown,
}

/// Host facts known before the window is shown.
#[derive(Debug, Clone, Copy)]
pub struct HostEnvironment {
    pub width: u32,
    pub height: u32,
    pub dark: bool,
}

pub fn run_session(
    config: ClientConfig,
    host: HostEnvironment,
    inputs: UnboundedReceiver<HostInput>,
    ui: Weak<AppWindow>,
) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, drive(config, host, inputs, ui));
    Ok(())
}

async fn drive(
    config: ClientConfig,
    host: HostEnvironment,
    mut inputs: UnboundedReceiver<HostInput>,
    ui: Weak<AppWindow>,
) {
    let outbox = Outbox::new();

    let location = Rc::new(RefCell::new(LocationAdapter::new(
        outbox.clone(),
        config.server_url.clone(),
        &config.initial_location,
    )));
    let theme = Rc::new(RefCell::new(
        ThemeAdapter::new(outbox.clone(), appearance(host.dark)).with_mode(config.theme_mode),
    ));
    let window = Rc::new(RefCell::new(WindowAdapter::new(
        outbox.clone(),
        host.width,
        host.height,
    )));
    let clipboard = {
        let ui = ui.clone();
        ClipboardAdapter::new(outbox.clone(), move |text| {
            let text = SharedString::from(text);
            let _ = ui.upgrade_in_event_loop(move |ui| ui.set_clipboard_text(text));
        })
    };

    let mut environment = Environment::new();
    environment
        .register(location.clone())
        .register(theme.clone())
        .register(window.clone())
        .register(clipboard);

    let mut commands = CommandExecutor::new(outbox.clone());
    commands.register(LocalStorage::default());

    let session = Session::new(outline::behaviors(), outbox)
        .with_environment(environment)
        .with_commands(commands);
    let transport = TcpTransport::new().with_max_inbound(config.max_inbound_frame);
    let client = Client::new(transport, config.channel_config(), session);

    let view = Rc::new(View {
        session: client.session(),
        location,
        theme: theme.clone(),
        ui: ui.clone(),
    });

    {
        let view = view.clone();
        client.on_frame_applied(move |_frame, _outcome| view.publish());
    }

    let (changes_tx, changes_rx) = mpsc::unbounded_channel();
    client.channel().on_connection_change(move |connected| {
        let _ = changes_tx.send(connected);
    });

    let indicator = ConnectionIndicator::new(config.unstable_grace).run(changes_rx, {
        let ui = ui.clone();
        move |state| {
            let label = SharedString::from(indicator_label(state));
            let _ = ui.upgrade_in_event_loop(move |ui| ui.set_connection_state(label));
        }
    });

    tracing::info!(
        url = %config.server_url,
        theme_mode = config.theme_mode.as_str(),
        "session started"
    );
    view.publish();

    tokio::select! {
        _ = client.run() => tracing::warn!("channel stopped"),
        _ = indicator => tracing::debug!("connection indicator stopped"),
        _ = handle_inputs(&mut inputs, &view, &window, &theme) => {
            tracing::debug!("ui closed; ending session");
        }
    }
}

async fn handle_inputs(
    inputs: &mut UnboundedReceiver<HostInput>,
    view: &View,
    window: &RefCell<WindowAdapter>,
    theme: &RefCell<ThemeAdapter>,
) {
    while let Some(input) = inputs.recv().await {
        match input {
            HostInput::RowClicked(key) => view.click(&key),
            HostInput::GoBack => {
                if !view.location.borrow_mut().go_back() {
                    tracing::debug!("no previous location");
                }
            }
            HostInput::Resized { width, height } => {
                window.borrow_mut().resize(width, height);
            }
            HostInput::SystemTheme { dark } => {
                theme.borrow_mut().set_system_mode(appearance(dark));
            }
            HostInput::Shutdown => break,
        }

        view.publish();
    }
}

struct View {
    session: Rc<RefCell<Session<OutlineItem>>>,
    location: Rc<RefCell<LocationAdapter>>,
    theme: Rc<RefCell<ThemeAdapter>>,
    ui: Weak<AppWindow>,
}

impl View {
    /// Reports the click, then follows the element's `href` if it is a link.
    fn click(&self, key: &str) {
        let target = {
            let session = self.session.borrow();
            session.dispatch_event(key, &UiEvent::new("click"));
            outline::link_target(session.context(), key)
        };

        let Some(href) = target else {
            return;
        };

        let resolved = outline::resolve_href(self.location.borrow().current(), &href);
        match resolved {
            Some(path) => {
                if let Err(err) = self.location.borrow_mut().navigate(&path) {
                    tracing::warn!(key, href = %href, error = %err, "link not followed");
                }
            }
            None => tracing::info!(key, href = %href, "external link not followed"),
        }
    }

    fn publish(&self) {
        let (rows, rule_count) = {
            let session = self.session.borrow();
            let rows: Vec<OutlineRow> = outline::snapshot(session.context())
                .into_iter()
                .map(|row| OutlineRow {
                    key: row.key.into(),
                    depth: i32::try_from(row.depth).unwrap_or(i32::MAX),
                    label: row.label.into(),
                    clickable: row.clickable,
                })
                .collect();
            let rule_count = session.context().styles.sheet().len();
            (rows, i32::try_from(rule_count).unwrap_or(i32::MAX))
        };

        let (location, can_go_back) = {
            let location = self.location.borrow();
            (
                SharedString::from(location.current().to_string()),
                location.can_go_back(),
            )
        };
        let dark = self.theme.borrow().appearance() == Appearance::Dark;

        let result = self.ui.upgrade_in_event_loop(move |ui| {
            ui.set_rows(ModelRc::new(VecModel::from(rows)));
            ui.set_rule_count(rule_count);
            ui.set_location(location);
            ui.set_can_go_back(can_go_back);
            ui.set_dark(dark);
        });

        if let Err(err) = result {
            tracing::debug!(error = %err, "ui gone; view not published");
        }
    }
}

fn appearance(dark: bool) -> Appearance {
    if dark {
        Appearance::Dark
    } else {
        Appearance::Light
    }
}

fn indicator_label(state: IndicatorState) -> &'static str {
    match state {
        IndicatorState::Hidden => "connected",
        IndicatorState::Disconnected => "disconnected",
        IndicatorState::Unstable => "unstable",
    }
}
