//! Per-session state and server frame routing.

use crate::batch::Outbox;
use crate::behavior::{BehaviorTable, UiEvent};
use crate::commands::CommandExecutor;
use crate::env::Environment;
use crate::protocol::{ServerFrame, Update};
use crate::reconcile::{DiffOutcome, ElementCache, Reconciler};
use crate::style::StyleCache;
use crate::tree::ElementTree;
use std::cell::RefCell;

/// Live tree plus the two caches, owned by one session. Only the
/// reconciler mutates it.
pub struct SessionContext<H> {
    pub tree: ElementTree<H>,
    pub elements: ElementCache,
    pub styles: StyleCache,
}

impl<H> Default for SessionContext<H> {
    fn default() -> Self {
        Self {
            tree: ElementTree::new(),
            elements: ElementCache::new(),
            styles: StyleCache::new(),
        }
    }
}

type NextUpdateHook = Box<dyn FnOnce()>;

/// Callbacks run once, after the next server frame has been fully handled.
#[derive(Default)]
struct NextUpdateHooks(RefCell<Vec<NextUpdateHook>>);

impl NextUpdateHooks {
    fn push(&self, hook: impl FnOnce() + 'static) {
        self.0.borrow_mut().push(Box::new(hook));
    }

    fn run_pending(&self) {
        // Taken first so a hook may register another for the frame after.
        let pending = std::mem::take(&mut *self.0.borrow_mut());
        for hook in pending {
            hook();
        }
    }
}

pub struct Session<H> {
    context: SessionContext<H>,
    reconciler: Reconciler<H>,
    outbox: Outbox,
    environment: Environment,
    commands: CommandExecutor,
    next_update: NextUpdateHooks,
}

impl<H> Session<H> {
    pub fn new(behaviors: BehaviorTable<H>, outbox: Outbox) -> Self {
        Self {
            context: SessionContext::default(),
            reconciler: Reconciler::new(behaviors),
            commands: CommandExecutor::new(outbox.clone()),
            outbox,
            environment: Environment::new(),
            next_update: NextUpdateHooks::default(),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_commands(mut self, commands: CommandExecutor) -> Self {
        self.commands = commands;
        self
    }

    pub fn context(&self) -> &SessionContext<H> {
        &self.context
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn on_next_update(&self, hook: impl FnOnce() + 'static) {
        self.next_update.push(hook);
    }

    /// Environment facts carried in the connection URL.
    pub fn initial_updates(&self) -> Vec<Update> {
        self.environment.initial_updates()
    }

    /// Routes one server frame: tree (diff, else dom), then singletons, then
    /// commands, then next-update hooks.
    pub fn handle_frame(&mut self, frame: &ServerFrame) -> DiffOutcome {
        let outcome = match (&frame.diff, &frame.dom) {
            (Some(diff), dom) => {
                if dom.is_some() {
                    tracing::debug!("frame carries both diff and dom; applying the diff");
                }
                self.reconciler.apply_diff(&mut self.context, diff)
            }
            (None, Some(dom)) => self.reconciler.replace_root(&mut self.context, dom),
            (None, None) => DiffOutcome::default(),
        };

        if let Some(singletons) = &frame.singletons {
            self.environment.apply_singletons(singletons);
        }

        if !frame.commands.is_empty() {
            self.commands.execute_all(&frame.commands);
        }

        self.next_update.run_pending();
        outcome
    }

    /// Delivers `event` to the element at `key` and bubbles it up through
    /// bindings that let it propagate. Returns the number of updates queued.
    pub fn dispatch_event(&self, key: &str, event: &UiEvent) -> usize {
        let Some(entry) = self.context.elements.get(key) else {
            tracing::warn!(key, event = %event.name, "event for unknown key");
            return 0;
        };

        let mut updates = Vec::new();
        let mut next = Some(entry.element);

        while let Some(id) = next {
            let Some(element) = self.context.tree.get(id) else {
                break;
            };
            let (produced, bubbles) = element.handle_event(event);
            updates.extend(produced);
            next = if bubbles { element.parent() } else { None };
        }

        let queued = updates.len();
        self.outbox.enqueue_all(updates);
        queued
    }
}
