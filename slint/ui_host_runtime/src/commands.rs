//! Side-effecting commands requested by the server.

use crate::batch::Outbox;
use crate::error::CommandError;
use crate::protocol::{Command, Update};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub trait CommandTarget {
    fn name(&self) -> &'static str;

    fn execute(&mut self, command: &str, args: &[Value]) -> Result<Value, CommandError>;
}

pub struct CommandExecutor {
    targets: HashMap<&'static str, Box<dyn CommandTarget>>,
    outbox: Outbox,
}

impl CommandExecutor {
    pub fn new(outbox: Outbox) -> Self {
        Self {
            targets: HashMap::new(),
            outbox,
        }
    }

    pub fn register(&mut self, target: impl CommandTarget + 'static) -> &mut Self {
        self.targets.insert(target.name(), Box::new(target));
        self
    }

    /// Runs `commands` in order. A command whose target or verb is unknown is
    /// logged and skipped; the rest still run. Returns how many succeeded.
    pub fn execute_all(&mut self, commands: &[Command]) -> usize {
        let mut executed = 0;

        for command in commands {
            match self.execute(command) {
                Ok(result) => {
                    self.outbox.enqueue_all([
                        Update::new(command.result_key.as_str(), "running", false),
                        Update::new(command.result_key.as_str(), "done", true),
                        Update::new(command.result_key.as_str(), "result", result),
                    ]);
                    executed += 1;
                }
                Err(err) => {
                    tracing::error!(error = %err, result_key = %command.result_key, "command skipped");
                }
            }
        }

        executed
    }

    fn execute(&mut self, command: &Command) -> Result<Value, CommandError> {
        let target = self
            .targets
            .get_mut(command.target.as_str())
            .ok_or_else(|| CommandError::UnknownTarget(command.target.clone()))?;

        target.execute(&command.command, &command.args)
    }
}

/// In-memory key/value store answering the `localStorage` verbs.
#[derive(Debug, Default, Clone)]
pub struct LocalStorage {
    items: BTreeMap<String, String>,
}

impl LocalStorage {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl CommandTarget for LocalStorage {
    fn name(&self) -> &'static str {
        "localStorage"
    }

    fn execute(&mut self, command: &str, args: &[Value]) -> Result<Value, CommandError> {
        match command {
            "getItem" => {
                let key = string_arg(command, args, 0)?;
                Ok(self
                    .items
                    .get(&key)
                    .map_or(Value::Null, |value| Value::String(value.clone())))
            }
            "hasItem" => {
                let key = string_arg(command, args, 0)?;
                Ok(Value::Bool(self.items.contains_key(&key)))
            }
            "setItem" => {
                let key = string_arg(command, args, 0)?;
                let value = string_arg(command, args, 1)?;
                self.items.insert(key, value);
                Ok(Value::Null)
            }
            "removeItem" => {
                let key = string_arg(command, args, 0)?;
                self.items.remove(&key);
                Ok(Value::Null)
            }
            "clear" => {
                self.items.clear();
                Ok(Value::Null)
            }
            _ => Err(CommandError::UnknownCommand {
                target: self.name().to_string(),
                command: command.to_string(),
            }),
        }
    }
}

/// Storage keeps strings; other JSON values are stored in their text form.
fn string_arg(command: &str, args: &[Value], index: usize) -> Result<String, CommandError> {
    match args.get(index) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(CommandError::MissingArgument {
            command: command.to_string(),
            index,
        }),
    }
}
