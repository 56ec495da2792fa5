//! Command dispatch table.
//!
//! A command line is `name [arg1 [arg2 ...]]`: split on single spaces, no
//! quoting or escaping, so an argument can never contain a space.  The
//! registry maps names to handlers and always answers with one line of
//! text:
//!
//! | Outcome              | Response                  |
//! |----------------------|---------------------------|
//! | handler succeeded    | whatever it returned      |
//! | handler failed       | `ERROR: <message>`        |
//! | no such command      | `Unknown command: <name>` |
//!
//! Built-in commands:
//!
//! * `ping` → `pong`
//! * `show <component>` → toggles `launcher` or `terminal`, answers `OK`

use crate::traits::Toggle;
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A handler refused to run.  The message is sent to the client verbatim
/// after `ERROR: `.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CommandError(pub String);

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type Handler = Box<dyn Fn(&[&str]) -> Result<String, CommandError>>;

/// The shell surfaces that `show` can toggle.
///
/// A slot is `None` when the component could not be created (for example
/// the terminal is disabled in the config).
#[derive(Default)]
pub struct Components {
    pub launcher: Option<Box<dyn Toggle>>,
    pub terminal: Option<Box<dyn Toggle>>,
}

impl Components {
    /// Look a component up by its command-line name.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut dyn Toggle, CommandError> {
        let slot = match name {
            "launcher" => &mut self.launcher,
            "terminal" => &mut self.terminal,
            _ => return Err(CommandError(format!("unknown component: {}", name))),
        };
        match slot {
            Some(component) => Ok(component.as_mut()),
            None => Err(CommandError(format!("{} not available", name))),
        }
    }
}

/// Split a command line into its name and positional arguments.
pub fn parse_command(line: &str) -> (&str, Vec<&str>) {
    let mut parts = line.split(' ');
    let name = parts.next().unwrap_or_default();
    (name, parts.collect())
}

pub struct CommandRegistry {
    handlers: HashMap<String, Handler>,
}

impl CommandRegistry {
    /// A registry with the built-in commands, bound to `components`.
    pub fn new(components: Rc<RefCell<Components>>) -> Self {
        let mut registry = Self::empty();
        registry.register("ping", |_| Ok("pong".into()));
        registry.register("show", move |args| {
            show(&mut components.borrow_mut(), args)
        });
        registry
    }

    /// A registry without any command.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Bind `handler` to `name`, replacing any previous binding.
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&[&str]) -> Result<String, CommandError> + 'static,
    {
        self.handlers.insert(name.to_string(), Box::new(handler));
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Execute one command line and return the response text.
    pub fn run(&self, line: &str) -> String {
        debug!("processing command: {:?}", line);
        let (name, args) = parse_command(line);
        match self.handlers.get(name) {
            Some(handler) => match handler(&args) {
                Ok(response) => response,
                Err(e) => format!("ERROR: {}", e),
            },
            None => format!("Unknown command: {}", name),
        }
    }
}

/// `show <component>`
fn show(components: &mut Components, args: &[&str]) -> Result<String, CommandError> {
    let [name] = args else {
        return Err(CommandError::new("invalid params"));
    };
    components.get_mut(name)?.toggle();
    Ok("OK".into())
}
