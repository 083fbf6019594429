//! Listener and command registry.
//!
//! Both tables are append-only and preserve insertion order: listeners per
//! [`EventKind`], commands per name, and command names in the order they were
//! first registered.

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::{Command, CommandDoc};
use crate::event::EventKind;
use crate::listener::Listener;

/// A registered item together with the label of whoever registered it.
#[derive(Debug, Clone)]
pub struct Entry<T> {
    pub item: T,
    pub source: Arc<str>,
}

/// Insertion-ordered listener and command tables.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    listeners: HashMap<EventKind, Vec<Entry<Listener>>>,
    commands: HashMap<String, Vec<Entry<Command>>>,
    command_order: Vec<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Listener, source: Arc<str>) {
        self.listeners
            .entry(listener.kind())
            .or_default()
            .push(Entry {
                item: listener,
                source,
            });
    }

    pub fn add_command(&mut self, command: Command, source: Arc<str>) {
        let entries = self.commands.entry(command.name().to_string()).or_default();
        if entries.is_empty() {
            self.command_order.push(command.name().to_string());
        }
        entries.push(Entry {
            item: command,
            source,
        });
    }

    /// Listeners for exactly `kind`, in registration order.
    pub fn listeners(&self, kind: EventKind) -> &[Entry<Listener>] {
        self.listeners.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Commands registered under `name`, in registration order.
    pub fn commands(&self, name: &str) -> &[Entry<Command>] {
        self.commands.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Command names in first-registration order.
    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.command_order.iter().map(String::as_str)
    }

    /// One doc per command name, taken from the first registration.
    pub fn command_docs(&self) -> impl Iterator<Item = CommandDoc> + '_ {
        self.command_names().filter_map(|name| {
            self.commands(name)
                .first()
                .map(|entry| CommandDoc::new(name, entry.item.doc()))
        })
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub fn command_count(&self) -> usize {
        self.commands.values().map(Vec::len).sum()
    }
}
