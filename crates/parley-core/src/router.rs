//! Thread routing across a fleet of bots.
//!
//! Each thread belongs to at most one bot. Events in an owned thread go to
//! the owner only; events in an unowned thread go to the fallback bot, the
//! single bot that owns no thread at all. Events that are not thread-scoped
//! go to every bot.
//!
//! Routing happens in two phases:
//!
//! - **Setup**: a [`BotManager`] creates bots, loads their plugins and
//!   assigns threads.
//! - **Run**: [`BotManager::start`] computes the fallback and freezes the bots
//!   into a [`Fleet`]. A [`Router`] obtained from the fleet picks the
//!   recipients of each event.
//!
//! ```rust,ignore
//! let mut manager = BotManager::new();
//! let support = manager.add_bot("support")?.id();
//! manager.add_bot("chatter")?;
//! manager.assign_thread("123", support)?;
//!
//! let fleet = manager.start()?;
//! let router = fleet.router(None)?;
//! while let Some(event) = session.next_event().await? {
//!     router.route_and_dispatch(event).await?;
//! }
//! ```
//!
//! The thread map is shared, so bots may claim more threads while running.
//! The fallback, however, is fixed at start.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::bot::{Bot, DispatchSettings};
use crate::error::{DispatchResult, RegistrationResult, RoutingError, RoutingResult};
use crate::event::Event;

/// Identifies a bot within its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BotId(usize);

impl BotId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Thread map
// =============================================================================

#[derive(Debug, Clone)]
struct ThreadOwner {
    id: BotId,
    name: Arc<str>,
}

/// Thread to bot ownership. Entries are never removed or reassigned.
#[derive(Debug, Default)]
pub struct ThreadMap {
    owners: RwLock<HashMap<String, ThreadOwner>>,
}

impl ThreadMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `thread` to the bot `id`.
    ///
    /// Re-assigning to the same bot is a no-op.
    pub fn assign(&self, thread: &str, id: BotId, name: &str) -> RoutingResult<()> {
        let mut owners = self.owners.write();
        match owners.get(thread) {
            Some(owner) if owner.id == id => Ok(()),
            Some(owner) => Err(RoutingError::ThreadConflict {
                thread: thread.to_string(),
                owner: owner.name.to_string(),
                requested: name.to_string(),
            }),
            None => {
                debug!(thread, bot = name, "Assigned thread");
                owners.insert(
                    thread.to_string(),
                    ThreadOwner {
                        id,
                        name: name.into(),
                    },
                );
                Ok(())
            }
        }
    }

    pub fn owner(&self, thread: &str) -> Option<BotId> {
        self.owners.read().get(thread).map(|owner| owner.id)
    }

    /// Whether the bot owns at least one thread.
    pub fn owns_any(&self, id: BotId) -> bool {
        self.owners.read().values().any(|owner| owner.id == id)
    }

    /// Threads owned by the bot, sorted.
    pub fn threads_of(&self, id: BotId) -> Vec<String> {
        let mut threads: Vec<String> = self
            .owners
            .read()
            .iter()
            .filter(|(_, owner)| owner.id == id)
            .map(|(thread, _)| thread.clone())
            .collect();
        threads.sort_unstable();
        threads
    }

    pub fn len(&self) -> usize {
        self.owners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.read().is_empty()
    }
}

// =============================================================================
// Setup phase
// =============================================================================

/// Creates bots and assigns threads before the fleet starts.
pub struct BotManager {
    bots: Vec<Bot>,
    threads: Arc<ThreadMap>,
    settings: Arc<Value>,
    dispatch: DispatchSettings,
}

impl Default for BotManager {
    fn default() -> Self {
        Self {
            bots: Vec::new(),
            threads: Arc::new(ThreadMap::new()),
            settings: Arc::new(Value::Object(Default::default())),
            dispatch: DispatchSettings::default(),
        }
    }
}

impl BotManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the settings shared by bots created without their own.
    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    /// Sets the dispatch behaviour of bots created afterwards.
    pub fn with_dispatch(mut self, dispatch: DispatchSettings) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Creates a bot that uses the shared settings.
    pub fn add_bot(&mut self, name: impl Into<String>) -> RegistrationResult<&mut Bot> {
        let settings = Arc::clone(&self.settings);
        self.push_bot(name.into(), settings)
    }

    /// Creates a bot with its own settings.
    pub fn add_bot_with_settings(
        &mut self,
        name: impl Into<String>,
        settings: Value,
    ) -> RegistrationResult<&mut Bot> {
        self.push_bot(name.into(), Arc::new(settings))
    }

    fn push_bot(&mut self, name: String, settings: Arc<Value>) -> RegistrationResult<&mut Bot> {
        let index = self.bots.len();
        let bot = Bot::new(
            BotId(index),
            name,
            settings,
            self.dispatch,
            Arc::clone(&self.threads),
        )?;
        info!(bot = %bot.name(), id = %bot.id(), "Created bot");
        self.bots.push(bot);
        Ok(&mut self.bots[index])
    }

    pub fn bots(&self) -> &[Bot] {
        &self.bots
    }

    pub fn bot(&self, id: BotId) -> Option<&Bot> {
        self.bots.get(id.0)
    }

    pub fn bot_mut(&mut self, id: BotId) -> Option<&mut Bot> {
        self.bots.get_mut(id.0)
    }

    pub fn find(&self, name: &str) -> Option<&Bot> {
        self.bots.iter().find(|bot| bot.name() == name)
    }

    pub fn threads(&self) -> &Arc<ThreadMap> {
        &self.threads
    }

    /// Assigns `thread` to the bot `id`.
    pub fn assign_thread(&self, thread: &str, id: BotId) -> RoutingResult<()> {
        let bot = self.bot(id).ok_or(RoutingError::UnknownBot(id))?;
        bot.claim_thread(thread)
    }

    /// The bot that receives events from unowned threads, if any.
    ///
    /// Fails when more than one bot owns no thread.
    pub fn compute_fallback(&self) -> RoutingResult<Option<BotId>> {
        let unassigned: Vec<&Bot> = self
            .bots
            .iter()
            .filter(|bot| !self.threads.owns_any(bot.id()))
            .collect();

        match unassigned.as_slice() {
            [] => Ok(None),
            [bot] => Ok(Some(bot.id())),
            many => Err(RoutingError::AmbiguousFallback {
                bots: many.iter().map(|bot| bot.name().to_string()).collect(),
            }),
        }
    }

    /// Computes the fallback and freezes the bots.
    pub fn start(self) -> RoutingResult<Fleet> {
        let fallback = self.compute_fallback()?;
        let bots: Vec<Arc<Bot>> = self.bots.into_iter().map(Arc::new).collect();

        info!(
            bots = bots.len(),
            threads = self.threads.len(),
            fallback = fallback.and_then(|id| bots.get(id.0)).map(|bot| bot.name()),
            "Fleet started"
        );

        Ok(Fleet {
            bots,
            threads: self.threads,
            fallback,
        })
    }
}

impl fmt::Debug for BotManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotManager")
            .field("bots", &self.bots)
            .field("threads", &self.threads.len())
            .finish()
    }
}

// =============================================================================
// Run phase
// =============================================================================

/// Started bots, shared and immutable apart from the thread map.
#[derive(Debug)]
pub struct Fleet {
    bots: Vec<Arc<Bot>>,
    threads: Arc<ThreadMap>,
    fallback: Option<BotId>,
}

impl Fleet {
    /// Bots in creation order.
    pub fn bots(&self) -> &[Arc<Bot>] {
        &self.bots
    }

    pub fn bot(&self, id: BotId) -> Option<&Arc<Bot>> {
        self.bots.get(id.0)
    }

    pub fn find(&self, name: &str) -> Option<&Arc<Bot>> {
        self.bots.iter().find(|bot| bot.name() == name)
    }

    pub fn fallback(&self) -> Option<BotId> {
        self.fallback
    }

    pub fn threads(&self) -> &Arc<ThreadMap> {
        &self.threads
    }

    /// Returns a router delivering to `target` only, or to every bot.
    pub fn router(&self, target: Option<BotId>) -> RoutingResult<Router<'_>> {
        let available = match target {
            Some(id) => vec![self.bot(id).ok_or(RoutingError::UnknownBot(id))?],
            None => self.bots.iter().collect(),
        };
        Ok(Router {
            fleet: self,
            available,
        })
    }
}

/// Picks recipients for each event.
#[derive(Debug, Clone)]
pub struct Router<'a> {
    fleet: &'a Fleet,
    available: Vec<&'a Arc<Bot>>,
}

impl<'a> Router<'a> {
    /// Bots that must handle `event`, in creation order.
    ///
    /// The result depends only on `event` and the current thread map.
    pub fn route(&self, event: &Event) -> Vec<&'a Arc<Bot>> {
        let Some(thread) = event.thread_id() else {
            return self.available.clone();
        };

        let owner = self.fleet.threads.owner(thread).or(self.fleet.fallback);
        match owner {
            Some(owner) => self
                .available
                .iter()
                .copied()
                .filter(|bot| bot.id() == owner)
                .collect(),
            None => {
                debug!(thread, event = %event.kind(), "No bot for thread, skipping");
                Vec::new()
            }
        }
    }

    /// Dispatches `event` to every recipient in turn.
    ///
    /// Returns how many bots handled it.
    pub async fn route_and_dispatch(&self, event: Event) -> DispatchResult<usize> {
        let recipients = self.route(&event);
        for bot in &recipients {
            bot.dispatch(event.clone()).await?;
        }
        Ok(recipients.len())
    }
}
