//! The Parley runtime: builds the fleet, connects the session and runs the
//! event loop.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use parley_runtime::ParleyRuntime;
//!
//! let mut runtime = ParleyRuntime::builder()
//!     .config_file("parley.toml")
//!     .build()?;
//!
//! if let Some(bot) = runtime.bot_mut("greeter") {
//!     bot.load_plugin(Arc::new(Greeter))?;
//! }
//!
//! // Until Ctrl+C, SIGTERM or the session ends
//! runtime.run(&my_connector).await?;
//! ```
//!
//! Events are handled one at a time: the next event is pulled only once every
//! recipient bot has finished with the current one. A shutdown request is
//! observed between events, never during one.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use parley_core::{Bot, BotManager, Connector, Router, Session, SessionOrigin};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, ParleyConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::store::{JsonFileStore, SessionStore};

/// What a finished run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    /// How the session was obtained.
    pub origin: SessionOrigin,
    /// Raw events pulled from the session.
    pub events: usize,
    /// Event deliveries, one per recipient bot.
    pub deliveries: usize,
}

/// Owns the bots during setup and drives them once running.
pub struct ParleyRuntime {
    config: ParleyConfig,
    manager: BotManager,
    store: Option<Arc<dyn SessionStore>>,
    target: Option<String>,
    shutdown: CancellationToken,
}

impl ParleyRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Validates `config`, initializes logging and creates the configured bots.
    pub fn from_config(config: ParleyConfig) -> RuntimeResult<Self> {
        validate_config(&config)?;
        logging::init_from_config(&config.logging);

        let manager = Self::build_manager(&config)?;
        let store = config
            .session
            .persist
            .then(|| Arc::new(JsonFileStore::new(&config.session.file)) as Arc<dyn SessionStore>);

        info!(
            log_level = %config.logging.level,
            bots = config.bots.len(),
            fault_policy = ?config.dispatch.fault_policy,
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config,
            manager,
            store,
            target: None,
            shutdown: CancellationToken::new(),
        })
    }

    fn build_manager(config: &ParleyConfig) -> RuntimeResult<BotManager> {
        let mut manager = BotManager::new()
            .with_settings(config.shared_settings())
            .with_dispatch(config.dispatch);

        for bot_config in &config.bots {
            let bot = match bot_config.settings {
                Some(_) => manager.add_bot_with_settings(
                    bot_config.name.as_str(),
                    bot_config.effective_settings(&config.settings),
                )?,
                None => manager.add_bot(bot_config.name.as_str())?,
            };
            for thread in &bot_config.threads {
                bot.claim_thread(thread)?;
            }
        }

        Ok(manager)
    }

    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    pub fn manager(&self) -> &BotManager {
        &self.manager
    }

    /// The bot manager, for adding bots that are not in the configuration.
    pub fn manager_mut(&mut self) -> &mut BotManager {
        &mut self.manager
    }

    /// A configured bot, for loading plugins and registering handlers.
    pub fn bot_mut(&mut self, name: &str) -> Option<&mut Bot> {
        let id = self.manager.find(name)?.id();
        self.manager.bot_mut(id)
    }

    /// Replaces the session store chosen from `session.file`.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Neither loads nor saves credentials.
    pub fn without_store(mut self) -> Self {
        self.store = None;
        self
    }

    /// Delivers events to this bot only.
    pub fn target(mut self, bot: impl Into<String>) -> Self {
        self.target = Some(bot.into());
        self
    }

    /// A token that stops the event loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs until Ctrl+C, SIGTERM, the shutdown token or the end of the
    /// session's event stream.
    pub async fn run(self, connector: &dyn Connector) -> RuntimeResult<RunStats> {
        self.run_until(connector, wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes, the shutdown token is cancelled or the
    /// session's event stream ends.
    ///
    /// Saved credentials are written back when the loop exits, whether or not
    /// it failed.
    pub async fn run_until<F>(self, connector: &dyn Connector, shutdown: F) -> RuntimeResult<RunStats>
    where
        F: Future<Output = ()>,
    {
        let Self {
            manager,
            store,
            target,
            shutdown: token,
            ..
        } = self;

        let fleet = manager.start()?;
        let target = match target {
            Some(name) => Some(
                fleet
                    .find(&name)
                    .ok_or(RuntimeError::UnknownTarget(name.clone()))?
                    .id(),
            ),
            None => None,
        };
        let router = fleet.router(target)?;

        let saved = load_saved(store.as_deref()).await;
        let (mut session, origin) = connector.connect(saved).await?;
        match origin {
            SessionOrigin::Restored => {
                info!(user = session.user_id(), "Loaded session from saved credentials")
            }
            SessionOrigin::Created => info!(user = session.user_id(), "Created new session"),
        }

        let result = event_loop(&router, session.as_mut(), shutdown, &token).await;
        let saved = save_credentials(store.as_deref(), session.as_ref()).await;

        match (result, saved) {
            (Ok((events, deliveries)), Ok(())) => {
                info!(events, deliveries, "Runtime stopped");
                Ok(RunStats {
                    origin,
                    events,
                    deliveries,
                })
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(save_err)) => {
                error!(error = %save_err, "Failed to save session after error");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for ParleyRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParleyRuntime")
            .field("manager", &self.manager)
            .field("persist", &self.store.is_some())
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Event loop
// =============================================================================

/// Pulls and routes events until shutdown or end of stream.
///
/// Returns the number of events pulled and deliveries made.
async fn event_loop<F>(
    router: &Router<'_>,
    session: &mut dyn Session,
    shutdown: F,
    token: &CancellationToken,
) -> RuntimeResult<(usize, usize)>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut events = 0;
    let mut deliveries = 0;

    info!("Listening...");
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            _ = &mut shutdown => None,
            next = session.next_event() => Some(next),
        };

        let Some(next) = next else {
            info!("Shutdown requested");
            break;
        };
        let Some(event) = next? else {
            info!("Session event stream ended");
            break;
        };

        events += 1;
        debug!(event = event.name(), thread = ?event.thread_id(), "Received event");
        deliveries += router.route_and_dispatch(event).await?;
    }

    Ok((events, deliveries))
}

async fn load_saved(store: Option<&dyn SessionStore>) -> Option<serde_json::Value> {
    let store = store?;
    match store.load().await {
        Ok(saved) => saved,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable saved session");
            None
        }
    }
}

async fn save_credentials(store: Option<&dyn SessionStore>, session: &dyn Session) -> RuntimeResult<()> {
    let Some(store) = store else {
        return Ok(());
    };
    match session.credentials() {
        Some(credentials) => Ok(store.save(&credentials).await?),
        None => {
            debug!("Session has no credentials to save");
            Ok(())
        }
    }
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = wait_for_ctrl_c() => {}
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Loads configuration and creates a [`ParleyRuntime`].
///
/// ```rust,ignore
/// let runtime = ParleyRuntime::builder()
///     .config_file("deploy/parley.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: ParleyConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build(self) -> RuntimeResult<ParleyRuntime> {
        let config = self.config_loader.load()?;
        ParleyRuntime::from_config(config)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
