mod actions;
pub mod state;

use crate::core::{Config, Driver};
use crate::errors::{ClientError, Result};
use crate::events::{Event, EventBus, EventKind};
use crate::locators;
use crate::model::{LifecycleState, SearchResult};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// Automation client for one WhatsApp Web session.
///
/// [`Client::start`] runs the polling loop that owns the lifecycle state
/// and dispatches events; the imperative actions (open, send_message,
/// send_file, search_conversations, ...) share the same page. The loop and
/// actions cooperate through suspension points only, so callers invoking
/// actions against the same chat from independent tasks must serialize
/// themselves.
pub struct Client<D: Driver> {
    driver: Arc<D>,
    config: Config,
    bus: EventBus,
    session_id: Uuid,
    state_tx: watch::Sender<LifecycleState>,
    state_rx: watch::Receiver<LifecycleState>,
    running: AtomicBool,
}

impl<D: Driver> Client<D> {
    pub fn new(driver: D, config: Config) -> Self {
        let (state_tx, state_rx) = watch::channel(LifecycleState::Unknown);
        Self {
            driver: Arc::new(driver),
            config,
            bus: EventBus::new(),
            session_id: Uuid::new_v4(),
            state_tx,
            state_rx,
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared handle to the underlying driver.
    pub fn driver(&self) -> Arc<D> {
        self.driver.clone()
    }

    /// Current lifecycle state as last published by the automation loop.
    pub fn state(&self) -> LifecycleState {
        *self.state_rx.borrow()
    }

    /// Register an event handler.
    pub fn on<F, Fut>(&self, kind: EventKind, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.bus.on(kind, handler);
    }

    /// Register an event handler gated by a payload filter.
    pub fn on_filtered<F, Fut, P>(&self, kind: EventKind, handler: F, filter: P)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        P: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.bus.on_filtered(kind, handler, filter);
    }

    /// Register an event handler by its string name, e.g. `"on_logged_in"`.
    pub fn event<F, Fut>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let kind: EventKind = name.parse()?;
        self.bus.on(kind, handler);
        Ok(())
    }

    /// Request the automation loop to stop. Observed between poll cycles;
    /// safe to call from inside an event handler.
    pub fn stop(&self) {
        info!(session = %self.session_id, "stop requested");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Block until the session reaches `LoggedIn`, or `timeout` elapses.
    ///
    /// Call this from a task other than the one running [`Client::start`]
    /// and outside event handlers: the loop pauses while handlers run.
    pub async fn wait_until_logged_in(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut rx = self.state_rx.clone();
        loop {
            if *rx.borrow_and_update() == LifecycleState::LoggedIn {
                return true;
            }
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return false,
            }
        }
    }

    /// Run the automation loop until [`Client::stop`] is called or the
    /// driver fails. Navigates to the base URL, then polls the page state,
    /// emitting transition events exactly once per transition and
    /// `on_tick` every cycle.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ClientError::Configuration(
                "client is already running".to_string(),
            ));
        }
        let result = self.run_loop().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_loop(&self) -> Result<()> {
        info!(
            session = %self.session_id,
            url = %self.config.session.base_url,
            "starting automation loop"
        );
        self.driver.navigate(&self.config.session.base_url).await?;
        self.bus.emit(Event::Start).await;

        let poll = Duration::from_millis(self.config.session.poll_interval_ms);
        let mut previous = LifecycleState::Unknown;
        let mut ticks: u64 = 0;

        while self.running.load(Ordering::SeqCst) {
            let mut current = match state::detect_state(self.driver.as_ref()).await {
                Ok(state) => state,
                Err(err) => {
                    self.bus
                        .emit(Event::Error(format!("state detection failed: {err}")))
                        .await;
                    self.running.store(false, Ordering::SeqCst);
                    return Err(err);
                }
            };

            // an auth-stage signal right after LoggedIn means the session
            // was invalidated; publish the loss for one cycle before
            // following the detector again
            if previous == LifecycleState::LoggedIn && current.is_auth_stage() {
                current = LifecycleState::LoggedOut;
            }

            if current != previous {
                self.state_tx.send_replace(current);
                self.emit_transition(current).await;
            }
            self.bus.emit(Event::Tick(current)).await;

            let every = self.config.session.unread_check_every_ticks;
            if current == LifecycleState::LoggedIn && every > 0 && ticks % every == 0 {
                match self.scan_unread_chats().await {
                    Ok(unread) if !unread.is_empty() => {
                        self.bus.emit(Event::UnreadChat(unread)).await;
                    }
                    Ok(_) => {}
                    Err(err) => debug!("unread probe failed: {err}"),
                }
            }

            previous = current;
            ticks += 1;
            // suspension point between cycles; stop() takes effect here
            tokio::time::sleep(poll).await;
        }

        info!(session = %self.session_id, "automation loop stopped");
        Ok(())
    }

    async fn emit_transition(&self, state: LifecycleState) {
        debug!(session = %self.session_id, state = %state, "lifecycle transition");
        match state {
            LifecycleState::AuthRequired => self.bus.emit(Event::Auth).await,
            LifecycleState::QrAuth => match self.capture_qr().await {
                Ok(Some(bytes)) => self.bus.emit(Event::Qr(bytes)).await,
                Ok(None) => {}
                Err(err) => {
                    self.bus
                        .emit(Event::Error(format!("qr capture failed: {err}")))
                        .await;
                }
            },
            LifecycleState::Loading => {
                let chats_loading = self
                    .driver
                    .count(locators::LOADING_CHATS)
                    .await
                    .unwrap_or(0)
                    > 0;
                self.bus.emit(Event::Loading(chats_loading)).await;
            }
            LifecycleState::LoggedIn => self.bus.emit(Event::LoggedIn).await,
            LifecycleState::LoggedOut => self.bus.emit(Event::LoggedOut).await,
            LifecycleState::Unknown => {}
        }
    }

    async fn capture_qr(&self) -> Result<Option<Vec<u8>>> {
        let Some(canvas) = self
            .driver
            .query(locators::QR_CODE)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        let bytes = self.driver.capture_image(&canvas).await?;
        self.driver.release(&[canvas]).await.ok();
        Ok(Some(bytes))
    }

    async fn scan_unread_chats(&self) -> Result<Vec<SearchResult>> {
        let Some(list) = self
            .driver
            .query(locators::CHAT_LIST)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(Vec::new());
        };

        let rows = self.driver.query_within(&list, locators::SEARCH_ITEM).await?;
        let mut unread = Vec::new();
        for row in &rows {
            let badges = self.driver.query_within(row, locators::UNREAD_BADGE).await?;
            if badges.is_empty() {
                continue;
            }
            self.driver.release(&badges).await.ok();
            unread.push(SearchResult::from_element(self.driver.as_ref(), row).await);
        }

        self.driver.release(&rows).await.ok();
        self.driver.release(&[list]).await.ok();
        Ok(unread)
    }
}

impl Client<crate::browser::ChromeDriver> {
    /// Launch a Chrome session for `config` and build a client over it.
    pub async fn launch(config: Config) -> Result<Self> {
        let driver = crate::browser::ChromeDriver::launch(&config.browser).await?;
        Ok(Self::new(driver, config))
    }
}
