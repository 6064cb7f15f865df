use std::cell::Cell;
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use std::time::Duration;

use crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::layout::{Position, Rect};

use crate::clock::{Clock, MonotonicClock};
use crate::config::Config;
use crate::countdown::{RandomDelay, ReleaseDelay};
use crate::format::format_time;
use crate::history::{HistoryStore, HistoryView, Solve, StoreError, Subscription, UserId};
use crate::identity::{self, IdentityError, IdentityProvider};
use crate::runtime::AppEvent;
use crate::session::{Phase, Session, SessionSettings};

/// Which collaborator a banner is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum BannerKind {
    Identity,
    StoreRead,
    StoreWrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

/// Everything the event loop and the renderer share
pub struct App<C: Clock = MonotonicClock, D: ReleaseDelay = RandomDelay> {
    pub session: Session<C, D>,
    pub config: Config,
    pub identity: Option<UserId>,
    pub history: HistoryView,
    pub banner: Option<Banner>,
    pub confirm_clear: bool,
    /// Latest local solve; shown even when the store never accepts it
    pub last_solve: Option<Solve>,
    /// Where the timer digits were last drawn, for pointer taps
    pub timer_area: Cell<Rect>,
    store: HistoryStore,
    subscription: Option<Subscription>,
    generation: u64,
    events: Sender<AppEvent>,
}

impl App {
    pub fn live(config: Config, store: HistoryStore, events: Sender<AppEvent>) -> Self {
        let delay = RandomDelay::new(config.release_min_ms, config.release_max_ms);
        App::new(MonotonicClock::new(), delay, config, store, events)
    }
}

impl<C: Clock, D: ReleaseDelay> App<C, D> {
    pub fn new(
        clock: C,
        delay: D,
        config: Config,
        store: HistoryStore,
        events: Sender<AppEvent>,
    ) -> Self {
        let sink_events = Mutex::new(events.clone());
        let sink = store.sink(move |result| {
            if let Ok(tx) = sink_events.lock() {
                let _ = tx.send(AppEvent::Appended(result));
            }
        });
        let session = Session::new(clock, delay, SessionSettings::from(&config), Box::new(sink));

        Self {
            session,
            config,
            identity: None,
            history: HistoryView::default(),
            banner: None,
            confirm_clear: false,
            last_solve: None,
            timer_area: Cell::new(Rect::default()),
            store,
            subscription: None,
            generation: 0,
            events,
        }
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Kick off sign-in; the result comes back as [`AppEvent::SignedIn`]
    pub fn start_sign_in<P: IdentityProvider>(&self, provider: P) {
        let tx = self.events.clone();
        identity::sign_in_in_background(provider, move |result| {
            let _ = tx.send(AppEvent::SignedIn(result));
        });
    }

    /// How long the event loop may sleep before a timer needs attention
    pub fn next_wake(&self) -> Option<Duration> {
        let now = self.session.now_ms();
        self.session
            .next_deadline()
            .map(|deadline| Duration::from_millis(deadline.saturating_sub(now)))
    }

    pub fn status_line(&self) -> &'static str {
        match self.session.phase() {
            Phase::Arming => "PREPARE TO START...",
            Phase::Running => "SOLVE IN PROGRESS",
            Phase::Idle if self.session.elapsed_ms() > 0 => "FINISH",
            Phase::Idle => "PRESS SPACE OR TAP TO START SEQUENCE",
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) -> Control {
        self.session.advance();

        match event {
            AppEvent::Tick | AppEvent::Resize => {}
            AppEvent::Key(key) => return self.on_key(key),
            AppEvent::Mouse(mouse) => self.on_mouse(mouse),
            AppEvent::SignedIn(result) => self.on_signed_in(result),
            AppEvent::History {
                subscription,
                update,
            } => self.on_history(subscription, update),
            AppEvent::Appended(result) => self.on_appended(result),
            AppEvent::Cleared(result) => self.on_cleared(result),
        }
        Control::Continue
    }

    /// Switch the store and the live history to a new identity
    pub fn on_signed_in(&mut self, result: Result<UserId, IdentityError>) {
        if let Some(mut old) = self.subscription.take() {
            old.detach();
        }
        self.generation += 1;

        match result {
            Ok(user) => {
                tracing::info!(user = %user, "signed in");
                self.store.set_identity(Some(user.clone()));

                let generation = self.generation;
                let update_tx = self.events.clone();
                let error_tx = self.events.clone();
                self.subscription = Some(self.store.subscribe(
                    &user,
                    move |snapshot| {
                        let _ = update_tx.send(AppEvent::History {
                            subscription: generation,
                            update: Ok(snapshot),
                        });
                    },
                    move |e| {
                        let _ = error_tx.send(AppEvent::History {
                            subscription: generation,
                            update: Err(e),
                        });
                    },
                ));
                self.identity = Some(user);
                if matches!(&self.banner, Some(b) if b.kind == BannerKind::Identity) {
                    self.banner = None;
                }
            }
            Err(e) => {
                self.store.set_identity(None);
                self.identity = None;
                self.history = HistoryView::default();
                self.show_banner(
                    BannerKind::Identity,
                    format!("Sign-in failed: {e}. Times will not be saved."),
                );
            }
        }
    }

    fn on_history(&mut self, subscription: u64, update: Result<Vec<Solve>, StoreError>) {
        if subscription != self.generation {
            tracing::debug!(subscription, "dropping update from stale subscription");
            return;
        }
        match update {
            Ok(snapshot) => {
                self.history = HistoryView::from_snapshot(
                    &snapshot,
                    self.config.list_window,
                    self.config.trend_window,
                );
            }
            Err(e) => self.show_banner(BannerKind::StoreRead, format!("Could not load history: {e}")),
        }
    }

    fn on_appended(&mut self, result: Result<Solve, StoreError>) {
        match result {
            Ok(solve) => {
                if self
                    .last_solve
                    .as_ref()
                    .is_some_and(|s| s.is_pending() && s.elapsed_ms == solve.elapsed_ms)
                {
                    self.last_solve = Some(solve);
                }
            }
            Err(e) => {
                let time = self
                    .last_solve
                    .as_ref()
                    .map(|s| format_time(s.elapsed_ms))
                    .unwrap_or_default();
                self.show_banner(BannerKind::StoreWrite, format!("Could not save {time}: {e}"));
            }
        }
    }

    fn on_cleared(&mut self, result: Result<usize, StoreError>) {
        if let Err(e) = result {
            self.show_banner(BannerKind::StoreWrite, format!("Clearing history failed: {e}"));
        }
    }

    fn show_banner(&mut self, kind: BannerKind, message: String) {
        tracing::warn!(kind = %kind, "{message}");
        self.banner = Some(Banner { kind, message });
    }

    /// The single start/stop input shared by space and pointer taps
    pub fn toggle(&mut self) {
        let was_running = self.session.phase() == Phase::Running;
        self.session.toggle();

        if was_running && self.session.phase() == Phase::Idle {
            let elapsed_ms = self.session.elapsed_ms();
            if elapsed_ms > 0 {
                self.last_solve = Some(Solve::pending(elapsed_ms));
            }
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Control {
        if key.kind != KeyEventKind::Press {
            return Control::Continue;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Control::Quit;
        }

        if self.confirm_clear {
            self.confirm_clear = false;
            if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
                let tx = self.events.clone();
                self.store.clear_all(move |result| {
                    let _ = tx.send(AppEvent::Cleared(result));
                });
            }
            return Control::Continue;
        }

        match key.code {
            KeyCode::Char(' ') => self.toggle(),
            KeyCode::Esc => match self.session.phase() {
                Phase::Arming => {
                    self.session.request_stop();
                }
                Phase::Running => {}
                Phase::Idle => return Control::Quit,
            },
            KeyCode::Char('q') => {
                if self.session.phase() == Phase::Idle {
                    return Control::Quit;
                }
            }
            KeyCode::Char('c') => {
                if self.session.phase() == Phase::Idle {
                    self.confirm_clear = true;
                }
            }
            _ => self.banner = None,
        }
        Control::Continue
    }

    fn on_mouse(&mut self, mouse: MouseEvent) {
        if mouse.kind != MouseEventKind::Down(MouseButton::Left) {
            return;
        }
        if self
            .timer_area
            .get()
            .contains(Position::new(mouse.column, mouse.row))
        {
            self.toggle();
        }
    }
}
