//! One open book.
//!
//! A [`ReaderSession`] is created when a book is opened and consumed by
//! [`ReaderSession::close`]. It owns the book state and the progress
//! tracker, and drives the rendition, the position codec and the sync
//! client on every page turn. Only one page turn runs at a time; a turn
//! requested while another is in flight is rejected with
//! [`PagemarkError::TurnInProgress`].

use pagemark_core::{
    count_words, metadata_key, percentage, sync_fraction, ActivityEvent, ActivityLimits,
    BookState, BookStats, PagemarkError, PagemarkResult, ProgressEvent, ReaderSettings,
};
use pagemark_position::{InternalLocation, PositionCodec};
use pagemark_storage::{KeyValueStore, KeyValueStoreExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::input::{command_for, ReaderCommand};
use crate::library::save_settings;
use crate::progress::ProgressTracker;
use crate::rendition::{Rendition, RenditionEvent};
use crate::sync::{SyncClient, SyncTransport};

/// Shared services a session runs against.
pub struct SessionServices<S, T>
where
    S: KeyValueStore,
    T: SyncTransport,
{
    pub store: Arc<S>,
    pub sync: Arc<SyncClient<T, S>>,
    pub clock: Arc<dyn Clock>,
    pub settings: ReaderSettings,
    pub limits: ActivityLimits,
}

struct SessionState {
    book: BookState,
    tracker: ProgressTracker,
    /// Element addressed by the current reading position.
    marker: Option<InternalLocation>,
}

/// Clears the in-flight flag when a page turn ends, however it ends.
struct TurnGuard<'a>(&'a AtomicBool);

impl<'a> TurnGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> PagemarkResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PagemarkError::TurnInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ReaderSession<R, S, T>
where
    R: Rendition,
    S: KeyValueStore,
    T: SyncTransport,
{
    rendition: R,
    store: Arc<S>,
    sync: Arc<SyncClient<T, S>>,
    clock: Arc<dyn Clock>,
    settings: Mutex<ReaderSettings>,
    state: Mutex<SessionState>,
    turning: AtomicBool,
}

impl<R, S, T> ReaderSession<R, S, T>
where
    R: Rendition,
    S: KeyValueStore,
    T: SyncTransport,
{
    /// Open `book` in `rendition` at its saved position.
    ///
    /// A position that cannot be resolved opens the book at the start.
    pub async fn open(
        mut book: BookState,
        rendition: R,
        services: SessionServices<S, T>,
    ) -> PagemarkResult<Self> {
        let spine = rendition.spine();
        if book.total_words == 0 {
            book.total_words = spine.total_words();
            debug!(id = %book.id, words = book.total_words, "Counted words");
        }

        let target = match PositionCodec::new(spine).to_internal_location(&book.position) {
            Ok(target) => target,
            Err(e) => {
                warn!(id = %book.id, position = %book.position, error = %e, "Starting at beginning of book");
                None
            }
        };
        rendition.display(target.as_ref()).await?;

        let now = services.clock.now();
        let mut state = SessionState {
            tracker: ProgressTracker::new(book.total_words, services.limits, now),
            marker: target,
            book,
        };
        state.book.device_id = services.settings.device_id.clone();
        state.book.device_name = services.settings.device_name.clone();

        let session = Self {
            rendition,
            store: services.store,
            sync: services.sync,
            clock: services.clock,
            settings: Mutex::new(services.settings),
            state: Mutex::new(state),
            turning: AtomicBool::new(false),
        };
        {
            let mut state = session.state.lock().await;
            session.update_word_offset(&mut state);
            info!(
                id = %state.book.id,
                words = state.book.total_words,
                percentage = state.book.percentage,
                "Reader session opened"
            );
        }
        Ok(session)
    }

    pub fn rendition(&self) -> &R {
        &self.rendition
    }

    pub async fn book(&self) -> BookState {
        self.state.lock().await.book.clone()
    }

    pub async fn settings(&self) -> ReaderSettings {
        self.settings.lock().await.clone()
    }

    /// Location of the element the reading position addresses.
    pub async fn position_marker(&self) -> Option<InternalLocation> {
        self.state.lock().await.marker.clone()
    }

    // ========================================================================
    // PAGE TURNS
    // ========================================================================

    /// Turn forward, recording reading activity for the page left behind.
    pub async fn next_page(&self) -> PagemarkResult<BookStats> {
        let _turn = TurnGuard::acquire(&self.turning)?;
        let mut state = self.state.lock().await;

        let visible_words = count_words(&self.rendition.visible_text().await?);
        let activity = state
            .tracker
            .page_turn(&state.book.id, visible_words, self.clock.now());

        let moved = self.rendition.next().await?;
        state.tracker.restart_timer(self.clock.now());
        if moved {
            self.relocate(&mut state);
        }

        if let Some(record) = activity {
            if !state.book.is_local() {
                let settings = self.settings.lock().await;
                let event = ActivityEvent {
                    device_id: settings.device_id.clone(),
                    device: settings.device_name.clone(),
                    activity: vec![record],
                };
                drop(settings);
                if let Err(e) = self.sync.flush_activity(&event).await {
                    error!(id = %state.book.id, error = %e, "Failed to queue activity");
                }
            }
        }
        if moved {
            self.flush_progress(&state.book).await;
        }
        Ok(self.stats_of(&state))
    }

    /// Turn back. Going back is not reading, so no activity is recorded.
    pub async fn prev_page(&self) -> PagemarkResult<BookStats> {
        let _turn = TurnGuard::acquire(&self.turning)?;
        let mut state = self.state.lock().await;

        let moved = self.rendition.prev().await?;
        state.tracker.restart_timer(self.clock.now());
        if moved {
            self.relocate(&mut state);
            self.flush_progress(&state.book).await;
        }
        Ok(self.stats_of(&state))
    }

    /// Dispatch a rendition event. Returns the command it mapped to, for
    /// commands the UI layer has to carry out itself.
    pub async fn handle_event(&self, event: RenditionEvent) -> PagemarkResult<Option<ReaderCommand>> {
        match &event {
            RenditionEvent::SectionRendered { spine_index } => {
                debug!(spine_index, "Section rendered");
                self.state.lock().await.tracker.restart_timer(self.clock.now());
                return Ok(None);
            }
            RenditionEvent::LocationChanged(range) => {
                debug!(start = %range.start, "Location changed");
                self.follow_location().await;
                return Ok(None);
            }
            _ => {}
        }

        let Some(command) = command_for(&event) else {
            return Ok(None);
        };
        match command {
            ReaderCommand::NextPage => {
                self.next_page().await?;
            }
            ReaderCommand::PrevPage => {
                self.prev_page().await?;
            }
            ReaderCommand::CycleTheme => {
                self.cycle_theme().await?;
            }
            ReaderCommand::ShowBars | ReaderCommand::HideBars | ReaderCommand::ToggleBars => {}
        }
        Ok(Some(command))
    }

    /// Switch to the next color scheme and persist it.
    pub async fn cycle_theme(&self) -> PagemarkResult<String> {
        let mut settings = self.settings.lock().await;
        let scheme = settings.theme.cycle_color_scheme().to_string();
        save_settings(self.store.as_ref(), &settings).await?;
        debug!(scheme = %scheme, "Cycled color scheme");
        Ok(scheme)
    }

    pub async fn stats(&self) -> BookStats {
        let state = self.state.lock().await;
        self.stats_of(&state)
    }

    /// End the session, persisting local books.
    pub async fn close(self) -> BookState {
        let state = self.state.into_inner();
        if state.book.is_local() {
            if let Err(e) = self.store.set_json(&metadata_key(&state.book.id), &state.book).await {
                error!(id = %state.book.id, error = %e, "Failed to save local book state");
            }
        }
        info!(id = %state.book.id, percentage = state.book.percentage, "Reader session closed");
        state.book
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    /// Recompute the word offset and reading position from the rendition.
    /// On failure the previous values are kept.
    fn relocate(&self, state: &mut SessionState) {
        self.update_word_offset(state);
        let Some(range) = self.rendition.current_location() else {
            return;
        };
        match PositionCodec::new(self.rendition.spine()).to_position(&range.start) {
            Ok(encoded) => {
                state.book.position = encoded.position.to_string();
                state.marker = Some(encoded.element);
            }
            Err(e) => warn!(id = %state.book.id, start = %range.start, error = %e, "Cannot encode position"),
        }
    }

    /// Catch up with a move the engine made on its own, such as a relayout
    /// or a jump. A page turn in flight relocates by itself.
    async fn follow_location(&self) {
        let Ok(_turn) = TurnGuard::acquire(&self.turning) else {
            debug!("Location change during a page turn");
            return;
        };
        let mut state = self.state.lock().await;
        let word = state.book.current_word_offset;
        let position = state.book.position.clone();
        self.relocate(&mut state);
        if state.book.current_word_offset != word || state.book.position != position {
            self.flush_progress(&state.book).await;
        }
    }

    fn update_word_offset(&self, state: &mut SessionState) {
        let Some(range) = self.rendition.current_location() else {
            warn!(id = %state.book.id, "Rendition reports no location");
            return;
        };
        match self.rendition.spine().word_offset(&range.start) {
            Ok(word) => {
                state.tracker.set_current_word(word);
                state.book.current_word_offset = state.tracker.current_word();
                state.book.percentage =
                    percentage(state.book.current_word_offset, state.book.total_words);
            }
            Err(e) => warn!(id = %state.book.id, start = %range.start, error = %e, "Cannot count words"),
        }
    }

    async fn flush_progress(&self, book: &BookState) {
        if book.is_local() {
            if let Err(e) = self.store.set_json(&metadata_key(&book.id), book).await {
                error!(id = %book.id, error = %e, "Failed to save local progress");
            }
            return;
        }
        let event = ProgressEvent {
            document: book.id.clone(),
            device_id: book.device_id.clone(),
            device: book.device_name.clone(),
            percentage: sync_fraction(book.current_word_offset, book.total_words),
            progress: book.position.clone(),
        };
        if let Err(e) = self.sync.flush_progress(&event).await {
            error!(id = %book.id, error = %e, "Failed to queue progress");
        }
    }

    fn stats_of(&self, state: &SessionState) -> BookStats {
        let chapter = self
            .rendition
            .current_location()
            .and_then(|range| self.rendition.spine().chapter_label(range.start.spine_index));
        state.tracker.stats(chapter, self.rendition.section_layout())
    }
}
