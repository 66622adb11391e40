//! The review store: the single writable projection of a review asset.
//!
//! All commands take `&self` and may interleave freely. Each one applies
//! its mutation to the in-memory asset immediately, then awaits the
//! persistence collaborator, then either settles or reverts that mutation
//! (see [`crate::rollback`]). The state lock is never held across an await
//! on a collaborator.
//!
//! Loads and share-token generation are each serialized against
//! themselves, so overlapping calls of the same kind queue up instead of
//! racing.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, Mutex, RwLock};

use reelnote_core::annotation::{DrawnShape, Shape};
use reelnote_core::error::CoreError;
use reelnote_core::navigator::{format_time, SeekTarget, ThreadNavigator};
use reelnote_core::normalize::ReferenceSpace;
use reelnote_core::review::{
    self, AssetStatus, Attachment, Comment, ReviewAsset, Thread, ThreadState,
};
use reelnote_core::types::{EntityId, Seconds};
use reelnote_events::{event_types, EventBus, ReviewEvent};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::persistence::{PersistenceResult, Playback, ReviewPersistence};
use crate::rollback::{Field, FieldValue, Rollback, Tentative, WriteLog};

// ---------------------------------------------------------------------------
// State and inputs
// ---------------------------------------------------------------------------

/// What the UI renders from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReviewState {
    pub asset: Option<ReviewAsset>,
    pub selected_thread_id: Option<EntityId>,
    pub is_loading: bool,
    /// Display form of the most recent command failure.
    pub error: Option<String>,
}

/// Input for [`ReviewStore::add_thread`].
#[derive(Debug, Clone)]
pub struct NewThread {
    pub t_start: Seconds,
    pub t_end: Option<Seconds>,
    pub shapes: Vec<Shape>,
}

impl NewThread {
    /// Convert shapes from the drawing surface (in surface pixels) into a
    /// thread request.
    pub fn from_drawn(
        t_start: Seconds,
        t_end: Option<Seconds>,
        drawn: &[DrawnShape],
        surface_width: f64,
        surface_height: f64,
    ) -> Result<Self, CoreError> {
        let shapes = drawn
            .iter()
            .map(|d| Shape::from_drawn(d, surface_width, surface_height))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            t_start,
            t_end,
            shapes,
        })
    }
}

/// Input for [`ReviewStore::add_comment`].
#[derive(Debug, Clone)]
pub struct NewComment {
    pub author_id: EntityId,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

impl NewComment {
    pub fn text(author_id: EntityId, body: impl Into<String>) -> Self {
        Self {
            author_id,
            body: body.into(),
            attachments: Vec::new(),
        }
    }
}

struct Inner {
    view: ReviewState,
    writes: WriteLog,
}

fn loaded_mut(view: &mut ReviewState) -> StoreResult<&mut ReviewAsset> {
    view.asset.as_mut().ok_or(StoreError::AssetNotLoaded)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct ReviewStore {
    persistence: Arc<dyn ReviewPersistence>,
    events: Arc<EventBus>,
    playback: Option<Arc<dyn Playback>>,
    reference: ReferenceSpace,
    inner: RwLock<Inner>,
    load_gate: Mutex<()>,
    share_gate: Mutex<()>,
}

impl ReviewStore {
    pub fn new(persistence: Arc<dyn ReviewPersistence>, events: Arc<EventBus>) -> Self {
        Self {
            persistence,
            events,
            playback: None,
            reference: ReferenceSpace::default(),
            inner: RwLock::new(Inner {
                view: ReviewState::default(),
                writes: WriteLog::default(),
            }),
            load_gate: Mutex::new(()),
            share_gate: Mutex::new(()),
        }
    }

    /// Build a store with its own event bus sized and framed per `config`.
    pub fn from_config(config: &StoreConfig, persistence: Arc<dyn ReviewPersistence>) -> Self {
        let events = Arc::new(EventBus::new(config.event_bus_capacity));
        Self::new(persistence, events).with_reference(config.reference_space())
    }

    /// Attach the video element navigation should seek.
    pub fn with_playback(mut self, playback: Arc<dyn Playback>) -> Self {
        self.playback = Some(playback);
        self
    }

    /// Use a non-default canonical frame for canvas normalization.
    pub fn with_reference(mut self, reference: ReferenceSpace) -> Self {
        self.reference = reference;
        self
    }

    /// The canonical frame canvases should be normalized against.
    pub fn reference_space(&self) -> ReferenceSpace {
        self.reference
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReviewEvent> {
        self.events.subscribe()
    }

    // -- reads ---------------------------------------------------------------

    /// A copy of the current state.
    pub async fn snapshot(&self) -> ReviewState {
        self.inner.read().await.view.clone()
    }

    pub async fn asset(&self) -> Option<ReviewAsset> {
        self.inner.read().await.view.asset.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.inner.read().await.view.is_loading
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.read().await.view.error.clone()
    }

    pub async fn open_threads(&self) -> Vec<Thread> {
        self.threads_where(Thread::is_open).await
    }

    pub async fn resolved_threads(&self) -> Vec<Thread> {
        self.threads_where(Thread::is_resolved).await
    }

    pub async fn selected_thread(&self) -> Option<Thread> {
        let inner = self.inner.read().await;
        let view = &inner.view;
        let id = view.selected_thread_id?;
        view.asset.as_ref()?.thread(id).cloned()
    }

    async fn threads_where(&self, keep: impl Fn(&Thread) -> bool) -> Vec<Thread> {
        let inner = self.inner.read().await;
        inner
            .view
            .asset
            .as_ref()
            .map(|a| a.threads.iter().filter(|t| keep(t)).cloned().collect())
            .unwrap_or_default()
    }

    // -- loading -------------------------------------------------------------

    /// Fetch an asset and make it the current one.
    ///
    /// On failure the previously loaded asset stays in place.
    pub async fn load_asset(&self, asset_id: EntityId) -> StoreResult<()> {
        let _gate = self.load_gate.lock().await;
        self.begin_load().await;
        tracing::debug!(%asset_id, "Loading review asset");
        let fetched = self.persistence.fetch_asset(asset_id).await;
        self.finish_load(fetched).await
    }

    /// Fetch the asset a share link points at and make it the current one.
    pub async fn load_shared_asset(&self, token: &str) -> StoreResult<()> {
        let _gate = self.load_gate.lock().await;
        self.begin_load().await;
        tracing::debug!("Loading review asset by share token");
        let fetched = self.persistence.fetch_asset_by_share_token(token).await;
        self.finish_load(fetched).await
    }

    async fn begin_load(&self) {
        self.inner.write().await.view.is_loading = true;
    }

    async fn finish_load(&self, fetched: PersistenceResult<ReviewAsset>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let Inner { view, writes } = &mut *inner;
        view.is_loading = false;

        let asset = match fetched {
            Ok(asset) => asset,
            Err(err) => {
                let err = StoreError::from(err);
                tracing::warn!(error = %err, "Failed to load review asset");
                view.error = Some(err.to_string());
                return Err(err);
            }
        };

        writes.clear();
        if let Some(selected) = view.selected_thread_id {
            if asset.thread(selected).is_none() {
                view.selected_thread_id = None;
            }
        }
        let asset_id = asset.id;
        tracing::info!(
            %asset_id,
            version = asset.version,
            threads = asset.threads.len(),
            status = asset.status.as_str(),
            "Review asset loaded",
        );
        view.asset = Some(asset);
        view.error = None;
        drop(inner);

        self.events
            .publish(ReviewEvent::new(event_types::ASSET_LOADED, asset_id));
        Ok(())
    }

    // -- commands ------------------------------------------------------------

    /// Create a thread anchored to `input.shapes` and select it.
    pub async fn add_thread(&self, input: NewThread) -> StoreResult<Thread> {
        let result = self.try_add_thread(input).await;
        self.record("add_thread", result).await
    }

    async fn try_add_thread(&self, input: NewThread) -> StoreResult<Thread> {
        let (tentative, thread) = {
            let mut inner = self.inner.write().await;
            let view = &mut inner.view;
            let asset = loaded_mut(view)?;
            let thread = review::create_thread(
                input.shapes,
                input.t_start,
                input.t_end,
                asset.next_chip()?,
            )?;
            asset.threads.push(thread.clone());
            asset.bump_version();
            let tentative = Tentative::new(
                asset.id,
                Rollback::RemoveThread {
                    thread_id: thread.id,
                },
            );
            view.selected_thread_id = Some(thread.id);
            (tentative, thread)
        };

        self.commit(
            tentative.clone(),
            self.persistence.persist_thread(tentative.asset_id, &thread),
        )
        .await?;

        tracing::info!(
            asset_id = %tentative.asset_id,
            thread_id = %thread.id,
            chip = thread.chip,
            at = %format_time(thread.t_start),
            "Thread created",
        );
        self.events.publish(
            ReviewEvent::new(event_types::THREAD_CREATED, tentative.asset_id)
                .with_thread(thread.id)
                .with_payload(json!({ "chip": thread.chip, "t_start": thread.t_start })),
        );
        Ok(thread)
    }

    /// Append a comment to a thread. Never changes the thread's state.
    pub async fn add_comment(&self, thread_id: EntityId, input: NewComment) -> StoreResult<Comment> {
        let result = self.try_add_comment(thread_id, input).await;
        self.record("add_comment", result).await
    }

    async fn try_add_comment(&self, thread_id: EntityId, input: NewComment) -> StoreResult<Comment> {
        let (tentative, comment) = {
            let mut inner = self.inner.write().await;
            let asset = loaded_mut(&mut inner.view)?;
            let asset_id = asset.id;
            let thread = asset
                .thread_mut(thread_id)
                .ok_or(StoreError::ThreadNotFound(thread_id))?;
            let comment = Comment::new(input.author_id, input.body, input.attachments)?;
            *thread = review::append_comment(thread, comment.clone());
            asset.bump_version();
            let tentative = Tentative::new(
                asset_id,
                Rollback::RemoveComment {
                    thread_id,
                    comment_id: comment.id,
                },
            );
            (tentative, comment)
        };

        self.commit(
            tentative.clone(),
            self.persistence.persist_comment(thread_id, &comment),
        )
        .await?;

        tracing::debug!(%thread_id, comment_id = %comment.id, "Comment added");
        self.events.publish(
            ReviewEvent::new(event_types::COMMENT_ADDED, tentative.asset_id)
                .with_thread(thread_id)
                .with_payload(json!({ "comment_id": comment.id })),
        );
        Ok(comment)
    }

    /// Anchor more shapes to an existing thread.
    pub async fn add_shapes(&self, thread_id: EntityId, shapes: Vec<Shape>) -> StoreResult<Thread> {
        let result = self.try_add_shapes(thread_id, shapes).await;
        self.record("add_shapes", result).await
    }

    async fn try_add_shapes(&self, thread_id: EntityId, shapes: Vec<Shape>) -> StoreResult<Thread> {
        let (tentative, thread) = {
            let mut inner = self.inner.write().await;
            let asset = loaded_mut(&mut inner.view)?;
            let asset_id = asset.id;
            let thread = asset
                .thread_mut(thread_id)
                .ok_or(StoreError::ThreadNotFound(thread_id))?;
            let shape_ids = shapes.iter().map(Shape::id).collect();
            *thread = review::append_shapes(thread, shapes)?;
            let updated = thread.clone();
            asset.bump_version();
            let tentative = Tentative::new(
                asset_id,
                Rollback::RemoveShapes {
                    thread_id,
                    shape_ids,
                },
            );
            (tentative, updated)
        };

        self.commit(
            tentative.clone(),
            self.persistence.persist_thread(tentative.asset_id, &thread),
        )
        .await?;

        self.events.publish(
            ReviewEvent::new(event_types::THREAD_SHAPES_ADDED, tentative.asset_id)
                .with_thread(thread_id)
                .with_payload(json!({ "shapes": thread.shapes.len() })),
        );
        Ok(thread)
    }

    pub async fn resolve_thread(&self, thread_id: EntityId) -> StoreResult<()> {
        let result = self.transition_thread(thread_id, ThreadState::Resolved).await;
        self.record("resolve_thread", result).await
    }

    pub async fn reopen_thread(&self, thread_id: EntityId) -> StoreResult<()> {
        let result = self.transition_thread(thread_id, ThreadState::Open).await;
        self.record("reopen_thread", result).await
    }

    async fn transition_thread(&self, thread_id: EntityId, target: ThreadState) -> StoreResult<()> {
        let tentative = {
            let mut inner = self.inner.write().await;
            let Inner { view, writes } = &mut *inner;
            let asset = loaded_mut(view)?;
            let asset_id = asset.id;
            let thread = asset
                .thread_mut(thread_id)
                .ok_or(StoreError::ThreadNotFound(thread_id))?;
            let field = Field::ThreadState(thread_id);
            let previous = thread.state;
            if previous == target {
                // Only a confirmed state is a no-op; stack behind a pending one.
                if !writes.is_pending(field) {
                    return Ok(());
                }
            } else {
                *thread = review::with_state(thread, target);
                asset.bump_version();
            }
            let claim = writes.claim(field, FieldValue::ThreadState(previous));
            Tentative::new(asset_id, Rollback::RestoreThreadState { thread_id, claim })
        };

        self.commit(
            tentative.clone(),
            self.persistence.persist_thread_state(thread_id, target),
        )
        .await?;

        let event_type = match target {
            ThreadState::Resolved => event_types::THREAD_RESOLVED,
            ThreadState::Open => event_types::THREAD_REOPENED,
        };
        tracing::debug!(%thread_id, state = target.as_str(), "Thread state changed");
        self.events
            .publish(ReviewEvent::new(event_type, tentative.asset_id).with_thread(thread_id));
        Ok(())
    }

    /// Move the asset through the approval workflow.
    ///
    /// Any transition is allowed since each call is an explicit reviewer
    /// action. When two calls race, the later intent is kept even if the
    /// earlier one fails.
    pub async fn set_status(&self, status: AssetStatus) -> StoreResult<()> {
        let result = self.try_set_status(status).await;
        self.record("set_status", result).await
    }

    async fn try_set_status(&self, status: AssetStatus) -> StoreResult<()> {
        let tentative = {
            let mut inner = self.inner.write().await;
            let Inner { view, writes } = &mut *inner;
            let asset = loaded_mut(view)?;
            let previous = asset.status;
            asset.status = status;
            asset.bump_version();
            let claim = writes.claim(Field::Status, FieldValue::Status(previous));
            Tentative::new(asset.id, Rollback::RestoreStatus { claim })
        };

        self.commit(
            tentative.clone(),
            self.persistence.persist_status(tentative.asset_id, status),
        )
        .await?;

        tracing::info!(asset_id = %tentative.asset_id, status = status.as_str(), "Review status changed");
        self.events.publish(
            ReviewEvent::new(event_types::STATUS_CHANGED, tentative.asset_id)
                .with_payload(json!({ "status": status })),
        );
        Ok(())
    }

    /// Return the asset's share token, minting one on first use.
    pub async fn generate_share_token(&self) -> StoreResult<String> {
        let result = self.try_generate_share_token().await;
        self.record("generate_share_token", result).await
    }

    async fn try_generate_share_token(&self) -> StoreResult<String> {
        let _gate = self.share_gate.lock().await;

        let asset_id = {
            let inner = self.inner.read().await;
            let asset = inner.view.asset.as_ref().ok_or_else(|| {
                StoreError::TokenGenerationFailed("no review asset is loaded".to_string())
            })?;
            if let Some(token) = &asset.share_token {
                return Ok(token.clone());
            }
            asset.id
        };

        let token = self
            .persistence
            .create_share_token(asset_id)
            .await
            .map_err(|err| StoreError::TokenGenerationFailed(err.to_string()))?;

        {
            let mut inner = self.inner.write().await;
            if let Some(asset) = inner.view.asset.as_mut().filter(|a| a.id == asset_id) {
                asset.share_token = Some(token.clone());
                asset.bump_version();
            }
        }

        tracing::info!(%asset_id, "Share token created");
        self.events
            .publish(ReviewEvent::new(event_types::SHARE_TOKEN_CREATED, asset_id));
        Ok(token)
    }

    // -- selection & navigation ----------------------------------------------

    pub async fn select_thread(&self, thread_id: EntityId) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let view = &mut inner.view;
        let exists = view
            .asset
            .as_ref()
            .is_some_and(|a| a.thread(thread_id).is_some());
        if !exists {
            return Err(StoreError::ThreadNotFound(thread_id));
        }
        view.selected_thread_id = Some(thread_id);
        Ok(())
    }

    pub async fn clear_selection(&self) {
        self.inner.write().await.view.selected_thread_id = None;
    }

    pub async fn clear_error(&self) {
        self.inner.write().await.view.error = None;
    }

    pub async fn has_previous(&self) -> bool {
        let inner = self.inner.read().await;
        let view = &inner.view;
        view.asset.as_ref().is_some_and(|a| {
            ThreadNavigator::new(&a.threads, view.selected_thread_id).has_previous()
        })
    }

    pub async fn has_next(&self) -> bool {
        let inner = self.inner.read().await;
        let view = &inner.view;
        view.asset
            .as_ref()
            .is_some_and(|a| ThreadNavigator::new(&a.threads, view.selected_thread_id).has_next())
    }

    /// Select the thread before the current one in time order and seek to it.
    pub async fn go_to_previous(&self) -> Option<SeekTarget> {
        self.step(|nav| nav.previous()).await
    }

    /// Select the thread after the current one in time order and seek to it.
    pub async fn go_to_next(&self) -> Option<SeekTarget> {
        self.step(|nav| nav.next()).await
    }

    async fn step(&self, pick: impl Fn(&ThreadNavigator<'_>) -> Option<SeekTarget>) -> Option<SeekTarget> {
        let target = {
            let mut inner = self.inner.write().await;
            let view = &mut inner.view;
            let asset = view.asset.as_ref()?;
            let target = pick(&ThreadNavigator::new(&asset.threads, view.selected_thread_id))?;
            view.selected_thread_id = Some(target.thread_id);
            target
        };

        if let Some(playback) = &self.playback {
            playback.seek(target.time);
        }
        Some(target)
    }

    // -- reconciliation ------------------------------------------------------

    /// Await a persistence call for an applied mutation and settle or revert
    /// it.
    async fn commit<T>(
        &self,
        tentative: Tentative,
        persist: impl std::future::Future<Output = PersistenceResult<T>>,
    ) -> StoreResult<T> {
        match persist.await {
            Ok(value) => {
                tentative.settle(&mut self.inner.write().await.writes);
                Ok(value)
            }
            Err(err) => {
                let asset_id = tentative.asset_id;
                let reverted = {
                    let mut inner = self.inner.write().await;
                    let Inner { view, writes } = &mut *inner;
                    tentative.revert(view, writes)
                };
                tracing::warn!(%asset_id, error = %err, reverted, "Rolled back optimistic update");
                self.events.publish(
                    ReviewEvent::new(event_types::COMMAND_ROLLED_BACK, asset_id)
                        .with_payload(json!({ "error": err.to_string(), "reverted": reverted })),
                );
                Err(err.into())
            }
        }
    }

    /// Surface a failed command through the `error` field.
    async fn record<T>(&self, command: &'static str, result: StoreResult<T>) -> StoreResult<T> {
        if let Err(err) = &result {
            tracing::warn!(command, error = %err, "Review command failed");
            self.inner.write().await.view.error = Some(err.to_string());
        }
        result
    }
}
