#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use reelnote_core::annotation::{Shape, ShapeGeometry, ShapeKind};
use reelnote_core::normalize::Point;
use reelnote_core::review::{
    create_thread, AssetStatus, Comment, ReviewAsset, Thread, ThreadState,
};
use reelnote_core::types::{EntityId, Seconds};
use reelnote_events::EventBus;
use reelnote_store::{
    InMemoryPersistence, NewThread, Operation, PersistenceResult, Playback, ReviewPersistence,
    ReviewStore,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn shape() -> Shape {
    let geometry = ShapeGeometry::from_points(
        ShapeKind::Rect,
        vec![Point::new(0.1, 0.1), Point::new(0.4, 0.3)],
    )
    .expect("valid rect");
    Shape::new(geometry, "#FF4444", 2.0).expect("valid shape")
}

pub fn new_thread(t_start: Seconds) -> NewThread {
    NewThread {
        t_start,
        t_end: None,
        shapes: vec![shape()],
    }
}

pub fn stored_thread(chip: u32, t_start: Seconds) -> Thread {
    create_thread(vec![shape()], t_start, None, chip).expect("valid thread")
}

/// An asset with one open thread per start time, chips numbered from 1.
pub fn asset_with_threads(starts: &[Seconds]) -> ReviewAsset {
    let mut asset = ReviewAsset::new(
        "Brand film cut 2",
        "https://cdn.example.com/brand-film.mp4",
        60.0,
        1920.0,
        1080.0,
    );
    for (i, t) in starts.iter().enumerate() {
        asset.threads.push(stored_thread(i as u32 + 1, *t));
    }
    asset
}

/// A store loaded with `asset`, backed by in-memory persistence.
pub async fn loaded_store(asset: ReviewAsset) -> (ReviewStore, Arc<InMemoryPersistence>) {
    let persistence = Arc::new(InMemoryPersistence::default());
    let asset_id = asset.id;
    persistence.insert_asset(asset).await;
    let store = ReviewStore::new(persistence.clone(), Arc::new(EventBus::default()));
    store.load_asset(asset_id).await.expect("seeded asset loads");
    (store, persistence)
}

/// Playback double that records every seek.
#[derive(Default)]
pub struct RecordingPlayback {
    seeks: StdMutex<Vec<Seconds>>,
}

impl RecordingPlayback {
    pub fn seeks(&self) -> Vec<Seconds> {
        self.seeks.lock().unwrap().clone()
    }
}

impl Playback for RecordingPlayback {
    fn current_time(&self) -> Seconds {
        self.seeks.lock().unwrap().last().copied().unwrap_or_default()
    }

    fn seek(&self, time: Seconds) {
        self.seeks.lock().unwrap().push(time);
    }
}

// ---------------------------------------------------------------------------
// Gated persistence
// ---------------------------------------------------------------------------

/// A checkpoint that held calls wait at until the test lets them through.
pub struct Gate {
    arrived: Semaphore,
    released: Semaphore,
}

impl Gate {
    fn new() -> Self {
        Self {
            arrived: Semaphore::new(0),
            released: Semaphore::new(0),
        }
    }

    /// Wait until `n` calls are parked at the gate.
    pub async fn arrivals(&self, n: u32) {
        self.arrived
            .acquire_many(n)
            .await
            .expect("gate semaphore open")
            .forget();
    }

    /// Let `n` parked (or future) calls through, in arrival order.
    pub fn release(&self, n: usize) {
        self.released.add_permits(n);
    }

    async fn pass(&self) {
        self.arrived.add_permits(1);
        self.released
            .acquire()
            .await
            .expect("gate semaphore open")
            .forget();
    }
}

/// Wraps [`InMemoryPersistence`] so chosen operations block at a [`Gate`]
/// before reaching storage.
pub struct GatedPersistence {
    inner: Arc<InMemoryPersistence>,
    gates: StdMutex<HashMap<Operation, Arc<Gate>>>,
}

impl GatedPersistence {
    pub fn new(inner: Arc<InMemoryPersistence>) -> Self {
        Self {
            inner,
            gates: StdMutex::new(HashMap::new()),
        }
    }

    /// Hold every later call of `op` at the returned gate.
    pub fn hold(&self, op: Operation) -> Arc<Gate> {
        self.gates
            .lock()
            .unwrap()
            .entry(op)
            .or_insert_with(|| Arc::new(Gate::new()))
            .clone()
    }

    async fn checkpoint(&self, op: Operation) {
        let gate = self.gates.lock().unwrap().get(&op).cloned();
        if let Some(gate) = gate {
            gate.pass().await;
        }
    }
}

#[async_trait]
impl ReviewPersistence for GatedPersistence {
    async fn fetch_asset(&self, asset_id: EntityId) -> PersistenceResult<ReviewAsset> {
        self.checkpoint(Operation::FetchAsset).await;
        self.inner.fetch_asset(asset_id).await
    }

    async fn fetch_asset_by_share_token(&self, token: &str) -> PersistenceResult<ReviewAsset> {
        self.checkpoint(Operation::FetchAsset).await;
        self.inner.fetch_asset_by_share_token(token).await
    }

    async fn persist_thread(&self, asset_id: EntityId, thread: &Thread) -> PersistenceResult<()> {
        self.checkpoint(Operation::PersistThread).await;
        self.inner.persist_thread(asset_id, thread).await
    }

    async fn persist_comment(&self, thread_id: EntityId, comment: &Comment) -> PersistenceResult<()> {
        self.checkpoint(Operation::PersistComment).await;
        self.inner.persist_comment(thread_id, comment).await
    }

    async fn persist_thread_state(
        &self,
        thread_id: EntityId,
        state: ThreadState,
    ) -> PersistenceResult<()> {
        self.checkpoint(Operation::PersistThreadState).await;
        self.inner.persist_thread_state(thread_id, state).await
    }

    async fn persist_status(&self, asset_id: EntityId, status: AssetStatus) -> PersistenceResult<()> {
        self.checkpoint(Operation::PersistStatus).await;
        self.inner.persist_status(asset_id, status).await
    }

    async fn create_share_token(&self, asset_id: EntityId) -> PersistenceResult<String> {
        self.checkpoint(Operation::CreateShareToken).await;
        self.inner.create_share_token(asset_id).await
    }
}

/// A loaded store whose persistence calls can be held at gates.
pub async fn gated_store(
    asset: ReviewAsset,
) -> (ReviewStore, Arc<GatedPersistence>, Arc<InMemoryPersistence>) {
    let memory = Arc::new(InMemoryPersistence::default());
    let asset_id = asset.id;
    memory.insert_asset(asset).await;
    let gated = Arc::new(GatedPersistence::new(memory.clone()));
    let store = ReviewStore::new(gated.clone(), Arc::new(EventBus::default()));
    store.load_asset(asset_id).await.expect("seeded asset loads");
    (store, gated, memory)
}
