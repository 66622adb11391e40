//! In-memory persistence for tests, demos and local development.
//!
//! ## Limitations
//!
//! - **Single-process only**: nothing is shared across process boundaries
//! - **No durability**: all state is lost when the process exits
//!
//! Beyond the [`ReviewPersistence`] contract it records call counts and can
//! be told to fail specific operations, which is how store rollback paths
//! are exercised.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{Mutex, RwLock};

use reelnote_core::review::{AssetStatus, Comment, ReviewAsset, Thread, ThreadState};
use reelnote_core::types::EntityId;

use crate::persistence::{PersistenceError, PersistenceResult, ReviewPersistence};

/// Default length of generated share tokens.
pub const DEFAULT_TOKEN_LENGTH: usize = 32;

/// The collaborator calls, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchAsset,
    PersistThread,
    PersistComment,
    PersistThreadState,
    PersistStatus,
    CreateShareToken,
}

/// Let `skip` calls through, then fail `remaining` calls (`None`: forever).
#[derive(Debug, Clone, Copy)]
struct FailurePlan {
    skip: usize,
    remaining: Option<usize>,
}

pub struct InMemoryPersistence {
    assets: RwLock<HashMap<EntityId, ReviewAsset>>,
    failures: Mutex<HashMap<Operation, FailurePlan>>,
    calls: Mutex<HashMap<Operation, usize>>,
    token_length: usize,
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_LENGTH)
    }
}

impl InMemoryPersistence {
    pub fn new(token_length: usize) -> Self {
        Self {
            assets: RwLock::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            token_length: token_length.max(8),
        }
    }

    /// Seed (or replace) a stored asset.
    pub async fn insert_asset(&self, asset: ReviewAsset) {
        self.assets.write().await.insert(asset.id, asset);
    }

    /// The stored copy of an asset, as the next fetch would return it.
    pub async fn stored_asset(&self, asset_id: EntityId) -> Option<ReviewAsset> {
        self.assets.read().await.get(&asset_id).cloned()
    }

    /// Fail the next `times` calls of `op`.
    pub async fn fail_next(&self, op: Operation, times: usize) {
        self.plan(op, FailurePlan { skip: 0, remaining: Some(times) }).await;
    }

    /// Fail every call of `op` until cleared.
    pub async fn fail_always(&self, op: Operation) {
        self.plan(op, FailurePlan { skip: 0, remaining: None }).await;
    }

    /// Let `successes` calls of `op` through, then fail every later one.
    pub async fn fail_after(&self, op: Operation, successes: usize) {
        self.plan(op, FailurePlan { skip: successes, remaining: None }).await;
    }

    pub async fn clear_failures(&self) {
        self.failures.lock().await.clear();
    }

    /// Number of times `op` has been invoked, failed calls included.
    pub async fn call_count(&self, op: Operation) -> usize {
        self.calls.lock().await.get(&op).copied().unwrap_or(0)
    }

    async fn plan(&self, op: Operation, plan: FailurePlan) {
        self.failures.lock().await.insert(op, plan);
    }

    /// Count the call and decide whether it should fail.
    async fn enter(&self, op: Operation) -> PersistenceResult<()> {
        *self.calls.lock().await.entry(op).or_insert(0) += 1;

        let mut failures = self.failures.lock().await;
        let Some(plan) = failures.get_mut(&op) else {
            return Ok(());
        };
        if plan.skip > 0 {
            plan.skip -= 1;
            return Ok(());
        }
        match plan.remaining {
            Some(0) => {
                failures.remove(&op);
                Ok(())
            }
            Some(n) => {
                plan.remaining = Some(n - 1);
                Err(injected(op))
            }
            None => Err(injected(op)),
        }
    }

    fn generate_token(&self) -> String {
        rand::rng()
            .sample_iter(&rand::distr::Alphanumeric)
            .take(self.token_length)
            .map(char::from)
            .collect()
    }
}

fn injected(op: Operation) -> PersistenceError {
    PersistenceError::Unavailable(format!("injected failure for {op:?}"))
}

fn asset_not_found(asset_id: EntityId) -> PersistenceError {
    PersistenceError::NotFound {
        entity: "asset",
        id: asset_id.to_string(),
    }
}

fn thread_not_found(thread_id: EntityId) -> PersistenceError {
    PersistenceError::NotFound {
        entity: "thread",
        id: thread_id.to_string(),
    }
}

/// Locate a stored thread in whichever asset holds it.
fn find_thread(
    assets: &mut HashMap<EntityId, ReviewAsset>,
    thread_id: EntityId,
) -> PersistenceResult<(&mut u64, &mut Thread)> {
    assets
        .values_mut()
        .find_map(|asset| {
            let version = &mut asset.version;
            asset
                .threads
                .iter_mut()
                .find(|t| t.id == thread_id)
                .map(|thread| (version, thread))
        })
        .ok_or_else(|| thread_not_found(thread_id))
}

#[async_trait]
impl ReviewPersistence for InMemoryPersistence {
    async fn fetch_asset(&self, asset_id: EntityId) -> PersistenceResult<ReviewAsset> {
        self.enter(Operation::FetchAsset).await?;
        self.stored_asset(asset_id)
            .await
            .ok_or_else(|| asset_not_found(asset_id))
    }

    async fn fetch_asset_by_share_token(&self, token: &str) -> PersistenceResult<ReviewAsset> {
        self.enter(Operation::FetchAsset).await?;
        self.assets
            .read()
            .await
            .values()
            .find(|a| a.share_token.as_deref() == Some(token))
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound {
                entity: "share token",
                id: token.to_string(),
            })
    }

    async fn persist_thread(&self, asset_id: EntityId, thread: &Thread) -> PersistenceResult<()> {
        self.enter(Operation::PersistThread).await?;
        let mut assets = self.assets.write().await;
        let asset = assets
            .get_mut(&asset_id)
            .ok_or_else(|| asset_not_found(asset_id))?;

        match asset.thread_mut(thread.id) {
            Some(stored) => {
                let new_shapes: Vec<_> = thread
                    .shapes
                    .iter()
                    .filter(|s| !stored.shapes.iter().any(|known| known.id() == s.id()))
                    .cloned()
                    .collect();
                stored.shapes.extend(new_shapes);
            }
            None => {
                if asset.threads.iter().any(|t| t.chip == thread.chip) {
                    return Err(PersistenceError::Rejected(format!(
                        "chip {} already used on asset {asset_id}",
                        thread.chip
                    )));
                }
                asset.threads.push(thread.clone());
            }
        }
        asset.bump_version();
        Ok(())
    }

    async fn persist_comment(&self, thread_id: EntityId, comment: &Comment) -> PersistenceResult<()> {
        self.enter(Operation::PersistComment).await?;
        let mut assets = self.assets.write().await;
        let (version, thread) = find_thread(&mut assets, thread_id)?;
        if !thread.comments.iter().any(|c| c.id == comment.id) {
            thread.comments.push(comment.clone());
            *version += 1;
        }
        Ok(())
    }

    async fn persist_thread_state(
        &self,
        thread_id: EntityId,
        state: ThreadState,
    ) -> PersistenceResult<()> {
        self.enter(Operation::PersistThreadState).await?;
        let mut assets = self.assets.write().await;
        let (version, thread) = find_thread(&mut assets, thread_id)?;
        if thread.state != state {
            thread.state = state;
            *version += 1;
        }
        Ok(())
    }

    async fn persist_status(&self, asset_id: EntityId, status: AssetStatus) -> PersistenceResult<()> {
        self.enter(Operation::PersistStatus).await?;
        let mut assets = self.assets.write().await;
        let asset = assets
            .get_mut(&asset_id)
            .ok_or_else(|| asset_not_found(asset_id))?;
        if asset.status != status {
            asset.status = status;
            asset.bump_version();
        }
        Ok(())
    }

    async fn create_share_token(&self, asset_id: EntityId) -> PersistenceResult<String> {
        self.enter(Operation::CreateShareToken).await?;
        let mut assets = self.assets.write().await;
        let asset = assets
            .get_mut(&asset_id)
            .ok_or_else(|| asset_not_found(asset_id))?;
        if let Some(token) = &asset.share_token {
            return Ok(token.clone());
        }
        let token = self.generate_token();
        asset.share_token = Some(token.clone());
        asset.bump_version();
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use reelnote_core::annotation::{Shape, ShapeGeometry, ShapeKind};
    use reelnote_core::normalize::Point;
    use reelnote_core::review::create_thread;

    fn asset() -> ReviewAsset {
        ReviewAsset::new("Spot 30s", "https://cdn.example/spot.mp4", 30.0, 1920.0, 1080.0)
    }

    fn thread(chip: u32) -> Thread {
        let geometry = ShapeGeometry::from_points(ShapeKind::Path, vec![Point::new(0.2, 0.2)]).unwrap();
        create_thread(vec![Shape::new(geometry, "#FF4444", 2.0).unwrap()], 1.0, None, chip).unwrap()
    }

    #[tokio::test]
    async fn fetch_unknown_asset_is_not_found() {
        let store = InMemoryPersistence::default();
        let err = store.fetch_asset(reelnote_core::types::new_id()).await.unwrap_err();
        assert_matches!(err, PersistenceError::NotFound { entity: "asset", .. });
    }

    #[tokio::test]
    async fn failure_plans_count_down() {
        let store = InMemoryPersistence::default();
        let a = asset();
        store.insert_asset(a.clone()).await;

        store.fail_next(Operation::FetchAsset, 2).await;
        assert!(store.fetch_asset(a.id).await.is_err());
        assert!(store.fetch_asset(a.id).await.is_err());
        assert!(store.fetch_asset(a.id).await.is_ok());
        assert_eq!(store.call_count(Operation::FetchAsset).await, 3);

        store.fail_after(Operation::FetchAsset, 1).await;
        assert!(store.fetch_asset(a.id).await.is_ok());
        assert!(store.fetch_asset(a.id).await.is_err());
        store.clear_failures().await;
        assert!(store.fetch_asset(a.id).await.is_ok());
    }

    #[tokio::test]
    async fn persist_thread_is_append_only_upsert() {
        let store = InMemoryPersistence::default();
        let a = asset();
        store.insert_asset(a.clone()).await;

        let t = thread(1);
        store.persist_thread(a.id, &t).await.unwrap();
        store.persist_thread(a.id, &t).await.unwrap();
        let stored = store.stored_asset(a.id).await.unwrap();
        assert_eq!(stored.threads.len(), 1);
        assert_eq!(stored.threads[0].shapes.len(), 1);

        let mut dup = thread(1);
        dup.id = reelnote_core::types::new_id();
        assert_matches!(
            store.persist_thread(a.id, &dup).await,
            Err(PersistenceError::Rejected(_))
        );
    }

    #[tokio::test]
    async fn comments_and_states_land_on_the_right_thread() {
        let store = InMemoryPersistence::default();
        let mut a = asset();
        let t = thread(1);
        a.threads.push(t.clone());
        store.insert_asset(a.clone()).await;

        let comment = Comment::new(reelnote_core::types::new_id(), "fix the flicker", vec![]).unwrap();
        store.persist_comment(t.id, &comment).await.unwrap();
        store.persist_comment(t.id, &comment).await.unwrap();
        store.persist_thread_state(t.id, ThreadState::Resolved).await.unwrap();

        let stored = store.stored_asset(a.id).await.unwrap();
        assert_eq!(stored.threads[0].comments, vec![comment]);
        assert_eq!(stored.threads[0].state, ThreadState::Resolved);
        assert_eq!(stored.version, a.version + 2);

        let missing = store
            .persist_thread_state(reelnote_core::types::new_id(), ThreadState::Open)
            .await;
        assert_matches!(missing, Err(PersistenceError::NotFound { entity: "thread", .. }));
    }

    #[tokio::test]
    async fn share_token_is_stable_and_resolvable() {
        let store = InMemoryPersistence::new(16);
        let a = asset();
        store.insert_asset(a.clone()).await;

        let token = store.create_share_token(a.id).await.unwrap();
        assert_eq!(token.len(), 16);
        assert_eq!(store.create_share_token(a.id).await.unwrap(), token);

        let shared = store.fetch_asset_by_share_token(&token).await.unwrap();
        assert_eq!(shared.id, a.id);
        assert!(store.fetch_asset_by_share_token("nope").await.is_err());
    }
}
