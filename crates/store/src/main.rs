//! `reelnote-session` -- scripted review session against the in-memory
//! backend.
//!
//! Seeds one asset, then walks through a reviewer's flow: draw on two
//! frames, discuss, resolve, step between notes, approve and share. Every
//! store event is logged as it is published.
//!
//! # Environment variables
//!
//! | Variable             | Required | Default | Description                          |
//! |----------------------|----------|---------|--------------------------------------|
//! | `REFERENCE_WIDTH`    | no       | `1280`  | Canonical canvas frame width         |
//! | `REFERENCE_HEIGHT`   | no       | `720`   | Canonical canvas frame height        |
//! | `EVENT_BUS_CAPACITY` | no       | `256`   | Review event channel capacity        |
//! | `SHARE_TOKEN_LENGTH` | no       | `32`    | Length of minted share tokens        |
//! | `RUST_LOG`           | no       | `reelnote_store=info,reelnote_core=info` | Log filter |

use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelnote_core::annotation::{DrawnShape, ShapeKind};
use reelnote_core::navigator::format_time;
use reelnote_core::normalize::{restore_from_storage, CanvasObject, CanvasState, Point};
use reelnote_core::review::{AssetStatus, ReviewAsset};
use reelnote_core::types::{new_id, Seconds};
use reelnote_store::{
    InMemoryPersistence, NewComment, NewThread, Playback, ReviewStore, StoreConfig,
};

/// Size of the drawing surface in this session, in pixels.
const SURFACE_WIDTH: f64 = 960.0;
const SURFACE_HEIGHT: f64 = 540.0;

/// Stand-in for the video element: remembers where it was last sought to.
#[derive(Default)]
struct Playhead {
    position: Mutex<Seconds>,
}

impl Playback for Playhead {
    fn current_time(&self) -> Seconds {
        self.position.lock().map(|p| *p).unwrap_or_default()
    }

    fn seek(&self, time: Seconds) {
        if let Ok(mut position) = self.position.lock() {
            *position = time;
        }
        tracing::info!(at = %format_time(time), "Seek");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelnote_store=info,reelnote_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = StoreConfig::from_env();
    tracing::info!(?config, "Starting reelnote-session");

    let persistence = Arc::new(InMemoryPersistence::new(config.share_token_length));
    let asset = ReviewAsset::new(
        "Launch teaser v3",
        "https://cdn.example.com/teaser-v3.mp4",
        42.0,
        1920.0,
        1080.0,
    );
    let asset_id = asset.id;
    persistence.insert_asset(asset).await;

    let playhead = Arc::new(Playhead::default());
    let store = ReviewStore::from_config(&config, persistence.clone())
        .with_playback(playhead.clone());

    let mut events = store.subscribe();
    let event_log = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!(
                event_type = %event.event_type,
                thread_id = ?event.thread_id,
                payload = %event.payload,
                "Event",
            );
        }
    });

    store.load_asset(asset_id).await.context("loading seeded asset")?;

    // Canvas round trip through the reference frame.
    let canvas = CanvasState {
        objects: vec![CanvasObject::at(480.0, 270.0)],
        ..Default::default()
    };
    let stored = store
        .reference_space()
        .normalize_for_storage(&canvas, SURFACE_WIDTH, SURFACE_HEIGHT);
    let restored = restore_from_storage(&stored, SURFACE_WIDTH, SURFACE_HEIGHT);
    tracing::info!(
        stored_left = stored.canvas.objects[0].left,
        restored_left = restored.objects[0].left,
        "Canvas normalized for storage",
    );

    let reviewer = new_id();

    let circle = DrawnShape {
        kind: ShapeKind::Circle,
        points: vec![Point::new(300.0, 120.0), Point::new(420.0, 240.0)],
        color: None,
        stroke_width: 3.0,
    };
    let logo = store
        .add_thread(NewThread::from_drawn(
            12.5,
            None,
            &[circle],
            SURFACE_WIDTH,
            SURFACE_HEIGHT,
        )?)
        .await?;
    store
        .add_comment(logo.id, NewComment::text(reviewer, "Logo is clipped on the left."))
        .await?;

    let stroke = DrawnShape {
        kind: ShapeKind::Path,
        points: vec![
            Point::new(100.0, 400.0),
            Point::new(180.0, 380.0),
            Point::new(260.0, 410.0),
        ],
        color: Some("#33AAFF".to_string()),
        stroke_width: 4.0,
    };
    let grade = store
        .add_thread(NewThread::from_drawn(
            5.0,
            Some(8.0),
            &[stroke],
            SURFACE_WIDTH,
            SURFACE_HEIGHT,
        )?)
        .await?;
    store
        .add_comment(grade.id, NewComment::text(reviewer, "Grade drifts warm here."))
        .await?;

    store.resolve_thread(logo.id).await?;
    store
        .add_comment(logo.id, NewComment::text(reviewer, "Fixed in v4, thanks."))
        .await?;

    // Step through the notes in time order, starting from the earliest.
    store.select_thread(grade.id).await?;
    while let Some(target) = store.go_to_next().await {
        tracing::info!(at = %format_time(target.time), thread_id = %target.thread_id, "Stepped to note");
    }
    tracing::info!(at = %format_time(playhead.current_time()), "Playhead parked");

    store.set_status(AssetStatus::Approved).await?;
    let token = store.generate_share_token().await?;
    tracing::info!(token_len = token.len(), "Share link ready");

    let state = store.snapshot().await;
    tracing::info!(
        open = store.open_threads().await.len(),
        resolved = store.resolved_threads().await.len(),
        version = state.asset.as_ref().map_or(0, |a| a.version),
        "Session complete",
    );
    println!("{}", serde_json::to_string_pretty(&state)?);

    drop(store);
    event_log.await.context("event logger panicked")?;
    Ok(())
}
