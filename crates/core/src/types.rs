/// Assets, threads, comments, shapes and authors are all identified by UUIDs.
pub type EntityId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Playback positions are plain seconds from the start of the video.
pub type Seconds = f64;

/// Generate a fresh random identifier.
pub fn new_id() -> EntityId {
    uuid::Uuid::new_v4()
}
