//! Review domain model: assets, threads and comments.
//!
//! Everything here is pure. Thread transitions take a thread by reference
//! and return the next version of it, so callers decide when (and whether)
//! the new value replaces the old one.

use serde::{Deserialize, Serialize};

use crate::annotation::{validate_shape_count, Shape};
use crate::error::CoreError;
use crate::types::{new_id, EntityId, Seconds, Timestamp};

/* --------------------------------------------------------------------------
Constants
-------------------------------------------------------------------------- */

/// Maximum length for a comment body.
pub const MAX_COMMENT_LENGTH: usize = 10_000;

/// Maximum number of attachments on a single comment.
pub const MAX_ATTACHMENTS_PER_COMMENT: usize = 10;

/* --------------------------------------------------------------------------
States
-------------------------------------------------------------------------- */

/// Thread lifecycle. Both transitions are explicit and idempotent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    #[default]
    Open,
    Resolved,
}

impl ThreadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "open" => Ok(Self::Open),
            "resolved" => Ok(Self::Resolved),
            _ => Err(CoreError::Validation(format!(
                "Invalid thread state '{s}'. Must be one of: open, resolved"
            ))),
        }
    }
}

/// Approval workflow status of a review asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    #[default]
    InReview,
    ChangesRequested,
    Approved,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InReview => "in_review",
            Self::ChangesRequested => "changes_requested",
            Self::Approved => "approved",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "in_review" => Ok(Self::InReview),
            "changes_requested" => Ok(Self::ChangesRequested),
            "approved" => Ok(Self::Approved),
            _ => Err(CoreError::Validation(format!(
                "Invalid asset status '{s}'. Must be one of: in_review, changes_requested, approved"
            ))),
        }
    }

    /// Whether the reviewer has reached a decision on this submission.
    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::InReview)
    }
}

/* --------------------------------------------------------------------------
Comments
-------------------------------------------------------------------------- */

/// A file reference produced by the upload collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: EntityId,
    pub author_id: EntityId,
    pub body: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Comment {
    /// Create a comment stamped with the current time.
    pub fn new(
        author_id: EntityId,
        body: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<Self, CoreError> {
        let body = body.into();
        validate_comment_body(&body)?;
        if attachments.len() > MAX_ATTACHMENTS_PER_COMMENT {
            return Err(CoreError::Validation(format!(
                "A comment may carry at most {MAX_ATTACHMENTS_PER_COMMENT} attachments"
            )));
        }
        Ok(Self {
            id: new_id(),
            author_id,
            body,
            created_at: chrono::Utc::now(),
            attachments,
        })
    }
}

/// Validate comment text: non-blank and within [`MAX_COMMENT_LENGTH`].
pub fn validate_comment_body(body: &str) -> Result<(), CoreError> {
    if body.trim().is_empty() {
        return Err(CoreError::Validation(
            "A comment must have non-empty text".to_string(),
        ));
    }
    if body.chars().count() > MAX_COMMENT_LENGTH {
        return Err(CoreError::Validation(format!(
            "Comment text exceeds maximum length of {MAX_COMMENT_LENGTH} characters"
        )));
    }
    Ok(())
}

/* --------------------------------------------------------------------------
Threads
-------------------------------------------------------------------------- */

/// A timestamped, shape-anchored discussion.
///
/// `t_end == None` marks a point-in-time annotation rather than a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: EntityId,
    /// Display number, unique within the asset and fixed at creation.
    pub chip: u32,
    pub t_start: Seconds,
    pub t_end: Option<Seconds>,
    pub shapes: Vec<Shape>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub state: ThreadState,
    pub created_at: Timestamp,
}

impl Thread {
    pub fn is_open(&self) -> bool {
        self.state == ThreadState::Open
    }

    pub fn is_resolved(&self) -> bool {
        self.state == ThreadState::Resolved
    }
}

/// Validate a thread's time anchor.
pub fn validate_time_range(t_start: Seconds, t_end: Option<Seconds>) -> Result<(), CoreError> {
    let start_ok = t_start.is_finite() && t_start >= 0.0;
    let end_ok = t_end.map_or(true, |end| end.is_finite() && end >= t_start);
    if start_ok && end_ok {
        Ok(())
    } else {
        Err(CoreError::InvalidTimeRange {
            start: t_start,
            end: t_end,
        })
    }
}

/// Build a new open thread.
pub fn create_thread(
    shapes: Vec<Shape>,
    t_start: Seconds,
    t_end: Option<Seconds>,
    next_chip: u32,
) -> Result<Thread, CoreError> {
    validate_shape_count(shapes.len())?;
    validate_time_range(t_start, t_end)?;

    Ok(Thread {
        id: new_id(),
        chip: next_chip,
        t_start,
        t_end,
        shapes,
        comments: Vec::new(),
        state: ThreadState::Open,
        created_at: chrono::Utc::now(),
    })
}

pub fn resolve(thread: &Thread) -> Thread {
    with_state(thread, ThreadState::Resolved)
}

pub fn reopen(thread: &Thread) -> Thread {
    with_state(thread, ThreadState::Open)
}

/// Return `thread` in `state`; an unchanged state yields an identical copy.
pub fn with_state(thread: &Thread, state: ThreadState) -> Thread {
    Thread {
        state,
        ..thread.clone()
    }
}

/// Append a comment. Legal in any state and never changes the state.
pub fn append_comment(thread: &Thread, comment: Comment) -> Thread {
    let mut next = thread.clone();
    next.comments.push(comment);
    next
}

/// Anchor additional shapes to an existing thread.
pub fn append_shapes(thread: &Thread, shapes: Vec<Shape>) -> Result<Thread, CoreError> {
    validate_shape_count(shapes.len())?;
    validate_shape_count(thread.shapes.len() + shapes.len())?;
    let mut next = thread.clone();
    next.shapes.extend(shapes);
    Ok(next)
}

/* --------------------------------------------------------------------------
Assets
-------------------------------------------------------------------------- */

/// A video under review together with its discussion threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewAsset {
    pub id: EntityId,
    pub title: String,
    pub video_url: String,
    pub duration: Seconds,
    /// Native video width, the denominator for unit-space shapes.
    pub video_width: f64,
    /// Native video height, the denominator for unit-space shapes.
    pub video_height: f64,
    /// Bumped on every structural mutation. Advisory only.
    pub version: u64,
    #[serde(default)]
    pub status: AssetStatus,
    pub share_token: Option<String>,
    #[serde(default)]
    pub threads: Vec<Thread>,
}

impl ReviewAsset {
    pub fn new(
        title: impl Into<String>,
        video_url: impl Into<String>,
        duration: Seconds,
        video_width: f64,
        video_height: f64,
    ) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            video_url: video_url.into(),
            duration,
            video_width,
            video_height,
            version: 1,
            status: AssetStatus::InReview,
            share_token: None,
            threads: Vec::new(),
        }
    }

    /// `max(existing chips) + 1`, or `1` for an asset without threads.
    pub fn next_chip(&self) -> Result<u32, CoreError> {
        match self.threads.iter().map(|t| t.chip).max() {
            None => Ok(1),
            Some(max) => max.checked_add(1).ok_or_else(|| {
                CoreError::Validation(format!("Chip numbers exhausted after {max}"))
            }),
        }
    }

    pub fn thread(&self, id: EntityId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn thread_mut(&mut self, id: EntityId) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| t.id == id)
    }

    pub fn open_threads(&self) -> Vec<&Thread> {
        self.threads.iter().filter(|t| t.is_open()).collect()
    }

    pub fn resolved_threads(&self) -> Vec<&Thread> {
        self.threads.iter().filter(|t| t.is_resolved()).collect()
    }

    pub fn bump_version(&mut self) {
        self.version += 1;
    }
}

/* --------------------------------------------------------------------------
Tests
-------------------------------------------------------------------------- */
