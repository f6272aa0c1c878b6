//! Opaque feed cursors and connection assembly.
//!
//! A cursor is standard base64 over either a decimal position
//! (`"12"`) or a keyset pair (`"<unix_ts>:<post_id>"`). Feeds are
//! paginated by position; keyset cursors decode but are rejected by the
//! feed reader.

use crate::error::{AppError, Result};
use crate::models::{FeedPost, PageInfo, PostConnection, PostEdge};
use base64::{engine::general_purpose, Engine as _};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Zero-based position of an edge within the ranked feed
    Offset(usize),
    Keyset { timestamp: i64, post_id: Uuid },
}

impl Cursor {
    pub fn encode(&self) -> String {
        let raw = match self {
            Cursor::Offset(position) => position.to_string(),
            Cursor::Keyset { timestamp, post_id } => format!("{}:{}", timestamp, post_id),
        };
        general_purpose::STANDARD.encode(raw)
    }

    pub fn decode(cursor: &str) -> Result<Self> {
        let decoded = general_purpose::STANDARD
            .decode(cursor.trim())
            .map_err(|_| AppError::InvalidCursor("Invalid cursor format".to_string()))?;
        let raw = String::from_utf8(decoded)
            .map_err(|_| AppError::InvalidCursor("Invalid cursor encoding".to_string()))?;

        if let Some((ts, post_id)) = raw.split_once(':') {
            let timestamp = parse_digits(ts.strip_prefix('-').unwrap_or(ts))
                .and_then(|_| ts.parse::<i64>().ok())
                .ok_or_else(|| AppError::InvalidCursor("Invalid cursor timestamp".to_string()))?;
            let post_id = Uuid::parse_str(post_id)
                .map_err(|_| AppError::InvalidCursor("Invalid cursor post id".to_string()))?;
            return Ok(Cursor::Keyset { timestamp, post_id });
        }

        parse_digits(&raw)
            .map(Cursor::Offset)
            .ok_or_else(|| AppError::InvalidCursor("Invalid cursor value".to_string()))
    }
}

/// Only plain ASCII digits; rejects signs, whitespace and empty strings.
fn parse_digits(raw: &str) -> Option<usize> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Position of the first edge to return after `after`.
///
/// No cursor starts at the top; an offset cursor resumes immediately after
/// the edge it was issued for.
pub fn resume_offset(after: Option<&str>) -> Result<usize> {
    match after.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(0),
        Some(raw) => match Cursor::decode(raw)? {
            Cursor::Offset(position) => position
                .checked_add(1)
                .ok_or_else(|| AppError::InvalidCursor("Cursor out of range".to_string())),
            Cursor::Keyset { .. } => Err(AppError::InvalidCursor(
                "Keyset cursors are not supported for feeds".to_string(),
            )),
        },
    }
}

/// Build a connection for a page that starts at `offset` in the feed.
pub fn build_connection(posts: Vec<FeedPost>, offset: usize, has_next_page: bool) -> PostConnection {
    let edges: Vec<PostEdge> = posts
        .into_iter()
        .enumerate()
        .map(|(i, node)| PostEdge {
            cursor: Cursor::Offset(offset + i).encode(),
            node,
        })
        .collect();

    let page_info = PageInfo {
        start_cursor: edges.first().map(|e| e.cursor.clone()),
        end_cursor: edges.last().map(|e| e.cursor.clone()),
        has_next_page,
        has_previous_page: offset > 0,
    };

    PostConnection {
        total_count: edges.len() as i32,
        edges,
        page_info,
    }
}
