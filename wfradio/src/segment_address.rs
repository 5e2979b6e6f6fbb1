//! Segment address grammar and next-segment derivation
//!
//! The backend publishes the address of the segment currently playing but
//! has no endpoint for "segment N+1". Addresses of one track only differ by
//! the chunk number, so the successor is derived locally:
//!
//! ```text
//! address := base ROOT SEP folder SEP "Chunk_" index "." ext query
//! ROOT    := storage root marker ("Tracks" by default)
//! SEP     := "/" | "%2F" | "%2f"
//! folder  := percent-encoded track folder, no "/" or "?"
//! index   := 1*DIGIT  (1-based)
//! ext     := 1*ALNUM
//! query   := "?" ... with a non-empty "token" parameter
//! ```
//!
//! Nothing outside this module looks inside an address string.

use crate::error::Result;
use crate::models::{SegmentSnapshot, TrackSnapshot};
use regex::Regex;
use std::fmt;
use url::Url;

/// Folder under which the object store keeps track chunks
pub const DEFAULT_STORAGE_ROOT: &str = "Tracks";

/// Why an address could not be parsed or derived
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address is not of the form <base>/{root}/<folder>/Chunk_<n>.<ext>: {address}")]
    UnexpectedShape { root: String, address: String },

    #[error("address carries no access token: {0}")]
    MissingToken(String),

    #[error("chunk index out of range in {0}")]
    InvalidIndex(String),

    #[error("derived address is not a valid URL: {0}")]
    InvalidUrl(String),
}

/// A parsed segment address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentAddress {
    /// Everything up to and including the storage root marker
    base: String,
    root_separator: String,
    folder: String,
    chunk_separator: String,
    index: u32,
    extension: String,
    /// Query string including the leading `?`
    query: String,
}

impl SegmentAddress {
    /// 1-based chunk number
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Percent-encoded track folder
    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Access token shared by every chunk of the track
    pub fn token(&self) -> Option<String> {
        Url::parse(&format!("https://token.invalid/{}", self.query))
            .ok()?
            .query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
    }

    /// Whether both addresses point into the same track folder with the same token
    pub fn same_track(&self, other: &SegmentAddress) -> bool {
        self.base == other.base && self.folder == other.folder && self.query == other.query
    }

    /// The address of another chunk of the same track
    pub fn with_index(&self, index: u32) -> SegmentAddress {
        SegmentAddress {
            index,
            ..self.clone()
        }
    }

    pub fn to_url(&self) -> std::result::Result<Url, AddressError> {
        let rendered = self.to_string();
        Url::parse(&rendered).map_err(|_| AddressError::InvalidUrl(rendered))
    }
}

impl fmt::Display for SegmentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}Chunk_{}.{}{}",
            self.base,
            self.root_separator,
            self.folder,
            self.chunk_separator,
            self.index,
            self.extension,
            self.query
        )
    }
}

/// How a server-reported segment relates to the one playing locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentRelation {
    /// Same address
    Same,
    /// Same track, earlier chunk
    Behind,
    /// Same track, later chunk
    Ahead,
    /// Another track (or another token)
    OtherTrack,
    /// One of the addresses could not be parsed
    Unknown,
}

/// Parses segment addresses and derives their successors
#[derive(Debug, Clone)]
pub struct SegmentAddressResolver {
    root: String,
    pattern: Regex,
}

impl SegmentAddressResolver {
    /// Create a resolver for chunks stored under `root`
    pub fn new(root: impl Into<String>) -> Result<Self> {
        let root = root.into();
        let pattern = Regex::new(&format!(
            r"^(?P<base>.*?{})(?P<sep1>/|%2[Ff])(?P<folder>[^/?]+?)(?P<sep2>/|%2[Ff])Chunk_(?P<index>\d+)\.(?P<ext>[A-Za-z0-9]+)(?P<query>\?.*)?$",
            regex::escape(&root)
        ))?;
        Ok(Self { root, pattern })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Parse an address according to the module grammar
    pub fn parse(&self, address: &Url) -> std::result::Result<SegmentAddress, AddressError> {
        let raw = address.as_str();
        let caps = self
            .pattern
            .captures(raw)
            .ok_or_else(|| AddressError::UnexpectedShape {
                root: self.root.clone(),
                address: raw.to_string(),
            })?;

        let has_token = address
            .query_pairs()
            .any(|(k, v)| k == "token" && !v.is_empty());
        if !has_token {
            return Err(AddressError::MissingToken(raw.to_string()));
        }

        let index: u32 = caps["index"]
            .parse()
            .map_err(|_| AddressError::InvalidIndex(raw.to_string()))?;
        if index == 0 {
            return Err(AddressError::InvalidIndex(raw.to_string()));
        }

        Ok(SegmentAddress {
            base: caps["base"].to_string(),
            root_separator: caps["sep1"].to_string(),
            folder: caps["folder"].to_string(),
            chunk_separator: caps["sep2"].to_string(),
            index,
            extension: caps["ext"].to_string(),
            query: caps
                .name("query")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        })
    }

    /// Address of the segment after `current`, or `None` on the track's last segment
    pub fn resolve_next(
        &self,
        current: &SegmentSnapshot,
        track: &TrackSnapshot,
    ) -> std::result::Result<Option<Url>, AddressError> {
        if track.current_segment_index >= track.segment_count {
            return Ok(None);
        }

        let parsed = self.parse(&current.address)?;
        let next_index = parsed
            .index()
            .checked_add(1)
            .ok_or_else(|| AddressError::InvalidIndex(current.address.to_string()))?;

        parsed.with_index(next_index).to_url().map(Some)
    }

    /// Classify `reported` against `playing`
    pub fn relation(&self, reported: &Url, playing: &Url) -> SegmentRelation {
        if reported == playing {
            return SegmentRelation::Same;
        }
        let (Ok(reported), Ok(playing)) = (self.parse(reported), self.parse(playing)) else {
            return SegmentRelation::Unknown;
        };
        if !reported.same_track(&playing) {
            return SegmentRelation::OtherTrack;
        }
        match reported.index().cmp(&playing.index()) {
            std::cmp::Ordering::Less => SegmentRelation::Behind,
            std::cmp::Ordering::Equal => SegmentRelation::Same,
            std::cmp::Ordering::Greater => SegmentRelation::Ahead,
        }
    }
}
