//! Event fingerprints and the two places they are persisted on a topic.
//!
//! A fingerprint is the SHA-1 of the event's normalized UID. It is written
//! onto a topic twice:
//! - as a forum tag (`ics-<10 hex>`), which is what lookups search for
//! - as a hidden HTML comment in the first post (`<!-- ICSUID:<16 hex> -->`),
//!   which survives tag edits and is used to verify marker search hits
//!
//! Both are cut from the same digest, so they cannot disagree.

use std::fmt::Write;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use regex::Regex;
use sha1::{Digest, Sha1};

const TAG_PREFIX: &str = "ics-";
const TAG_HEX_LEN: usize = 10;
const MARKER_PREFIX: &str = "ICSUID:";
const MARKER_HEX_LEN: usize = 16;

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<!--\s*ICSUID:([0-9a-f]{16})\s*-->\s*").unwrap());

fn sha1_hex(input: &str) -> String {
    let digest = Sha1::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

/// Stable identifier derived from an event UID.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    hex: String,
    /// Tags older tooling derived from the raw or merely trimmed UID
    aliases: Vec<String>,
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.hex == other.hex
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hex.hash(state);
    }
}

impl Fingerprint {
    /// Fingerprint of a UID, or `None` when the UID is blank.
    pub fn from_uid(uid: &str) -> Option<Self> {
        let normalized = uid.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        let hex = sha1_hex(&normalized);
        let canonical = tag_for(&hex);
        let mut aliases: Vec<String> = Vec::new();
        for variant in [uid, uid.trim()] {
            let tag = tag_for(&sha1_hex(variant));
            if tag != canonical && !aliases.contains(&tag) {
                aliases.push(tag);
            }
        }

        Some(Fingerprint { hex, aliases })
    }

    /// The forum tag for this fingerprint.
    pub fn tag(&self) -> String {
        tag_for(&self.hex)
    }

    /// The canonical tag followed by any legacy aliases, in lookup order.
    pub fn tag_variants(&self) -> Vec<String> {
        std::iter::once(self.tag())
            .chain(self.aliases.iter().cloned())
            .collect()
    }

    /// Token embedded in the hidden marker, also used as a search phrase.
    pub fn marker_token(&self) -> String {
        format!("{MARKER_PREFIX}{}", &self.hex[..MARKER_HEX_LEN])
    }

    /// The hidden marker as it appears in a post body.
    pub fn marker_html(&self) -> String {
        format!("<!-- {} -->", self.marker_token())
    }

    /// Does this tag list carry the fingerprint (or one of its aliases)?
    pub fn read_tag(&self, tags: &[String]) -> bool {
        let variants = self.tag_variants();
        tags.iter().any(|t| variants.iter().any(|v| v.eq_ignore_ascii_case(t)))
    }

    /// The tag list with the fingerprint tag added, or `None` if already present.
    /// Existing tags keep their order.
    pub fn write_tag(&self, tags: &[String]) -> Option<Vec<String>> {
        if self.read_tag(tags) {
            return None;
        }
        let mut out = tags.to_vec();
        out.push(self.tag());
        Some(out)
    }

    /// Compare the body's hidden marker with this fingerprint.
    pub fn read_marker(&self, body: &str) -> MarkerPresence {
        match hidden_marker(body) {
            None => MarkerPresence::Missing,
            Some(hex) if hex.eq_ignore_ascii_case(&self.hex[..MARKER_HEX_LEN]) => {
                MarkerPresence::Matches
            }
            Some(_) => MarkerPresence::Conflicts,
        }
    }

    /// The body with every existing marker replaced by this fingerprint's marker.
    pub fn write_marker(&self, body: &str) -> String {
        format!("{}\n{}", self.marker_html(), strip_markers(body))
    }
}

fn tag_for(hex: &str) -> String {
    format!("{TAG_PREFIX}{}", &hex[..TAG_HEX_LEN])
}

/// How a topic's hidden marker relates to a given fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerPresence {
    Missing,
    Matches,
    Conflicts,
}

/// The 16-hex marker value in a body, if any.
pub fn hidden_marker(body: &str) -> Option<String> {
    MARKER_RE
        .captures(body)
        .map(|c| c[1].to_ascii_lowercase())
}

/// Remove every hidden marker (and the whitespace after it) from a body.
pub fn strip_markers(body: &str) -> String {
    MARKER_RE.replace_all(body, "").into_owned()
}

/// `new_body` carrying the hidden marker of `old_body`, if it had one.
pub fn carry_marker(old_body: &str, new_body: &str) -> String {
    match hidden_marker(old_body) {
        Some(hex) => format!("<!-- {MARKER_PREFIX}{hex} -->\n{}", strip_markers(new_body)),
        None => new_body.to_string(),
    }
}
