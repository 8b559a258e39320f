//! Container image reference parsing.
//!
//! Splits `registry[:port]/path/name[:tag][@sha256:digest]` into repository,
//! image name and version. Malformed references never fail the scan; they
//! come back as [`ImageShape::Unparsed`] with empty fields.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Repository path, final name segment, optional tag, optional digest.
///
/// The first path segment may carry a registry port, later segments may not,
/// so the split between repository and name is always the last `/`.
static IMAGE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<repo>[0-9A-Za-z.\-]+(?::[0-9]+)?(?:/[0-9A-Za-z._\-]+)*)/(?P<name>[0-9A-Za-z._\-]+)(?::(?P<tag>[0-9A-Za-z._\-]+))?(?:@(?P<digest>sha256:[0-9a-fA-F]+))?$",
    )
    .expect("image reference pattern is valid")
});

/// Tag the platform assumes when a reference carries none.
pub const IMPLIED_TAG: &str = "latest";

/// How an image reference was recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageShape {
    /// `repo/name:tag`
    Tagged,
    /// `repo/name` with the implied `latest` tag.
    ImpliedLatest,
    /// `repo/name@sha256:...`, optionally with a tag as well.
    Digest,
    /// Anything else. Counted, but with empty fields.
    Unparsed,
}

/// Structured form of one image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub repository: String,
    pub name: String,
    pub version: String,
    pub shape: ImageShape,
}

impl ImageRef {
    fn unparsed() -> Self {
        Self {
            repository: String::new(),
            name: String::new(),
            version: String::new(),
            shape: ImageShape::Unparsed,
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.shape != ImageShape::Unparsed
    }
}

/// Parse an image reference string.
pub fn parse_image(reference: &str) -> ImageRef {
    let Some(caps) = IMAGE_REFERENCE.captures(reference.trim()) else {
        return ImageRef::unparsed();
    };

    let repository = caps["repo"].to_string();
    let name = caps["name"].to_string();
    let tag = caps.name("tag").map(|m| m.as_str());
    let digest = caps.name("digest").map(|m| m.as_str());

    let (version, shape) = match (tag, digest) {
        (_, Some(digest)) => (digest.to_string(), ImageShape::Digest),
        (Some(tag), None) => (tag.to_string(), ImageShape::Tagged),
        (None, None) => (IMPLIED_TAG.to_string(), ImageShape::ImpliedLatest),
    };

    ImageRef {
        repository,
        name,
        version,
        shape,
    }
}
