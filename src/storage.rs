//! Resolution of stored asset paths to client-facing URLs.
//!
//! Visual paths in the store are logical object keys ("slides/deck-1/4.png" or
//! "bucket-name/slides/deck-1/4.png"). Clients fetch them through their own
//! asset origin, so the live protocol carries bucket-relative paths only.

/// Maps a logical stored path to the path sent over the live protocol.
pub trait ObjectStore: Send + Sync {
    fn resolve(&self, logical_path: &str) -> String;
}

/// Strips a leading bucket segment, leaving a bucket-relative key.
pub struct BucketRelative {
    bucket: String,
}

impl BucketRelative {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }
}

impl ObjectStore for BucketRelative {
    fn resolve(&self, logical_path: &str) -> String {
        match logical_path.split_once('/') {
            Some((first, rest)) if first == self.bucket => rest.to_string(),
            _ => logical_path.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_matching_bucket_prefix() {
        let store = BucketRelative::new("assets");
        assert_eq!(store.resolve("assets/slides/4.png"), "slides/4.png");
    }

    #[test]
    fn test_leaves_other_paths_alone() {
        let store = BucketRelative::new("assets");
        assert_eq!(store.resolve("slides/4.png"), "slides/4.png");
        assert_eq!(store.resolve("other/slides/4.png"), "other/slides/4.png");
        assert_eq!(store.resolve("plain.png"), "plain.png");
    }
}
