//! Version lifecycle tags.
//!
//! A version name carries at most one trailing tag: `.pending` while its
//! bytes are still arriving from a peer, `.scratch` while it is a local
//! mutable workspace. An untagged name is a final, immutable version. A
//! fresh scratch with no source version is named exactly `.scratch`.

/// Suffix marking a version still being received from a peer.
pub const PENDING_SUFFIX: &str = ".pending";

/// Suffix marking a locally mutable scratch.
pub const SCRATCH_SUFFIX: &str = ".scratch";

pub fn pending_name(version: &str) -> String {
    format!("{version}{PENDING_SUFFIX}")
}

pub fn scratch_name(version: &str) -> String {
    format!("{version}{SCRATCH_SUFFIX}")
}

pub fn is_pending(version: &str) -> bool {
    version.ends_with(PENDING_SUFFIX)
}

pub fn is_scratch(version: &str) -> bool {
    version.ends_with(SCRATCH_SUFFIX)
}

pub fn is_final(version: &str) -> bool {
    !is_pending(version) && !is_scratch(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_classify_versions() {
        assert!(is_final("deadbeef"));
        assert!(!is_final("deadbeef.pending"));
        assert!(!is_final("deadbeef.scratch"));
        assert!(is_pending("deadbeef.pending"));
        assert!(is_scratch("deadbeef.scratch"));
        // A fresh scratch is all suffix.
        assert!(is_scratch(".scratch"));
        assert!(!is_final(".scratch"));
    }

    #[test]
    fn tagged_names_append_the_suffix() {
        assert_eq!(pending_name("v1"), "v1.pending");
        assert_eq!(scratch_name("v1"), "v1.scratch");
    }
}
