use std::collections::BTreeMap;

/// Registry table key used for images that carry no registry host.
pub const DEFAULT_REGISTRY_KEY: &str = "default";

/// What the first `/`-separated segment of an image reference denotes.
#[derive(Debug, PartialEq, Eq)]
pub enum Segment {
    /// Looks like a registry host, e.g. `quay.io` or `registry.example.com:5000`.
    Registry,
    /// Part of the repository path, e.g. `library` in `library/nginx`.
    Path,
}

/// Classifies the first segment of a multi-segment image reference.
///
/// A segment is taken to be a registry host when it contains a `.`.
/// Note that this treats `localhost:5000` as a path segment.
pub fn classify_first_segment(segment: &str) -> Segment {
    if segment.contains('.') {
        Segment::Registry
    } else {
        Segment::Path
    }
}

/// Rewrites the registry of `image` according to `registries`.
///
/// Returns `None` when no entry of the table applies, in which case the image
/// must be left untouched.
///
/// - `nginx:1.27` and `library/nginx` get the `default` registry prepended.
/// - `quay.io/org/app` has `quay.io` replaced by `registries["quay.io"]`.
pub fn resolve(image: &str, registries: &BTreeMap<String, String>) -> Option<String> {
    let mut segments: Vec<&str> = image.split('/').collect();

    if segments.len() > 1 && classify_first_segment(segments[0]) == Segment::Registry {
        let registry = registries.get(segments[0])?;
        segments[0] = registry.as_str();
    } else {
        // image name, optionally with a tag that may itself contain dots
        let registry = registries.get(DEFAULT_REGISTRY_KEY)?;
        segments.insert(0, registry.as_str());
    }

    Some(segments.join("/"))
}
