use globset::{Glob, GlobSet, GlobSetBuilder};

/// Set of namespace glob patterns (`kube-system`, `kube-*`) whose requests are
/// admitted without mutation.
#[derive(Debug, Clone)]
pub struct NamespaceFilter {
    patterns: Vec<String>,
    set: GlobSet,
}

impl Default for NamespaceFilter {
    fn default() -> Self {
        NamespaceFilter {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }
}

impl NamespaceFilter {
    pub fn new<I, S>(patterns: I) -> Result<Self, globset::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            builder.add(Glob::new(pattern)?);
        }
        Ok(NamespaceFilter {
            set: builder.build()?,
            patterns,
        })
    }

    /// Cluster-scoped requests carry no namespace and are never excluded.
    pub fn is_excluded(&self, namespace: Option<&str>) -> bool {
        match namespace {
            Some(ns) if !ns.is_empty() => self.set.is_match(ns),
            _ => false,
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
