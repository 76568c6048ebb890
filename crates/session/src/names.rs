use async_trait::async_trait;
use dashmap::DashMap;

/// Directory lookup capability for turning participant ids into display
/// names. Resolution is best-effort: `None` (or a slow directory) just
/// means log entries fall back to the raw id.
#[async_trait]
pub trait NameResolver: Send + Sync + 'static {
    async fn resolve(&self, participant_id: &str) -> Option<String>;
}

/// Resolver that never resolves. Useful when no directory is attached.
pub struct NullResolver;

#[async_trait]
impl NameResolver for NullResolver {
    async fn resolve(&self, _participant_id: &str) -> Option<String> {
        None
    }
}

/// Read-mostly cache of resolved display names. Written from resolution
/// tasks, read synchronously on the transcription commit path.
#[derive(Default)]
pub struct NameCache {
    names: DashMap<String, String>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, participant_id: &str, display_name: String) {
        self.names.insert(participant_id.to_string(), display_name);
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.names.contains_key(participant_id)
    }

    /// Cached display name, or the raw id when unresolved.
    pub fn display_name(&self, participant_id: &str) -> String {
        self.names
            .get(participant_id)
            .map(|name| name.clone())
            .unwrap_or_else(|| participant_id.to_string())
    }
}
