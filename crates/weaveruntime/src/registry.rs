use std::collections::HashMap;
use std::sync::Arc;
use weavecore::Activity;

/// Registry of activities available to the substrate, keyed by name.
///
/// Activities are stateless singletons, registered once and shared across
/// runs.
pub struct ActivityRegistry {
    activities: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self {
            activities: HashMap::new(),
        }
    }

    pub fn register(&mut self, activity: Arc<dyn Activity>) {
        let name = activity.name().to_string();
        tracing::info!("registering activity: {}", name);
        self.activities.insert(name, activity);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Activity>> {
        self.activities.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.activities.contains_key(name)
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.activities.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
