//! Persona lookup seam used by the scheduler to resolve system prompts.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A named system-prompt profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub system_prompt: String,
}

/// Abstraction over persona storage.
#[async_trait]
pub trait PersonaStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<Persona>;

    /// The workspace-wide default persona, if one is configured.
    async fn get_default(&self) -> Option<Persona>;
}

/// Map-backed [`PersonaStore`] for embedding applications without their own
/// persona storage.
pub struct InMemoryPersonaStore {
    personas: RwLock<HashMap<String, Persona>>,
    default_id: RwLock<Option<String>>,
}

impl InMemoryPersonaStore {
    pub fn new() -> Self {
        Self {
            personas: RwLock::new(HashMap::new()),
            default_id: RwLock::new(None),
        }
    }

    /// Insert or replace a persona.
    pub fn upsert(&self, persona: Persona) {
        self.personas.write().insert(persona.id.clone(), persona);
    }

    /// Mark a persona as the default.  The id does not need to exist yet.
    pub fn set_default(&self, id: impl Into<String>) {
        *self.default_id.write() = Some(id.into());
    }
}

impl Default for InMemoryPersonaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersonaStore for InMemoryPersonaStore {
    async fn get(&self, id: &str) -> Option<Persona> {
        self.personas.read().get(id).cloned()
    }

    async fn get_default(&self) -> Option<Persona> {
        let id = self.default_id.read().clone()?;
        self.personas.read().get(&id).cloned()
    }
}
