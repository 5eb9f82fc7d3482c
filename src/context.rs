use std::collections::HashMap;

/// Name given to the bottom frame of every context stack.
pub const DEFAULT_CONTEXT_NAME: &str = "Default";

/// A named scope that decides which commands are visible.
///
/// The context contains:
/// - `name`: what commands bind to with [`Command::context`](crate::Command::context).
/// - `prompt`: the prompt shown while this context is active.
/// - `data`: an attribute bag handlers can use to keep per-scope state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    name: String,
    /// The prompt for this frame only.
    pub prompt: String,
    /// Key-value store owned by this frame (e.g. the interface being configured).
    pub data: HashMap<String, String>,
    default: bool,
}

impl Context {
    /// Create a context; an empty or missing prompt falls back to the name.
    pub fn new(name: impl Into<String>, prompt: Option<&str>) -> Self {
        let name = name.into();
        let prompt = match prompt {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => name.clone(),
        };
        Self {
            name,
            prompt,
            data: HashMap::new(),
            default: false,
        }
    }

    /// The permanent bottom frame of a context stack.
    pub fn default_context(prompt: Option<&str>) -> Self {
        Self {
            default: true,
            ..Self::new(DEFAULT_CONTEXT_NAME, prompt)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default(&self) -> bool {
        self.default
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name == name
    }

    /// Get the value of an attribute.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Set or override an attribute.
    pub fn set(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.data.insert(key.into(), val.into());
    }
}
