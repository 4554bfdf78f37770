use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderFamily {
    OpenAi,
    Anthropic,
    Google,
    DeepSeek,
    Internal,
}

/// An operation a provider may or may not implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    Chat,
    ChatStream,
    Tools,
    Embed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub streaming: bool,
    pub tools: bool,
    pub embeddings: bool,
}

impl Capabilities {
    pub const CHAT: Capabilities = Capabilities {
        streaming: true,
        tools: true,
        embeddings: false,
    };

    pub const EMBEDDING: Capabilities = Capabilities {
        streaming: false,
        tools: false,
        embeddings: true,
    };

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            // embedding models are the only ones without a chat endpoint
            Capability::Chat => !self.embeddings,
            Capability::ChatStream => self.streaming,
            Capability::Tools => self.tools,
            Capability::Embed => self.embeddings,
        }
    }
}

/// Static metadata describing one model an adapter serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    pub display_name: String,
    pub provider: ProviderFamily,
    pub capabilities: Capabilities,
}

impl ModelSpec {
    pub fn new<I: Into<String>>(id: I, provider: ProviderFamily, capabilities: Capabilities) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            provider,
            capabilities,
        }
    }

    pub fn chat<I: Into<String>>(id: I, provider: ProviderFamily) -> Self {
        Self::new(id, provider, Capabilities::CHAT)
    }

    pub fn embedding<I: Into<String>>(id: I, provider: ProviderFamily) -> Self {
        Self::new(id, provider, Capabilities::EMBEDDING)
    }

    pub fn with_display_name<N: Into<String>>(mut self, name: N) -> Self {
        self.display_name = name.into();
        self
    }
}
