use crate::pool::CredentialPool;

/// Round-robin pools over the Vertex AI regions each model family is served
/// from. Consumed exactly like a credential pool: one region per request.
#[derive(Debug)]
pub struct VertexRegions {
    pub claude_35_sonnet: CredentialPool,
    pub claude_3_sonnet: CredentialPool,
    pub claude_3_opus: CredentialPool,
    pub claude_3_haiku: CredentialPool,
    pub gemini_1: CredentialPool,
    pub gemini_2: CredentialPool,
}

impl VertexRegions {
    pub fn new() -> Self {
        Self {
            claude_35_sonnet: regions(&["us-east5", "europe-west1"]),
            claude_3_sonnet: regions(&["us-east5", "us-central1", "asia-southeast1"]),
            claude_3_opus: regions(&["us-east5"]),
            claude_3_haiku: regions(&[
                "us-east5",
                "us-central1",
                "europe-west1",
                "europe-west4",
            ]),
            gemini_1: regions(&[
                "us-central1",
                "us-east4",
                "us-west1",
                "us-west4",
                "europe-west1",
                "europe-west2",
            ]),
            gemini_2: regions(&["us-central1"]),
        }
    }

    /// The region pool serving `model`.
    pub fn for_model(&self, model: &str) -> &CredentialPool {
        if model.contains("claude-3-5-sonnet") {
            &self.claude_35_sonnet
        } else if model.contains("claude-3-opus") {
            &self.claude_3_opus
        } else if model.contains("claude-3-haiku") {
            &self.claude_3_haiku
        } else if model.contains("claude") {
            &self.claude_3_sonnet
        } else if model.contains("gemini-2") {
            &self.gemini_2
        } else {
            &self.gemini_1
        }
    }
}

impl Default for VertexRegions {
    fn default() -> Self {
        Self::new()
    }
}

fn regions(names: &[&str]) -> CredentialPool {
    CredentialPool::unlimited(names.iter().map(|name| name.to_string()).collect())
}
