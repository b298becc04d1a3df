/// The closed set of upstream wire formats the gateway can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    Gpt,
    OpenRouter,
    Azure,
    Gemini,
    VertexGemini,
    Claude,
    VertexClaude,
    Cloudflare,
    Cohere,
    Tts,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Gpt => "gpt",
            Engine::OpenRouter => "openrouter",
            Engine::Azure => "azure",
            Engine::Gemini => "gemini",
            Engine::VertexGemini => "vertex-gemini",
            Engine::Claude => "claude",
            Engine::VertexClaude => "vertex-claude",
            Engine::Cloudflare => "cloudflare",
            Engine::Cohere => "cohere",
            Engine::Tts => "tts",
        }
    }

    /// Pick the engine from a provider's base URL and the requested model.
    pub fn detect(base_url: &str, model: &str) -> Engine {
        if model.starts_with("tts") {
            return Engine::Tts;
        }
        if base_url.contains("aiplatform.googleapis.com") {
            if model.contains("claude") {
                return Engine::VertexClaude;
            }
            return Engine::VertexGemini;
        }
        if base_url.contains("generativelanguage") {
            return Engine::Gemini;
        }
        if base_url.contains("api.cloudflare.com") {
            return Engine::Cloudflare;
        }
        if base_url.contains("anthropic") {
            return Engine::Claude;
        }
        if base_url.contains("cohere") {
            return Engine::Cohere;
        }
        if base_url.contains("openrouter.ai") {
            return Engine::OpenRouter;
        }
        if base_url.contains("azure") {
            return Engine::Azure;
        }
        Engine::Gpt
    }

    /// Engines whose responses are opaque media rather than chat JSON.
    pub fn is_media(&self) -> bool {
        matches!(self, Engine::Tts)
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_by_host_and_model() {
        assert_eq!(Engine::detect("https://api.openai.com/v1", "gpt-4o"), Engine::Gpt);
        assert_eq!(
            Engine::detect("https://openrouter.ai/api/v1", "meta-llama/llama-3"),
            Engine::OpenRouter
        );
        assert_eq!(
            Engine::detect("https://foo.openai.azure.com/", "gpt-4o"),
            Engine::Azure
        );
        assert_eq!(
            Engine::detect(
                "https://generativelanguage.googleapis.com/v1beta",
                "gemini-1.5-pro"
            ),
            Engine::Gemini
        );
        assert_eq!(
            Engine::detect("https://aiplatform.googleapis.com/", "gemini-1.5-pro"),
            Engine::VertexGemini
        );
        assert_eq!(
            Engine::detect("https://aiplatform.googleapis.com/", "claude-3-5-sonnet"),
            Engine::VertexClaude
        );
        assert_eq!(
            Engine::detect("https://api.anthropic.com/v1/messages", "claude-3-opus"),
            Engine::Claude
        );
        assert_eq!(
            Engine::detect("https://api.cloudflare.com/", "@cf/meta/llama-3"),
            Engine::Cloudflare
        );
        assert_eq!(Engine::detect("https://api.cohere.com/v1", "command-r"), Engine::Cohere);
        assert_eq!(Engine::detect("https://api.openai.com/v1", "tts-1"), Engine::Tts);
    }
}
