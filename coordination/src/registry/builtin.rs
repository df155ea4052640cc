//! Built-in alias table.

use super::{ApiStyle, ModelDescriptor};

const ANTHROPIC_MESSAGES: &str = "https://api.anthropic.com/v1/messages";
const OPENAI_CHAT: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_MODELS: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const ANTHROPIC_KEY: &str = "ANTHROPIC_API_KEY";
const OPENAI_KEY: &str = "OPENAI_API_KEY";
const GEMINI_KEY: &str = "GEMINI_API_KEY";

pub(super) fn descriptors() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::remote(
            "claude-sonnet-4.5",
            ApiStyle::Anthropic,
            ANTHROPIC_MESSAGES,
            "claude-sonnet-4-5",
        )
        .with_aliases(["sonnet"])
        .with_api_key_env(ANTHROPIC_KEY)
        .with_notes("Balanced reviewer; strong on architecture and correctness"),
        ModelDescriptor::remote(
            "claude-opus-4.1",
            ApiStyle::Anthropic,
            ANTHROPIC_MESSAGES,
            "claude-opus-4-1",
        )
        .with_aliases(["opus"])
        .with_api_key_env(ANTHROPIC_KEY)
        .with_notes("Deep reasoning, slower and more expensive"),
        ModelDescriptor::remote(
            "claude-haiku-4.5",
            ApiStyle::Anthropic,
            ANTHROPIC_MESSAGES,
            "claude-haiku-4-5",
        )
        .with_aliases(["haiku"])
        .with_api_key_env(ANTHROPIC_KEY),
        ModelDescriptor::remote("gpt-5", ApiStyle::OpenAi, OPENAI_CHAT, "gpt-5")
            .with_aliases(["gpt"])
            .with_api_key_env(OPENAI_KEY),
        ModelDescriptor::remote(
            "gemini-2.5-pro",
            ApiStyle::Gemini,
            GEMINI_MODELS,
            "gemini-2.5-pro",
        )
        .with_aliases(["gemini", "gemini-pro"])
        .with_api_key_env(GEMINI_KEY)
        .with_notes("Large context window"),
        ModelDescriptor::remote(
            "gemini-2.5-flash",
            ApiStyle::Gemini,
            GEMINI_MODELS,
            "gemini-2.5-flash",
        )
        .with_aliases(["flash"])
        .with_api_key_env(GEMINI_KEY),
        ModelDescriptor::local("codex-cli", "codex", vec!["exec".into(), "-".into()])
            .with_aliases(["codex"])
            .with_notes("Codex CLI, prompt on stdin"),
        ModelDescriptor::local("claude-cli", "claude", vec!["--print".into()])
            .with_notes("Claude Code CLI in print mode"),
    ]
}
