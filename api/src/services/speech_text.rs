//! Markdown to narration text for podcast scripts and test prompts

use std::sync::LazyLock;

use regex::Regex;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("valid regex"),
        replacement,
    }
}

// Applied in order; later rules rely on earlier ones having run.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"(?m)^#{1,6}[ \t]+(.+)$", "${1}."),
        rule(r"\*\*(.+?)\*\*", "${1}"),
        rule(r"__(.+?)__", "${1}"),
        rule(r"\*(.+?)\*", "${1}"),
        rule(r"_(.+?)_", "${1}"),
        rule(r"(?m)^[ \t]*[-*+][ \t]+(.+)$", "${1}."),
        rule(r"(?m)^[ \t]*\d+\.[ \t]+(.+)$", "${1}."),
        rule(r"(?s)```.*?```", ""),
        rule(r"`([^`]+)`", "${1}"),
        rule(r"\[([^\]]+)\]\([^)]*\)", "${1}"),
        rule(r"<[^>]+>", ""),
        rule(r"\n{3,}", "\n\n"),
        rule(r" {2,}", " "),
    ]
});

/// Flatten markdown into plain sentences suitable for text-to-speech.
pub fn markdown_to_speech(markdown: &str) -> String {
    let text = RULES.iter().fold(markdown.to_string(), |text, rule| {
        rule.pattern.replace_all(&text, rule.replacement).into_owned()
    });
    text.trim().to_string()
}
