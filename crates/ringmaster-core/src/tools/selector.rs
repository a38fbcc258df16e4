use super::traits::ToolSpec;

/// Narrows the tool set offered to the model for one request.
///
/// The executor calls `select` with the user prompt and the full registry
/// listing, then truncates the result to the configured
/// `max_tools_per_request`.  Returning the input unchanged is a valid
/// implementation.
pub trait ToolSelector: Send + Sync {
    fn select(&self, prompt: &str, tools: Vec<ToolSpec>) -> Vec<ToolSpec>;
}

/// Selector that keeps only tools whose name or description shares a word
/// with the prompt; falls back to the full set when nothing matches.
pub struct KeywordToolSelector;

impl ToolSelector for KeywordToolSelector {
    fn select(&self, prompt: &str, tools: Vec<ToolSpec>) -> Vec<ToolSpec> {
        let words: Vec<String> = prompt
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() >= 3)
            .collect();
        if words.is_empty() {
            return tools;
        }

        let matched: Vec<ToolSpec> = tools
            .iter()
            .filter(|t| {
                let haystack = format!("{} {}", t.name, t.description).to_lowercase();
                words.iter().any(|w| haystack.contains(w.as_str()))
            })
            .cloned()
            .collect();

        if matched.is_empty() { tools } else { matched }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str, description: &str) -> ToolSpec {
        ToolSpec {
            name: name.into(),
            description: description.into(),
            schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn keyword_selector_narrows_on_match() {
        let tools = vec![
            spec("weather", "Look up the weather for a city"),
            spec("calculator", "Evaluate arithmetic expressions"),
        ];
        let selected = KeywordToolSelector.select("what's the weather in Seoul?", tools);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "weather");
    }

    #[test]
    fn keyword_selector_falls_back_to_full_set() {
        let tools = vec![spec("weather", "weather lookup")];
        let selected = KeywordToolSelector.select("zzz qqq", tools.clone());
        assert_eq!(selected.len(), tools.len());
    }
}
