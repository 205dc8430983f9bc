//! Search term synthesis for scenes that don't carry an explicit term.

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he",
    "her", "his", "in", "into", "is", "it", "its", "of", "on", "or", "our", "she", "that", "the",
    "their", "them", "then", "there", "they", "this", "to", "was", "we", "were", "what", "when",
    "which", "while", "who", "will", "with", "you", "your",
];

/// Adjectives rotated across retry rounds so a failed search does not simply
/// repeat itself. Indexed by scene plus a per-round stride, so neighbouring
/// scenes in the same round also diverge.
const VARIATIONS: &[&str] = &[
    "vibrant",
    "dramatic",
    "colorful",
    "dynamic",
    "cinematic",
    "stylized",
    "minimalist",
    "bold",
    "moody",
    "playful",
    "retro",
    "futuristic",
    "elegant",
    "abstract",
    "surreal",
];

const MAX_KEYWORDS: usize = 4;

/// Content words of a sentence, lowercased, stopwords removed, in order.
pub fn keywords(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
        .take(MAX_KEYWORDS)
        .collect()
}

/// Build a search term for one scene attempt: optional style prefix, a
/// rotating variation adjective, then the scene's content words. Falls back
/// to `topic` when the scene text yields no keywords.
pub fn synthesize(style: Option<&str>, scene_text: &str, topic: &str, variation_index: usize) -> String {
    let adjective = VARIATIONS[variation_index % VARIATIONS.len()];
    let kws = keywords(scene_text);
    let subject = if kws.is_empty() {
        topic.to_lowercase()
    } else {
        kws.join(" ")
    };

    let mut parts = Vec::with_capacity(3);
    if let Some(style) = style
        && !style.trim().is_empty()
    {
        parts.push(style.trim().to_lowercase());
    }
    parts.push(adjective.to_owned());
    parts.push(subject);
    parts.join(" ")
}

/// Progressively more generic terms for the secondary-provider fallback:
/// styled topic, bare topic keywords, "illustration {topic}", then the raw
/// topic.
pub fn fallback_terms(style: Option<&str>, topic: &str) -> Vec<String> {
    let topic_lower = topic.to_lowercase();
    let kws = keywords(topic);
    let kw_term = if kws.is_empty() {
        topic_lower.clone()
    } else {
        kws.join(" ")
    };

    let mut terms = Vec::with_capacity(4);
    if let Some(style) = style
        && !style.trim().is_empty()
    {
        terms.push(format!("{} {kw_term}", style.trim().to_lowercase()));
    }
    terms.push(kw_term);
    terms.push(format!("illustration {topic_lower}"));
    terms.push(topic_lower);
    terms.dedup();
    terms
}
