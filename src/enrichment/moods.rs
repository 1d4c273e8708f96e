//! Mood tag vocabulary and filtering.

/// The fixed mood vocabulary tracks are tagged against.
pub const MOOD_VOCABULARY: &[&str] = &[
    "aggressive",
    "ambient",
    "angry",
    "atmospheric",
    "bittersweet",
    "brooding",
    "calm",
    "chill",
    "dark",
    "dramatic",
    "dreamy",
    "energetic",
    "epic",
    "ethereal",
    "euphoric",
    "funky",
    "gloomy",
    "groovy",
    "happy",
    "haunting",
    "hypnotic",
    "intense",
    "melancholic",
    "melancholy",
    "mellow",
    "moody",
    "nostalgic",
    "peaceful",
    "playful",
    "relaxing",
    "romantic",
    "sad",
    "sensual",
    "somber",
    "soothing",
    "triumphant",
    "upbeat",
    "uplifting",
    "wistful",
];

/// Filter raw service tags against the mood vocabulary.
///
/// A tag qualifies when it equals a vocabulary mood or contains one as a
/// substring ("dark ambient" yields both "dark" and "ambient"). The
/// canonical vocabulary term is what gets stored, deduplicated, capped at
/// `cap`.
pub fn filter_moods(tags: &[String], cap: usize) -> Vec<String> {
    let mut moods: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        for mood in MOOD_VOCABULARY {
            if moods.len() >= cap {
                return moods;
            }
            if (tag == *mood || tag.contains(mood)) && !moods.iter().any(|m| m == mood) {
                moods.push(mood.to_string());
            }
        }
        if moods.len() >= cap {
            break;
        }
    }
    moods
}
