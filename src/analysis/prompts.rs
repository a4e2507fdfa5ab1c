const TRANSCRIPTION_TEMPLATE: &str = include_str!("prompts/transcription.md");
const ACTIVITY_CARDS_TEMPLATE: &str = include_str!("prompts/activity_cards.md");

/// Stage 1 prompt for a video that is `duration` (`MM:SS`) long.
pub fn transcription_prompt(duration: &str) -> String {
    TRANSCRIPTION_TEMPLATE.replace("{{DURATION}}", duration)
}

/// Stage 2 prompt. `previous_cards_json` is the JSON array of cards that
/// precede this batch on the timeline.
pub fn activity_cards_prompt(observations: &str, previous_cards_json: &str) -> String {
    ACTIVITY_CARDS_TEMPLATE
        .replace("{{PREVIOUS_CARDS}}", previous_cards_json)
        .replace("{{OBSERVATIONS}}", observations)
}
