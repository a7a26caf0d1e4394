//! Reward extraction for channel messages.
//!
//! A message rewards its mentioned users when it contains at least one reward
//! marker (`:egg:`) and at least one user mention (`<@U123>` or `<@U123|name>`).
//! The marker count is global to the message and applies to every recipient.

use crate::domain::user::SlackUserId;

pub const DEFAULT_REWARD_MARKER: &str = "egg";

const MENTION_OPEN: &str = "<@";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewardTally {
    recipients: Vec<SlackUserId>,
    count: u32,
}

impl RewardTally {
    /// Recipients in order of first mention. Never empty.
    pub fn recipients(&self) -> &[SlackUserId] {
        &self.recipients
    }

    /// Number of markers in the message. Always at least one.
    pub fn count(&self) -> u32 {
        self.count
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewardExtractor {
    marker: String,
}

impl Default for RewardExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_REWARD_MARKER)
    }
}

impl RewardExtractor {
    /// `emoji_name` is the bare shortcode name; colons are added here.
    pub fn new(emoji_name: &str) -> Self {
        let name = emoji_name.trim().trim_matches(':');
        Self { marker: format!(":{name}:") }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn extract(&self, text: &str) -> Option<RewardTally> {
        let mut recipients: Vec<SlackUserId> = Vec::new();
        let mut count = 0_u32;
        let mut rest = text;

        while let Some(ch) = rest.chars().next() {
            if rest.starts_with(self.marker.as_str()) {
                count = count.saturating_add(1);
                rest = &rest[self.marker.len()..];
                continue;
            }

            if let Some((user_id, consumed)) = parse_mention(rest) {
                if !recipients.contains(&user_id) {
                    recipients.push(user_id);
                }
                rest = &rest[consumed..];
                continue;
            }

            rest = &rest[ch.len_utf8()..];
        }

        if count == 0 || recipients.is_empty() {
            return None;
        }

        Some(RewardTally { recipients, count })
    }
}

/// Scans `text` with the default `:egg:` marker.
pub fn extract_reward(text: &str) -> Option<RewardTally> {
    RewardExtractor::default().extract(text)
}

/// Parses a mention at the start of `input`, returning the user id and the
/// number of bytes consumed.
fn parse_mention(input: &str) -> Option<(SlackUserId, usize)> {
    let body_and_rest = input.strip_prefix(MENTION_OPEN)?;
    let close = body_and_rest.find('>')?;
    let body = &body_and_rest[..close];
    let user_id = body.split('|').next().unwrap_or_default();

    if user_id.is_empty() || !user_id.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return None;
    }

    Some((SlackUserId(user_id.to_owned()), MENTION_OPEN.len() + close + 1))
}

#[cfg(test)]
mod tests {
    use super::{extract_reward, RewardExtractor};
    use crate::domain::user::SlackUserId;

    fn ids(values: &[&str]) -> Vec<SlackUserId> {
        values.iter().map(|value| SlackUserId((*value).to_owned())).collect()
    }

    #[test]
    fn single_mention_with_two_markers() {
        let tally = extract_reward("<@U1234> good job! :egg: :egg:").expect("reward");

        assert_eq!(tally.recipients(), ids(&["U1234"]).as_slice());
        assert_eq!(tally.count(), 2);
    }

    #[test]
    fn several_mentions_share_the_global_count() {
        let tally = extract_reward("<@U1234> <@U2345> <@U8765> :egg: :egg:").expect("reward");

        assert_eq!(tally.recipients(), ids(&["U1234", "U2345", "U8765"]).as_slice());
        assert_eq!(tally.count(), 2);
    }

    #[test]
    fn repeated_mention_collapses_to_one_recipient() {
        let tally =
            extract_reward("<@U1234> <@U1234> I accidentally tagged you twice! :egg:").expect("reward");

        assert_eq!(tally.recipients(), ids(&["U1234"]).as_slice());
        assert_eq!(tally.count(), 1);
    }

    #[test]
    fn duplicates_keep_first_seen_order_and_markers_still_sum() {
        let tally = extract_reward(":egg: <@UB> <@UA> :egg: <@UB> :egg:").expect("reward");

        assert_eq!(tally.recipients(), ids(&["UB", "UA"]).as_slice());
        assert_eq!(tally.count(), 3);
    }

    #[test]
    fn mentions_without_marker_are_not_a_reward() {
        assert_eq!(extract_reward("<@U1234> have you been to spatula city?"), None);
    }

    #[test]
    fn markers_without_mentions_are_not_a_reward() {
        assert_eq!(extract_reward(":egg: :egg: :egg: breakfast time"), None);
    }

    #[test]
    fn adjacent_markers_are_counted_individually() {
        let tally = extract_reward("<@U1>:egg::egg::egg:").expect("reward");
        assert_eq!(tally.count(), 3);
    }

    #[test]
    fn labelled_mentions_use_the_user_id() {
        let tally = extract_reward("thanks <@U777|henny> :egg:").expect("reward");
        assert_eq!(tally.recipients(), ids(&["U777"]).as_slice());
    }

    #[test]
    fn channel_and_broadcast_references_are_not_mentions() {
        assert_eq!(extract_reward("<#C123|general> <!here> :egg:"), None);
    }

    #[test]
    fn malformed_mentions_are_skipped() {
        assert_eq!(extract_reward("<@> <@U1 :egg:"), None);
        let tally = extract_reward("<@> <@U9> :egg:").expect("reward");
        assert_eq!(tally.recipients(), ids(&["U9"]).as_slice());
    }

    #[test]
    fn similar_shortcodes_are_not_markers() {
        assert_eq!(extract_reward("<@U1> :eggplant: :fried_egg:"), None);
    }

    #[test]
    fn multibyte_text_is_scanned_safely() {
        let tally = extract_reward("🐔 merci <@U5> 🥚 :egg: ✨").expect("reward");
        assert_eq!(tally.count(), 1);
        assert_eq!(tally.recipients(), ids(&["U5"]).as_slice());
    }

    #[test]
    fn custom_marker_accepts_colon_wrapped_names() {
        let extractor = RewardExtractor::new(":taco:");
        assert_eq!(extractor.marker(), ":taco:");

        let tally = extractor.extract("<@U1> :taco: :egg:").expect("reward");
        assert_eq!(tally.count(), 1);
    }
}
