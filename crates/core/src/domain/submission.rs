use serde::{Deserialize, Serialize};

use crate::domain::member::{ChannelId, UserId};

/// A channel message offered to the counting engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub channel_id: ChannelId,
    pub sender_id: UserId,
    pub text: String,
    /// Slack message timestamp (`ts`), stored verbatim on acceptance.
    pub timestamp: String,
    pub thread_ts: Option<String>,
}

impl Submission {
    pub fn is_threaded(&self) -> bool {
        self.thread_ts.as_deref().is_some_and(|ts| !ts.is_empty())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    OtherChannel,
    SystemSender,
    ThreadedReply,
    NoLeadingNumber,
}

impl IgnoreReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::OtherChannel => "other_channel",
            Self::SystemSender => "system_sender",
            Self::ThreadedReply => "threaded_reply",
            Self::NoLeadingNumber => "no_leading_number",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionOutcome {
    Ignored(IgnoreReason),
    RejectedConsecutive,
    RejectedOutOfOrder { expected: i64 },
    Accepted { number: i64, events: Vec<String> },
}

impl SubmissionOutcome {
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::RejectedConsecutive | Self::RejectedOutOfOrder { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored(_) => "ignored",
            Self::RejectedConsecutive => "rejected_consecutive",
            Self::RejectedOutOfOrder { .. } => "rejected_out_of_order",
            Self::Accepted { .. } => "accepted",
        }
    }
}

/// Extracts the run of ASCII digits at the very start of `text`.
///
/// Returns `None` when the text does not begin with a digit or the digits do
/// not fit in an `i64`.
pub fn leading_number(text: &str) -> Option<i64> {
    let end = text.bytes().take_while(u8::is_ascii_digit).count();
    if end == 0 {
        return None;
    }
    text[..end].parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::{leading_number, Submission};
    use crate::domain::member::{ChannelId, UserId};

    #[test]
    fn leading_number_reads_digits_at_start_only() {
        assert_eq!(leading_number("42 is my guess"), Some(42));
        assert_eq!(leading_number("7"), Some(7));
        assert_eq!(leading_number("0012abc"), Some(12));
        assert_eq!(leading_number("abc 42"), None);
        assert_eq!(leading_number(" 42"), None);
        assert_eq!(leading_number("-3"), None);
        assert_eq!(leading_number(""), None);
    }

    #[test]
    fn leading_number_treats_overflow_as_missing() {
        assert_eq!(leading_number("99999999999999999999999 big"), None);
        assert_eq!(leading_number("9223372036854775807"), Some(i64::MAX));
    }

    #[test]
    fn leading_number_ignores_non_ascii_digits() {
        assert_eq!(leading_number("٣ arabic three"), None);
    }

    #[test]
    fn empty_thread_ts_is_not_a_thread() {
        let mut submission = Submission {
            channel_id: ChannelId("C1".to_owned()),
            sender_id: UserId("U1".to_owned()),
            text: "1".to_owned(),
            timestamp: "1730000000.0001".to_owned(),
            thread_ts: Some(String::new()),
        };
        assert!(!submission.is_threaded());

        submission.thread_ts = Some("1730000000.0000".to_owned());
        assert!(submission.is_threaded());
    }
}
