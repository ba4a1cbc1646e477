use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use tally_core::domain::event::EventDefinition;
use tally_core::leaderboard::{LeaderboardEntry, Scope};

pub const CONSECUTIVE_NOTICE: &str = "You counted consecutively! That's not allowed.";
pub const NO_RUNNING_EVENTS: &str = "There aren't any counting events running right now.";
pub const REJECTION_REACTION: &str = "bangbang";

const MEDALS: [&str; 3] = [":first_place_medal:", ":second_place_medal:", ":third_place_medal:"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    /// Plain text message with no blocks.
    pub fn text(text: impl Into<String>) -> Self {
        Self { fallback_text: text.into(), blocks: Vec::new() }
    }

    /// Body of a slash command reply that only the invoking user sees.
    pub fn ephemeral_response(&self) -> SlashResponse<'_> {
        SlashResponse {
            response_type: ResponseType::Ephemeral,
            text: &self.fallback_text,
            blocks: &self.blocks,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Ephemeral,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlashResponse<'a> {
    pub response_type: ResponseType,
    pub text: &'a str,
    #[serde(skip_serializing_if = "no_blocks")]
    pub blocks: &'a [Block],
}

fn no_blocks(blocks: &&[Block]) -> bool {
    blocks.is_empty()
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

pub fn out_of_order_notice(expected: i64) -> String {
    format!("You counted incorrectly! The next valid number is supposed to be *{expected}*.")
}

/// `"October 2026"` for a monthly scope, the event name otherwise.
pub fn scope_title(scope: &Scope) -> String {
    match scope {
        Scope::Monthly { year, month } => format!("{} {year}", month_name(*month)),
        Scope::Event(name) => name.clone(),
    }
}

pub fn monthly_leaderboard_message(
    scope: &Scope,
    entries: &[LeaderboardEntry],
) -> MessageTemplate {
    let title = scope_title(scope);
    let mut builder = MessageBuilder::new(format!("Counting stats for {title}"))
        .section("tally.leaderboard.header.v1", |section| {
            section.mrkdwn(format!(":chart_with_upwards_trend: Counting stats for *{title}*:"));
        });

    for (rank, entry) in entries.iter().enumerate() {
        builder = builder.section(format!("tally.leaderboard.entry.{rank}"), |section| {
            section.mrkdwn(ranked_line(rank, entry, "this month"));
        });
    }

    builder.build()
}

pub fn event_leaderboard_message(
    running: &[(&EventDefinition, Vec<LeaderboardEntry>)],
) -> MessageTemplate {
    if running.is_empty() {
        return MessageBuilder::new(NO_RUNNING_EVENTS)
            .section("tally.events.none.v1", |section| {
                section.mrkdwn(NO_RUNNING_EVENTS);
            })
            .build();
    }

    let names = running.iter().map(|(event, _)| event.name.as_str()).collect::<Vec<_>>();
    let mut builder = MessageBuilder::new(format!("Counting stats for {}", names.join(", ")));

    for (event, entries) in running {
        let name = &event.name;
        builder = builder.section(format!("tally.events.{name}.header"), |section| {
            section.mrkdwn(format!(":calendar: Counting stats for event *{name}*:"));
        });
        for (rank, entry) in entries.iter().enumerate() {
            builder = builder.section(format!("tally.events.{name}.entry.{rank}"), |section| {
                section.mrkdwn(ranked_line(rank, entry, "so far"));
            });
        }
        builder = builder.context(format!("tally.events.{name}.ends"), |context| {
            context.mrkdwn(format!("Event will end at *{}*, your time", slack_date(event.end)));
        });
    }

    builder.build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("tally.error.summary.v1", |section| {
            section.mrkdwn(summary);
        })
        .context("tally.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn leader_announcement(scope: &Scope, leader: &LeaderboardEntry) -> String {
    format!(
        "Counting leader for *{}*: {} with *{}*",
        scope_title(scope),
        leader.user.mention(),
        leader.count
    )
}

pub fn help_message() -> MessageTemplate {
    MessageBuilder::new("Counting commands")
        .section("tally.help.summary.v1", |section| {
            section.mrkdwn(
                "*Available commands*\n• `/leaderboard` this month's counting stats\n• `/events` stats for running counting events",
            );
        })
        .build()
}

fn ranked_line(rank: usize, entry: &LeaderboardEntry, period: &str) -> String {
    let line = format!("{} has counted *{}* {period}", entry.user.mention(), entry.count);
    match MEDALS.get(rank) {
        Some(medal) => format!("{medal} {line}"),
        None => line,
    }
}

/// Slack date token rendered in the reader's own timezone.
fn slack_date(at: DateTime<Utc>) -> String {
    format!(
        "<!date^{}^{{time}} on {{date}}|{}>",
        at.timestamp(),
        at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        12 => "December",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use tally_core::domain::event::EventDefinition;
    use tally_core::domain::member::UserId;
    use tally_core::leaderboard::{LeaderboardEntry, Scope};

    use super::{
        error_message, event_leaderboard_message, leader_announcement,
        monthly_leaderboard_message, out_of_order_notice, Block, MessageBuilder, MessageTemplate,
        TextObject,
    };

    fn entry(user: &str, count: i64) -> LeaderboardEntry {
        LeaderboardEntry { user: UserId(user.to_owned()), count }
    }

    fn texts(message: &MessageTemplate) -> Vec<String> {
        message
            .blocks
            .iter()
            .flat_map(|block| match block {
                Block::Section { text, .. } => vec![text.text().to_owned()],
                Block::Context { elements, .. } => {
                    elements.iter().map(|element| element.text().to_owned()).collect()
                }
            })
            .collect()
    }

    #[test]
    fn message_builder_creates_typed_block_structure() {
        let message = MessageBuilder::new("fallback")
            .section("tally.summary.v1", |section| {
                section.mrkdwn("*Summary*");
            })
            .context("tally.summary.context.v1", |context| {
                context.plain("footnote");
            })
            .build();

        assert_eq!(message.blocks.len(), 2);
        assert!(matches!(
            &message.blocks[0],
            Block::Section {
                block_id,
                text: TextObject::Mrkdwn { .. }
            } if block_id == "tally.summary.v1"
        ));
        assert!(matches!(
            &message.blocks[1],
            Block::Context { elements, .. } if elements.len() == 1
        ));
    }

    #[test]
    fn monthly_leaderboard_awards_medals_to_top_three() {
        let scope = Scope::Monthly { year: 2026, month: 10 };
        let entries = [entry("U1", 9), entry("U2", 7), entry("U3", 5), entry("U4", 2)];

        let lines = texts(&monthly_leaderboard_message(&scope, &entries));

        assert_eq!(
            lines,
            vec![
                ":chart_with_upwards_trend: Counting stats for *October 2026*:",
                ":first_place_medal: <@U1> has counted *9* this month",
                ":second_place_medal: <@U2> has counted *7* this month",
                ":third_place_medal: <@U3> has counted *5* this month",
                "<@U4> has counted *2* this month",
            ]
        );
    }

    #[test]
    fn empty_monthly_leaderboard_renders_header_only() {
        let scope = Scope::Monthly { year: 2026, month: 1 };
        let message = monthly_leaderboard_message(&scope, &[]);

        assert_eq!(
            texts(&message),
            vec![":chart_with_upwards_trend: Counting stats for *January 2026*:"]
        );
    }

    #[test]
    fn events_message_without_running_events_says_so() {
        let lines = texts(&event_leaderboard_message(&[]));

        assert_eq!(lines, vec!["There aren't any counting events running right now."]);
    }

    #[test]
    fn events_message_renders_standings_and_end_time() {
        let event = EventDefinition {
            name: "fall-sprint".to_owned(),
            start: Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).single().expect("start"),
            end: Utc.with_ymd_and_hms(2026, 10, 31, 23, 0, 0).single().expect("end"),
        };
        let running = vec![(&event, vec![entry("U2", 4), entry("U1", 1)])];

        let lines = texts(&event_leaderboard_message(&running));

        assert_eq!(lines[0], ":calendar: Counting stats for event *fall-sprint*:");
        assert_eq!(lines[1], ":first_place_medal: <@U2> has counted *4* so far");
        assert_eq!(lines[2], ":second_place_medal: <@U1> has counted *1* so far");
        assert_eq!(
            lines[3],
            "Event will end at *<!date^1793487600^{time} on {date}|2026-10-31T23:00:00Z>*, your time"
        );
    }

    #[test]
    fn ephemeral_response_serializes_slack_shape() {
        let message = error_message("Something broke", "req-7");
        let body = serde_json::to_value(message.ephemeral_response()).expect("serialize");

        assert_eq!(body["response_type"], json!("ephemeral"));
        assert_eq!(body["text"], json!("Something broke"));
        assert_eq!(body["blocks"][0]["type"], json!("section"));
        assert_eq!(body["blocks"][0]["text"]["type"], json!("mrkdwn"));
        assert_eq!(body["blocks"][1]["elements"][0]["text"], json!("Correlation ID: req-7"));
    }

    #[test]
    fn text_only_response_omits_blocks() {
        let message = MessageTemplate::text("hello");
        let body = serde_json::to_value(message.ephemeral_response()).expect("serialize");

        assert_eq!(body, json!({ "response_type": "ephemeral", "text": "hello" }));
    }

    #[test]
    fn notices_and_announcement_use_game_wording() {
        assert_eq!(
            out_of_order_notice(4),
            "You counted incorrectly! The next valid number is supposed to be *4*."
        );
        assert_eq!(
            leader_announcement(&Scope::Monthly { year: 2026, month: 3 }, &entry("U9", 12)),
            "Counting leader for *March 2026*: <@U9> with *12*"
        );
    }
}
