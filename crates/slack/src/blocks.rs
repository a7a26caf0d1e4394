use serde::Serialize;

use henhouse_core::domain::chicken::Chicken;
use henhouse_core::domain::user::SlackUserId;
use henhouse_core::DmCommand;

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
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
}

/// A Block Kit message plus the plain-text fallback Slack shows in notifications.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
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

pub fn help_message() -> MessageTemplate {
    let commands = DmCommand::ALL
        .iter()
        .map(|command| format!("• `{}`: {}", command.token(), command.description()))
        .collect::<Vec<_>>()
        .join("\n");

    MessageBuilder::new("Henhouse command help")
        .section("henhouse.help.summary.v1", |section| {
            section.mrkdwn(format!("*Available commands*\n{commands}"));
        })
        .context("henhouse.help.rewards.v1", |context| {
            context.mrkdwn("Give eggs in any channel: `@someone :egg: :egg:`");
        })
        .build()
}

pub fn rename_prompt_message(chicken: &Chicken, remaining: usize) -> MessageTemplate {
    let current = chicken.display_name();
    MessageBuilder::new(format!("What should {current} be called?"))
        .section("henhouse.rename.prompt.v1", |section| {
            section.mrkdwn(format!("What would you like to name *{current}*? Reply with a name."));
        })
        .context("henhouse.rename.remaining.v1", |context| {
            context.plain(format!("{remaining} chicken(s) left to name"));
        })
        .build()
}

pub fn rename_complete_message(name: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Your chicken is now called {name}"))
        .section("henhouse.rename.done.v1", |section| {
            section.mrkdwn(format!(":hatching_chick: Your chicken is now called *{name}*."));
        })
        .build()
}

pub fn chickens_message(chickens: &[Chicken]) -> MessageTemplate {
    if chickens.is_empty() {
        return MessageBuilder::new("You have no chickens yet")
            .section("henhouse.chickens.empty.v1", |section| {
                section.plain("You have no chickens yet.");
            })
            .build();
    }

    let lines = chickens
        .iter()
        .map(|chicken| {
            let status = if chicken.laid_today { "laid today" } else { "ready to lay" };
            format!("• *{}* ({status})", chicken.display_name())
        })
        .collect::<Vec<_>>()
        .join("\n");

    MessageBuilder::new(format!("You have {} chicken(s)", chickens.len()))
        .section("henhouse.chickens.list.v1", |section| {
            section.mrkdwn(format!("*Your chickens*\n{lines}"));
        })
        .build()
}

pub fn eggs_message(received: u64, available_today: u32) -> MessageTemplate {
    MessageBuilder::new(format!("You have received {received} egg(s)"))
        .section("henhouse.eggs.received.v1", |section| {
            section.mrkdwn(format!(":egg: You have received *{received}* egg(s)."));
        })
        .context("henhouse.eggs.available.v1", |context| {
            context.plain(format!("You can give {available_today} more egg(s) today."));
        })
        .build()
}

pub fn eggs_received_message(giver: &SlackUserId, count: u32) -> MessageTemplate {
    MessageBuilder::new(format!("You received {count} egg(s)"))
        .section("henhouse.eggs.gift.v1", |section| {
            section.mrkdwn(format!(":egg: {} gave you {count} egg(s)!", giver.mention()));
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("henhouse.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("henhouse.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use henhouse_core::domain::chicken::Chicken;
    use henhouse_core::domain::user::{SlackUserId, WorkspaceId};

    use super::{
        chickens_message, eggs_message, eggs_received_message, error_message, help_message,
        rename_prompt_message, Block, MessageBuilder, TextObject,
    };

    fn chicken(name: Option<&str>, laid_today: bool) -> Chicken {
        let mut chicken =
            Chicken::hatch(WorkspaceId("W1".to_owned()), SlackUserId("U1".to_owned()), Utc::now());
        chicken.name = name.map(str::to_owned);
        chicken.laid_today = laid_today;
        chicken
    }

    #[test]
    fn message_builder_creates_typed_block_structure() {
        let message = MessageBuilder::new("fallback")
            .section("s1", |section| {
                section.mrkdwn("*hello*");
            })
            .context("c1", |context| {
                context.plain("footnote");
            })
            .build();

        assert_eq!(message.fallback_text, "fallback");
        assert_eq!(
            message.blocks,
            vec![
                Block::Section { block_id: "s1".to_owned(), text: TextObject::mrkdwn("*hello*") },
                Block::Context {
                    block_id: "c1".to_owned(),
                    elements: vec![TextObject::plain("footnote")],
                },
            ]
        );
    }

    #[test]
    fn blocks_serialize_with_slack_type_tags() {
        let message = error_message("boom", "env-1");
        let json = serde_json::to_value(&message).expect("serialize");

        assert_eq!(json["blocks"][0]["type"], "section");
        assert_eq!(json["blocks"][0]["text"]["type"], "mrkdwn");
        assert_eq!(json["blocks"][1]["elements"][0]["text"], "Correlation ID: env-1");
    }

    #[test]
    fn help_lists_every_command() {
        let message = help_message();
        let Block::Section { text: TextObject::Mrkdwn { text }, .. } = &message.blocks[0] else {
            panic!("expected mrkdwn section");
        };

        for token in ["`help`", "`rename`", "`chickens`", "`eggs`"] {
            assert!(text.contains(token), "missing {token} in {text}");
        }
    }

    #[test]
    fn rename_prompt_names_unnamed_chickens_generically() {
        let message = rename_prompt_message(&chicken(None, false), 3);
        assert!(message.fallback_text.contains("an unnamed chicken"));
    }

    #[test]
    fn chickens_message_reports_laying_state() {
        let message = chickens_message(&[chicken(Some("Henrietta"), true), chicken(None, false)]);
        let Block::Section { text: TextObject::Mrkdwn { text }, .. } = &message.blocks[0] else {
            panic!("expected mrkdwn section");
        };

        assert!(text.contains("*Henrietta* (laid today)"));
        assert!(text.contains("*an unnamed chicken* (ready to lay)"));
    }

    #[test]
    fn eggs_message_carries_balance_and_allowance() {
        let message = eggs_message(7, 2);
        assert_eq!(message.fallback_text, "You have received 7 egg(s)");
        assert!(matches!(
            &message.blocks[1],
            Block::Context { elements, .. } if elements == &vec![TextObject::plain("You can give 2 more egg(s) today.")]
        ));
    }

    #[test]
    fn gift_message_mentions_the_giver() {
        let message = eggs_received_message(&SlackUserId("U9".to_owned()), 2);
        assert_eq!(
            message.blocks[0],
            Block::Section {
                block_id: "henhouse.eggs.gift.v1".to_owned(),
                text: TextObject::mrkdwn(":egg: <@U9> gave you 2 egg(s)!"),
            }
        );
    }
}
