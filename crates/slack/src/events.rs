use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use henhouse_core::domain::chicken::{Chicken, ChickenId};
use henhouse_core::domain::user::{SlackUserId, WorkspaceId};
use henhouse_core::{ApplicationError, DmCommand, InterfaceError, RewardExtractor, RewardTally};

use crate::commands::CommandRouter;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

impl SlackEnvelope {
    /// Decodes a Socket Mode frame. Frames other than `events_api` carry no
    /// message and become [`SlackEvent::Unsupported`].
    pub fn from_socket_json(frame: &Value) -> Result<Self, EventParseError> {
        let envelope_id = frame
            .get("envelope_id")
            .and_then(Value::as_str)
            .ok_or(EventParseError::MissingField("envelope_id"))?
            .to_owned();
        let frame_type = frame.get("type").and_then(Value::as_str).unwrap_or("unknown");

        let event = match (frame_type, frame.get("payload")) {
            ("events_api", Some(payload)) => SlackEvent::from_callback_json(payload)?,
            _ => SlackEvent::Unsupported { event_type: frame_type.to_owned() },
        };

        Ok(Self { envelope_id, event })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    /// Decodes an Events API `event_callback` body.
    pub fn from_callback_json(callback: &Value) -> Result<Self, EventParseError> {
        let raw = RawCallback::deserialize(callback)
            .map_err(|error| EventParseError::Malformed(error.to_string()))?;

        if raw.event.event_type != "message" {
            return Ok(Self::Unsupported { event_type: raw.event.event_type });
        }

        MessageEvent::from_raw(raw.team_id, raw.event).map(Self::Message)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    Unsupported,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventParseError {
    #[error("malformed event payload: {0}")]
    Malformed(String),
    #[error("event payload is missing `{0}`")]
    MissingField(&'static str),
    #[error("unknown channel type `{0}`")]
    UnknownChannelType(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConversationType {
    DirectMessage,
    Public,
    /// Private channels and multi-person DMs.
    Group,
}

impl ConversationType {
    pub fn from_channel_type(channel_type: &str) -> Option<Self> {
        match channel_type {
            "im" => Some(Self::DirectMessage),
            "channel" => Some(Self::Public),
            "group" | "mpim" => Some(Self::Group),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageSubtype {
    BotMessage,
    MessageChanged,
    MessageDeleted,
    Other(String),
}

impl MessageSubtype {
    fn parse(raw: &str) -> Self {
        match raw {
            "bot_message" => Self::BotMessage,
            "message_changed" => Self::MessageChanged,
            "message_deleted" => Self::MessageDeleted,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// One incoming chat message. `sender` is absent for bot and system messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub conversation_type: ConversationType,
    pub sender: Option<SlackUserId>,
    pub workspace_id: WorkspaceId,
    pub text: String,
    pub subtype: Option<MessageSubtype>,
    pub ts: String,
}

impl MessageEvent {
    /// Returns `None` for callbacks that are not message events.
    pub fn from_callback_json(callback: &Value) -> Result<Option<Self>, EventParseError> {
        match SlackEvent::from_callback_json(callback)? {
            SlackEvent::Message(event) => Ok(Some(event)),
            SlackEvent::Unsupported { .. } => Ok(None),
        }
    }

    fn from_raw(team_id: String, raw: RawEvent) -> Result<Self, EventParseError> {
        let channel_id = raw.channel.ok_or(EventParseError::MissingField("channel"))?;
        let channel_type = raw.channel_type.ok_or(EventParseError::MissingField("channel_type"))?;
        let conversation_type = ConversationType::from_channel_type(&channel_type)
            .ok_or(EventParseError::UnknownChannelType(channel_type))?;
        let ts = raw.ts.ok_or(EventParseError::MissingField("ts"))?;
        // App posts carry the bot's own user id alongside `bot_id`.
        let from_app = raw.bot_id.is_some();

        Ok(Self {
            channel_id,
            conversation_type,
            sender: raw.user.filter(|user| !user.is_empty() && !from_app).map(SlackUserId),
            workspace_id: WorkspaceId(team_id),
            text: raw.text.unwrap_or_default(),
            subtype: raw.subtype.as_deref().map(MessageSubtype::parse),
            ts,
        })
    }
}

#[derive(Deserialize)]
struct RawCallback {
    team_id: String,
    event: RawEvent,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    channel: Option<String>,
    channel_type: Option<String>,
    user: Option<String>,
    bot_id: Option<String>,
    text: Option<String>,
    subtype: Option<String>,
    ts: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed(MessageOutcome),
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

impl DispatchError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        match self {
            Self::Handler(EventHandlerError::Application(error)) => {
                error.into_interface(correlation_id)
            }
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Event dispatcher with the message handler registered.
pub fn henhouse_dispatcher(messages: MessageDispatcher) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(messages));
    dispatcher
}

/// Outcome of applying a reply to a chicken awaiting a rename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyOutcome {
    Renamed { chicken_id: ChickenId, name: String },
    /// The chicken was no longer awaiting a rename; nothing changed.
    Stale,
}

/// Tracks chickens waiting for their owner to reply with a new name.
#[async_trait]
pub trait PendingReplyService: Send + Sync {
    /// Side-effect free lookup of the chicken awaiting a reply from `user`.
    async fn find_pending(
        &self,
        user: &SlackUserId,
        workspace: &WorkspaceId,
    ) -> Result<Option<Chicken>, ApplicationError>;

    async fn resolve_pending(
        &self,
        chicken: &Chicken,
        reply: &str,
    ) -> Result<ReplyOutcome, ApplicationError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GiveOutcome {
    Credited { recipients: Vec<SlackUserId>, eggs_per_recipient: u32, remaining_today: u32 },
    /// Every recipient was filtered out, e.g. a sender rewarding only themselves.
    NoEligibleRecipients,
}

#[async_trait]
pub trait EggGivingService: Send + Sync {
    /// Credits `count` eggs to each recipient. All or nothing.
    async fn give_eggs(
        &self,
        workspace: &WorkspaceId,
        sender: &SlackUserId,
        count: u32,
        recipients: &[SlackUserId],
    ) -> Result<GiveOutcome, ApplicationError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No human sender: bot posts and system messages.
    BotOriginated,
}

/// Which behavior a message selects, decided from the message alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageRoute {
    Ignore(IgnoreReason),
    /// Either a reply to a pending prompt or a command, depending on held state.
    DirectMessage { sender: SlackUserId },
    Reward { sender: SlackUserId, tally: RewardTally },
    NoReward,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    Ignored(IgnoreReason),
    CommandHandled(DmCommand),
    ReplyResolved(ReplyOutcome),
    EggsGiven(GiveOutcome),
    NoReward,
}

/// Routes each message to at most one collaborator.
///
/// | Condition                               | Action                       |
/// |-----------------------------------------|------------------------------|
/// | no sender                               | ignore                       |
/// | direct message, chicken awaiting rename | `resolve_pending`            |
/// | direct message, nothing pending         | `CommandRouter::route`       |
/// | elsewhere, reward shape present         | `give_eggs`                  |
/// | elsewhere, no reward shape              | ignore                       |
///
/// Collaborator errors propagate unchanged.
pub struct MessageDispatcher {
    extractor: RewardExtractor,
    pending: Arc<dyn PendingReplyService>,
    commands: CommandRouter,
    eggs: Arc<dyn EggGivingService>,
}

impl MessageDispatcher {
    pub fn new(
        extractor: RewardExtractor,
        pending: Arc<dyn PendingReplyService>,
        commands: CommandRouter,
        eggs: Arc<dyn EggGivingService>,
    ) -> Self {
        Self { extractor, pending, commands, eggs }
    }

    pub fn classify(&self, event: &MessageEvent) -> MessageRoute {
        let Some(sender) = &event.sender else {
            return MessageRoute::Ignore(IgnoreReason::BotOriginated);
        };

        if event.conversation_type == ConversationType::DirectMessage {
            return MessageRoute::DirectMessage { sender: sender.clone() };
        }

        match self.extractor.extract(&event.text) {
            Some(tally) => MessageRoute::Reward { sender: sender.clone(), tally },
            None => MessageRoute::NoReward,
        }
    }

    pub async fn handle_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<MessageOutcome, ApplicationError> {
        let workspace = &event.workspace_id;

        match self.classify(event) {
            MessageRoute::Ignore(reason) => {
                debug!(
                    event_name = "slack.message.ignored",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %event.channel_id,
                    subtype = ?event.subtype,
                    reason = ?reason,
                    "ignoring message without a human sender"
                );
                Ok(MessageOutcome::Ignored(reason))
            }
            MessageRoute::DirectMessage { sender } => {
                if let Some(chicken) = self.pending.find_pending(&sender, workspace).await? {
                    info!(
                        event_name = "slack.message.pending_reply",
                        correlation_id = %ctx.correlation_id,
                        user_id = %sender,
                        chicken_id = %chicken.id.0,
                        "resolving pending rename"
                    );
                    let outcome = self.pending.resolve_pending(&chicken, &event.text).await?;
                    return Ok(MessageOutcome::ReplyResolved(outcome));
                }

                let command = self.commands.route(&sender, workspace, &event.text).await?;
                info!(
                    event_name = "slack.message.command",
                    correlation_id = %ctx.correlation_id,
                    user_id = %sender,
                    command = %command,
                    "handled direct message command"
                );
                Ok(MessageOutcome::CommandHandled(command))
            }
            MessageRoute::Reward { sender, tally } => {
                info!(
                    event_name = "slack.message.reward",
                    correlation_id = %ctx.correlation_id,
                    user_id = %sender,
                    recipients = tally.recipients().len(),
                    count = tally.count(),
                    "crediting eggs"
                );
                let outcome = self
                    .eggs
                    .give_eggs(workspace, &sender, tally.count(), tally.recipients())
                    .await?;
                Ok(MessageOutcome::EggsGiven(outcome))
            }
            MessageRoute::NoReward => Ok(MessageOutcome::NoReward),
        }
    }
}

pub struct MessageHandler {
    dispatcher: MessageDispatcher,
}

impl MessageHandler {
    pub fn new(dispatcher: MessageDispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl EventHandler for MessageHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let outcome = self.dispatcher.handle_message(event, ctx).await?;
        Ok(HandlerResult::Processed(outcome))
    }
}
