//! Slack interface for henhouse.
//!
//! - **Socket Mode** (`socket`) - envelope pump with reconnection; each envelope is
//!   handled before it is acknowledged
//! - **Events** (`events`) - Events API decoding and the message dispatcher that
//!   decides between egg giving, rename replies and DM commands
//! - **Commands** (`commands`) - DM command routing and the outbound notifier
//! - **Block Kit** (`blocks`) - reply templates
//!
//! ```text
//! Socket frame → SlackEnvelope → EventDispatcher → MessageHandler → MessageDispatcher
//!                                                                     ├─ PendingReplyService
//!                                                                     ├─ CommandRouter → DmCommandService
//!                                                                     └─ EggGivingService
//! ```

pub mod blocks;
pub mod commands;
pub mod events;
pub mod socket;
