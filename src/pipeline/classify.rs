//! Chat/email classification via an as-of join against status changes
//!
//! Under [`ClassificationPolicy::PriorOnline`] a message is a chat when any
//! online status for its site exists at or before the message timestamp.
//! An offline transition in between does not matter. Only messages without
//! a classification are examined; existing verdicts are never revised.

use anyhow::{Context, Result};
use tracing::info;

use crate::config::ClassificationPolicy;
use crate::event::Message;
use crate::store::{Classification, EventStore};

/// Outcome of one classification pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifyReport {
    /// Messages that had no classification before this pass
    pub examined: u64,
    pub chats: u64,
    pub emails: u64,
}

/// Decide chat vs email for a single message
pub fn is_chat(store: &EventStore, message: &Message, policy: ClassificationPolicy) -> Result<bool> {
    let verdict = match policy {
        ClassificationPolicy::PriorOnline => store
            .latest_status_at_or_before(message.site_id, message.timestamp, true)?
            .is_some(),
        ClassificationPolicy::NearestStatus => store
            .latest_status_at_or_before(message.site_id, message.timestamp, false)?
            .map_or(false, |status| status.online),
    };
    Ok(verdict)
}

/// Classify every message that is not classified yet
pub fn classify(store: &EventStore, policy: ClassificationPolicy) -> Result<ClassifyReport> {
    info!(?policy, "tagging messages as chats or emails");

    let pending = store
        .unclassified_messages()
        .context("Failed to load unclassified messages")?;

    let mut report = ClassifyReport::default();
    let mut classifications = Vec::with_capacity(pending.len());

    for message in pending {
        let chat = is_chat(store, &message, policy).with_context(|| {
            format!("Status lookup failed for message {}", message.system_id)
        })?;

        report.examined += 1;
        if chat {
            report.chats += 1;
        } else {
            report.emails += 1;
        }

        classifications.push(Classification {
            message_system_id: message.system_id,
            message_timestamp: message.timestamp,
            site_id: message.site_id,
            is_chat: chat,
        });
    }

    store
        .insert_classifications(&classifications)
        .context("Failed to write classifications")?;

    info!(
        examined = report.examined,
        chats = report.chats,
        emails = report.emails,
        "classification finished"
    );
    Ok(report)
}
