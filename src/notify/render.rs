//! Notification text rendering.
//!
//! Both notification families (a share was granted, a document changed
//! state) render once into a `RenderedNotification`; every sink delivers
//! that same value.

use serde::Serialize;

use crate::permission::{ItemType, Permission};

const REJECTED_WITH_REASON: &str = "rejected_with_reason:";

/// What happened to an item
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeType {
    SubmittedForReview,
    Approved,
    Rejected { reason: Option<String> },
    Renamed,
    Moved,
    /// Any other label, rendered verbatim
    Other(String),
}

impl ChangeType {
    /// Parse a stored change label.
    ///
    /// `rejected_with_reason:<text>` carries the reason; empty text means
    /// no reason.
    pub fn parse(label: &str) -> Self {
        if let Some(reason) = label.strip_prefix(REJECTED_WITH_REASON) {
            let reason = reason.trim();
            return ChangeType::Rejected {
                reason: (!reason.is_empty()).then(|| reason.to_string()),
            };
        }
        match label {
            "submitted for QA review" => ChangeType::SubmittedForReview,
            "approved" => ChangeType::Approved,
            "rejected" => ChangeType::Rejected { reason: None },
            "renamed" => ChangeType::Renamed,
            "moved" => ChangeType::Moved,
            other => ChangeType::Other(other.to_string()),
        }
    }

    pub fn rejected(reason: Option<&str>) -> Self {
        ChangeType::Rejected {
            reason: reason
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
        }
    }

    /// Verb used in messages
    pub fn label(&self) -> &str {
        match self {
            ChangeType::SubmittedForReview => "submitted for QA review",
            ChangeType::Approved => "approved",
            ChangeType::Rejected { .. } => "rejected",
            ChangeType::Renamed => "renamed",
            ChangeType::Moved => "moved",
            ChangeType::Other(label) => label,
        }
    }

    /// Stored form; inverse of `parse`
    pub fn encode(&self) -> String {
        match self {
            ChangeType::Rejected { reason: Some(reason) } => format!("{}{}", REJECTED_WITH_REASON, reason),
            other => other.label().to_string(),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ChangeType::Rejected { reason } => reason.as_deref(),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Share,
    DocumentChange,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Share => "share",
            NotificationKind::DocumentChange => "document_change",
        }
    }
}

/// One rendered notice, independent of the channel that delivers it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenderedNotification {
    pub kind: NotificationKind,
    /// Mail subject line
    pub subject: String,
    pub message: String,
    pub item_type: ItemType,
    pub item_id: i64,
    pub item_name: String,
    pub permission: Option<Permission>,
    /// Encoded change label
    pub change_type: Option<String>,
    pub actor_name: String,
}

pub fn render_share(
    actor_name: &str,
    item_type: ItemType,
    item_id: i64,
    item_name: &str,
    permission: Permission,
) -> RenderedNotification {
    RenderedNotification {
        kind: NotificationKind::Share,
        subject: format!("{} shared a {} with you", actor_name, item_type),
        message: format!(
            "{} shared the {} \"{}\" with you as {}.",
            actor_name,
            item_type,
            item_name,
            permission.label()
        ),
        item_type,
        item_id,
        item_name: item_name.to_string(),
        permission: Some(permission),
        change_type: None,
        actor_name: actor_name.to_string(),
    }
}

pub fn render_change(
    actor_name: &str,
    item_type: ItemType,
    item_id: i64,
    item_name: &str,
    change: &ChangeType,
) -> RenderedNotification {
    let (subject, message) = match change {
        ChangeType::SubmittedForReview => (
            format!("\"{}\" is waiting for QA review", item_name),
            format!(
                "{} submitted the {} \"{}\" for QA review.",
                actor_name, item_type, item_name
            ),
        ),
        other => {
            let mut message = format!(
                "{} {} your {} \"{}\".",
                actor_name,
                other.label(),
                item_type,
                item_name
            );
            if let Some(reason) = other.reason() {
                message.push_str(&format!(" Reason: {}", reason));
            }
            (format!("Your {} \"{}\" was {}", item_type, item_name, other.label()), message)
        }
    };

    RenderedNotification {
        kind: NotificationKind::DocumentChange,
        subject,
        message,
        item_type,
        item_id,
        item_name: item_name.to_string(),
        permission: None,
        change_type: Some(change.encode()),
        actor_name: actor_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_labels() {
        assert_eq!(ChangeType::parse("submitted for QA review"), ChangeType::SubmittedForReview);
        assert_eq!(ChangeType::parse("approved"), ChangeType::Approved);
        assert_eq!(ChangeType::parse("rejected"), ChangeType::Rejected { reason: None });
        assert_eq!(
            ChangeType::parse("rejected_with_reason:out of budget"),
            ChangeType::Rejected { reason: Some("out of budget".to_string()) }
        );
        assert_eq!(ChangeType::parse("rejected_with_reason:"), ChangeType::Rejected { reason: None });
        assert_eq!(ChangeType::parse("archived"), ChangeType::Other("archived".to_string()));
    }

    #[test]
    fn encode_is_inverse_of_parse() {
        for label in ["approved", "renamed", "moved", "rejected", "rejected_with_reason:late", "archived"] {
            assert_eq!(ChangeType::parse(label).encode(), label);
        }
    }

    #[test]
    fn rejection_with_reason_renders_reason() {
        let change = ChangeType::parse("rejected_with_reason:out of budget");
        let n = render_change("Maria", ItemType::Document, 7, "Budget.xlsx", &change);
        assert_eq!(
            n.message,
            "Maria rejected your document \"Budget.xlsx\". Reason: out of budget"
        );
        assert!(n.message.ends_with("Reason: out of budget"));
        assert_eq!(n.change_type.as_deref(), Some("rejected_with_reason:out of budget"));
    }

    #[test]
    fn approved_has_no_reason_suffix() {
        let n = render_change("Maria", ItemType::Document, 7, "Budget.xlsx", &ChangeType::Approved);
        assert_eq!(n.message, "Maria approved your document \"Budget.xlsx\".");
        assert!(!n.message.contains("Reason"));
    }

    #[test]
    fn submitted_template() {
        let n = render_change(
            "Ana",
            ItemType::Document,
            7,
            "Budget.xlsx",
            &ChangeType::SubmittedForReview,
        );
        assert_eq!(n.message, "Ana submitted the document \"Budget.xlsx\" for QA review.");
        assert_eq!(n.kind, NotificationKind::DocumentChange);
    }

    #[test]
    fn share_template() {
        let n = render_share("Ana", ItemType::Folder, 3, "Reports", Permission::Contributor);
        assert_eq!(n.message, "Ana shared the folder \"Reports\" with you as Contributor.");
        assert_eq!(n.permission, Some(Permission::Contributor));
        assert_eq!(n.kind, NotificationKind::Share);
    }
}
