// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request triage entities: requests, their status machine, categories and members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CourierError;
use crate::types::{Metadata, Platform};

/// Lifecycle of a [`Request`].
///
/// Statuses only move forward through the declaration order. `Failed` can be
/// entered from anywhere and is terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Identifying,
    Categorizing,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl RequestStatus {
    fn rank(self) -> u8 {
        match self {
            RequestStatus::Pending => 0,
            RequestStatus::Identifying => 1,
            RequestStatus::Categorizing => 2,
            RequestStatus::Queued => 3,
            RequestStatus::Processing => 4,
            RequestStatus::Completed => 5,
            RequestStatus::Failed => 6,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }
}

/// First time each status was entered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusStamps {
    pub pending_at: Option<DateTime<Utc>>,
    pub identifying_at: Option<DateTime<Utc>>,
    pub categorizing_at: Option<DateTime<Utc>>,
    pub queued_at: Option<DateTime<Utc>>,
    pub processing_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl StatusStamps {
    fn slot(&mut self, status: RequestStatus) -> &mut Option<DateTime<Utc>> {
        match status {
            RequestStatus::Pending => &mut self.pending_at,
            RequestStatus::Identifying => &mut self.identifying_at,
            RequestStatus::Categorizing => &mut self.categorizing_at,
            RequestStatus::Queued => &mut self.queued_at,
            RequestStatus::Processing => &mut self.processing_at,
            RequestStatus::Completed => &mut self.completed_at,
            RequestStatus::Failed => &mut self.failed_at,
        }
    }

    pub fn get(&self, status: RequestStatus) -> Option<DateTime<Utc>> {
        match status {
            RequestStatus::Pending => self.pending_at,
            RequestStatus::Identifying => self.identifying_at,
            RequestStatus::Categorizing => self.categorizing_at,
            RequestStatus::Queued => self.queued_at,
            RequestStatus::Processing => self.processing_at,
            RequestStatus::Completed => self.completed_at,
            RequestStatus::Failed => self.failed_at,
        }
    }
}

/// Workflow object opened for each incoming message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub platform: Platform,
    pub message_id: String,
    pub account_id: String,
    pub channel_id: String,
    pub member_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub category_id: Option<String>,
    pub status: RequestStatus,
    pub metadata: Metadata,
    pub error: Option<String>,
    pub stamps: StatusStamps,
    pub created_at: DateTime<Utc>,
}

impl Request {
    /// A fresh `Pending` request for a message.
    pub fn new(
        platform: Platform,
        message_id: impl Into<String>,
        account_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let mut stamps = StatusStamps::default();
        stamps.pending_at = Some(now);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            platform,
            message_id: message_id.into(),
            account_id: account_id.into(),
            channel_id: channel_id.into(),
            member_id: None,
            email: None,
            phone: None,
            category_id: None,
            status: RequestStatus::Pending,
            metadata: Metadata::new(),
            error: None,
            stamps,
            created_at: now,
        }
    }

    /// Move to `to`, stamping its timestamp the first time it is entered.
    ///
    /// Returns whether the status changed. Re-entering the current status is a
    /// no-op; moving backwards or out of `Failed` is rejected.
    pub fn transition(&mut self, to: RequestStatus) -> Result<bool, CourierError> {
        self.transition_at(to, Utc::now())
    }

    pub fn transition_at(
        &mut self,
        to: RequestStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, CourierError> {
        if to == self.status {
            return Ok(false);
        }
        let allowed = match (self.status, to) {
            (RequestStatus::Failed, _) => false,
            (_, RequestStatus::Failed) => true,
            (from, to) => to.rank() > from.rank(),
        };
        if !allowed {
            return Err(CourierError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        let slot = self.stamps.slot(to);
        if slot.is_none() {
            *slot = Some(at);
        }
        self.status = to;
        Ok(true)
    }

    /// Enter `Failed` with an error message. Always allowed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        if self.status != RequestStatus::Failed {
            let now = Utc::now();
            if self.stamps.failed_at.is_none() {
                self.stamps.failed_at = Some(now);
            }
            self.status = RequestStatus::Failed;
        }
    }
}

/// A node in the triage decision forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestCategory {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parent_id: Option<String>,
    /// Execution order among siblings; unique per parent.
    pub sequence: i64,
    pub is_active: bool,
    pub is_public: bool,
    /// Channel ids this category is offered on. Empty means all channels.
    pub allowed_channels: Vec<String>,
    pub authorized_members: Vec<String>,
    pub authorized_groups: Vec<String>,
    /// Registered handler name used both to match and to process requests.
    pub handler: Option<String>,
}

impl RequestCategory {
    pub fn new(id: impl Into<String>, name: impl Into<String>, sequence: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            parent_id: None,
            sequence,
            is_active: true,
            is_public: true,
            allowed_channels: Vec::new(),
            authorized_members: Vec::new(),
            authorized_groups: Vec::new(),
            handler: None,
        }
    }

    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }

    /// Whether this category is offered on `channel_id`.
    pub fn allows_channel(&self, channel_id: &str) -> bool {
        self.allowed_channels.is_empty() || self.allowed_channels.iter().any(|c| c == channel_id)
    }

    /// Whether `member` may see this category. Unresolved members only see public ones.
    pub fn visible_to(&self, member: Option<&Member>) -> bool {
        if self.is_public {
            return true;
        }
        let Some(member) = member else {
            return false;
        };
        self.authorized_members.iter().any(|m| *m == member.id)
            || member
                .group_ids
                .iter()
                .any(|g| self.authorized_groups.contains(g))
    }
}

/// Check that `category` can be written next to `existing` categories.
///
/// Rejects a `sequence` already used by a sibling and a parent chain that
/// leads back to the category itself. `existing` may contain the category's
/// own previous version; it is ignored.
pub fn check_category_placement(
    category: &RequestCategory,
    existing: &[RequestCategory],
) -> Result<(), CourierError> {
    if let Some(clash) = existing.iter().find(|c| {
        c.id != category.id && c.parent_id == category.parent_id && c.sequence == category.sequence
    }) {
        return Err(CourierError::Validation(format!(
            "sequence {} is already used by category `{}` under the same parent",
            category.sequence, clash.name
        )));
    }

    let mut cursor = category.parent_id.clone();
    let mut hops = 0usize;
    while let Some(parent_id) = cursor {
        if parent_id == category.id {
            return Err(CourierError::Validation(format!(
                "category `{}` cannot be its own ancestor",
                category.name
            )));
        }
        hops += 1;
        if hops > existing.len() {
            break;
        }
        cursor = existing
            .iter()
            .find(|c| c.id == parent_id)
            .and_then(|c| c.parent_id.clone());
    }
    Ok(())
}

/// A CRM member that accounts can be linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub group_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberGroup {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request::new(Platform::Email, "<m@x>", "a@x", "ch")
    }

    #[test]
    fn forward_transitions_stamp_once() {
        let mut req = request();
        assert!(req.transition(RequestStatus::Categorizing).unwrap());
        let first = req.stamps.categorizing_at;
        assert!(first.is_some());
        assert!(!req.transition(RequestStatus::Categorizing).unwrap());
        assert_eq!(req.stamps.categorizing_at, first);
        // Skipped statuses are never stamped.
        assert!(req.stamps.identifying_at.is_none());
    }

    #[test]
    fn backward_transition_is_rejected() {
        let mut req = request();
        req.transition(RequestStatus::Queued).unwrap();
        let err = req.transition(RequestStatus::Categorizing).unwrap_err();
        assert!(matches!(err, CourierError::InvalidTransition { .. }));
        assert_eq!(req.status, RequestStatus::Queued);
    }

    #[test]
    fn failed_is_reachable_and_terminal() {
        let mut req = request();
        req.transition(RequestStatus::Processing).unwrap();
        req.transition(RequestStatus::Failed).unwrap();
        assert!(req.transition(RequestStatus::Completed).is_err());
        assert!(!req.transition(RequestStatus::Failed).unwrap());
    }

    #[test]
    fn fail_records_error() {
        let mut req = request();
        req.fail("boom");
        assert_eq!(req.status, RequestStatus::Failed);
        assert_eq!(req.error.as_deref(), Some("boom"));
        assert!(req.stamps.failed_at.is_some());
    }

    #[test]
    fn category_visibility() {
        let member = Member {
            id: "m1".into(),
            name: "Ann".into(),
            email: None,
            phone: None,
            group_ids: vec!["staff".into()],
        };
        let public = RequestCategory::new("c1", "Public", 1);
        let direct = RequestCategory {
            authorized_members: vec!["m1".into()],
            ..RequestCategory::new("c2", "Direct", 2).private()
        };
        let group = RequestCategory {
            authorized_groups: vec!["staff".into()],
            ..RequestCategory::new("c3", "Group", 3).private()
        };
        let closed = RequestCategory::new("c4", "Closed", 4).private();

        assert!(public.visible_to(None));
        assert!(!direct.visible_to(None));
        assert!(direct.visible_to(Some(&member)));
        assert!(group.visible_to(Some(&member)));
        assert!(!closed.visible_to(Some(&member)));
    }

    #[test]
    fn channel_allow_list() {
        let open = RequestCategory::new("c1", "Any", 1);
        let scoped = RequestCategory {
            allowed_channels: vec!["support".into()],
            ..RequestCategory::new("c2", "Support only", 2)
        };
        assert!(open.allows_channel("sales"));
        assert!(scoped.allows_channel("support"));
        assert!(!scoped.allows_channel("sales"));
    }

    #[test]
    fn placement_rejects_duplicate_sequence() {
        let existing = vec![RequestCategory::new("a", "Billing", 1)];
        let dup = RequestCategory::new("b", "Support", 1);
        assert!(check_category_placement(&dup, &existing).is_err());
        // Same sequence under a different parent is fine.
        let nested = RequestCategory::new("b", "Support", 1).under("a");
        assert!(check_category_placement(&nested, &existing).is_ok());
        // Re-saving a category with its own sequence is fine.
        assert!(check_category_placement(&existing[0], &existing).is_ok());
    }

    #[test]
    fn placement_rejects_cycles() {
        let existing = vec![
            RequestCategory::new("a", "Top", 1),
            RequestCategory::new("b", "Mid", 1).under("a"),
            RequestCategory::new("c", "Leaf", 1).under("b"),
        ];
        let moved = RequestCategory::new("a", "Top", 1).under("c");
        assert!(check_category_placement(&moved, &existing).is_err());
        let own_parent = RequestCategory::new("a", "Top", 1).under("a");
        assert!(check_category_placement(&own_parent, &existing).is_err());
    }
}
