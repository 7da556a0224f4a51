// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Member identification, categorization and processing of requests.
//!
//! Categorization walks the category forest level by level. At each level
//! only active categories offered on the request's channel and visible to
//! its member are considered. A single visible category is taken without
//! asking its handler; otherwise handlers are asked in sequence order and
//! the first positive answer wins. Matching stops at the first level where
//! nothing matches, so the deepest matched category is kept.

use std::sync::Arc;

use courier_core::{
    CourierError, Member, Metadata, Request, RequestCategory, RequestStatus, Store,
};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::handlers::{HandlerRegistry, match_decision};

/// Metadata key holding `{category, error}` entries for failed matchers.
pub const CATEGORIZATION_ERRORS_KEY: &str = "categorization_errors";

/// Metadata key describing how (or why not) a member was linked.
pub const MEMBER_IDENTIFICATION_KEY: &str = "member_identification";

/// Runs requests through identification, categorization and processing.
pub struct RequestEngine {
    store: Arc<dyn Store>,
    handlers: Arc<HandlerRegistry>,
}

impl RequestEngine {
    pub fn new(store: Arc<dyn Store>, handlers: Arc<HandlerRegistry>) -> Self {
        Self { store, handlers }
    }

    /// Load a request by id.
    pub async fn load(&self, request_id: &str) -> Result<Request, CourierError> {
        self.store
            .get_request(request_id)
            .await?
            .ok_or_else(|| CourierError::not_found("request", request_id))
    }

    /// Identify the member, then categorize. Returns whether a category was assigned.
    pub async fn triage(&self, request: &mut Request) -> Result<bool, CourierError> {
        self.identify_member(request).await?;
        self.categorize(request).await
    }

    /// Link the request to a member. Returns whether it is linked afterwards.
    ///
    /// Already linked requests are left alone. Otherwise the sender account's
    /// member is used, then a member whose email or phone equals the
    /// request's contact details. Several matching members leave the request
    /// unlinked, with the ambiguity in `error` and in the metadata.
    pub async fn identify_member(&self, request: &mut Request) -> Result<bool, CourierError> {
        if request.member_id.is_some() {
            return Ok(true);
        }
        if request.status == RequestStatus::Pending {
            request.transition(RequestStatus::Identifying)?;
        }

        let account = self
            .store
            .get_account(request.platform, &request.account_id)
            .await?;
        if let Some(member_id) = account.as_ref().and_then(|a| a.member_id.clone()) {
            request.member_id = Some(member_id);
            request
                .metadata
                .insert(MEMBER_IDENTIFICATION_KEY.into(), json!({ "method": "account" }));
            self.store.update_request(request).await?;
            return Ok(true);
        }

        if request.email.is_none() && request.phone.is_none() {
            request.metadata.insert(
                MEMBER_IDENTIFICATION_KEY.into(),
                json!({ "result": "no_contact_details" }),
            );
            self.store.update_request(request).await?;
            return Ok(false);
        }

        let mut members = self
            .store
            .find_members_by_contact(request.email.as_deref(), request.phone.as_deref())
            .await?;
        let linked = match members.len() {
            0 => {
                request.metadata.insert(
                    MEMBER_IDENTIFICATION_KEY.into(),
                    json!({ "result": "no_match", "email": request.email, "phone": request.phone }),
                );
                false
            }
            1 => {
                let member = members.remove(0);
                let matched_by = if request.email.is_some() && request.email == member.email {
                    "email"
                } else {
                    "phone"
                };
                request.metadata.insert(
                    MEMBER_IDENTIFICATION_KEY.into(),
                    json!({ "method": "contact_match", "matched_by": matched_by }),
                );
                if account.is_some() {
                    self.store
                        .set_account_member(request.platform, &request.account_id, &member.id)
                        .await?;
                }
                info!(request_id = %request.id, member_id = %member.id, matched_by, "linked request to member");
                request.member_id = Some(member.id);
                true
            }
            count => {
                warn!(request_id = %request.id, count, "several members share the request's contact details");
                let message = format!("{count} members match the request's contact details");
                request.error = Some(message.clone());
                request.metadata.insert(
                    MEMBER_IDENTIFICATION_KEY.into(),
                    json!({
                        "error": message,
                        "count": count,
                        "email": request.email,
                        "phone": request.phone,
                    }),
                );
                false
            }
        };
        self.store.update_request(request).await?;
        Ok(linked)
    }

    /// Assign a category and queue the request. Returns whether a category was assigned.
    ///
    /// Finding no category is a normal outcome and still queues the request.
    /// A failure outside individual matchers marks the request failed and
    /// returns `Ok(false)`; only storage failures while saving that state
    /// are returned as errors.
    pub async fn categorize(&self, request: &mut Request) -> Result<bool, CourierError> {
        if !matches!(
            request.status,
            RequestStatus::Pending | RequestStatus::Identifying | RequestStatus::Categorizing
        ) {
            return Err(CourierError::InvalidTransition {
                from: request.status,
                to: RequestStatus::Categorizing,
            });
        }
        match self.assign_category(request).await {
            Ok(assigned) => {
                request.transition(RequestStatus::Queued)?;
                self.store.update_request(request).await?;
                info!(
                    request_id = %request.id,
                    category = request.category_id.as_deref().unwrap_or("-"),
                    "request queued"
                );
                Ok(assigned)
            }
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "categorization failed");
                request.fail(e.to_string());
                self.store.update_request(request).await?;
                Ok(false)
            }
        }
    }

    async fn assign_category(&self, request: &mut Request) -> Result<bool, CourierError> {
        request.transition(RequestStatus::Categorizing)?;
        request.category_id = None;
        let member = match request.member_id.as_deref() {
            Some(id) => self.store.get_member(id).await?,
            None => None,
        };

        let mut parent: Option<String> = None;
        let mut assigned = false;
        loop {
            let visible = self
                .visible_categories(parent.as_deref(), &request.channel_id, member.as_ref())
                .await?;
            let chosen = match visible.len() {
                0 => None,
                1 => {
                    debug!(request_id = %request.id, category = %visible[0].name, "single visible category");
                    visible.into_iter().next()
                }
                _ => self.first_match(request, visible).await,
            };
            let Some(category) = chosen else {
                break;
            };
            request.category_id = Some(category.id.clone());
            assigned = true;
            parent = Some(category.id);
        }
        Ok(assigned)
    }

    async fn visible_categories(
        &self,
        parent: Option<&str>,
        channel_id: &str,
        member: Option<&Member>,
    ) -> Result<Vec<RequestCategory>, CourierError> {
        let mut categories: Vec<RequestCategory> = self
            .store
            .child_categories(parent)
            .await?
            .into_iter()
            .filter(|c| c.is_active && c.allows_channel(channel_id) && c.visible_to(member))
            .collect();
        categories.sort_by_key(|c| c.sequence);
        Ok(categories)
    }

    /// Ask each category's handler in order. Failing handlers are recorded
    /// and skipped.
    async fn first_match(
        &self,
        request: &mut Request,
        candidates: Vec<RequestCategory>,
    ) -> Option<RequestCategory> {
        for category in candidates {
            let Some(handler_name) = category.handler.as_deref() else {
                continue;
            };
            let Some(handler) = self.handlers.get(handler_name) else {
                record_error(
                    &mut request.metadata,
                    &category.name,
                    &format!("handler `{handler_name}` is not registered"),
                );
                continue;
            };

            let snapshot = request.clone();
            let result = match handler.call(&snapshot, request.metadata.clone()).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(request_id = %request.id, category = %category.name, error = %e, "matcher failed");
                    record_error(&mut request.metadata, &category.name, &e.to_string());
                    continue;
                }
            };

            match match_decision(&result) {
                Some(true) => {
                    for (key, value) in result {
                        request.metadata.insert(key, value);
                    }
                    return Some(category);
                }
                Some(false) => {}
                None => {
                    record_error(
                        &mut request.metadata,
                        &category.name,
                        "handler returned no boolean `category_match`",
                    );
                }
            }
        }
        None
    }

    /// Run the assigned category's handler and complete the request.
    ///
    /// Requests without a category complete immediately. A handler failure
    /// marks the request failed and is returned.
    pub async fn process_category(&self, request: &mut Request) -> Result<(), CourierError> {
        let Some(category_id) = request.category_id.clone() else {
            request.transition(RequestStatus::Completed)?;
            self.store.update_request(request).await?;
            return Ok(());
        };

        request.transition(RequestStatus::Processing)?;
        self.store.update_request(request).await?;

        match self.run_processor(request, &category_id).await {
            Ok(metadata) => {
                if let Some(metadata) = metadata {
                    request.metadata = metadata;
                }
                request.transition(RequestStatus::Completed)?;
                self.store.update_request(request).await?;
                info!(request_id = %request.id, category = %category_id, "request completed");
                Ok(())
            }
            Err(e) => {
                warn!(request_id = %request.id, category = %category_id, error = %e, "processing failed");
                request.fail(e.to_string());
                self.store.update_request(request).await?;
                Err(e)
            }
        }
    }

    async fn run_processor(
        &self,
        request: &Request,
        category_id: &str,
    ) -> Result<Option<Metadata>, CourierError> {
        let category = self
            .store
            .get_category(category_id)
            .await?
            .ok_or_else(|| CourierError::not_found("category", category_id))?;
        let Some(handler_name) = category.handler.as_deref() else {
            return Ok(None);
        };
        let handler = self.handlers.get(handler_name).ok_or_else(|| CourierError::Handler {
            name: handler_name.to_string(),
            message: "not registered".into(),
        })?;
        handler
            .call(request, request.metadata.clone())
            .await
            .map(Some)
    }
}

fn record_error(metadata: &mut Metadata, category: &str, error: &str) {
    let entry = metadata
        .entry(CATEGORIZATION_ERRORS_KEY)
        .or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        *entry = Value::Array(Vec::new());
    }
    if let Value::Array(list) = entry {
        list.push(json!({ "category": category, "error": error }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_accumulate_in_a_list() {
        let mut metadata = Metadata::new();
        record_error(&mut metadata, "Billing", "boom");
        record_error(&mut metadata, "Abuse", "bang");
        let list = metadata[CATEGORIZATION_ERRORS_KEY].as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1]["category"], "Abuse");
    }

    #[test]
    fn malformed_error_list_is_replaced() {
        let mut metadata = Metadata::new();
        metadata.insert(CATEGORIZATION_ERRORS_KEY.into(), Value::String("oops".into()));
        record_error(&mut metadata, "Billing", "boom");
        assert_eq!(metadata[CATEGORIZATION_ERRORS_KEY].as_array().unwrap().len(), 1);
    }
}
