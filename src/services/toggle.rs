//! Add/remove membership in a user-owned relation.
//!
//! Favorites, the shopping cart and subscriptions all share one state machine:
//! per `(actor, target)` pair the state is either absent or present, `Add`
//! moves absent to present and `Remove` moves present to absent. Any other
//! transition is rejected with a conflict and leaves the store untouched.

use serde::Serialize;

use crate::{
    error::ServiceError,
    jwt::SessionData,
    permissions::ActionType,
    schema::Id,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome<T> {
    /// The pair was inserted; carries a projection of the target
    Created(T),
    Removed,
}

/// A set of `(actor, target)` pairs owned by the actor.
#[allow(async_fn_in_trait)]
pub trait Relation {
    type Target;
    type Summary: Serialize;

    /// Noun used in messages, e.g. "favorites".
    fn name(&self) -> &'static str;

    async fn resolve(&self, target_id: Id) -> Result<Option<Self::Target>, ServiceError>;

    /// Refuses pairs that may never exist, regardless of state.
    fn admit(&self, _actor: Id, _target: &Self::Target) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn contains(&self, actor: Id, target_id: Id) -> Result<bool, ServiceError>;

    /// Returns `false` when the pair was already present.
    async fn add(&self, actor: Id, target_id: Id) -> Result<bool, ServiceError>;

    /// Returns `false` when the pair was not present.
    async fn remove(&self, actor: Id, target_id: Id) -> Result<bool, ServiceError>;

    async fn summarize(
        &self,
        actor: Id,
        target: Self::Target,
    ) -> Result<Self::Summary, ServiceError>;
}

pub async fn toggle<R: Relation>(
    relation: &R,
    actor: Option<&SessionData>,
    target_id: Id,
    intent: Intent,
) -> Result<ToggleOutcome<R::Summary>, ServiceError> {
    let session = actor.ok_or(ServiceError::Unauthorized)?;
    session.authenticate(ActionType::ManageOwnLists)?;

    let target = relation
        .resolve(target_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Target {target_id}")))?;
    relation.admit(session.user_id, &target)?;

    let present = relation.contains(session.user_id, target_id).await?;

    match (intent, present) {
        (Intent::Add, false) => {
            // A concurrent add may still win between the check and the insert.
            if !relation.add(session.user_id, target_id).await? {
                return Err(already_present(relation));
            }
            log::trace!(
                "> {} added {target_id} to {}",
                session.username,
                relation.name()
            );
            let summary = relation.summarize(session.user_id, target).await?;
            Ok(ToggleOutcome::Created(summary))
        }
        (Intent::Remove, true) => {
            if !relation.remove(session.user_id, target_id).await? {
                return Err(not_present(relation));
            }
            log::trace!(
                "> {} removed {target_id} from {}",
                session.username,
                relation.name()
            );
            Ok(ToggleOutcome::Removed)
        }
        (Intent::Add, true) => Err(already_present(relation)),
        (Intent::Remove, false) => Err(not_present(relation)),
    }
}

fn already_present<R: Relation>(relation: &R) -> ServiceError {
    ServiceError::Conflict(format!("Already in {}", relation.name()))
}

fn not_present<R: Relation>(relation: &R) -> ServiceError {
    ServiceError::Conflict(format!("Not in {}", relation.name()))
}
