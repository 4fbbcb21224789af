use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use flock_db::{Database, DbError};
use flock_types::Id;
use flock_types::events::GatewayEvent;
use flock_types::models::{Comment, Message, Notification};

use crate::auth::Identity;
use crate::dispatcher::Dispatcher;

const MAX_CONTENT_CHARS: usize = 2000;

/// A state-changing social action. Each variant has exactly one arm in
/// [`ActionService::perform`].
#[derive(Debug, Clone)]
pub enum Action {
    Follow { user_id: Id },
    Like { post_id: Id },
    Comment { post_id: Id, content: String },
    Message { receiver_id: Id, content: String },
}

#[derive(Debug)]
pub enum ActionOutcome {
    Followed,
    Liked,
    Commented(Comment),
    MessageSent(Message),
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Store(DbError),
}

impl From<DbError> for ActionError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => Self::NotFound(what),
            DbError::Conflict(what) => Self::Conflict(what),
            DbError::Invalid(what) => Self::Validation(format!("invalid {what}")),
            other => Self::Store(other),
        }
    }
}

/// What goes out on the live channel once the write has committed.
enum Emission {
    Silent,
    Notify(Notification),
    Deliver(Message),
}

/// Persist-then-publish pipeline for social actions.
#[derive(Clone)]
pub struct ActionService {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl ActionService {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run `action` as `actor`. Nothing is published unless the write
    /// succeeded, and a failed publish never undoes the write.
    pub async fn perform(&self, actor: &Identity, action: Action) -> Result<ActionOutcome, ActionError> {
        match action {
            Action::Follow { user_id } => self.follow(actor, user_id).await.map(|()| ActionOutcome::Followed),
            Action::Like { post_id } => self.like(actor, post_id).await.map(|()| ActionOutcome::Liked),
            Action::Comment { post_id, content } => self
                .comment(actor, post_id, content)
                .await
                .map(ActionOutcome::Commented),
            Action::Message { receiver_id, content } => self
                .message(actor, receiver_id, content)
                .await
                .map(ActionOutcome::MessageSent),
        }
    }

    pub async fn follow(&self, actor: &Identity, user_id: Id) -> Result<(), ActionError> {
        let actor_id = actor.user_id;
        if user_id == actor_id {
            return Err(ActionError::Validation("cannot follow yourself".into()));
        }
        let row = self.db.call(move |db| db.record_follow(actor_id, user_id)).await?;
        self.emit(Emission::Notify(row.into())).await;
        Ok(())
    }

    pub async fn like(&self, actor: &Identity, post_id: Id) -> Result<(), ActionError> {
        let actor_id = actor.user_id;
        let row = self.db.call(move |db| db.record_like(actor_id, post_id)).await?;
        self.emit(row.map_or(Emission::Silent, |n| Emission::Notify(n.into()))).await;
        Ok(())
    }

    pub async fn comment(&self, actor: &Identity, post_id: Id, content: String) -> Result<Comment, ActionError> {
        let actor_id = actor.user_id;
        check_content(&content, "comment")?;
        let (comment, row) = self
            .db
            .call(move |db| db.record_comment(actor_id, post_id, &content))
            .await?;
        self.emit(row.map_or(Emission::Silent, |n| Emission::Notify(n.into()))).await;
        Ok(comment.into())
    }

    pub async fn message(&self, actor: &Identity, receiver_id: Id, content: String) -> Result<Message, ActionError> {
        let actor_id = actor.user_id;
        if receiver_id == actor_id {
            return Err(ActionError::Validation("cannot message yourself".into()));
        }
        check_content(&content, "message")?;
        let message: Message = self
            .db
            .call(move |db| db.record_message(actor_id, receiver_id, &content))
            .await?
            .into();
        self.emit(Emission::Deliver(message.clone())).await;
        Ok(message)
    }

    async fn emit(&self, emission: Emission) {
        let result = match emission {
            Emission::Silent => return,
            Emission::Notify(notification) => {
                let recipient = notification.user_id;
                self.dispatcher
                    .publish(recipient, GatewayEvent::Notification(notification))
                    .await
            }
            Emission::Deliver(message) => {
                let (receiver, sender) = (message.receiver_id, message.sender_id);
                self.dispatcher
                    .publish_to_conversation(receiver, sender, GatewayEvent::NewMessage(message))
                    .await
            }
        };

        match result {
            Ok(n) => debug!("Live event delivered to {} connection(s)", n),
            Err(e) => debug!("Live delivery skipped: {}", e),
        }
    }
}

fn check_content(content: &str, what: &str) -> Result<(), ActionError> {
    if content.trim().is_empty() {
        return Err(ActionError::Validation(format!("{what} cannot be empty")));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ActionError::Validation(format!(
            "{what} exceeds {MAX_CONTENT_CHARS} characters"
        )));
    }
    Ok(())
}
