use async_trait::async_trait;
use serenity::{
    builder::{CreateMessage, EditMessage},
    http::{Http, HttpError},
    model::id::{ChannelId, MessageId},
};
use std::sync::Arc;

use super::{
    embeds,
    status::{MessageSink, StatusView},
};
use crate::error::DisplayError;

/// A Discord text channel the player talks to.
pub struct DiscordChannel {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl DiscordChannel {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

fn display_error(err: serenity::Error) -> DisplayError {
    match err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 404 =>
        {
            DisplayError::Gone
        }
        other => DisplayError::Http(other.to_string()),
    }
}

#[async_trait]
impl MessageSink for DiscordChannel {
    async fn send_status(&self, view: &StatusView) -> Result<MessageId, DisplayError> {
        let message = self
            .channel_id
            .send_message(&self.http, CreateMessage::new().embed(embeds::status_embed(view)))
            .await
            .map_err(display_error)?;
        Ok(message.id)
    }

    async fn edit_status(&self, id: MessageId, view: &StatusView) -> Result<(), DisplayError> {
        self.channel_id
            .edit_message(&self.http, id, EditMessage::new().embed(embeds::status_embed(view)))
            .await
            .map(|_| ())
            .map_err(display_error)
    }

    async fn delete(&self, id: MessageId) -> Result<(), DisplayError> {
        self.channel_id
            .delete_message(&self.http, id)
            .await
            .map_err(display_error)
    }

    async fn say(&self, text: &str) -> Result<(), DisplayError> {
        self.channel_id
            .say(&self.http, text)
            .await
            .map(|_| ())
            .map_err(display_error)
    }
}
