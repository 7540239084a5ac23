use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::conversation::model::ConversationLists;
use crate::message::model::{Message, MessageQuery, Reaction};
use crate::settings::Settings;
use crate::user::UserInfo;
use crate::{conversation, message, user};

/// The collaborator HTTP API this core is built over. Every network
/// suspension point of the messaging core goes through this seam.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    /// `GET /api/messages/conversations`
    async fn find_conversations(&self) -> super::Result<ConversationLists>;

    /// `POST /api/messages/conversations`: idempotent get-or-create of the
    /// direct conversation with `other` (uniqueness is a collaborator-side
    /// guarantee).
    async fn create_conversation(&self, other: &user::Sub) -> super::Result<conversation::Id>;

    /// `GET /api/messages/conversations/{id}/messages`
    async fn find_messages(
        &self,
        conversation_id: &conversation::Id,
        query: &MessageQuery,
    ) -> super::Result<Vec<Message>>;

    /// `POST /api/messages/send`
    async fn send_message(
        &self,
        conversation_id: &conversation::Id,
        content: &str,
        kind: message::Kind,
    ) -> super::Result<Message>;

    /// `DELETE /api/messages/{id}`
    async fn delete_message(&self, id: &message::Id) -> super::Result<()>;

    /// `POST /api/messages/{id}/reactions`
    async fn add_reaction(&self, id: &message::Id, emoji: &str) -> super::Result<Reaction>;

    /// `DELETE /api/messages/{id}/reactions`
    async fn remove_reaction(&self, id: &message::Id, emoji: &str) -> super::Result<()>;

    /// `POST /api/messages/conversations/{id}/typing`, best effort.
    async fn set_typing(
        &self,
        conversation_id: &conversation::Id,
        is_typing: bool,
    ) -> super::Result<()>;

    /// `POST /api/messages/conversations/{id}/read`, best effort.
    async fn mark_as_read(&self, conversation_id: &conversation::Id) -> super::Result<()>;

    /// `GET /api/users/{sub}`: profile lookup used to decorate incoming
    /// change-feed rows with their sender.
    async fn find_user(&self, sub: &user::Sub) -> super::Result<UserInfo>;
}

pub type Api = Arc<dyn MessagingApi>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedConversation {
    conversation_id: conversation::Id,
}

#[derive(Deserialize)]
struct MessagePage {
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct SentMessage {
    message: Message,
}

#[derive(Deserialize)]
struct AddedReaction {
    reaction: Reaction,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    conversation_id: &'a conversation::Id,
    content: &'a str,
    r#type: message::Kind,
}

#[derive(Clone)]
pub struct HttpApi {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: settings.api_base.clone(),
            token: settings.token.clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> super::Result<RequestBuilder> {
        let url = self.base.join(path)?;
        let mut req = self.http.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        Ok(req)
    }

    async fn check(resp: reqwest::Response) -> super::Result<reqwest::Response> {
        if !resp.status().is_success() {
            return Err(super::Error::Status(resp.status()));
        }
        Ok(resp)
    }
}

#[async_trait]
impl MessagingApi for HttpApi {
    async fn find_conversations(&self) -> super::Result<ConversationLists> {
        let resp = self
            .request(Method::GET, "/api/messages/conversations")?
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn create_conversation(&self, other: &user::Sub) -> super::Result<conversation::Id> {
        let resp = self
            .request(Method::POST, "/api/messages/conversations")?
            .json(&json!({ "otherUserId": other }))
            .send()
            .await?;
        let created: CreatedConversation = Self::check(resp).await?.json().await?;
        Ok(created.conversation_id)
    }

    async fn find_messages(
        &self,
        conversation_id: &conversation::Id,
        query: &MessageQuery,
    ) -> super::Result<Vec<Message>> {
        let mut url = self
            .base
            .join(&format!("/api/messages/conversations/{conversation_id}/messages"))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("limit", &query.limit.to_string());
            if let Some(before) = &query.before {
                pairs.append_pair("before", &before.to_rfc3339());
            }
            if let Some(after) = &query.after {
                pairs.append_pair("after", &after.to_rfc3339());
            }
        }

        let mut req = self.http.get(url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let page: MessagePage = Self::check(req.send().await?).await?.json().await?;
        Ok(page.messages)
    }

    async fn send_message(
        &self,
        conversation_id: &conversation::Id,
        content: &str,
        kind: message::Kind,
    ) -> super::Result<Message> {
        let resp = self
            .request(Method::POST, "/api/messages/send")?
            .json(&SendRequest {
                conversation_id,
                content,
                r#type: kind,
            })
            .send()
            .await?;
        let sent: SentMessage = Self::check(resp).await?.json().await?;
        Ok(sent.message)
    }

    async fn delete_message(&self, id: &message::Id) -> super::Result<()> {
        let resp = self
            .request(Method::DELETE, &format!("/api/messages/{id}"))?
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn add_reaction(&self, id: &message::Id, emoji: &str) -> super::Result<Reaction> {
        let resp = self
            .request(Method::POST, &format!("/api/messages/{id}/reactions"))?
            .json(&json!({ "emoji": emoji }))
            .send()
            .await?;
        let added: AddedReaction = Self::check(resp).await?.json().await?;
        Ok(added.reaction)
    }

    async fn remove_reaction(&self, id: &message::Id, emoji: &str) -> super::Result<()> {
        let resp = self
            .request(Method::DELETE, &format!("/api/messages/{id}/reactions"))?
            .json(&json!({ "emoji": emoji }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn set_typing(
        &self,
        conversation_id: &conversation::Id,
        is_typing: bool,
    ) -> super::Result<()> {
        let resp = self
            .request(
                Method::POST,
                &format!("/api/messages/conversations/{conversation_id}/typing"),
            )?
            .json(&json!({ "isTyping": is_typing }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn mark_as_read(&self, conversation_id: &conversation::Id) -> super::Result<()> {
        let resp = self
            .request(
                Method::POST,
                &format!("/api/messages/conversations/{conversation_id}/read"),
            )?
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn find_user(&self, sub: &user::Sub) -> super::Result<UserInfo> {
        let resp = self
            .request(Method::GET, &format!("/api/users/{sub}"))?
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}
