//! Bot API transport for the operator chat.
//!
//! Converts teloxide updates into [`Inbound`] events, hands them to the
//! [`ConversationHandler`] and renders the [`Reply`] back, buttons included.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, Recipient};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::commands::{ConversationHandler, Inbound, Keyboard, Reply};
use crate::owner::OwnerId;
use crate::profile::PhotoPayload;

const SHUTDOWN_RETRY: Duration = Duration::from_millis(100);

/// The operator-facing bot.
pub struct OperatorBot {
    bot: Bot,
    handler: Arc<ConversationHandler>,
}

impl OperatorBot {
    #[must_use]
    pub fn new(bot_token: &str, handler: Arc<ConversationHandler>) -> Self {
        Self {
            bot: Bot::new(bot_token),
            handler,
        }
    }

    /// Polls for updates until `shutdown` resolves.
    pub async fn run<S>(self: Arc<Self>, shutdown: S)
    where
        S: Future<Output = ()> + Send + 'static,
    {
        info!("Starting operator bot");

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint({
                let this = Arc::clone(&self);
                move |msg: Message| {
                    let this = Arc::clone(&this);
                    async move {
                        this.handle_message(msg).await;
                        respond(())
                    }
                }
            }))
            .branch(Update::filter_callback_query().endpoint({
                let this = Arc::clone(&self);
                move |q: CallbackQuery| {
                    let this = Arc::clone(&this);
                    async move {
                        this.handle_callback(q).await;
                        respond(())
                    }
                }
            }));

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .default_handler(|update| async move {
                debug!("Ignoring update {:?}", update.id);
            })
            .build();

        let token = dispatcher.shutdown_token();
        tokio::spawn(async move {
            shutdown.await;
            info!("Stopping update polling...");
            // The signal may arrive before the dispatcher starts polling.
            loop {
                match token.shutdown() {
                    Ok(stopped) => break stopped.await,
                    Err(e) => {
                        debug!("Dispatcher not running yet ({}), retrying", e);
                        tokio::time::sleep(SHUTDOWN_RETRY).await;
                    }
                }
            }
        });

        dispatcher.dispatch().await;
        info!("Operator bot stopped");
    }

    async fn handle_message(&self, msg: Message) {
        let Some(user) = msg.from.as_ref() else {
            return;
        };
        let sender = OwnerId::new(user.id.0);

        let event = if let Some(text) = msg.text() {
            Inbound::from_text(text)
        } else if msg.photo().is_some() {
            let mut photos = Vec::new();
            // Strangers get rejected by the handler; don't fetch their files.
            if self.handler.is_owner(sender) {
                match self.download_photo(&msg).await {
                    Ok(photo) => photos.push(photo),
                    Err(e) => {
                        warn!("Photo download failed: {:#}", e);
                        let reply = Reply::with_keyboard(
                            format!("Could not download the photo: {e}"),
                            Keyboard::FinishPhotos,
                        );
                        self.send(msg.chat.id, reply).await;
                        return;
                    }
                }
            }
            Inbound::Photos(photos)
        } else {
            Inbound::Text(String::new())
        };

        let reply = self.dispatch(sender, event).await;
        self.send(msg.chat.id, reply).await;
    }

    async fn handle_callback(&self, q: CallbackQuery) {
        if let Err(e) = self.bot.answer_callback_query(q.id.clone()).await {
            debug!("Could not answer callback query: {}", e);
        }

        let sender = OwnerId::new(q.from.id.0);
        let event = Inbound::from_callback(q.data.as_deref().unwrap_or_default());

        let reply = self.dispatch(sender, event).await;
        self.send(q.from.id, reply).await;
    }

    /// Runs the handler in its own task so a panic only aborts this conversation.
    async fn dispatch(&self, sender: OwnerId, event: Inbound) -> Reply {
        let handler = Arc::clone(&self.handler);
        match tokio::spawn(async move { handler.handle(sender, event).await }).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Conversation handler failed: {}", e);
                self.handler.reset(sender).await;
                Reply::with_menu("Something went wrong. Start again from the menu.")
            }
        }
    }

    /// Fetches the largest size of the message's photo into a temp file.
    async fn download_photo(&self, msg: &Message) -> anyhow::Result<PhotoPayload> {
        let photo = msg
            .photo()
            .and_then(<[_]>::last)
            .ok_or_else(|| anyhow!("message has no photo sizes"))?;

        let file = self
            .bot
            .get_file(photo.file.id.clone())
            .await
            .context("get_file failed")?;

        let payload = PhotoPayload::empty().context("could not create temp file")?;
        let mut dst = tokio::fs::File::create(payload.path()).await?;
        self.bot
            .download_file(&file.path, &mut dst)
            .await
            .context("download failed")?;
        dst.flush().await?;

        debug!("Downloaded photo to {}", payload.path().display());
        Ok(payload)
    }

    async fn send<C>(&self, to: C, reply: Reply)
    where
        C: Into<Recipient> + Send,
    {
        let mut request = self.bot.send_message(to, reply.text);
        if let Some(markup) = keyboard_markup(reply.keyboard) {
            request = request.reply_markup(markup);
        }
        if let Err(e) = request.await {
            warn!("Failed to send reply: {}", e);
        }
    }
}

impl std::fmt::Debug for OperatorBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorBot").finish_non_exhaustive()
    }
}

fn keyboard_markup(keyboard: Keyboard) -> Option<InlineKeyboardMarkup> {
    let rows = keyboard.rows();
    if rows.is_empty() {
        return None;
    }

    Some(InlineKeyboardMarkup::new(rows.into_iter().map(|row| {
        row.into_iter()
            .map(|action| InlineKeyboardButton::callback(action.label(), action.callback_data()))
            .collect::<Vec<_>>()
    })))
}
