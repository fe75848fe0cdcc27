//! Conversation handler: turns operator input into flow steps and replies.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::types::{Inbound, Keyboard, MenuAction, Reply};
use crate::login::{LoginError, LoginStateMachine, LoginStep};
use crate::owner::{OwnerGuard, OwnerId};
use crate::profile::{NAME_SEPARATOR, PhotoPayload, PhotoReport, ProfileError, ProfileService};
use crate::session::SessionManager;

const UNAUTHORIZED: &str = "This bot is private to its owner.";

/// Which non-login reply the handler is waiting for.
#[derive(Debug, Default)]
enum Prompt {
    #[default]
    None,
    Name,
    Photos(Vec<PhotoPayload>),
}

/// Routes every inbound event of the owner's chat.
pub struct ConversationHandler {
    guard: OwnerGuard,
    sessions: Arc<SessionManager>,
    login: LoginStateMachine,
    profile: ProfileService,
    prompt: Mutex<Prompt>,
}

impl ConversationHandler {
    #[must_use]
    pub fn new(
        guard: OwnerGuard,
        sessions: Arc<SessionManager>,
        login: LoginStateMachine,
        profile: ProfileService,
    ) -> Self {
        Self {
            guard,
            sessions,
            login,
            profile,
            prompt: Mutex::new(Prompt::None),
        }
    }

    #[must_use]
    pub fn is_owner(&self, sender: OwnerId) -> bool {
        sender == self.guard.owner()
    }

    /// Handles one event and returns exactly one reply.
    pub async fn handle(&self, sender: OwnerId, event: Inbound) -> Reply {
        if self.guard.authorize(sender).is_err() {
            return Reply::text(UNAUTHORIZED);
        }

        debug!("Handling {:?}", event);
        match event {
            Inbound::Start => Reply::with_menu(
                "Hello! Use the buttons below.\n\
                 Press 'Log in' to sign your user account in by phone.",
            ),
            Inbound::Cancel => {
                self.reset(sender).await;
                Reply::with_menu("Cancelled.")
            }
            Inbound::Button(action) => self.handle_button(sender, action).await,
            Inbound::UnknownButton(data) => {
                debug!("Unknown callback data {:?}", data);
                Reply::with_menu("Unknown option.")
            }
            Inbound::Text(text) => self.handle_text(sender, &text).await,
            Inbound::Photos(photos) => self.handle_photos(photos).await,
        }
    }

    /// Drops whatever is pending: prompts, queued photos and login attempts.
    pub async fn reset(&self, sender: OwnerId) {
        *self.prompt.lock().await = Prompt::None;
        if let Err(e) = self.login.abandon(sender).await {
            debug!("Reset refused: {}", e);
        }
    }

    async fn handle_button(&self, sender: OwnerId, action: MenuAction) -> Reply {
        match action {
            MenuAction::FinishPhotos => self.finish_photos(sender).await,
            MenuAction::Login => {
                self.reset(sender).await;
                match self.login.start(sender).await {
                    Ok(step) => render_login_step(step),
                    Err(e) => render_login_error(&e),
                }
            }
            MenuAction::Logout => {
                self.reset(sender).await;
                if self.sessions.logout(sender).await {
                    info!("Owner logged out");
                    Reply::with_menu("Logged out and deleted the saved session.")
                } else {
                    Reply::with_menu("There is no saved session to log out of.")
                }
            }
            MenuAction::ChangeName => {
                self.reset(sender).await;
                *self.prompt.lock().await = Prompt::Name;
                Reply::text(format!(
                    "Send the new name. Write 'First{NAME_SEPARATOR}Last' to set a last name too."
                ))
            }
            MenuAction::ChangePhoto => {
                self.reset(sender).await;
                *self.prompt.lock().await = Prompt::Photos(Vec::new());
                Reply::with_keyboard(
                    "Send one or more photos (as photos), then press Done.",
                    Keyboard::FinishPhotos,
                )
            }
        }
    }

    async fn handle_text(&self, sender: OwnerId, text: &str) -> Reply {
        if self.login.stage().await.is_active() {
            return match self.login.submit(sender, text).await {
                Ok(step) => render_login_step(step),
                Err(e) => render_login_error(&e),
            };
        }

        let mut prompt = self.prompt.lock().await;
        if matches!(*prompt, Prompt::Name) {
            *prompt = Prompt::None;
            drop(prompt);
            return self.rename(sender, text).await;
        }

        if matches!(*prompt, Prompt::Photos(_)) {
            if text.eq_ignore_ascii_case("done") {
                drop(prompt);
                return self.finish_photos(sender).await;
            }
            return Reply::with_keyboard(
                "Please send a photo, or press Done when finished.",
                Keyboard::FinishPhotos,
            );
        }

        Reply::with_menu("Use the buttons below.")
    }

    async fn rename(&self, sender: OwnerId, text: &str) -> Reply {
        match self.profile.rename(sender, text).await {
            Ok(_) => Reply::with_menu("Name updated successfully."),
            Err(ProfileError::EmptyName) => {
                *self.prompt.lock().await = Prompt::Name;
                Reply::text("The first name cannot be empty. Send the new name again.")
            }
            Err(e) => render_profile_error("Failed to update the name", &e),
        }
    }

    async fn handle_photos(&self, photos: Vec<PhotoPayload>) -> Reply {
        let mut prompt = self.prompt.lock().await;
        match &mut *prompt {
            Prompt::Photos(queue) => {
                queue.extend(photos);
                Reply::with_keyboard(
                    format!(
                        "Received. {} photo(s) queued. Send more or press Done.",
                        queue.len()
                    ),
                    Keyboard::FinishPhotos,
                )
            }
            _ => Reply::with_menu("Press 'Change photo' first, then send the photo."),
        }
    }

    async fn finish_photos(&self, sender: OwnerId) -> Reply {
        let queue = {
            let mut prompt = self.prompt.lock().await;
            match std::mem::take(&mut *prompt) {
                Prompt::Photos(queue) if queue.is_empty() => {
                    *prompt = Prompt::Photos(queue);
                    return Reply::with_keyboard(
                        "No photos received yet. Send a photo first.",
                        Keyboard::FinishPhotos,
                    );
                }
                Prompt::Photos(queue) => queue,
                other => {
                    *prompt = other;
                    return Reply::with_menu("Press 'Change photo' first.");
                }
            }
        };

        match self.profile.set_photos(sender, queue).await {
            Ok(report) => render_photo_report(&report),
            Err(e) => render_profile_error("Failed to update the photo", &e),
        }
    }
}

impl std::fmt::Debug for ConversationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationHandler")
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

fn render_login_step(step: LoginStep) -> Reply {
    match step {
        LoginStep::PhoneRequested => {
            Reply::text("Send your phone number in international format (e.g. +201234567890).")
        }
        LoginStep::CodeSent => {
            Reply::text("A login code was sent to your Telegram account. Send the code here.")
        }
        LoginStep::PasswordRequired { hint } => {
            let mut text =
                "The account is protected by a 2FA password. Send the password now.".to_owned();
            if let Some(hint) = hint.filter(|h| !h.is_empty()) {
                text.push_str(&format!("\nHint: {hint}"));
            }
            Reply::text(text)
        }
        LoginStep::LoggedIn(me) => {
            Reply::with_menu(format!("Logged in successfully as: {}", me.display_name()))
        }
    }
}

fn render_login_error(err: &LoginError) -> Reply {
    let text = match err {
        LoginError::Unauthorized(_) => UNAUTHORIZED.to_owned(),
        LoginError::EmptyInput => "Please send a non-empty value.".to_owned(),
        LoginError::NotInProgress => {
            "The temporary login expired. Start again from the menu.".to_owned()
        }
        LoginError::InvalidCode => {
            "The code is incorrect. Press 'Log in' again to request a new code.".to_owned()
        }
        LoginError::Transient(_)
        | LoginError::InvalidPassword(_)
        | LoginError::SignInFailed(_)
        | LoginError::Finalize(_) => err.to_string(),
    };

    if err.is_terminal() {
        Reply::with_menu(text)
    } else {
        Reply::text(text)
    }
}

fn render_profile_error(context: &str, err: &ProfileError) -> Reply {
    match err {
        ProfileError::Unauthorized(_) => Reply::text(UNAUTHORIZED),
        ProfileError::NotLoggedIn => {
            Reply::with_menu("No account is signed in. Log in first.")
        }
        _ => Reply::with_menu(format!("{context}: {err}")),
    }
}

fn render_photo_report(report: &PhotoReport) -> Reply {
    let total = report.results.len();
    if report.failed() == 0 {
        return if total == 1 {
            Reply::with_menu("Profile photo updated.")
        } else {
            Reply::with_menu(format!("All {total} profile photos were set."))
        };
    }

    let mut lines = vec![format!(
        "Set {} of {total} profile photo(s).",
        report.succeeded()
    )];
    for (position, err) in report.failures() {
        lines.push(format!("Photo #{position} failed: {err}"));
    }
    Reply::with_menu(lines.join("\n"))
}
