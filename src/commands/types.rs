//! Inbound events, menu buttons and replies.

use std::fmt;

use crate::profile::PhotoPayload;

/// Buttons of the inline menus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    /// Start signing the user account in.
    Login,

    /// Close and delete the stored session.
    Logout,

    /// Start collecting new profile photos.
    ChangePhoto,

    /// Ask for a new account name.
    ChangeName,

    /// Upload the photos collected so far.
    FinishPhotos,
}

impl MenuAction {
    /// Parses callback data of a pressed button.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "login" => Some(Self::Login),
            "logout" => Some(Self::Logout),
            "change_photo" => Some(Self::ChangePhoto),
            "change_name" => Some(Self::ChangeName),
            "photos_done" => Some(Self::FinishPhotos),
            _ => None,
        }
    }

    /// Callback data sent back when the button is pressed.
    #[must_use]
    pub const fn callback_data(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::ChangePhoto => "change_photo",
            Self::ChangeName => "change_name",
            Self::FinishPhotos => "photos_done",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Login => "🔐 Log in",
            Self::Logout => "⛔ Log out",
            Self::ChangePhoto => "📸 Change photo",
            Self::ChangeName => "✏️ Change name",
            Self::FinishPhotos => "✅ Done",
        }
    }
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.callback_data())
    }
}

/// Button layout attached to a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyboard {
    None,
    MainMenu,
    FinishPhotos,
}

impl Keyboard {
    /// Rows of buttons, top to bottom.
    #[must_use]
    pub fn rows(self) -> Vec<Vec<MenuAction>> {
        match self {
            Self::None => Vec::new(),
            Self::MainMenu => vec![
                vec![MenuAction::Login, MenuAction::Logout],
                vec![MenuAction::ChangePhoto, MenuAction::ChangeName],
            ],
            Self::FinishPhotos => vec![vec![MenuAction::FinishPhotos]],
        }
    }
}

/// Something the operator sent.
#[derive(Debug)]
pub enum Inbound {
    /// `/start`.
    Start,

    /// `/cancel`.
    Cancel,

    /// A menu button press.
    Button(MenuAction),

    /// A button whose callback data is not recognised.
    UnknownButton(String),

    /// Free text.
    Text(String),

    /// One or more downloaded images, in the order they were sent.
    Photos(Vec<PhotoPayload>),
}

impl Inbound {
    /// Classifies a text message, recognising the slash commands.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        let command = trimmed
            .split_whitespace()
            .next()
            .map(|c| c.split('@').next().unwrap_or(c).to_lowercase());

        match command.as_deref() {
            Some("/start") => Self::Start,
            Some("/cancel") => Self::Cancel,
            _ => Self::Text(trimmed.to_owned()),
        }
    }

    /// Classifies callback data.
    #[must_use]
    pub fn from_callback(data: &str) -> Self {
        MenuAction::parse(data).map_or_else(|| Self::UnknownButton(data.to_owned()), Self::Button)
    }
}

/// A message to send back to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Keyboard,
}

impl Reply {
    /// Plain reply without buttons.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Keyboard::None,
        }
    }

    /// Reply that offers the main menu again.
    #[must_use]
    pub fn with_menu(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Keyboard::MainMenu,
        }
    }

    #[must_use]
    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            text: text.into(),
            keyboard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_actions_round_trip_callback_data() {
        for action in [
            MenuAction::Login,
            MenuAction::Logout,
            MenuAction::ChangePhoto,
            MenuAction::ChangeName,
            MenuAction::FinishPhotos,
        ] {
            assert_eq!(MenuAction::parse(action.callback_data()), Some(action));
        }
        assert_eq!(MenuAction::parse("bogus"), None);
    }

    #[test]
    fn test_main_menu_is_two_by_two() {
        let rows = Keyboard::MainMenu.rows();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == 2));
        assert!(Keyboard::None.rows().is_empty());
    }

    #[test]
    fn test_from_text_commands() {
        assert!(matches!(Inbound::from_text("/start"), Inbound::Start));
        assert!(matches!(Inbound::from_text("/START@my_bot"), Inbound::Start));
        assert!(matches!(Inbound::from_text(" /cancel "), Inbound::Cancel));
        assert!(matches!(
            Inbound::from_text("  +201234567890 "),
            Inbound::Text(t) if t == "+201234567890"
        ));
    }

    #[test]
    fn test_from_callback() {
        assert!(matches!(
            Inbound::from_callback("login"),
            Inbound::Button(MenuAction::Login)
        ));
        assert!(matches!(
            Inbound::from_callback("nope"),
            Inbound::UnknownButton(d) if d == "nope"
        ));
    }
}
