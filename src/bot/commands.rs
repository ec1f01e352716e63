use crate::telegram::{BotCommand, InlineKeyboardButton, InlineKeyboardMarkup};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Main,
    AddGoogleToken,
    SetSheet,
    SetSheetList,
    SetPatterns,
    Setup,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MenuButton {
    label: &'static str,
    callback_data: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CommandDef {
    command: Command,
    /// Operation name shown to the user and used for the pending dialogue
    name: &'static str,
    text: &'static str,
    description: &'static str,
    /// Listed through `setMyCommands`
    advertised: bool,
    button: Option<MenuButton>,
}

const COMMAND_DEFS: &[CommandDef] = &[
    CommandDef {
        command: Command::Start,
        name: "Start",
        text: "start",
        description: "Start bot",
        advertised: false,
        button: None,
    },
    CommandDef {
        command: Command::Main,
        name: "Main",
        text: "main",
        description: "Show main menu",
        advertised: true,
        button: None,
    },
    CommandDef {
        command: Command::AddGoogleToken,
        name: "AddGoogleToken",
        text: "addgoogletoken",
        description: "Add google token",
        advertised: true,
        button: Some(MenuButton {
            label: "Add Google Token",
            callback_data: "addGoogleToken",
        }),
    },
    CommandDef {
        command: Command::SetSheet,
        name: "SetSheet",
        text: "setsheet",
        description: "Set Google sheet id for parse data",
        advertised: true,
        button: Some(MenuButton {
            label: "Set Sheet ID",
            callback_data: "setSheet",
        }),
    },
    CommandDef {
        command: Command::SetSheetList,
        name: "SetSheetList",
        text: "setsheetlist",
        description: "Set Google sheet list for parse data",
        advertised: true,
        button: Some(MenuButton {
            label: "Set Sheet List",
            callback_data: "setSheetList",
        }),
    },
    CommandDef {
        command: Command::SetPatterns,
        name: "SetPatterns",
        text: "setpatterns",
        description: "Set Patterns for parsing input message",
        advertised: true,
        button: Some(MenuButton {
            label: "Set Patterns for parser",
            callback_data: "setPatterns",
        }),
    },
    CommandDef {
        command: Command::Setup,
        name: "Setup",
        text: "setup",
        description: "Set token, sheet, list and patterns in one go",
        advertised: true,
        button: Some(MenuButton {
            label: "Guided setup",
            callback_data: "setup",
        }),
    },
    CommandDef {
        command: Command::Cancel,
        name: "Cancel",
        text: "cancel",
        description: "Cancel current operation",
        advertised: true,
        button: None,
    },
];

impl Command {
    pub fn name(self) -> &'static str {
        COMMAND_DEFS
            .iter()
            .find(|def| def.command == self)
            .map_or("Unknown", |def| def.name)
    }

    /// Command name as typed after the slash, without any `@botname`
    pub fn parse(text: &str) -> Option<Self> {
        COMMAND_DEFS
            .iter()
            .find(|def| def.text == text)
            .map(|def| def.command)
    }

    pub fn from_callback(data: &str) -> Option<Self> {
        COMMAND_DEFS
            .iter()
            .find(|def| def.button.is_some_and(|b| b.callback_data == data))
            .map(|def| def.command)
    }
}

/// Commands registered with `setMyCommands`
pub fn bot_commands() -> Vec<BotCommand> {
    COMMAND_DEFS
        .iter()
        .filter(|def| def.advertised)
        .map(|def| BotCommand {
            command: def.text.to_string(),
            description: def.description.to_string(),
        })
        .collect()
}

/// Inline keyboard shown under the settings checklist
pub fn settings_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::column(COMMAND_DEFS.iter().filter_map(|def| {
        def.button.map(|b| InlineKeyboardButton {
            text: b.label.to_string(),
            callback_data: b.callback_data.to_string(),
        })
    }))
}
