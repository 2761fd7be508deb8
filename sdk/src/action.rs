//! Action types
//!
//! An [`Action`] is one externally visible step proposed by the reasoner.
//! The channel-specific payload lives in [`ActionKind`], a sum type with one
//! variant per dispatch channel.
//!
//! The reasoner speaks a loose JSON dialect:
//!
//! ```json
//! {"type": "keyboard", "params": {"text": "hello"}, "description": "Type greeting", "isFinal": true}
//! ```
//!
//! [`Action::from_value`] turns that into a typed action. Unrecognised type
//! tags are kept as [`ActionKind::Unknown`] so the executor can report them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// A single action proposed by the reasoner
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    /// Channel and channel-specific parameters
    #[serde(flatten)]
    pub kind: ActionKind,

    /// Human-readable description
    pub description: String,

    /// Reasoner's claim that this action finishes the task
    #[serde(rename = "isFinal")]
    pub is_final: bool,
}

/// Channel-specific action payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "params", rename_all = "lowercase")]
pub enum ActionKind {
    Browser(BrowserParams),
    App(AppParams),
    System(SystemParams),
    Keyboard(KeyboardParams),
    Mouse(MouseParams),
    Wait(WaitParams),
    Done { summary: Option<String> },
    Unknown(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowserParams {
    pub url: Option<String>,
    pub selector: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppParams {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemParams {
    pub command: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyboardParams {
    pub text: Option<String>,
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseParams {
    pub x: Option<i32>,
    pub y: Option<i32>,
    #[serde(default)]
    pub button: MouseButton,
    #[serde(default = "default_clicks")]
    pub clicks: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitParams {
    #[serde(alias = "duration")]
    pub duration_ms: Option<u64>,
}

fn default_clicks() -> u8 {
    1
}

impl ActionKind {
    /// Wire name of the channel (`"browser"`, `"system"`, ...)
    pub fn type_name(&self) -> &str {
        match self {
            ActionKind::Browser(_) => "browser",
            ActionKind::App(_) => "app",
            ActionKind::System(_) => "system",
            ActionKind::Keyboard(_) => "keyboard",
            ActionKind::Mouse(_) => "mouse",
            ActionKind::Wait(_) => "wait",
            ActionKind::Done { .. } => "done",
            ActionKind::Unknown(name) => name,
        }
    }
}

impl Action {
    /// Create an action with an empty description
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            description: String::new(),
            is_final: false,
        }
    }

    pub fn browser(params: BrowserParams) -> Self {
        Self::new(ActionKind::Browser(params))
    }

    pub fn app(name: impl Into<String>) -> Self {
        Self::new(ActionKind::App(AppParams {
            name: name.into(),
            args: Vec::new(),
        }))
    }

    pub fn system(command: impl Into<String>) -> Self {
        Self::new(ActionKind::System(SystemParams {
            command: command.into(),
        }))
    }

    pub fn keyboard_text(text: impl Into<String>) -> Self {
        Self::new(ActionKind::Keyboard(KeyboardParams {
            text: Some(text.into()),
            keys: Vec::new(),
        }))
    }

    pub fn wait(duration_ms: u64) -> Self {
        Self::new(ActionKind::Wait(WaitParams {
            duration_ms: Some(duration_ms),
        }))
    }

    /// Set the human-readable description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark the action as the last one of the task
    pub fn finishing(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Description if present, otherwise the channel name
    pub fn label(&self) -> String {
        if self.description.is_empty() {
            format!("{} action", self.kind.type_name())
        } else {
            self.description.clone()
        }
    }

    /// Parse the reasoner's JSON object into a typed action
    ///
    /// Accepts `isFinal` or `is_final`; a missing `params` object is treated
    /// as empty. Returns `EngineError::ReasonerParse` when the object has no
    /// `type` or its params do not fit the channel.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, EngineError> {
        let obj = value
            .as_object()
            .ok_or_else(|| EngineError::ReasonerParse("decision is not a JSON object".into()))?;

        let tag = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::ReasonerParse("decision has no 'type' field".into()))?
            .trim()
            .to_ascii_lowercase();

        let params = obj
            .get("params")
            .cloned()
            .filter(|v| !v.is_null())
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

        let description = obj
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let is_final = obj
            .get("isFinal")
            .or_else(|| obj.get("is_final"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let kind = match tag.as_str() {
            "browser" => ActionKind::Browser(parse_params(&tag, params)?),
            "app" => ActionKind::App(parse_params(&tag, params)?),
            "system" => ActionKind::System(parse_params(&tag, params)?),
            "keyboard" => ActionKind::Keyboard(parse_params(&tag, params)?),
            "mouse" => ActionKind::Mouse(parse_params(&tag, params)?),
            "wait" => ActionKind::Wait(parse_params(&tag, params)?),
            "done" => ActionKind::Done {
                summary: params
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .map(String::from),
            },
            _ => ActionKind::Unknown(tag),
        };

        Ok(Self {
            kind,
            description,
            is_final,
        })
    }
}

fn parse_params<T: DeserializeOwned>(tag: &str, params: serde_json::Value) -> Result<T, EngineError> {
    serde_json::from_value(params)
        .map_err(|e| EngineError::ReasonerParse(format!("invalid {} params: {}", tag, e)))
}
