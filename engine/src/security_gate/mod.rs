//! Security gate
//!
//! Decides whether a proposed action needs explicit user confirmation before
//! it is dispatched. Only `system` actions are ever gated: a system command
//! whose text contains any deny-listed term (case-insensitive substring
//! match) requires confirmation.
//!
//! Matching is a plain substring test, so `"rm"` also matches `"format"`
//! and `"perform"`.

use sdk::action::{Action, ActionKind};

/// Terms that mark a system command as dangerous
pub const DENY_TERMS: &[&str] = &[
    "shutdown",
    "restart",
    "hibernate",
    "sleep",
    "delete",
    "remove",
    "rm",
    "del",
    "format",
    "reg delete",
    "regedit",
    "netsh",
    "firewall",
];

/// Stateless classifier for dangerous actions
///
/// # Examples
///
/// ```
/// use sdk::action::Action;
/// use stride_engine::security_gate::SecurityGate;
///
/// let gate = SecurityGate::new();
///
/// assert!(gate.requires_confirmation(&Action::system("shutdown /s /t 0")));
/// assert!(gate.requires_confirmation(&Action::system("NETSH advfirewall reset")));
/// assert!(!gate.requires_confirmation(&Action::system("echo hello")));
///
/// // Only system commands are gated
/// assert!(!gate.requires_confirmation(&Action::keyboard_text("delete everything")));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityGate;

impl SecurityGate {
    /// Create a new SecurityGate
    pub fn new() -> Self {
        Self
    }

    /// Whether the action must be confirmed before dispatch
    pub fn requires_confirmation(&self, action: &Action) -> bool {
        self.matched_term(action).is_some()
    }

    /// The first deny-listed term found in the action, if it is gated
    pub fn matched_term(&self, action: &Action) -> Option<&'static str> {
        let ActionKind::System(params) = &action.kind else {
            return None;
        };

        let command = params.command.to_lowercase();
        DENY_TERMS.iter().copied().find(|term| command.contains(term))
    }
}
