//! The closed set of side effects an action node may request.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendEmail,
    SendSms,
    SendWhatsapp,
    CreateTask,
    UpdateField,
    Webhook,
    AssignTo,
}

impl ActionType {
    /// Whether this action only delivers a message to someone.
    ///
    /// Notification nodes are restricted to these.
    pub fn is_messaging(self) -> bool {
        matches!(self, Self::SendEmail | Self::SendSms | Self::SendWhatsapp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SendEmail => "send_email",
            Self::SendSms => "send_sms",
            Self::SendWhatsapp => "send_whatsapp",
            Self::CreateTask => "create_task",
            Self::UpdateField => "update_field",
            Self::Webhook => "webhook",
            Self::AssignTo => "assign_to",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
