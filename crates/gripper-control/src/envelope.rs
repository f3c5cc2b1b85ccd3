//! JSON 信封
//!
//! 入站：`{"command": "...", "value": ...}`
//! 出站：`{"type": "status" | "ack" | "error", ...}`

use crate::command::GripperCommand;
use crate::error::ControlError;
use crate::state::MotionSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 入站指令信封
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    #[serde(default)]
    pub value: Option<Value>,
}

impl CommandEnvelope {
    pub fn from_json(text: &str) -> Result<Self, ControlError> {
        serde_json::from_str(text).map_err(|e| ControlError::MalformedEnvelope(e.to_string()))
    }

    /// 解析为 [`GripperCommand`]
    ///
    /// 数值既可以是 JSON 数字，也可以是可解析为数字的字符串。
    pub fn to_command(&self) -> Result<GripperCommand, ControlError> {
        let value = match &self.value {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(v) => Some(v),
                Err(_) => return Err(self.invalid_value()),
            },
            Some(_) => return Err(self.invalid_value()),
        };
        GripperCommand::parse(&self.command, value)
    }

    fn invalid_value(&self) -> ControlError {
        // 先确认指令名有效，未知指令优先报告
        match GripperCommand::parse(&self.command, Some(0.0)) {
            Ok(cmd) => ControlError::InvalidValue {
                command: cmd.name(),
                value: self.value.as_ref().map(Value::to_string).unwrap_or_default(),
            },
            Err(e) => e,
        }
    }
}

/// 出站消息
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    Status { data: MotionSnapshot },
    Ack { command: String },
    Error { message: String },
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MotionRequest;

    #[test]
    fn test_envelope_without_value() {
        let env = CommandEnvelope::from_json(r#"{"command":"grasp"}"#).unwrap();
        assert_eq!(
            env.to_command().unwrap(),
            GripperCommand::Motion(MotionRequest::Grasp)
        );
    }

    #[test]
    fn test_envelope_numeric_and_string_value() {
        let env = CommandEnvelope::from_json(r#"{"command":"set_torque","value":1.5}"#).unwrap();
        assert_eq!(env.to_command().unwrap(), GripperCommand::SetTorque(1.5));

        let env =
            CommandEnvelope::from_json(r#"{"command":"set_position","value":"-3.4"}"#).unwrap();
        assert_eq!(env.to_command().unwrap(), GripperCommand::SetPosition(-3.4));
    }

    #[test]
    fn test_envelope_invalid_value() {
        let env =
            CommandEnvelope::from_json(r#"{"command":"set_position","value":"abc"}"#).unwrap();
        match env.to_command() {
            Err(ControlError::InvalidValue { command, value }) => {
                assert_eq!(command, "set_position");
                assert_eq!(value, "\"abc\"");
            },
            other => panic!("Expected InvalidValue, got {:?}", other),
        }

        let env = CommandEnvelope::from_json(r#"{"command":"dance","value":[1]}"#).unwrap();
        assert!(matches!(
            env.to_command(),
            Err(ControlError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            CommandEnvelope::from_json("{not json"),
            Err(ControlError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            CommandEnvelope::from_json(r#"{"value":1}"#),
            Err(ControlError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_outbound_messages() {
        let json = OutboundMessage::Ack {
            command: "grasp".into(),
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"type":"ack","command":"grasp"}"#);

        let json = OutboundMessage::Error {
            message: "Unknown command: x".into(),
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"type":"error","message":"Unknown command: x"}"#);
    }
}
