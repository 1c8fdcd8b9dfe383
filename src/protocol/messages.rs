//! Control API messages
//!
//! Every exchange is one request envelope answered by one reply with the same
//! id. Request and response bodies are adjacently tagged:
//! `{"type": "ReceiveStart", "data": {"port": "9000"}}`.

use serde::{Deserialize, Serialize};

use crate::audio::StreamFormat;
use crate::error::{Error, ErrorCode};

/// Request wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub id: u64,
    pub body: T,
}

/// Reply wrapper, matched to its request by `id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply<T> {
    pub id: u64,
    pub result: ControlResult<T>,
}

/// `{"ok": ...}` or `{"err": {"code": ..., "message": ...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlResult<T> {
    Ok(T),
    Err(RemoteError),
}

impl<T> From<crate::Result<T>> for ControlResult<T> {
    fn from(result: crate::Result<T>) -> Self {
        match result {
            Ok(value) => ControlResult::Ok(value),
            Err(e) => ControlResult::Err(RemoteError::from(&e)),
        }
    }
}

impl<T> ControlResult<T> {
    pub fn into_result(self) -> crate::Result<T> {
        match self {
            ControlResult::Ok(value) => Ok(value),
            ControlResult::Err(e) => Err(e.into()),
        }
    }
}

/// Error as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&Error> for RemoteError {
    fn from(err: &Error) -> Self {
        let message = match err {
            // Avoid nesting "Remote busy: ..." prefixes when relaying
            Error::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            code: err.code(),
            message,
        }
    }
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        Error::Remote {
            code: err.code,
            message: err.message,
        }
    }
}

/// Diagnostic snapshot of a player node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Ports with a live receive session
    pub ports: Vec<String>,
    /// Known storage ids
    pub storages: Vec<String>,
    /// Devices with a live playback session
    pub devices: Vec<String>,
}

/// Diagnostic snapshot of a recorder node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderState {
    /// Devices with a live capture session
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PlayerRequest {
    ReceiveStart {
        port: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        storage_id: Option<String>,
    },
    ReceiveStop {
        port: String,
    },
    Play {
        storage_id: String,
        device: String,
        #[serde(flatten)]
        format: StreamFormat,
    },
    Stop {
        device: String,
    },
    ClearStorage {
        storage_id: String,
    },
    State,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PlayerResponse {
    Ack,
    Storage { storage_id: String },
    State(PlayerState),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RecorderRequest {
    Start {
        device: String,
        #[serde(flatten)]
        format: StreamFormat,
        dest_addr: String,
    },
    Stop {
        device: String,
    },
    State,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RecorderResponse {
    Ack,
    State(RecorderState),
}

/// Result of starting file playback on a player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePlayback {
    pub storage_id: String,
    pub format: StreamFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrchestratorRequest {
    FilePlay {
        file: String,
        player_node: String,
        player_port: String,
        device: String,
    },
    FileStop {
        player_node: String,
        player_port: String,
        device: String,
        storage_id: String,
    },
    StartFileRecording {
        recorder_node: String,
        device: String,
        #[serde(flatten)]
        format: StreamFormat,
        receive_port: String,
        file: String,
    },
    StopFileRecording {
        recorder_node: String,
        device: String,
        receive_port: String,
    },
    PlayFromRecorder {
        player_node: String,
        player_port: String,
        player_device: String,
        #[serde(flatten)]
        format: StreamFormat,
        recorder_node: String,
        recorder_device: String,
    },
    StopFromRecorder {
        player_node: String,
        player_port: String,
        player_device: String,
        storage_id: String,
        recorder_node: String,
        recorder_device: String,
    },
    PlayerState {
        node: String,
    },
    RecorderState {
        node: String,
    },
    PlayerReceiveStart {
        node: String,
        port: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        storage_id: Option<String>,
    },
    PlayerReceiveStop {
        node: String,
        port: String,
    },
    PlayerPlay {
        node: String,
        storage_id: String,
        device: String,
        #[serde(flatten)]
        format: StreamFormat,
    },
    PlayerStop {
        node: String,
        device: String,
    },
    PlayerClearStorage {
        node: String,
        storage_id: String,
    },
    RecorderStart {
        node: String,
        device: String,
        #[serde(flatten)]
        format: StreamFormat,
        dest_addr: String,
    },
    RecorderStop {
        node: String,
        device: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrchestratorResponse {
    Ack,
    FilePlay(FilePlayback),
    Storage { storage_id: String },
    PlayerState(PlayerState),
    RecorderState(RecorderState),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let msg = Envelope {
            id: 7,
            body: PlayerRequest::Play {
                storage_id: "b1".into(),
                device: "dev0".into(),
                format: StreamFormat::new(2, 44100),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["body"]["type"], "Play");
        assert_eq!(json["body"]["data"]["channels"], 2);
        assert_eq!(json["body"]["data"]["rate"], 44100);
        assert_eq!(json["body"]["data"]["bits_per_sample"], 16);
    }

    #[test]
    fn test_optional_fields_may_be_omitted() {
        let req: PlayerRequest =
            serde_json::from_str(r#"{"type":"ReceiveStart","data":{"port":"9000"}}"#).unwrap();
        assert_eq!(
            req,
            PlayerRequest::ReceiveStart {
                port: "9000".into(),
                storage_id: None
            }
        );

        let req: RecorderRequest = serde_json::from_str(
            r#"{"type":"Start","data":{"device":"hw:1","channels":1,"rate":48000,"dest_addr":"10.0.0.2:9000"}}"#,
        )
        .unwrap();
        match req {
            RecorderRequest::Start { format, .. } => assert_eq!(format.bits_per_sample, 16),
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_direct_node_request_shape() {
        let req: OrchestratorRequest = serde_json::from_str(
            r#"{"type":"PlayerPlay","data":{"node":"10.0.0.3","storage_id":"b1","device":"hw:0,0","channels":2,"rate":44100}}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            OrchestratorRequest::PlayerPlay {
                node: "10.0.0.3".into(),
                storage_id: "b1".into(),
                device: "hw:0,0".into(),
                format: StreamFormat::new(2, 44100),
            }
        );

        let json = serde_json::to_value(OrchestratorRequest::PlayerReceiveStart {
            node: "10.0.0.3".into(),
            port: "9000".into(),
            storage_id: None,
        })
        .unwrap();
        assert_eq!(json["type"], "PlayerReceiveStart");
        assert!(json["data"].get("storage_id").is_none());
    }

    #[test]
    fn test_unit_variant_round_trip() {
        let json = serde_json::to_string(&PlayerRequest::State).unwrap();
        let parsed: PlayerRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, PlayerRequest::State);
    }

    #[test]
    fn test_error_reply_shape() {
        let reply: Reply<PlayerResponse> = Reply {
            id: 1,
            result: ControlResult::from(crate::Result::<PlayerResponse>::Err(Error::not_found(
                crate::error::ResourceKind::Storage,
                "b1",
            ))),
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["result"]["err"]["code"], "resource_not_found");
        assert_eq!(json["result"]["err"]["message"], "storage b1 not found");

        let err = reply.result.into_result().unwrap_err();
        assert!(err.is_not_found());
    }
}
