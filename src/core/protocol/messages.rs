// src/core/protocol/messages.rs

//! Wire message shapes for the newline-delimited JSON protocol. One `Request`
//! per connection line; responses carry a `status` field plus op-specific
//! payload.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Request {
    // --- NM-facing, from clients ---
    CLI_REGISTER {
        user: String,
    },
    CLI_DEREGISTER {
        #[serde(default)]
        user: String,
    },
    VIEW {},
    LIST_USERS {},
    VIEW_ROUTE {
        #[serde(default)]
        user: String,
    },
    READ_ROUTE {
        file: String,
    },
    WRITE_ROUTE {
        file: String,
    },
    STREAM_ROUTE {
        file: String,
    },
    CREATE {
        file: String,
        #[serde(default)]
        user: String,
    },
    DELETE {
        file: String,
        #[serde(default)]
        user: String,
    },
    INFO {
        file: String,
        #[serde(default)]
        user: String,
    },
    ADDACCESS {
        file: String,
        #[serde(default)]
        user: String,
        target_user: String,
        mode: String,
    },
    REMACCESS {
        file: String,
        #[serde(default)]
        user: String,
        target_user: String,
    },
    CREATEFOLDER {
        folder: String,
    },
    VIEWFOLDER {
        folder: String,
    },
    MOVE {
        file: String,
        folder: String,
    },
    CHECKPOINT {
        file: String,
        tag: String,
    },
    VIEWCHECKPOINT {
        file: String,
        tag: String,
    },
    REVERT {
        file: String,
        tag: String,
    },
    LISTCHECKPOINTS {
        file: String,
    },
    REQUESTACCESS {
        file: String,
        #[serde(default)]
        user: String,
        owner: String,
    },
    VIEWREQUESTS {
        #[serde(default)]
        user: String,
    },
    RESPONDREQUEST {
        file: String,
        requester: String,
        #[serde(default)]
        user: String,
        approve: bool,
    },

    // --- NM-facing, from SS ---
    SS_REGISTER {
        ss_id: String,
        ss_host: String,
        ss_client_port: u16,
        ss_nm_port: u16,
        #[serde(default)]
        files: Vec<String>,
    },
    SS_HEARTBEAT {
        ss_id: String,
    },

    // --- SS-facing, from clients ---
    READ {
        file: String,
        #[serde(default)]
        user: String,
    },
    WRITE_BEGIN {
        file: String,
        #[serde(default)]
        user: String,
        sentence_idx: usize,
    },
    WRITE_EDIT {
        word_index: usize,
        content: String,
    },
    WRITE_COMMIT {},
    UNDO {
        file: String,
        #[serde(default)]
        user: String,
    },
    STREAM {
        file: String,
        #[serde(default)]
        user: String,
    },

    // --- SS-facing, from NM ---
    NM_CREATE {
        file: String,
        owner: String,
    },
    NM_DELETE {
        file: String,
        #[serde(default)]
        user: String,
    },
    LIST {
        #[serde(default)]
        flags: String,
        #[serde(default)]
        user: String,
    },
    NM_ACCESS {
        file: String,
        cmd: String,
        mode: String,
        target_user: String,
        actor: String,
    },
}

/// A generic response envelope. `status` is always present; everything else
/// is populated only by the ops that produce it, so it is serialized with
/// `skip_serializing_if` to keep the wire text close to the original's ad
/// hoc payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    pub status: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ss_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ss_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_replica: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoints: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Response {
            status: 0,
            ..Default::default()
        }
    }

    pub fn err(status: i32) -> Self {
        Response {
            status,
            ..Default::default()
        }
    }

    pub fn msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    pub fn op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }
}

/// Per-word token pushed during `STREAM`, terminated by `{"op":"STOP"}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op")]
pub enum StreamMessage {
    TOK { w: String },
    STOP {},
}
