//! Wire messages exchanged over the postMessage-style transport.
//!
//! Every message is a tagged variant discriminated by `type`. Decoding
//! is exhaustive: an unknown tag or malformed shape is a decode error,
//! which the receiving side logs and discards (protocol errors never
//! throw past the boundary).

use crate::review::SpecReview;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

/// Sandbox renderer lifecycle, as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatusKind {
    Ready,
    Rendered,
    Error,
}

/// Host page lifecycle, as reported to the embedding caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatusKind {
    Ready,
    Compiling,
    Rendering,
    Rendered,
    Error,
    Loading,
}

/// Options forwarded with a proxied fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<(String, String)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// A runtime dependency the sandbox page must load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub url: String,
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Script,
    Style,
}

/// Toolbar control payload: every field independently optional and
/// applied only if present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolbarControl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_source: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_tweak_button: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_download_button: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_restart_button: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_download_dialog: Option<bool>,
}

/// Messages the host sends into the sandbox iframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SandboxInbound {
    #[serde(rename_all = "camelCase")]
    SandboxRender {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        markdown: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SandboxApproval {
        transaction_id: u64,
        specs: Vec<SpecReview>,
    },
    #[serde(rename_all = "camelCase")]
    GuardedFetchResponse {
        request_id: u64,
        status: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Messages the sandboxed renderer sends out to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SandboxOutbound {
    /// Approval request: the sole path by which document-declared
    /// executable content may become live.
    #[serde(rename_all = "camelCase")]
    SandboxedPreHydrateMessage {
        transaction_id: u64,
        specs: Vec<SpecReview>,
    },
    #[serde(rename_all = "camelCase")]
    SandboxStatus {
        status: SandboxStatusKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GuardedFetchRequest {
        request_id: u64,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<FetchOptions>,
    },
}

/// Messages external callers (extension host, editor) send to the host
/// page. Editor messages carry `sender` so a page embedding both sides
/// can filter out its own traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostInbound {
    #[serde(rename_all = "camelCase")]
    HostRenderRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        markdown: Option<String>,
        /// Raw JSON; the listener decodes it so that a malformed
        /// document becomes a document-level error, not a dropped
        /// message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interactive_document: Option<Value>,
    },
    HostToolbarControl(ToolbarControl),
    #[serde(rename_all = "camelCase")]
    EditorReady { sender: SmolStr },
    #[serde(rename_all = "camelCase")]
    EditorPage { sender: SmolStr, page: Value },
    #[serde(rename_all = "camelCase")]
    EditorGetOfflineDependencies { sender: SmolStr },
    #[serde(rename_all = "camelCase")]
    EditorSetOfflineDependencies {
        sender: SmolStr,
        offline_deps: Vec<Dependency>,
    },
}

/// Messages the host page emits to external callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostOutbound {
    #[serde(rename_all = "camelCase")]
    HostStatus {
        host_status: HostStatusKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    EditorSetOfflineDependencies {
        sender: SmolStr,
        offline_deps: Vec<Dependency>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_match_the_protocol_names() {
        let msg = SandboxOutbound::SandboxedPreHydrateMessage {
            transaction_id: 3,
            specs: vec![],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "sandboxedPreHydrateMessage");
        assert_eq!(value["transactionId"], 3);

        let approval: SandboxInbound = serde_json::from_value(json!({
            "type": "sandboxApproval",
            "transactionId": 3,
            "specs": []
        }))
        .unwrap();
        assert!(matches!(
            approval,
            SandboxInbound::SandboxApproval {
                transaction_id: 3,
                ..
            }
        ));
    }

    #[test]
    fn unknown_tags_are_decode_errors() {
        let result: Result<SandboxInbound, _> =
            serde_json::from_value(json!({"type": "sandboxEval", "code": "alert(1)"}));
        assert!(result.is_err());
    }

    #[test]
    fn toolbar_fields_are_all_optional() {
        let msg: HostInbound = serde_json::from_value(json!({
            "type": "hostToolbarControl",
            "setFilename": "report.idoc.md"
        }))
        .unwrap();
        match msg {
            HostInbound::HostToolbarControl(control) => {
                assert_eq!(control.set_filename.as_deref(), Some("report.idoc.md"));
                assert!(control.show_source.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
