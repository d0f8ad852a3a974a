use serde::{Deserialize, Serialize};

/// Signaling envelopes exchanged between clients and the relay.
///
/// One JSON object per WebSocket text frame. The relay reads only the tag
/// and the room id; `sdp` and `candidate` payloads pass through untouched.
/// Field names are camelCase on the wire (`roomId`, `sdpMid`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Register the sending connection under a room token
    Join {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    /// Unicast acknowledgment of a join
    Joined {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    /// Session description offer from the publisher
    Offer {
        #[serde(rename = "roomId")]
        room_id: String,
        sdp: String,
    },
    /// Session description answer from the viewer
    Answer {
        #[serde(rename = "roomId")]
        room_id: String,
        sdp: String,
    },
    /// Discovered network candidate, either direction
    Ice {
        #[serde(rename = "roomId")]
        room_id: String,
        candidate: CandidateInit,
    },
}

impl Envelope {
    /// The room this envelope routes to.
    pub fn room_id(&self) -> &str {
        match self {
            Envelope::Join { room_id }
            | Envelope::Joined { room_id }
            | Envelope::Offer { room_id, .. }
            | Envelope::Answer { room_id, .. }
            | Envelope::Ice { room_id, .. } => room_id,
        }
    }
}

/// ICE candidate payload, matching the shape browsers and webrtc-rs produce
/// from `RTCIceCandidate.toJSON()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateInit {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_wire_format() {
        let msg = Envelope::Join {
            room_id: "abc123".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"join","roomId":"abc123"}"#);
    }

    #[test]
    fn joined_roundtrip() {
        let msg = Envelope::Joined {
            room_id: "r1".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"joined""#));
        let parsed: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn offer_roundtrip() {
        let msg = Envelope::Offer {
            room_id: "abc123".to_string(),
            sdp: "v=0\r\n...".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"offer""#));
        assert!(json.contains(r#""roomId":"abc123""#));
        match serde_json::from_str::<Envelope>(&json).unwrap() {
            Envelope::Offer { sdp, .. } => assert_eq!(sdp, "v=0\r\n..."),
            other => panic!("expected Offer, got {other:?}"),
        }
    }

    #[test]
    fn ice_candidate_camel_case_fields() {
        let msg = Envelope::Ice {
            room_id: "r1".to_string(),
            candidate: CandidateInit {
                candidate: "candidate:1 1 UDP 2130706431 192.168.1.1 50000 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        // Must be camelCase, matching the browser's RTCIceCandidate JSON
        assert!(json.contains(r#""sdpMid":"0""#));
        assert!(json.contains(r#""sdpMLineIndex":0"#));
        assert!(!json.contains("sdp_mid"));
    }

    #[test]
    fn ice_candidate_from_browser_format() {
        let browser_json = r#"{
            "type": "ice",
            "roomId": "abc123",
            "candidate": {
                "candidate": "candidate:1 1 UDP 2130706431 192.168.1.1 50000 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0
            }
        }"#;
        match serde_json::from_str::<Envelope>(browser_json).unwrap() {
            Envelope::Ice { room_id, candidate } => {
                assert_eq!(room_id, "abc123");
                assert!(candidate.candidate.starts_with("candidate:1"));
                assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
                assert_eq!(candidate.sdp_mline_index, Some(0));
            }
            other => panic!("expected Ice, got {other:?}"),
        }
    }

    #[test]
    fn candidate_optional_fields_omitted() {
        let init = CandidateInit {
            candidate: "candidate:2 1 UDP 1694498815 203.0.113.9 50001 typ srflx".to_string(),
            sdp_mid: None,
            sdp_mline_index: None,
        };
        let json = serde_json::to_string(&init).unwrap();
        assert!(!json.contains("sdpMid"));
        assert!(!json.contains("sdpMLineIndex"));
        let parsed: CandidateInit = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, init);
    }

    #[test]
    fn room_id_accessor_covers_all_variants() {
        let variants = [
            Envelope::Join {
                room_id: "r".into(),
            },
            Envelope::Joined {
                room_id: "r".into(),
            },
            Envelope::Offer {
                room_id: "r".into(),
                sdp: String::new(),
            },
            Envelope::Answer {
                room_id: "r".into(),
                sdp: String::new(),
            },
            Envelope::Ice {
                room_id: "r".into(),
                candidate: CandidateInit {
                    candidate: String::new(),
                    sdp_mid: None,
                    sdp_mline_index: None,
                },
            },
        ];
        for v in &variants {
            assert_eq!(v.room_id(), "r");
        }
    }

    #[test]
    fn unknown_type_rejected() {
        let err = serde_json::from_str::<Envelope>(r#"{"type":"hangup","roomId":"r1"}"#);
        assert!(err.is_err());
    }
}
