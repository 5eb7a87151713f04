//! Wire protocol.
//!
//! Every message is one WebSocket text frame holding a JSON object:
//!
//! ```text
//! {"type": <kind code>, "user_id": <id>?, "body": <kind-specific object>?}
//! ```
//!
//! The server writes the originating player's id at the top level; older
//! builds put it inside `body`. Decoding accepts either, top level first.
//!
//! Unknown kinds are not errors: [`decode_server_frame`] returns `Ok(None)`
//! and the caller drops the frame.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    event::{ChatLine, ClientEvent, Damage, Direction, EventKind, Movement, ServerEvent},
    math::Rect,
};

/// Path segment appended to the serving origin to reach the event channel.
pub const CONNECT_PATH: &str = "connect";

/// Query parameter carrying the auth token.
pub const AUTH_PARAM: &str = "auth";

/// Raw frame envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireFrame {
    #[serde(rename = "type")]
    pub kind: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Body shared by move and damage broadcasts.
#[derive(Debug, Default, Deserialize)]
struct PositionBody {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    dimensions: Option<Rect>,
    #[serde(default)]
    direction: Option<Direction>,
    #[serde(default)]
    health: Option<i32>,
    #[serde(default)]
    seq: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    msg: String,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LeaveBody {
    #[serde(default)]
    user_id: Option<String>,
}

/// Encodes an outbound event as a text frame.
pub fn encode_client_event(event: &ClientEvent) -> anyhow::Result<String> {
    let body = match event {
        ClientEvent::Move { direction } => Some(serde_json::json!({ "direction": direction })),
        ClientEvent::Attack => None,
        ClientEvent::Chat { msg } => Some(serde_json::json!({ "msg": msg })),
    };
    let frame = WireFrame {
        kind: event.kind().code(),
        user_id: None,
        body,
    };
    serde_json::to_string(&frame).context("serialize client event")
}

/// Decodes one inbound text frame.
///
/// Returns `Ok(None)` for frames whose kind this client does not know.
pub fn decode_server_frame(text: &str) -> anyhow::Result<Option<ServerEvent>> {
    let frame: WireFrame = serde_json::from_str(text).context("parse frame")?;
    let Some(kind) = EventKind::from_code(frame.kind) else {
        return Ok(None);
    };
    let top_user = frame.user_id.filter(|id| !id.is_empty());

    let event = match kind {
        EventKind::Move => {
            let body: PositionBody = parse_body(frame.body, "move")?;
            let Some(user_id) = top_user.or(non_empty(body.user_id)) else {
                bail!("move frame without user_id");
            };
            let Some(dimensions) = body.dimensions else {
                bail!("move frame for {user_id} without dimensions");
            };
            ServerEvent::Move(Movement {
                user_id,
                dimensions,
                direction: body.direction,
                seq: body.seq,
            })
        }
        EventKind::Attack => ServerEvent::Attack { user_id: top_user },
        EventKind::Damage => {
            let body: PositionBody = parse_body(frame.body, "damage")?;
            let Some(user_id) = top_user.or(non_empty(body.user_id)) else {
                bail!("damage frame without user_id");
            };
            ServerEvent::Damage(Damage {
                user_id,
                dimensions: body.dimensions,
                health: body.health,
                seq: body.seq,
            })
        }
        EventKind::Chat => {
            let Some(body) = frame.body.filter(|b| !b.is_null()) else {
                bail!("chat frame without body");
            };
            let body: ChatBody = serde_json::from_value(body).context("parse chat body")?;
            ServerEvent::Chat(ChatLine {
                user_id: top_user.or(non_empty(body.user_id)),
                msg: body.msg,
            })
        }
        EventKind::Leave => {
            let body: LeaveBody = parse_body(frame.body, "leave")?;
            let Some(user_id) = top_user.or(non_empty(body.user_id)) else {
                bail!("leave frame without user_id");
            };
            ServerEvent::Leave { user_id }
        }
    };
    Ok(Some(event))
}

fn parse_body<T: for<'de> Deserialize<'de> + Default>(
    body: Option<Value>,
    what: &str,
) -> anyhow::Result<T> {
    match body {
        None | Some(Value::Null) => Ok(T::default()),
        Some(v) => serde_json::from_value(v).with_context(|| format!("parse {what} body")),
    }
}

fn non_empty(id: Option<String>) -> Option<String> {
    id.filter(|id| !id.is_empty())
}

/// Derives the event channel URL from the origin the client was served from.
///
/// `http://host:3000/game/` becomes `ws://host:3000/game/connect?auth=<token>`;
/// `https` maps to `wss`. A path without a trailing slash gets one.
pub fn connect_url(origin: &str, token: &str) -> anyhow::Result<String> {
    let origin = origin.trim();
    let (scheme, rest) = if let Some(rest) = origin.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = origin.strip_prefix("http://") {
        ("ws", rest)
    } else if let Some(rest) = origin.strip_prefix("wss://") {
        ("wss", rest)
    } else if let Some(rest) = origin.strip_prefix("ws://") {
        ("ws", rest)
    } else {
        bail!("origin {origin:?} must start with http://, https://, ws:// or wss://");
    };

    // Query and fragment of the page are not part of the channel address.
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let (host, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, "/"),
    };
    if host.is_empty() {
        bail!("origin {origin:?} has no host");
    }
    let sep = if path.ends_with('/') { "" } else { "/" };

    Ok(format!(
        "{scheme}://{host}{path}{sep}{CONNECT_PATH}?{AUTH_PARAM}={}",
        percent_encode(token)
    ))
}

/// Percent-encodes everything outside the URL unreserved set.
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_frames_match_wire_format() {
        let mv = encode_client_event(&ClientEvent::Move {
            direction: Direction::South,
        })
        .unwrap();
        assert_eq!(mv, r#"{"type":0,"body":{"direction":2}}"#);

        let attack = encode_client_event(&ClientEvent::Attack).unwrap();
        assert_eq!(attack, r#"{"type":1}"#);

        let chat = encode_client_event(&ClientEvent::Chat { msg: "hi".into() }).unwrap();
        assert_eq!(chat, r#"{"type":3,"body":{"msg":"hi"}}"#);
    }

    #[test]
    fn move_with_user_id_in_body() {
        let ev = decode_server_frame(r#"{"type":0,"body":{"user_id":"p2","dimensions":{"x":5,"y":7}}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            ev,
            ServerEvent::Move(Movement {
                user_id: "p2".into(),
                dimensions: Rect::new(5.0, 7.0, 0.0, 0.0),
                direction: None,
                seq: None,
            })
        );
    }

    #[test]
    fn move_as_broadcast_by_server() {
        let text = r#"{"type":0,"user_id":"abc","body":{"direction":1,"dimensions":{"x":17,"y":3,"width":16,"height":32}}}"#;
        let ev = decode_server_frame(text).unwrap().unwrap();
        let ServerEvent::Move(m) = ev else {
            panic!("expected move, got {ev:?}");
        };
        assert_eq!(m.user_id, "abc");
        assert_eq!(m.dimensions, Rect::player_at(17.0, 3.0));
        assert_eq!(m.direction, Some(Direction::East));
    }

    #[test]
    fn damage_with_health_only() {
        let text = r#"{"type":2,"user_id":"abc","body":{"health":5}}"#;
        let ev = decode_server_frame(text).unwrap().unwrap();
        assert_eq!(
            ev,
            ServerEvent::Damage(Damage {
                user_id: "abc".into(),
                dimensions: None,
                health: Some(5),
                seq: None,
            })
        );
    }

    #[test]
    fn chat_with_and_without_sender() {
        let ev = decode_server_frame(r#"{"type":3,"body":{"msg":"hi"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            ev,
            ServerEvent::Chat(ChatLine {
                user_id: None,
                msg: "hi".into()
            })
        );

        // Server fills user_id with "" for system messages.
        let ev = decode_server_frame(r#"{"type":3,"user_id":"","body":{"msg":"x","user_id":"p9"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(ev.user_id(), Some("p9"));
    }

    #[test]
    fn leave_and_attack() {
        let ev = decode_server_frame(r#"{"type":4,"user_id":"gone"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(ev, ServerEvent::Leave { user_id: "gone".into() });

        let ev = decode_server_frame(r#"{"type":1,"user_id":"p1","body":null}"#)
            .unwrap()
            .unwrap();
        assert_eq!(ev.kind(), EventKind::Attack);
        assert_eq!(ev.user_id(), Some("p1"));
    }

    #[test]
    fn unknown_kind_is_ignored_not_fatal() {
        assert_eq!(decode_server_frame(r#"{"type":42,"body":{}}"#).unwrap(), None);
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(decode_server_frame("not json").is_err());
        assert!(decode_server_frame(r#"{"body":{}}"#).is_err());
        assert!(decode_server_frame(r#"{"type":0,"body":{"dimensions":{"x":1,"y":1}}}"#).is_err());
        assert!(decode_server_frame(r#"{"type":0,"user_id":"p","body":{}}"#).is_err());
        assert!(decode_server_frame(r#"{"type":3}"#).is_err());
    }

    #[test]
    fn connect_url_from_origin() {
        assert_eq!(
            connect_url("http://10.0.0.1:3000/", "tok").unwrap(),
            "ws://10.0.0.1:3000/connect?auth=tok"
        );
        assert_eq!(
            connect_url("https://play.example.com/game", "a.b-c_d").unwrap(),
            "wss://play.example.com/game/connect?auth=a.b-c_d"
        );
        assert_eq!(
            connect_url("http://localhost:3000", "t").unwrap(),
            "ws://localhost:3000/connect?auth=t"
        );
        assert_eq!(
            connect_url("http://host/app/?lang=en#top", "x y").unwrap(),
            "ws://host/app/connect?auth=x%20y"
        );
    }

    #[test]
    fn connect_url_rejects_bad_origins() {
        assert!(connect_url("ftp://host/", "t").is_err());
        assert!(connect_url("http:///path", "t").is_err());
        assert!(connect_url("host:3000", "t").is_err());
    }
}
