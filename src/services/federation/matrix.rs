//! Matrix `m.room.message` events for posts.

use serde_json::{Value, json};

use super::{FederationBridge, escape_html};
use crate::models::{post, user};

pub const MESSAGE_EVENT: &str = "m.room.message";
pub const HTML_FORMAT: &str = "org.matrix.custom.html";

pub struct MatrixEventMapper<'a> {
    bridge: &'a FederationBridge,
}

impl<'a> MatrixEventMapper<'a> {
    pub fn new(bridge: &'a FederationBridge) -> Self {
        Self { bridge }
    }

    /// `@<user id>:<server name>`
    pub fn user_id(&self, user: &user::Model) -> String {
        format!("@{}:{}", user.id, self.bridge.matrix_server_name())
    }

    pub fn message(&self, post: &post::Model, author: &user::Model) -> Value {
        let sent_at = post.published_at.unwrap_or(post.created_at);
        json!({
            "type": MESSAGE_EVENT,
            "sender": self.user_id(author),
            "origin_server_ts": sent_at.timestamp_millis(),
            "content": {
                "msgtype": "m.text",
                "body": post.content,
                "format": HTML_FORMAT,
                "formatted_body": formatted_body(&post.content),
            },
        })
    }
}

/// HTML-escaped text with line breaks kept as `<br>`.
fn formatted_body(text: &str) -> String {
    escape_html(text).replace("\r\n", "<br>").replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::super::tests::{bridge, fixtures};
    use super::*;

    #[test]
    fn post_maps_to_text_message() {
        let (_, user, post) = fixtures();
        let bridge = bridge();
        let event = MatrixEventMapper::new(&bridge).message(&post, &user);

        assert_eq!(event["type"], MESSAGE_EVENT);
        assert_eq!(event["sender"], format!("@{}:matrix.alumni.example", user.id));
        assert_eq!(
            event["origin_server_ts"],
            post.published_at.unwrap().timestamp_millis()
        );
        assert_eq!(event["content"]["msgtype"], "m.text");
        assert_eq!(event["content"]["body"], "Hello <world> & friends");
        assert_eq!(event["content"]["format"], HTML_FORMAT);
        assert_eq!(
            event["content"]["formatted_body"],
            "Hello &lt;world&gt; &amp; friends"
        );
    }

    #[test]
    fn line_breaks_survive_formatting() {
        assert_eq!(formatted_body("a\nb\r\nc"), "a<br>b<br>c");
        assert_eq!(formatted_body("\"quoted\" 'text'"), "&quot;quoted&quot; &#39;text&#39;");
    }
}
