// Feed names and topic layout shared with the matrix firmware

pub const COMMAND_FEED: &str = "matrix_command";
pub const DEBUG_FEED: &str = "matrix_debug";

// MQTT topic for a feed. Adafruit IO scopes feeds under the account name;
// a plain broker uses the bare feed name.
pub fn feed_topic(username: Option<&str>, feed: &str) -> String {
    match username {
        Some(user) if !user.is_empty() => format!("{}/feeds/{}", user, feed),
        _ => feed.to_string(),
    }
}

pub fn command_topic(username: Option<&str>) -> String { feed_topic(username, COMMAND_FEED) }
pub fn debug_topic(username: Option<&str>) -> String { feed_topic(username, DEBUG_FEED) }

pub fn feed_name(topic: &str) -> &str {
    match topic.split_once("/feeds/") {
        Some((_, feed)) => feed,
        None => topic,
    }
}
