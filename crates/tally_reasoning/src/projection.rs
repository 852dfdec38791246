//! User-visible reply derived from the raw stream buffer.

use crate::function_call::is_function_call;
use tally_core::config::CallDetection;
use tokio::sync::watch;

/// Pure derivation of the displayed reply.
///
/// Call syntax never reaches the display: while the buffer holds a function
/// call, the placeholder is shown instead.
pub fn project(raw: &str, detection: CallDetection, placeholder: &str) -> String {
    if is_function_call(raw, detection) {
        placeholder.to_string()
    } else {
        raw.to_string()
    }
}

/// Publishes the projection of the raw buffer to any number of observers.
pub struct ReplyProjection {
    tx: watch::Sender<String>,
    detection: CallDetection,
    placeholder: String,
}

impl ReplyProjection {
    pub fn new(detection: CallDetection, placeholder: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(String::new());
        Self {
            tx,
            detection,
            placeholder: placeholder.into(),
        }
    }

    /// Re-derive from `raw`. Observers are only woken when the text changes.
    /// Returns whether `raw` is a function call.
    pub fn refresh(&self, raw: &str) -> bool {
        let display = project(raw, self.detection, &self.placeholder);
        self.tx.send_if_modified(|current| {
            if *current == display {
                false
            } else {
                *current = display;
                true
            }
        });
        is_function_call(raw, self.detection)
    }

    pub fn current(&self) -> String {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(project("Hello", CallDetection::Anywhere, "..."), "Hello");
        assert_eq!(project("", CallDetection::Anywhere, "..."), "");
    }

    #[test]
    fn test_call_shows_placeholder() {
        let raw = r#"<function>{"name":"get_todo_list""#;
        assert_eq!(project(raw, CallDetection::Anywhere, "..."), "...");
    }

    #[test]
    fn test_prefix_mode_shows_text_with_inline_marker() {
        let raw = "see <function>";
        assert_eq!(project(raw, CallDetection::Prefix, "..."), raw);
    }

    #[tokio::test]
    async fn test_refresh_notifies_only_on_change() {
        let projection = ReplyProjection::new(CallDetection::Anywhere, "...");
        let mut rx = projection.subscribe();

        assert!(!projection.refresh("Hel"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), "Hel");

        assert!(projection.refresh("<function>{"));
        assert_eq!(*rx.borrow_and_update(), "...");

        // Still a call: display unchanged, nobody woken
        assert!(projection.refresh("<function>{\"name\""));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(projection.current(), "...");
    }
}
