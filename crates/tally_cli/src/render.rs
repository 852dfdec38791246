/// Turns successive snapshots of the displayed reply into terminal writes.
///
/// The reply usually grows by appending, so only the new suffix is printed.
/// Anything else (the placeholder appearing or being replaced) starts a
/// fresh line.
#[derive(Debug, Default)]
pub struct Renderer {
    shown: String,
}

impl Renderer {
    /// Text to write to move the terminal from the last snapshot to `next`.
    pub fn update(&mut self, next: &str) -> Option<String> {
        if next == self.shown {
            return None;
        }
        let out = if next.is_empty() {
            "\n".to_string()
        } else if let Some(suffix) = next.strip_prefix(self.shown.as_str()) {
            suffix.to_string()
        } else {
            format!("\n{}", next)
        };
        self.shown = next.to_string();
        Some(out)
    }

    pub fn has_output(&self) -> bool {
        !self.shown.is_empty()
    }
}
