//! Contract with the surrounding application
//!
//! The pipeline decides *when* to show a loading indicator, display a
//! message or send the user back to the login screen; the application
//! decides *how*.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Success,
    Warning,
    Error,
}

pub trait SessionHooks: Send + Sync {
    /// A request with `show_loading` started.
    fn loading_started(&self, reason: &str);

    /// The same request settled, successfully or not.
    fn loading_finished(&self, reason: &str);

    /// User-visible notification.
    fn show_message(&self, level: MessageLevel, message: &str);

    /// Whether the application already shows the unauthenticated entry point.
    fn at_entry_point(&self) -> bool;

    /// Navigate to the unauthenticated entry point.
    fn go_to_entry_point(&self);
}
