use std::fmt::Display;

/// Marks a side effect whose failure is deliberately discarded.
///
/// `send_reaction(..).await.best_effort("reaction")` keeps the swallow
/// visible at the call site and logs what was dropped.
pub trait BestEffort<T> {
    fn best_effort(self, what: &str) -> Option<T>;
}

impl<T, E> BestEffort<T> for Result<T, E>
where
    E: Display,
{
    fn best_effort(self, what: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::debug!(what, error = %error, "best-effort side effect failed");
                None
            }
        }
    }
}
