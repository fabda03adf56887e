use anyhow::Result;
use session::Navigator;
use std::sync::Mutex;

/// Navigator for a terminal session: "redirecting" to the login page means
/// telling the user to sign in again.
pub struct TerminalNavigator {
    location: Mutex<String>,
}

impl TerminalNavigator {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: Mutex::new(location.into()),
        }
    }
}

impl Navigator for TerminalNavigator {
    fn current_location(&self) -> Result<String> {
        Ok(self.location.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn redirect(&self, path: &str) -> Result<()> {
        eprintln!(
            "Session expired. Sign in at {} and run `exam-console import-tokens`.",
            path
        );
        *self.location.lock().unwrap_or_else(|e| e.into_inner()) = path.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_updates_location() {
        let navigator = TerminalNavigator::new("/exams");
        navigator.redirect("/login").unwrap();
        assert_eq!(navigator.current_location().unwrap(), "/login");
    }
}
