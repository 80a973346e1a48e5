//! Defines the [`Termination`] trait.

use std::{fmt::Debug, process};

/// Extends [`std::process::Termination`] with a way to inspect the result.
///
/// [`crate::gui::run`] never returns to `main`, so it has to exit the process itself, using this
/// trait to pick the exit status.
pub trait Termination: process::Termination {
    fn is_success(&self) -> bool;
}

impl Termination for () {
    fn is_success(&self) -> bool {
        true
    }
}

impl<T: Termination, E: Debug> Termination for Result<T, E> {
    fn is_success(&self) -> bool {
        match self {
            Ok(term) => term.is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success() {
        assert!(().is_success());
        assert!(Ok::<(), anyhow::Error>(()).is_success());
        assert!(!Err::<(), _>(anyhow::anyhow!("camera unplugged")).is_success());
    }
}
