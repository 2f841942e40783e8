use std::fmt;

use crate::consts::{PASSWORD_ENV_VARS, USERNAME_ENV_VARS};

/// Index credentials, injected by the caller.
///
/// The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
  pub username: String,
  pub password: String,
}

impl Credentials {
  pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
    Self {
      username: username.into(),
      password: password.into(),
    }
  }

  /// Read credentials from the first set variables of
  /// [`USERNAME_ENV_VARS`] / [`PASSWORD_ENV_VARS`].
  ///
  /// An API token without a username is accepted and uploaded as `__token__`.
  pub fn from_env() -> Option<Self> {
    let lookup = |names: &[&str]| {
      names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    };

    let password = lookup(PASSWORD_ENV_VARS)?;
    let username = lookup(USERNAME_ENV_VARS).unwrap_or_else(|| "__token__".to_string());
    Some(Self { username, password })
  }
}

impl fmt::Debug for Credentials {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Credentials")
      .field("username", &self.username)
      .field("password", &"<redacted>")
      .finish()
  }
}
