//! Environment provisioning with scoped release.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::registry::EnvRegistry;
use super::types::{EnvHandle, EnvManager, EnvRequest, Environment, ProvisionError};

/// Creates and tears down environments through an [`EnvManager`], tracking
/// every live one in an [`EnvRegistry`].
#[derive(Clone)]
pub struct Provisioner {
  manager: Arc<dyn EnvManager>,
  registry: Arc<EnvRegistry>,
}

impl Provisioner {
  /// Provisioner backed by the process-wide registry.
  pub fn new(manager: Arc<dyn EnvManager>) -> Self {
    Self::with_registry(manager, EnvRegistry::global())
  }

  pub fn with_registry(manager: Arc<dyn EnvManager>, registry: Arc<EnvRegistry>) -> Self {
    Self { manager, registry }
  }

  pub fn registry(&self) -> &Arc<EnvRegistry> {
    &self.registry
  }

  /// Create an environment and install `request.packages` into it.
  ///
  /// If package installation fails, the half-built environment is torn down
  /// before the error is returned.
  pub async fn create(&self, request: &EnvRequest) -> Result<EnvLease, ProvisionError> {
    let name = request.name.as_str();
    self.registry.reserve(name)?;

    info!(
      env = %name,
      python = %request.interpreter_version,
      arch = %request.architecture(),
      manager = self.manager.kind(),
      "creating environment"
    );

    let handle = match self
      .manager
      .create_env(name, request.interpreter_version, request.flags)
      .await
    {
      Ok(handle) => handle,
      Err(e) => {
        self.registry.forget(name);
        error!(env = %name, error = %e, "environment creation failed");
        return Err(e);
      }
    };
    self.registry.activate(handle.clone());

    let mut lease = EnvLease {
      env: Environment {
        name: name.to_string(),
        interpreter_version: request.interpreter_version,
        architecture: request.architecture(),
        package_set: Vec::new(),
        handle,
      },
      provisioner: self.clone(),
      released: false,
    };

    if !request.packages.is_empty()
      && let Err(e) = lease.install(&request.packages).await
    {
      if let Err(teardown) = lease.release().await {
        debug!(env = %name, error = %teardown, "partial environment left for sweep");
      }
      return Err(e);
    }

    Ok(lease)
  }

  /// Run `f` inside a fresh environment, destroying it afterwards whatever
  /// `f` returns.
  ///
  /// A failed teardown wins over `f`'s result.
  pub async fn scoped<T, F>(&self, request: &EnvRequest, f: F) -> Result<T, ProvisionError>
  where
    F: AsyncFnOnce(&mut EnvLease) -> T,
  {
    let mut lease = self.create(request).await?;
    let result = f(&mut lease).await;
    lease.release().await?;
    Ok(result)
  }

  /// Tear down an environment by name.
  ///
  /// Idempotent: an unknown or already destroyed name is a no-op. An
  /// environment whose teardown fails goes back into the registry so the
  /// end-of-run sweep tries again.
  pub async fn destroy_named(&self, name: &str) -> Result<(), ProvisionError> {
    let Some(handle) = self.registry.take(name) else {
      debug!(env = %name, "destroy: not live, nothing to do");
      return Ok(());
    };
    if let Err(e) = self.teardown(&handle).await {
      self.registry.activate(handle);
      return Err(e);
    }
    Ok(())
  }

  /// Tear down an environment. Idempotent.
  pub async fn destroy(&self, env: &Environment) -> Result<(), ProvisionError> {
    self.destroy_named(&env.name).await
  }

  /// Tear down every live environment in the registry.
  ///
  /// Returns the failures; an empty list means the registry holds no live
  /// environments any more.
  pub async fn destroy_all(&self) -> Vec<(String, ProvisionError)> {
    let handles = self.registry.take_all();
    if !handles.is_empty() {
      warn!(count = handles.len(), "sweeping leftover environments");
    }

    let mut failures = Vec::new();
    for handle in handles {
      if let Err(e) = self.teardown(&handle).await {
        failures.push((handle.name.clone(), e));
      }
    }
    failures
  }

  async fn teardown(&self, handle: &EnvHandle) -> Result<(), ProvisionError> {
    info!(env = %handle.name, "destroying environment");
    self.manager.destroy(handle).await.inspect_err(|e| {
      error!(env = %handle.name, error = %e, "environment teardown failed");
    })
  }
}

/// A live environment that must be released.
///
/// Call [`EnvLease::release`] on every path. A lease dropped without release
/// stays registered and is reclaimed by [`Provisioner::destroy_all`].
pub struct EnvLease {
  env: Environment,
  provisioner: Provisioner,
  released: bool,
}

impl EnvLease {
  pub fn env(&self) -> &Environment {
    &self.env
  }

  /// Install more packages into the environment.
  pub async fn install(&mut self, package_specs: &[String]) -> Result<(), ProvisionError> {
    debug!(env = %self.env.name, packages = ?package_specs, "installing packages");
    self
      .provisioner
      .manager
      .install(&self.env.handle, package_specs)
      .await?;
    self.env.package_set.extend(package_specs.iter().cloned());
    Ok(())
  }

  /// Destroy the environment.
  ///
  /// On a teardown error the environment stays registered for
  /// [`Provisioner::destroy_all`] and the error is returned to the caller.
  pub async fn release(mut self) -> Result<(), ProvisionError> {
    self.released = true;
    self.provisioner.destroy(&self.env).await
  }
}

impl Drop for EnvLease {
  fn drop(&mut self) {
    if !self.released {
      warn!(env = %self.env.name, "environment lease dropped without release; left for sweep");
    }
  }
}
