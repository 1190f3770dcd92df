//! Ordered registry of loaded handlers.
//!
//! [`HandlerRegistry::build`] acquires and stages every descriptor in
//! declaration order. The first failure aborts construction; no partial
//! registry is returned. Dispatch iterates the registry in the same order.

use conductor_config::HandlerDescriptor;
use tracing::info;

use crate::acquire::Acquirer;
use crate::command::CommandRunner;
use crate::error::RegistryError;
use crate::loader::{LoadedHandler, Stager};

const REGISTRY_TARGET: &str = "conductor_handlers::registry";

/// Handlers in declaration order, unique by name.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: Vec<LoadedHandler>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires and stages each descriptor, in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError`] encountered.
    pub fn build<R: CommandRunner>(
        descriptors: &[HandlerDescriptor],
        acquirer: &mut Acquirer<'_, R>,
        stager: &Stager,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            let name = descriptor.name();
            let source = acquirer
                .resolve(descriptor)
                .map_err(|source| RegistryError::Acquisition {
                    name: name.to_owned(),
                    source,
                })?;
            let unit = stager.stage(&source, name)?;
            registry.register(LoadedHandler::new(descriptor.clone(), unit))?;
        }
        info!(
            target: REGISTRY_TARGET,
            handlers = registry.len(),
            "handler registry built"
        );
        Ok(registry)
    }

    /// Appends a handler.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is already taken.
    pub fn register(&mut self, handler: LoadedHandler) -> Result<(), RegistryError> {
        if self.get(handler.name()).is_some() {
            return Err(RegistryError::Duplicate {
                name: handler.name().to_owned(),
            });
        }
        self.handlers.push(handler);
        Ok(())
    }

    /// Looks up a handler by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LoadedHandler> {
        self.handlers.iter().find(|handler| handler.name() == name)
    }

    /// Handlers in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &LoadedHandler> {
        self.handlers.iter()
    }

    /// Handler names in dispatch order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(LoadedHandler::name).collect()
    }

    /// Number of registered handlers.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` when no handlers are registered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
