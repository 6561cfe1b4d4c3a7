use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::{DetectorBackend, SharedDetector};
use super::backends::{ContrastBackend, StubBackend};
use super::result::ObjectClass;
use crate::config::DetectorSettings;

/// Thread-safe registry of detector backends.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes `&mut self`.
pub struct BackendRegistry {
    backends: HashMap<String, SharedDetector>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Registry with the built-in backends, defaulting to `settings.backend`.
    ///
    /// The ONNX model is loaded only when `tract` is the selected backend.
    /// `stub` is a dry-run backend that never reports anything; it is
    /// registered only when asked for by name.
    pub fn from_settings(settings: &DetectorSettings) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(ContrastBackend::new());
        if settings.backend == "stub" {
            log::warn!("stub backend selected: dry run, no detections will be reported");
            registry.register(StubBackend::new());
        }

        #[cfg(feature = "backend-tract")]
        {
            if settings.backend == "tract" {
                let mut tract =
                    super::backends::TractBackend::new(&settings.model_path, settings.input_size)?;
                tract.warm_up()?;
                log::info!("loaded model {}", settings.model_path.display());
                registry.register(tract);
            }
        }

        registry.set_default(&settings.backend)?;
        log::info!(
            "detector backend: {} (available: {})",
            settings.backend,
            registry.list().join(", ")
        );
        Ok(registry)
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            ));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedDetector> {
        self.backends.get(name).cloned()
    }

    pub fn default_backend(&self) -> Option<SharedDetector> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select a backend that reports the requested class.
    ///
    /// Prefers the default backend when it supports the class.
    pub fn backend_for_class(&self, class: ObjectClass) -> Result<SharedDetector> {
        if let Some(default_backend) = self.default_backend() {
            if supports(&default_backend, class)? {
                return Ok(default_backend);
            }
        }

        for name in self.list() {
            if let Some(backend) = self.backends.get(&name) {
                if supports(backend, class)? {
                    return Ok(backend.clone());
                }
            }
        }

        Err(anyhow!(
            "no registered backend supports class {:?}",
            class
        ))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn supports(backend: &SharedDetector, class: ObjectClass) -> Result<bool> {
    let guard = backend
        .lock()
        .map_err(|_| anyhow!("backend lock poisoned"))?;
    Ok(guard.supports(class))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{ContrastBackend, StubBackend};

    #[test]
    fn first_registered_backend_is_default() {
        let mut registry = BackendRegistry::new();
        registry.register(ContrastBackend::new());
        registry.register(StubBackend::new());

        let default = registry.default_backend().unwrap();
        assert_eq!(default.lock().unwrap().name(), "contrast");
        assert_eq!(registry.list(), vec!["contrast", "stub"]);
    }

    #[test]
    fn set_default_rejects_unknown_names() {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new());
        assert!(registry.set_default("tract").is_err());
        assert!(registry.set_default("stub").is_ok());
    }

    #[test]
    fn from_settings_selects_the_configured_backend() -> Result<()> {
        let settings = DetectorSettings {
            backend: "stub".to_string(),
            model_path: "missing.onnx".into(),
            input_size: 640,
        };
        let registry = BackendRegistry::from_settings(&settings)?;
        let default = registry.default_backend().unwrap();
        assert_eq!(default.lock().unwrap().name(), "stub");

        let contrast = DetectorSettings {
            backend: "contrast".to_string(),
            ..settings.clone()
        };
        assert_eq!(BackendRegistry::from_settings(&contrast)?.list(), vec!["contrast"]);

        let unknown = DetectorSettings {
            backend: "yolo-magic".to_string(),
            ..settings
        };
        assert!(BackendRegistry::from_settings(&unknown).is_err());
        Ok(())
    }

    #[test]
    fn falls_back_to_a_backend_supporting_the_class() -> Result<()> {
        let mut registry = BackendRegistry::new();
        registry.register(ContrastBackend::new());
        registry.register(StubBackend::new());

        let backend = registry.backend_for_class(ObjectClass::Other(7))?;
        assert_eq!(backend.lock().unwrap().name(), "stub");
        Ok(())
    }
}
