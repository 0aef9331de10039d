//! Load a module image from storage, validate it, instantiate it against
//! import bindings and invoke its exports.
//!
//! ```text
//! Unloaded --load--> Loaded --validate--> Validated --instantiate--> Instantiated
//!                      \_________________________________/              |
//!                                                              invoke (repeatable)
//! ```
//!
//! Validation is informational unless [`Config::strict_validation`] is
//! set: a `false` result does not stop `instantiate` from trying.
//!
//! [`Config::strict_validation`]: crate::Config::strict_validation

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::console::{Console, StdoutConsole};
use crate::storage::{FsStorage, Storage};
use crate::{Engine, Error, Instance, Linker, Module, Val};

/// The bytes of a module, as read from storage. Never mutated.
#[derive(Debug, Clone)]
pub struct ModuleImage {
    path: PathBuf,
    bytes: Arc<[u8]>,
}

impl ModuleImage {
    pub fn new(path: impl Into<PathBuf>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Assemble WebAssembly text into binary. Binary images pass through
    /// unchanged.
    pub fn assemble(self) -> Result<Self, Error> {
        let bytes = wat::parse_bytes(&self.bytes)
            .map_err(|err| Error::Compile(format!("{}: {err}", self.path.display())))?
            .into_owned();
        Ok(Self {
            path: self.path,
            bytes: bytes.into(),
        })
    }
}

/// Loads, validates, instantiates and invokes modules through explicit
/// storage and console capabilities.
pub struct ModuleLoader {
    engine: Engine,
    storage: Box<dyn Storage>,
    console: Rc<dyn Console>,
}

impl ModuleLoader {
    pub fn new(
        engine: Engine,
        storage: impl Storage + 'static,
        console: impl Console + 'static,
    ) -> Self {
        Self {
            engine,
            storage: Box::new(storage),
            console: Rc::new(console),
        }
    }

    /// Filesystem storage and stdout console.
    pub fn with_fs(engine: Engine) -> Self {
        Self::new(engine, FsStorage, StdoutConsole)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn console(&self) -> Rc<dyn Console> {
        Rc::clone(&self.console)
    }

    /// Read the whole file at `path`.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<ModuleImage, Error> {
        let path = path.as_ref();
        let bytes = self.storage.read(path).map_err(|source| Error::Storage {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "loaded module image");
        Ok(ModuleImage::new(path, bytes))
    }

    /// Structural check of the image. Returns `false` on malformed input
    /// instead of failing.
    pub fn validate(&self, image: &ModuleImage) -> bool {
        let valid = self.engine.validate(image.bytes());
        tracing::debug!(path = %image.path().display(), valid, "validated module image");
        valid
    }

    /// Parse and check the image without linking it.
    pub fn compile(&self, image: &ModuleImage) -> Result<Module, Error> {
        if self.engine.config().strict_validation && !self.validate(image) {
            return Err(Error::Compile(format!(
                "{}: module failed validation",
                image.path().display()
            )));
        }
        Module::from_bytes(&self.engine, image.bytes())
    }

    /// Compile, link against `linker` and run the start function.
    pub fn instantiate(&self, image: &ModuleImage, linker: &Linker) -> Result<Instance, Error> {
        let module = self.compile(image)?;
        let result = linker.instantiate(&self.engine, &module);
        match &result {
            Ok(instance) => tracing::info!(
                path = %image.path().display(),
                exports = instance.exports().count(),
                "instantiated module"
            ),
            Err(err) => tracing::warn!(
                path = %image.path().display(),
                error = %err,
                "instantiation failed"
            ),
        }
        result
    }

    /// Instantiation as a future. Nothing happens until it is first
    /// polled; it then completes in that poll.
    pub fn instantiate_async<'a>(
        &'a self,
        image: ModuleImage,
        linker: &'a Linker,
    ) -> Instantiation<'a> {
        Instantiation {
            loader: self,
            linker,
            image: Some(image),
        }
    }

    /// Instantiation with an error-or-value continuation.
    pub fn instantiate_then<F>(&self, image: &ModuleImage, linker: &Linker, then: F)
    where
        F: FnOnce(Result<Instance, Error>),
    {
        then(self.instantiate(image, linker));
    }

    /// Call export `name` with `args`.
    pub fn invoke(
        &self,
        instance: &mut Instance,
        name: &str,
        args: &[Val],
    ) -> Result<Vec<Val>, Error> {
        let results = instance.call_dynamic(name, args);
        if let Err(err) = &results {
            tracing::debug!(export = name, error = %err, "invoke failed");
        }
        results
    }
}

/// Future returned by [`ModuleLoader::instantiate_async`].
#[must_use = "futures do nothing unless polled"]
pub struct Instantiation<'a> {
    loader: &'a ModuleLoader,
    linker: &'a Linker,
    image: Option<ModuleImage>,
}

impl Future for Instantiation<'_> {
    type Output = Result<Instance, Error>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(image) = this.image.take() else {
            panic!("Instantiation polled after completion");
        };
        Poll::Ready(this.loader.instantiate(&image, this.linker))
    }
}
